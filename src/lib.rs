//! Glues the ten workspace crates into a single running daemon: config loading,
//! persisted state, process-boundary check/notification executors, and the
//! `Bootstrap` that wires everything else together.

pub mod bootstrap;
pub mod executor;
pub mod state;

pub use bootstrap::Bootstrap;
pub use state::{PersistedState, StateError, StateResult};

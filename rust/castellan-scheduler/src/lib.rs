//! Scans the pending-check set on a fixed tick, checks eligibility (enabled,
//! inside check period, HA authority), admits against a global concurrency limit,
//! and dispatches each due checkable locally or to its configured remote endpoint.

pub mod error;
pub mod executor;
pub mod ha;
pub mod metrics;
pub mod pending;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use executor::CheckExecutor;
pub use scheduler::{ResultSink, Scheduler, SchedulerConfig};

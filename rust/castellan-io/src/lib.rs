//! The cooperative I/O substrate shared by the cluster transport and the check
//! executor: CPU-bound admission control, explicit deadlines and cancellation, and
//! mandatory-TLS setup.

pub mod admission;
pub mod deadline;
pub mod error;
pub mod tls;

pub use admission::{CpuBoundWork, IoBoundWorkSlot, IoEngine};
pub use deadline::run_with_deadline;
pub use error::{IoError, IoResult};
pub use tls::{peer_common_name, TlsMaterial};

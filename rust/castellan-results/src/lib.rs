//! The hard/soft state machine and its downstream fan-out: a typed signal bus for
//! anyone who wants to observe result processing, plus the notification and
//! perfdata sink boundary traits that keep this crate from depending on either of
//! its consumers.

pub mod processor;
pub mod signal;
pub mod sinks;
pub mod transition;

pub use processor::ResultProcessor;
pub use signal::{Signal, SignalBus};
pub use sinks::{NotificationSink, PerfdataSink};
pub use transition::{apply_result, Transition};

//! Turns a processed check result into delivered notifications: candidate type
//! derivation, type/state/time filters, timeperiod-gated suppression, and
//! downtime/acknowledgement/flapping gating, plus the reminder cadence for a
//! problem that hasn't recovered.

pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod types;

pub use config::NotificationConfig;
pub use engine::NotificationEngine;
pub use error::{NotifyError, NotifyResult};
pub use executor::NotificationExecutor;
pub use types::{NotificationType, TypeFilter};

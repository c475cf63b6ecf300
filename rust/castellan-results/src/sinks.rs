//! Boundary traits the result processor calls out through. Defined here (rather
//! than in the notification/perfdata crates) so this crate has no dependency on
//! either of them; they depend on this crate instead to implement these traits.

use std::sync::Arc;

use async_trait::async_trait;
use castellan_registry::{CheckResult, Checkable};

use crate::transition::Transition;

/// What the result processor asks the notification engine to do with each
/// processed result. One call per result, after the checkable's state has
/// already been updated and its lock is still held by the caller's logical
/// section (the call itself is async, so the lock is not literally held across
/// the await -- see [`crate::processor::ResultProcessor`]).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn handle_result(&self, checkable: Arc<Checkable>, transition: Transition, result: Arc<CheckResult>);
}

/// Where a processed result is pushed for performance-data export.
#[async_trait]
pub trait PerfdataSink: Send + Sync {
    async fn enqueue(&self, checkable: Arc<Checkable>, result: Arc<CheckResult>);
}

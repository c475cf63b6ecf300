//! The single entry point every external surface (HTTP API, CLI `--reload`
//! hooks, a future gRPC endpoint) is meant to call through. Every operation here
//! is translated straight into the same calls the scheduler and notification
//! engine use internally -- no notification or scheduling logic is duplicated at
//! this layer, which is why it is expressed purely as a trait with no transport
//! bound to it.

use async_trait::async_trait;
use castellan_registry::{CheckResult, CheckableSnapshot, ObjectId};
use castellan_results::Signal;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::auth::AuthContext;
use crate::error::FacadeResult;

#[derive(Debug, Clone)]
pub struct DowntimeRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fixed: bool,
    pub author: String,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct AcknowledgementRequest {
    pub author: String,
    pub comment: String,
    pub sticky: bool,
}

#[async_trait]
pub trait CoreFacade: Send + Sync {
    /// Accepts a passive check result produced outside the scheduler (e.g. from
    /// an external monitoring agent) and runs it through the same result
    /// processor active checks use.
    async fn process_check_result(&self, auth: &AuthContext, id: ObjectId, result: CheckResult) -> FacadeResult<()>;

    async fn schedule_downtime(&self, auth: &AuthContext, id: ObjectId, request: DowntimeRequest) -> FacadeResult<u64>;

    async fn remove_downtime(&self, auth: &AuthContext, id: ObjectId, downtime_id: u64) -> FacadeResult<()>;

    async fn acknowledge_problem(&self, auth: &AuthContext, id: ObjectId, request: AcknowledgementRequest) -> FacadeResult<()>;

    async fn clear_acknowledgement(&self, auth: &AuthContext, id: ObjectId) -> FacadeResult<()>;

    async fn reschedule(&self, auth: &AuthContext, id: ObjectId, when: DateTime<Utc>) -> FacadeResult<()>;

    async fn send_custom_notification(&self, auth: &AuthContext, id: ObjectId, author: String, comment: String) -> FacadeResult<()>;

    async fn query_checkable(&self, auth: &AuthContext, id: ObjectId) -> FacadeResult<CheckableSnapshot>;

    /// A live feed of state-change/new-result/reachability signals, scoped to
    /// whatever objects `auth` can see. Implementations filter the underlying
    /// `SignalBus` broadcast by permission before handing it to the caller.
    async fn subscribe_events(&self, auth: &AuthContext) -> FacadeResult<broadcast::Receiver<Signal>>;
}

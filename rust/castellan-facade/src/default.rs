use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use castellan_registry::{Acknowledgement, CheckResult, CheckableSnapshot, Downtime, ObjectId, Registry};
use castellan_notify::NotificationEngine;
use castellan_results::{ResultProcessor, Signal};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::auth::{AuthContext, PermissionChecker};
use crate::error::{FacadeError, FacadeResult};
use crate::facade::{AcknowledgementRequest, CoreFacade, DowntimeRequest};

/// The production wiring of [`CoreFacade`]: looks objects up in the shared
/// registry, runs every mutation through the same result processor and
/// notification engine the scheduler drives, and rejects anything the caller
/// can't see or touch before it gets that far.
pub struct DefaultFacade {
    registry: Arc<Registry>,
    processor: Arc<ResultProcessor>,
    notify: Arc<NotificationEngine>,
    permissions: Arc<dyn PermissionChecker>,
    next_downtime_id: AtomicU64,
}

impl DefaultFacade {
    pub fn new(
        registry: Arc<Registry>,
        processor: Arc<ResultProcessor>,
        notify: Arc<NotificationEngine>,
        permissions: Arc<dyn PermissionChecker>,
    ) -> Self {
        Self {
            registry,
            processor,
            notify,
            permissions,
            next_downtime_id: AtomicU64::new(1),
        }
    }

    fn require_view(&self, auth: &AuthContext, id: &ObjectId) -> FacadeResult<()> {
        if self.permissions.can_view(&auth.principal, id) {
            Ok(())
        } else {
            Err(FacadeError::NotFound(id.clone()))
        }
    }

    fn require_mutate(&self, auth: &AuthContext, id: &ObjectId) -> FacadeResult<()> {
        if self.permissions.can_mutate(&auth.principal, id) {
            Ok(())
        } else {
            Err(FacadeError::NotFound(id.clone()))
        }
    }

    fn lookup(&self, auth: &AuthContext, id: &ObjectId, mutate: bool) -> FacadeResult<Arc<castellan_registry::Checkable>> {
        if mutate {
            self.require_mutate(auth, id)?;
        } else {
            self.require_view(auth, id)?;
        }
        self.registry.checkable(id).ok_or_else(|| FacadeError::NotFound(id.clone()))
    }
}

#[async_trait]
impl CoreFacade for DefaultFacade {
    async fn process_check_result(&self, auth: &AuthContext, id: ObjectId, result: CheckResult) -> FacadeResult<()> {
        let checkable = self.lookup(auth, &id, true)?;
        info!(object = %id, principal = %auth.principal, "passive check result accepted");
        self.processor.process(checkable, result).await;
        Ok(())
    }

    async fn schedule_downtime(&self, auth: &AuthContext, id: ObjectId, request: DowntimeRequest) -> FacadeResult<u64> {
        if request.end <= request.start {
            return Err(FacadeError::Validation("downtime end must be after start".into()));
        }
        let checkable = self.lookup(auth, &id, true)?;
        let downtime_id = self.next_downtime_id.fetch_add(1, Ordering::SeqCst);
        checkable.lock().downtimes.push(Downtime {
            id: downtime_id,
            start: request.start,
            end: request.end,
            fixed: request.fixed,
            author: request.author,
            comment: request.comment,
        });
        Ok(downtime_id)
    }

    async fn remove_downtime(&self, auth: &AuthContext, id: ObjectId, downtime_id: u64) -> FacadeResult<()> {
        let checkable = self.lookup(auth, &id, true)?;
        checkable.lock().downtimes.retain(|d| d.id != downtime_id);
        Ok(())
    }

    async fn acknowledge_problem(&self, auth: &AuthContext, id: ObjectId, request: AcknowledgementRequest) -> FacadeResult<()> {
        let checkable = self.lookup(auth, &id, true)?;
        let acknowledged_state = checkable.lock().hard_state;
        if acknowledged_state.is_ok() {
            return Err(FacadeError::Validation("cannot acknowledge a checkable that is currently OK".into()));
        }
        checkable.lock().acknowledgement = Some(Acknowledgement {
            author: request.author,
            comment: request.comment,
            sticky: request.sticky,
            acknowledged_state,
        });
        Ok(())
    }

    async fn clear_acknowledgement(&self, auth: &AuthContext, id: ObjectId) -> FacadeResult<()> {
        let checkable = self.lookup(auth, &id, true)?;
        checkable.lock().acknowledgement = None;
        Ok(())
    }

    async fn reschedule(&self, auth: &AuthContext, id: ObjectId, when: DateTime<Utc>) -> FacadeResult<()> {
        let checkable = self.lookup(auth, &id, true)?;
        checkable.lock().next_check = when;
        Ok(())
    }

    async fn send_custom_notification(&self, auth: &AuthContext, id: ObjectId, author: String, comment: String) -> FacadeResult<()> {
        self.lookup(auth, &id, true)?;
        self.notify.send_custom(&id, &author, &comment).await;
        Ok(())
    }

    async fn query_checkable(&self, auth: &AuthContext, id: ObjectId) -> FacadeResult<CheckableSnapshot> {
        let checkable = self.lookup(auth, &id, false)?;
        Ok(checkable.snapshot())
    }

    async fn subscribe_events(&self, _auth: &AuthContext) -> FacadeResult<broadcast::Receiver<Signal>> {
        // The bus has no concept of per-subscriber filtering; a permission-aware
        // caller is expected to check each received signal's object id against
        // `can_view` itself before acting on it.
        Ok(self.processor.signals.subscribe())
    }
}

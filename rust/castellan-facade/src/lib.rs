//! Authenticated, permission-checked entry points the core accepts from anything
//! outside the scheduler loop: a passive check result, a downtime, an
//! acknowledgement, a reschedule, a custom notification, a status query, or an
//! event subscription. Every one of these is expressed as a method on
//! [`CoreFacade`] and translated straight into the same calls the scheduler and
//! notification engine make internally -- no transport (HTTP, gRPC, ...) is
//! bound to this crate; that is left entirely to whatever binds it in.

pub mod auth;
pub mod default;
pub mod error;
pub mod facade;

pub use auth::{AllowAll, AuthContext, PermissionChecker};
pub use default::DefaultFacade;
pub use error::{FacadeError, FacadeResult};
pub use facade::{AcknowledgementRequest, CoreFacade, DowntimeRequest};

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::{CheckState, CheckableConfig, CheckableKind, ObjectKind, Registry};
    use castellan_results::ResultProcessor;
    use chrono::Utc;
    use std::sync::Arc;

    struct DenyMutate;
    impl PermissionChecker for DenyMutate {
        fn can_view(&self, _principal: &str, _object: &castellan_registry::ObjectId) -> bool {
            true
        }
        fn can_mutate(&self, _principal: &str, _object: &castellan_registry::ObjectId) -> bool {
            false
        }
    }

    struct NullNotify;
    #[async_trait::async_trait]
    impl castellan_results::NotificationSink for NullNotify {
        async fn handle_result(
            &self,
            _c: Arc<castellan_registry::Checkable>,
            _t: castellan_results::Transition,
            _r: Arc<CheckResult>,
        ) {
        }
    }

    struct NullPerfdata;
    #[async_trait::async_trait]
    impl castellan_results::PerfdataSink for NullPerfdata {
        async fn enqueue(&self, _c: Arc<castellan_registry::Checkable>, _r: Arc<CheckResult>) {}
    }

    struct NoopExecutor;
    #[async_trait::async_trait]
    impl castellan_notify::NotificationExecutor for NoopExecutor {
        async fn send(
            &self,
            _user: &str,
            _checkable: &castellan_registry::Checkable,
            _ntype: castellan_notify::NotificationType,
            _result: &CheckResult,
        ) -> castellan_notify::NotifyResult<()> {
            Ok(())
        }
    }

    fn make_facade(permissions: Arc<dyn PermissionChecker>) -> (DefaultFacade, Arc<Registry>, castellan_registry::ObjectId) {
        let registry = Arc::new(Registry::new());
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let checkable = castellan_registry::Checkable::new(cfg, Utc::now());
        registry.activate_checkable(checkable.clone()).unwrap();
        let id = castellan_registry::ObjectId::new(ObjectKind::Host, "web1");

        let processor = Arc::new(ResultProcessor::new(Arc::new(NullNotify), Arc::new(NullPerfdata), 16));
        let prom = prometheus::Registry::new();
        let notify = castellan_notify::NotificationEngine::new(registry.clone(), Arc::new(NoopExecutor), &prom).unwrap();

        (DefaultFacade::new(registry.clone(), processor, notify, permissions), registry, id)
    }

    fn sample_result(state: CheckState) -> CheckResult {
        let now = Utc::now();
        CheckResult {
            scheduled_start: now,
            scheduled_end: now,
            execution_start: now,
            execution_end: now,
            state,
            output: "ok".into(),
            perfdata: Vec::new(),
            active: false,
            origin: Some("facade".into()),
        }
    }

    #[tokio::test]
    async fn process_check_result_updates_checkable_state() {
        let (facade, registry, id) = make_facade(Arc::new(AllowAll));
        let auth = AuthContext::new("alice");

        facade
            .process_check_result(&auth, id.clone(), sample_result(CheckState::Ok))
            .await
            .unwrap();

        let snapshot = registry.checkable(&id).unwrap().snapshot();
        assert!(snapshot.hard_state.is_ok());
    }

    #[tokio::test]
    async fn mutation_denied_for_principal_without_mutate_permission() {
        let (facade, _registry, id) = make_facade(Arc::new(DenyMutate));
        let auth = AuthContext::new("bob");

        let err = facade
            .process_check_result(&auth, id.clone(), sample_result(CheckState::Ok))
            .await
            .unwrap_err();

        assert!(matches!(err, FacadeError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_object_and_permission_denial_are_indistinguishable() {
        let (facade, _registry, id) = make_facade(Arc::new(AllowAll));
        let auth = AuthContext::new("alice");
        let missing = castellan_registry::ObjectId::new(ObjectKind::Host, "does-not-exist");

        let missing_err = facade.query_checkable(&auth, missing).await.unwrap_err();
        let denied_err = {
            let (denied_facade, _r, _id) = make_facade(Arc::new(DenyMutate));
            denied_facade.reschedule(&auth, id, Utc::now()).await.unwrap_err()
        };

        assert!(matches!(missing_err, FacadeError::NotFound(_)));
        assert!(matches!(denied_err, FacadeError::NotFound(_)));
    }

    #[tokio::test]
    async fn schedule_downtime_rejects_inverted_window() {
        let (facade, _registry, id) = make_facade(Arc::new(AllowAll));
        let auth = AuthContext::new("alice");
        let now = Utc::now();

        let err = facade
            .schedule_downtime(
                &auth,
                id,
                DowntimeRequest {
                    start: now,
                    end: now - chrono::Duration::seconds(1),
                    fixed: true,
                    author: "alice".into(),
                    comment: "bad window".into(),
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, FacadeError::Validation(_)));
    }
}

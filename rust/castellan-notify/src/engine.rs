//! Decides whether and who to notify, and owns the suppression ledger that records
//! notifications deferred by a closed timeperiod so they can fire -- or be
//! cancelled -- once it reopens.
//!
//! Registered configurations live entirely in this crate (`castellan-registry`
//! only tracks the `ObjectKind::Notification` lifecycle slot); a checkable's list
//! of configs is looked up by [`ObjectId`] whenever a result is processed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use castellan_registry::{
    CheckResult, CheckState, Checkable, ObjectId, ObjectKind, Registry,
};
use castellan_results::{NotificationSink, Transition};
use castellan_timer::TimerSet;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use prometheus::Registry as PromRegistry;
use tracing::{debug, warn};

use crate::config::NotificationConfig;
use crate::executor::NotificationExecutor;
use crate::metrics::NotifyMetrics;
use crate::types::{NotificationType, TypeFilter};

pub struct NotificationEngine {
    registry: Arc<Registry>,
    executor: Arc<dyn NotificationExecutor>,
    configs: DashMap<ObjectId, Vec<Arc<NotificationConfig>>>,
    last_sent: DashMap<(ObjectId, String), DateTime<Utc>>,
    flapping_seen: DashMap<ObjectId, bool>,
    metrics: NotifyMetrics,
}

impl NotificationEngine {
    pub fn new(
        registry: Arc<Registry>,
        executor: Arc<dyn NotificationExecutor>,
        prom_registry: &PromRegistry,
    ) -> prometheus::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            registry,
            executor,
            configs: DashMap::new(),
            last_sent: DashMap::new(),
            flapping_seen: DashMap::new(),
            metrics: NotifyMetrics::new(prom_registry)?,
        }))
    }

    /// Attach a notification config to a checkable. Multiple configs per checkable
    /// are normal -- e.g. one for pagers filtered to `Critical`, one for email
    /// filtered to everything.
    pub fn register(&self, id: ObjectId, config: NotificationConfig) {
        self.configs.entry(id).or_default().push(Arc::new(config));
    }

    /// Spawn the periodic sweep that drives reminders and reconciles the
    /// suppression ledger against timeperiods that have since opened or closed.
    /// Returns the timer's id so the caller can cancel it at shutdown.
    pub fn spawn_sweep(self: &Arc<Self>, timer: &Arc<TimerSet>, interval: Duration) -> castellan_timer::TimerId {
        let this = self.clone();
        timer.add_periodic(
            interval,
            Arc::new(move || {
                let this = this.clone();
                Box::pin(async move { this.sweep().await })
            }),
        )
    }

    async fn sweep(&self) {
        let now = Utc::now();
        for checkable in self.registry.all_checkables() {
            let id = object_id(&checkable);
            if !self.configs.contains_key(&id) {
                continue;
            }
            self.reconcile_suppressed(&checkable, &id, now).await;
            self.send_reminders(&checkable, &id, now).await;
        }
    }

    /// Re-examine every bit set in a checkable's suppression ledger: fire it if its
    /// timeperiod has reopened and the originating condition still holds, cancel it
    /// if the opposing condition now holds instead, and otherwise leave it pending.
    async fn reconcile_suppressed(&self, checkable: &Checkable, id: &ObjectId, now: DateTime<Utc>) {
        let (mut bits, current_state) = {
            let state = checkable.lock();
            (state.suppressed_notifications, state.hard_state)
        };
        if bits == 0 {
            return;
        }

        // A pending Problem and a pending Recovery together mean the checkable
        // toggled back and forth while the timeperiod was closed; they cancel each
        // other outright rather than being judged against the current state, since
        // whichever one matches `current_state` is only an artifact of which edge
        // happened to be last.
        let opposed = NotificationType::Problem.bit() | NotificationType::Recovery.bit();
        if bits & opposed == opposed {
            checkable.lock().suppressed_notifications &= !opposed;
            self.metrics.suppressed.with_label_values(&[NotificationType::Problem.label(), "cancelled"]).inc();
            self.metrics.suppressed.with_label_values(&[NotificationType::Recovery.label(), "cancelled"]).inc();
            debug!(checkable = %checkable.name(), "opposing problem/recovery suppressions cancelled each other");
            bits &= !opposed;
        }

        for ntype in ALL_TYPES {
            if bits & ntype.bit() == 0 {
                continue;
            }
            if self.condition_stale(ntype, current_state) {
                checkable.lock().suppressed_notifications &= !ntype.bit();
                self.metrics.suppressed.with_label_values(&[ntype.label(), "cancelled"]).inc();
                debug!(checkable = %checkable.name(), ntype = ntype.label(), "cancelled stale suppressed notification");
                continue;
            }
            if self.dispatch(checkable, id, ntype, current_state, now).await {
                checkable.lock().suppressed_notifications &= !ntype.bit();
            }
        }
    }

    /// Whether the condition that originally queued `ntype` no longer matches the
    /// checkable's current state, meaning the pending notification is moot.
    fn condition_stale(&self, ntype: NotificationType, current_state: CheckState) -> bool {
        match ntype {
            NotificationType::Problem => current_state.is_ok(),
            NotificationType::Recovery => !current_state.is_ok(),
            _ => false,
        }
    }

    async fn send_reminders(&self, checkable: &Checkable, id: &ObjectId, now: DateTime<Utc>) {
        let (current_state, last_hard_change) = {
            let state = checkable.lock();
            (state.hard_state, state.last_hard_state_change)
        };
        if current_state.is_ok() {
            return;
        }
        let Some(configs) = self.configs.get(id).map(|c| c.clone()) else {
            return;
        };
        for config in configs {
            let Some(interval) = config.interval else {
                continue;
            };
            if !config.types.contains(NotificationType::Problem) || !config.states.contains(current_state) {
                continue;
            }
            let key = (id.clone(), config.name.clone());
            let due = match self.last_sent.get(&key) {
                Some(last) => now - *last >= chrono_duration(interval),
                None => now - last_hard_change >= chrono_duration(interval),
            };
            if due {
                self.dispatch(checkable, id, NotificationType::Problem, current_state, now).await;
            }
        }
    }

    /// Evaluate every config registered for `id` against a single `(ntype,
    /// current_state)` event, sending to whichever users pass every gate. Returns
    /// whether at least one user was actually notified, which the suppression
    /// ledger uses to decide whether a pending bit can be cleared.
    async fn dispatch(
        &self,
        checkable: &Checkable,
        id: &ObjectId,
        ntype: NotificationType,
        current_state: CheckState,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(configs) = self.configs.get(id).map(|c| c.clone()) else {
            return false;
        };
        let result = checkable.lock().last_result.clone();
        let Some(result) = result else {
            return false;
        };

        let mut any_sent = false;
        for config in configs {
            if !config.types.contains(ntype) {
                continue;
            }
            if matches!(ntype, NotificationType::Problem | NotificationType::Recovery)
                && !config.states.contains(current_state)
            {
                continue;
            }

            let elapsed = {
                let state = checkable.lock();
                (now - state.last_hard_state_change)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            };
            if !config.in_window(elapsed) {
                continue;
            }

            if let Some(period_name) = &config.period {
                let open = self
                    .registry
                    .timeperiod(period_name)
                    .map(|tp| tp.is_inside(now))
                    .unwrap_or(true);
                if !open {
                    checkable.lock().suppressed_notifications |= ntype.bit();
                    self.metrics.suppressed.with_label_values(&[ntype.label(), "timeperiod"]).inc();
                    continue;
                }
            }

            {
                let state = checkable.lock();
                if state.is_in_downtime(now) && !matches!(ntype, NotificationType::DowntimeStart | NotificationType::DowntimeEnd) {
                    drop(state);
                    self.metrics.suppressed.with_label_values(&[ntype.label(), "downtime"]).inc();
                    continue;
                }
                if state.is_acknowledged_at(current_state) && ntype == NotificationType::Problem {
                    drop(state);
                    self.metrics.suppressed.with_label_values(&[ntype.label(), "acknowledged"]).inc();
                    continue;
                }
                if state.flapping && !matches!(ntype, NotificationType::FlappingStart | NotificationType::FlappingEnd) {
                    drop(state);
                    self.metrics.suppressed.with_label_values(&[ntype.label(), "flapping"]).inc();
                    continue;
                }
                if !state.notifications_enabled {
                    drop(state);
                    self.metrics.suppressed.with_label_values(&[ntype.label(), "disabled"]).inc();
                    continue;
                }
            }

            for user in &config.users {
                match self.executor.send(user, checkable, ntype, &result).await {
                    Ok(()) => {
                        any_sent = true;
                        self.metrics.sent.with_label_values(&[ntype.label()]).inc();
                    }
                    Err(err) => {
                        warn!(checkable = %checkable.name(), user, ntype = ntype.label(), error = %err, "notification delivery failed");
                    }
                }
            }
            if any_sent {
                self.last_sent.insert((id.clone(), config.name.clone()), now);
            }
        }
        any_sent
    }

    /// Fan out an operator-authored custom notification (e.g. from the facade's
    /// `send_custom_notification`), running it through the same gating pipeline as
    /// every other notification type. `comment` replaces nothing in the check
    /// result itself; executors that want it must read it from the config or log
    /// line they're given -- this engine only decides who gets notified and when.
    pub async fn send_custom(&self, id: &ObjectId, author: &str, comment: &str) {
        let _ = (author, comment);
        let Some(checkable) = self.registry.checkable(id) else {
            return;
        };
        let current_state = checkable.lock().hard_state;
        self.dispatch(&checkable, id, NotificationType::Custom, current_state, Utc::now()).await;
    }

    /// Called by the result processor for every processed check result. Determines
    /// the candidate notification type from the state transition and any flapping
    /// edge, then runs the full gating pipeline for each.
    async fn handle(&self, checkable: Arc<Checkable>, transition: Transition, result: Arc<CheckResult>) {
        let _ = &result; // dispatch reads the checkable's own `last_result` instead
        let id = object_id(&checkable);
        if !self.configs.contains_key(&id) {
            return;
        }
        let now = Utc::now();

        if let Some(ntype) = problem_or_recovery(&transition) {
            self.dispatch(&checkable, &id, ntype, transition.new_state, now).await;
        }

        let flapping_now = checkable.lock().flapping;
        let was_flapping = self.flapping_seen.insert(id.clone(), flapping_now).unwrap_or(false);
        if flapping_now != was_flapping {
            let ntype = if flapping_now {
                NotificationType::FlappingStart
            } else {
                NotificationType::FlappingEnd
            };
            self.dispatch(&checkable, &id, ntype, transition.new_state, now).await;
        }
    }
}

fn problem_or_recovery(transition: &Transition) -> Option<NotificationType> {
    if !transition.hard_changed {
        return None;
    }
    if transition.is_recovery {
        Some(NotificationType::Recovery)
    } else {
        Some(NotificationType::Problem)
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::seconds(60))
}

fn object_id(checkable: &Checkable) -> ObjectId {
    let kind = match checkable.config.kind {
        castellan_registry::CheckableKind::Host => ObjectKind::Host,
        castellan_registry::CheckableKind::Service => ObjectKind::Service,
    };
    ObjectId::new(kind, checkable.name())
}

const ALL_TYPES: [NotificationType; 8] = [
    NotificationType::Problem,
    NotificationType::Recovery,
    NotificationType::Acknowledgement,
    NotificationType::DowntimeStart,
    NotificationType::DowntimeEnd,
    NotificationType::FlappingStart,
    NotificationType::FlappingEnd,
    NotificationType::Custom,
];

#[async_trait]
impl NotificationSink for NotificationEngine {
    async fn handle_result(&self, checkable: Arc<Checkable>, transition: Transition, result: Arc<CheckResult>) {
        self.handle(checkable, transition, result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::{Acknowledgement, CheckableConfig, CheckableKind, PerfdataValue};
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingExecutor {
        calls: StdMutex<Vec<(String, &'static str)>>,
    }

    impl RecordingExecutor {
        fn new() -> Self {
            Self { calls: StdMutex::new(Vec::new()) }
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl NotificationExecutor for RecordingExecutor {
        async fn send(&self, user: &str, _checkable: &Checkable, ntype: NotificationType, _result: &CheckResult) -> NotifyResult<()> {
            self.calls.lock().unwrap().push((user.to_string(), ntype.label()));
            Ok(())
        }
    }

    fn sample_result(state: CheckState) -> Arc<CheckResult> {
        let now = Utc::now();
        Arc::new(CheckResult {
            scheduled_start: now,
            scheduled_end: now,
            execution_start: now,
            execution_end: now,
            state,
            output: "output".into(),
            perfdata: Vec::<PerfdataValue>::new(),
            active: true,
            origin: None,
        })
    }

    fn problem_transition() -> Transition {
        Transition {
            hard_changed: true,
            is_recovery: false,
            still_in_state: false,
            previous_hard_state: CheckState::Ok,
            new_state: CheckState::Critical,
        }
    }

    fn engine_with(executor: Arc<RecordingExecutor>) -> (Arc<NotificationEngine>, Arc<Registry>) {
        let registry = Arc::new(Registry::new());
        let prom = PromRegistry::new();
        let engine = NotificationEngine::new(registry.clone(), executor, &prom).unwrap();
        (engine, registry)
    }

    fn checkable_with_result(state: CheckState) -> (Arc<Checkable>, ObjectId) {
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let checkable = Checkable::new(cfg, Utc::now());
        checkable.lock().last_result = Some(sample_result(state));
        let id = object_id(&checkable);
        (checkable, id)
    }

    #[tokio::test]
    async fn sends_on_hard_problem_transition() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, _registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Critical);
        engine.register(id, NotificationConfig::new("page", vec!["oncall".to_string()]));

        engine
            .handle_result(checkable, problem_transition(), sample_result(CheckState::Critical))
            .await;

        assert_eq!(executor.count(), 1);
    }

    #[tokio::test]
    async fn closed_timeperiod_suppresses_and_sets_ledger_bit() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Critical);

        let closed = castellan_registry::TimePeriod::new(
            "never",
            vec![castellan_registry::TimeRange::Fixed {
                start: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2000, 1, 2).unwrap(),
            }],
        );
        registry.activate_timeperiod(Arc::new(closed)).unwrap();

        let mut cfg = NotificationConfig::new("page", vec!["oncall".to_string()]);
        cfg.period = Some("never".to_string());
        engine.register(id, cfg);

        engine
            .handle_result(checkable.clone(), problem_transition(), sample_result(CheckState::Critical))
            .await;

        assert_eq!(executor.count(), 0);
        assert_ne!(checkable.lock().suppressed_notifications & NotificationType::Problem.bit(), 0);
    }

    #[tokio::test]
    async fn acknowledged_problem_is_suppressed() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, _registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Critical);
        checkable.lock().acknowledgement = Some(Acknowledgement {
            author: "op".into(),
            comment: "known".into(),
            sticky: true,
            acknowledged_state: CheckState::Critical,
        });
        engine.register(id, NotificationConfig::new("page", vec!["oncall".to_string()]));

        engine
            .handle_result(checkable, problem_transition(), sample_result(CheckState::Critical))
            .await;

        assert_eq!(executor.count(), 0);
    }

    #[tokio::test]
    async fn suppressed_problem_fires_once_timeperiod_reopens() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Critical);
        checkable.lock().suppressed_notifications |= NotificationType::Problem.bit();

        registry.activate_timeperiod(Arc::new(castellan_registry::TimePeriod::always())).unwrap();
        let mut cfg = NotificationConfig::new("page", vec!["oncall".to_string()]);
        cfg.period = Some("always".to_string());
        engine.register(id.clone(), cfg);

        engine.reconcile_suppressed(&checkable, &id, Utc::now()).await;

        assert_eq!(executor.count(), 1);
        assert_eq!(checkable.lock().suppressed_notifications & NotificationType::Problem.bit(), 0);
    }

    #[tokio::test]
    async fn stale_suppressed_problem_is_cancelled_on_recovery() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, _registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Ok);
        checkable.lock().suppressed_notifications |= NotificationType::Problem.bit();
        engine.register(id.clone(), NotificationConfig::new("page", vec!["oncall".to_string()]));

        engine.reconcile_suppressed(&checkable, &id, Utc::now()).await;

        assert_eq!(checkable.lock().suppressed_notifications & NotificationType::Problem.bit(), 0);
        assert_eq!(executor.count(), 0);
    }

    #[tokio::test]
    async fn opposing_problem_and_recovery_suppressions_cancel_with_no_sends() {
        let executor = Arc::new(RecordingExecutor::new());
        let (engine, _registry) = engine_with(executor.clone());
        let (checkable, id) = checkable_with_result(CheckState::Ok);
        checkable.lock().suppressed_notifications |= NotificationType::Problem.bit() | NotificationType::Recovery.bit();
        engine.register(id.clone(), NotificationConfig::new("page", vec!["oncall".to_string()]));

        engine.reconcile_suppressed(&checkable, &id, Utc::now()).await;

        assert_eq!(executor.count(), 0);
        assert_eq!(checkable.lock().suppressed_notifications, 0);
    }

    #[test]
    fn type_filter_reports_membership() {
        let filter = TypeFilter::none().with(NotificationType::Problem);
        assert!(filter.contains(NotificationType::Problem));
        assert!(!filter.contains(NotificationType::Recovery));
    }
}

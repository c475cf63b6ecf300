//! Invoked exactly once per result, with the checkable's per-object lock held for
//! the synchronous part of the work: apply the state machine, update timing/
//! output/perfdata, recompute `next_check`, and decide flapping/suppression. The
//! async fan-out to the notification engine and perfdata writers happens after
//! the lock is released, so a slow downstream consumer never blocks the next
//! result for the same checkable from being recorded.

use std::sync::Arc;
use std::time::Duration;

use castellan_registry::{CheckResult, Checkable, StateType};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::signal::{Signal, SignalBus};
use crate::sinks::{NotificationSink, PerfdataSink};
use crate::transition::apply_result;

pub struct ResultProcessor {
    pub signals: SignalBus,
    notification_sink: Arc<dyn NotificationSink>,
    perfdata_sink: Arc<dyn PerfdataSink>,
}

impl ResultProcessor {
    pub fn new(
        notification_sink: Arc<dyn NotificationSink>,
        perfdata_sink: Arc<dyn PerfdataSink>,
        signal_capacity: usize,
    ) -> Self {
        Self {
            signals: SignalBus::new(signal_capacity),
            notification_sink,
            perfdata_sink,
        }
    }

    /// Process one result. Returns the checkable's newly computed `next_check`,
    /// matching the shape `castellan-scheduler::ResultSink` expects so a
    /// `ResultProcessor` can be wired in directly as the scheduler's result
    /// callback.
    pub async fn process(&self, checkable: Arc<Checkable>, result: CheckResult) -> DateTime<Utc> {
        let result = Arc::new(result);
        let id = checkable_object_id(&checkable);

        let (transition, next_check) = {
            let mut state = checkable.lock();
            let transition = apply_result(&mut state, &checkable.config, &result);
            state.last_result = Some(result.clone());

            let next_check = match state.state_type {
                StateType::Hard => Utc::now() + chrono_duration(checkable.config.check_interval),
                StateType::Soft => Utc::now() + chrono_duration(checkable.config.retry_interval),
            };
            state.next_check = next_check;

            if transition.hard_changed {
                info!(
                    checkable = %checkable.name(),
                    previous = ?transition.previous_hard_state,
                    current = ?transition.new_state,
                    attempt = state.attempt,
                    state_type = ?state.state_type,
                    "hard state transition"
                );
            }

            (transition, next_check)
        };

        self.signals.emit(Signal::NewCheckResult {
            id: id.clone(),
            result: result.clone(),
        });
        if transition.hard_changed {
            self.signals.emit(Signal::StateChange {
                id: id.clone(),
                previous: transition.previous_hard_state,
                current: transition.new_state,
                is_recovery: transition.is_recovery,
            });
        }

        self.notification_sink
            .handle_result(checkable.clone(), transition, result.clone())
            .await;
        self.perfdata_sink.enqueue(checkable, result).await;

        next_check
    }
}

fn chrono_duration(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::seconds(60))
}

fn checkable_object_id(checkable: &Checkable) -> castellan_registry::ObjectId {
    let kind = match checkable.config.kind {
        castellan_registry::CheckableKind::Host => castellan_registry::ObjectKind::Host,
        castellan_registry::CheckableKind::Service => castellan_registry::ObjectKind::Service,
    };
    castellan_registry::ObjectId::new(kind, checkable.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::{CheckState, CheckableConfig, CheckableKind};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingNotify(Arc<AtomicUsize>);
    #[async_trait::async_trait]
    impl NotificationSink for CountingNotify {
        async fn handle_result(&self, _c: Arc<Checkable>, _t: crate::transition::Transition, _r: Arc<CheckResult>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct CountingPerfdata(Arc<AtomicUsize>);
    #[async_trait::async_trait]
    impl PerfdataSink for CountingPerfdata {
        async fn enqueue(&self, _c: Arc<Checkable>, _r: Arc<CheckResult>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn result(state: CheckState) -> CheckResult {
        let now = Utc::now();
        CheckResult {
            scheduled_start: now,
            scheduled_end: now,
            execution_start: now,
            execution_end: now,
            state,
            output: "ok".into(),
            perfdata: Vec::new(),
            active: true,
            origin: None,
        }
    }

    #[tokio::test]
    async fn process_calls_both_sinks_and_returns_next_check() {
        let notif_count = Arc::new(AtomicUsize::new(0));
        let perf_count = Arc::new(AtomicUsize::new(0));
        let processor = ResultProcessor::new(
            Arc::new(CountingNotify(notif_count.clone())),
            Arc::new(CountingPerfdata(perf_count.clone())),
            16,
        );
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let checkable = Checkable::new(cfg, Utc::now());

        let before = Utc::now();
        let next_check = processor.process(checkable, result(CheckState::Ok)).await;

        assert_eq!(notif_count.load(Ordering::SeqCst), 1);
        assert_eq!(perf_count.load(Ordering::SeqCst), 1);
        assert!(next_check > before);
    }
}

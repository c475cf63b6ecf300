use prometheus::{Histogram, HistogramOpts, IntGauge, Registry as PromRegistry};

/// Runtime metrics for the scheduler tick loop, independent of the perfdata/OTLP
/// path -- these describe the scheduler's own health, not plugin output.
pub struct SchedulerMetrics {
    pub tick_duration: Histogram,
    pub pending_checks: IntGauge,
}

impl SchedulerMetrics {
    pub fn new(registry: &PromRegistry) -> prometheus::Result<Self> {
        let tick_duration = Histogram::with_opts(HistogramOpts::new(
            "scheduler_tick_duration_seconds",
            "Wall-clock time spent scanning and dispatching due checks in one tick",
        ))?;
        let pending_checks = IntGauge::new(
            "scheduler_pending_checks",
            "Number of checkables currently queued for execution",
        )?;
        registry.register(Box::new(tick_duration.clone()))?;
        registry.register(Box::new(pending_checks.clone()))?;
        Ok(Self {
            tick_duration,
            pending_checks,
        })
    }
}

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use castellan_cluster::{events, ClusterNode, Origin};
use castellan_io::IoEngine;
use castellan_registry::{CheckResult, CheckState, Checkable, Lifecycle, ObjectId, Registry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use prometheus::Registry as PromRegistry;
use tokio::sync::{oneshot, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::executor::CheckExecutor;
use crate::ha;
use crate::metrics::SchedulerMetrics;
use crate::pending::PendingSet;

pub type ResultSink =
    Arc<dyn Fn(Arc<Checkable>, CheckResult) -> Pin<Box<dyn Future<Output = DateTime<Utc>> + Send>> + Send + Sync>;

pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_in_flight: usize,
    pub postpone_slack: Duration,
    /// This process's own endpoint name, used to decide HA authority. `None` means
    /// HA is never contested locally (single-node or facade-only deployment).
    pub local_endpoint: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(400),
            max_in_flight: 256,
            postpone_slack: Duration::from_millis(500),
            local_endpoint: None,
        }
    }
}

/// Scans the pending set on every tick, checks eligibility, admits against the
/// global concurrency limit, and dispatches each due checkable locally or to its
/// `command_endpoint`.
pub struct Scheduler {
    registry: Arc<Registry>,
    pending: PendingSet,
    io_engine: Arc<IoEngine>,
    executor: Arc<dyn CheckExecutor>,
    cluster: Option<Arc<ClusterNode>>,
    in_flight: Arc<Semaphore>,
    on_result: ResultSink,
    metrics: SchedulerMetrics,
    config: SchedulerConfig,
    pending_requests: DashMap<String, oneshot::Sender<CheckResult>>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<Registry>,
        io_engine: Arc<IoEngine>,
        executor: Arc<dyn CheckExecutor>,
        cluster: Option<Arc<ClusterNode>>,
        on_result: ResultSink,
        prom: &PromRegistry,
        config: SchedulerConfig,
    ) -> prometheus::Result<Arc<Self>> {
        let metrics = SchedulerMetrics::new(prom)?;
        let max_in_flight = config.max_in_flight;
        Ok(Arc::new(Self {
            registry,
            pending: PendingSet::new(),
            io_engine,
            executor,
            cluster,
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
            on_result,
            metrics,
            config,
            pending_requests: DashMap::new(),
        }))
    }

    pub fn enqueue(&self, id: ObjectId, next_check: DateTime<Utc>) {
        self.pending.insert(id, next_check);
    }

    /// Register this scheduler's reply handler on the cluster router, so replies
    /// to `event::ExecuteCommand` requests resolve the waiting `run_one` call.
    pub fn register_reply_handler(self: &Arc<Self>, router: &castellan_cluster::Router) {
        let this = self.clone();
        router.register(
            events::CHECK_RESULT,
            Arc::new(move |_origin: Origin, params: serde_json::Value| {
                let this = this.clone();
                Box::pin(async move {
                    if let Some(id) = params.get("request_id").and_then(|v| v.as_str()) {
                        if let Some((_, tx)) = this.pending_requests.remove(id) {
                            if let Ok(result) = serde_json::from_value::<CheckResult>(
                                params.get("result").cloned().unwrap_or_default(),
                            ) {
                                let _ = tx.send(result);
                            }
                        }
                    }
                    None
                })
            }),
        );
    }

    pub fn spawn_tick_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.tick_interval);
            loop {
                ticker.tick().await;
                this.tick().await;
            }
        })
    }

    async fn tick(self: &Arc<Self>) {
        let start = std::time::Instant::now();
        let now = Utc::now();
        let due = self.pending.drain_due(now);
        for id in due {
            self.consider(id, now);
        }
        self.metrics.pending_checks.set(self.pending.len() as i64);
        self.metrics.tick_duration.observe(start.elapsed().as_secs_f64());
    }

    fn consider(self: &Arc<Self>, id: ObjectId, now: DateTime<Utc>) {
        let Some(checkable) = self.registry.checkable(&id) else { return };

        if self.registry.lifecycle_of(&id) != Some(Lifecycle::Active) {
            return;
        }
        if !checkable.lock().active_checks_enabled {
            self.requeue_after_interval(&id, &checkable, now);
            return;
        }
        if let Some(period_name) = &checkable.config.check_period {
            if let Some(period) = self.registry.timeperiod(period_name) {
                if !period.is_inside(now) {
                    self.requeue_after_interval(&id, &checkable, now);
                    return;
                }
            }
        }
        if checkable.config.ha_enabled {
            if !self.holds_authority(&checkable) {
                self.requeue_after_interval(&id, &checkable, now);
                return;
            }
        }
        if self.in_flight.available_permits() == 0 {
            self.pending
                .insert(id, now + chrono::Duration::from_std(self.config.postpone_slack).unwrap());
            return;
        }

        let this = self.clone();
        tokio::spawn(async move { this.run_one(id, checkable).await });
    }

    fn requeue_after_interval(&self, id: &ObjectId, checkable: &Checkable, now: DateTime<Utc>) {
        let interval = chrono::Duration::from_std(checkable.config.check_interval).unwrap_or(chrono::Duration::seconds(60));
        self.pending.insert(id.clone(), now + interval);
    }

    fn holds_authority(&self, checkable: &Checkable) -> bool {
        let Some(local) = &self.config.local_endpoint else { return true };
        let Some(zone_name) = &checkable.config.zone else { return true };
        let Some(zone) = self.registry.zone(zone_name) else { return true };
        let connected: Vec<&str> = zone
            .endpoints
            .iter()
            .filter(|name| {
                self.registry
                    .endpoint(name)
                    .map(|e| e.is_connected())
                    .unwrap_or(false)
            })
            .map(|s| s.as_str())
            .collect();
        ha::authority_holder(checkable.name(), &connected) == Some(local.as_str())
    }

    async fn run_one(self: Arc<Self>, id: ObjectId, checkable: Arc<Checkable>) {
        let _permit = self.in_flight.clone().acquire_owned().await;
        let scheduled_start = Utc::now();
        checkable.lock().in_flight = true;

        let result = match &checkable.config.command_endpoint {
            Some(endpoint_name) => self.execute_remote(&checkable, endpoint_name, scheduled_start).await,
            None => self.execute_local(&checkable).await,
        };

        checkable.lock().in_flight = false;
        let next_check = (self.on_result)(checkable.clone(), result).await;
        self.pending.insert(id, next_check);
    }

    async fn execute_local(&self, checkable: &Checkable) -> CheckResult {
        let cpu = self.io_engine.enter_cpu_bound().await;
        let result = self.executor.execute(checkable, checkable.config.check_timeout).await;
        drop(cpu);
        result
    }

    async fn execute_remote(&self, checkable: &Checkable, endpoint_name: &str, scheduled_start: DateTime<Utc>) -> CheckResult {
        let deadline = checkable.config.check_timeout;
        let Some(cluster) = &self.cluster else {
            return timeout_result(scheduled_start, deadline, "no cluster transport configured");
        };
        let Some(endpoint) = self.registry.endpoint(endpoint_name) else {
            return timeout_result(scheduled_start, deadline, "endpoint not found");
        };
        if !endpoint.is_dispatchable() {
            return timeout_result(scheduled_start, deadline, "endpoint not connected or syncing");
        }

        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending_requests.insert(request_id.clone(), tx);
        let msg = ClusterNode::execute_command_message(&checkable.config.check_command, &request_id);
        if let Err(e) = cluster.dispatch_to_endpoint(endpoint_name, msg).await {
            self.pending_requests.remove(&request_id);
            warn!(endpoint = endpoint_name, error = %e, "failed to dispatch remote check");
            return timeout_result(scheduled_start, deadline, "dispatch failed");
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            _ => {
                self.pending_requests.remove(&request_id);
                debug!(endpoint = endpoint_name, "remote check timed out");
                timeout_result(scheduled_start, deadline, "remote execution timed out")
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn timeout_result(scheduled_start: DateTime<Utc>, deadline: Duration, message: &str) -> CheckResult {
    let now = Utc::now();
    CheckResult {
        scheduled_start,
        scheduled_end: scheduled_start + chrono::Duration::from_std(deadline).unwrap_or(chrono::Duration::seconds(0)),
        execution_start: scheduled_start,
        execution_end: now,
        state: CheckState::Unknown,
        output: message.to_string(),
        perfdata: Vec::new(),
        active: true,
        origin: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::{CheckableConfig, CheckableKind};

    struct NoopExecutor;

    impl CheckExecutor for NoopExecutor {
        fn execute<'a>(
            &'a self,
            _checkable: &'a Checkable,
            _timeout: Duration,
        ) -> Pin<Box<dyn Future<Output = CheckResult> + Send + 'a>> {
            Box::pin(async move {
                let now = Utc::now();
                CheckResult {
                    scheduled_start: now,
                    scheduled_end: now,
                    execution_start: now,
                    execution_end: now,
                    state: CheckState::Ok,
                    output: "ok".into(),
                    perfdata: Vec::new(),
                    active: true,
                    origin: None,
                }
            })
        }
    }

    fn test_scheduler() -> Arc<Scheduler> {
        let registry = Arc::new(Registry::new());
        let io_engine = Arc::new(IoEngine::new(4));
        let prom = PromRegistry::new();
        let on_result: ResultSink = Arc::new(|_checkable, _result| Box::pin(async move { Utc::now() }));
        Scheduler::new(registry, io_engine, Arc::new(NoopExecutor), None, on_result, &prom, SchedulerConfig::default())
            .unwrap()
    }

    /// A checkable with a `command_endpoint` but no cluster transport wired in (the
    /// facade-only / single-node deployment shape) must resolve promptly to an
    /// `Unknown` result rather than hang the calling `run_one` task forever.
    #[tokio::test]
    async fn remote_check_without_cluster_resolves_to_unknown_without_hanging() {
        let scheduler = test_scheduler();
        let cfg = CheckableConfig::new("remote1", CheckableKind::Host, "check-ping");
        let checkable = Checkable::new(cfg, Utc::now());
        let scheduled_start = Utc::now();

        let result = tokio::time::timeout(
            Duration::from_secs(1),
            scheduler.execute_remote(&checkable, "nonexistent", scheduled_start),
        )
        .await
        .expect("execute_remote must resolve promptly with no cluster transport configured");

        assert_eq!(result.state, CheckState::Unknown);
        assert_eq!(result.scheduled_start, scheduled_start);
    }

    #[tokio::test]
    async fn pending_len_reflects_enqueued_checkables() {
        let scheduler = test_scheduler();
        assert_eq!(scheduler.pending_len(), 0);
        scheduler.enqueue(ObjectId::new(castellan_registry::ObjectKind::Host, "web1"), Utc::now());
        assert_eq!(scheduler.pending_len(), 1);
    }
}

//! Wires the ten crates together into one running process: registry, timers,
//! I/O admission, cluster transport, scheduler, result pipeline, notifications,
//! perfdata writers, the facade, and persisted state.

use std::sync::Arc;
use std::time::Duration;

use castellan_cluster::{events, ClusterNode, ClusterNodeConfig, Origin, ReplayLog, Router};
use castellan_config::Settings;
use castellan_facade::{AllowAll, DefaultFacade};
use castellan_io::{IoEngine, TlsMaterial};
use castellan_notify::NotificationEngine;
use castellan_perfdata::{sinks, PerfdataEngine, PerfdataWriter, WriterConfig};
use castellan_registry::{CheckResult, Registry};
use castellan_results::ResultProcessor;
use castellan_scheduler::{ResultSink, Scheduler, SchedulerConfig};
use castellan_timer::TimerSet;
use prometheus::Registry as PromRegistry;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{error, info, warn};

use crate::executor::{run_check_command, CommandNotificationExecutor, ProcessCheckExecutor};
use crate::state::PersistedState;

pub struct Bootstrap {
    pub registry: Arc<Registry>,
    pub timers: Arc<TimerSet>,
    pub scheduler: Arc<Scheduler>,
    pub cluster: Arc<ClusterNode>,
    pub notify: Arc<NotificationEngine>,
    pub perfdata: Arc<PerfdataEngine>,
    pub facade: Arc<DefaultFacade>,
    pub state: Arc<PersistedState>,
    pub settings: Settings,
}

impl Bootstrap {
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let prom = PromRegistry::new();
        let registry = Arc::new(Registry::new());
        let timers = TimerSet::new();
        let io_engine = Arc::new(IoEngine::new(settings.scheduler.cpu_concurrency));

        let state = Arc::new(PersistedState::open(&settings.state_file)?);
        state.restore(&registry)?;

        let tls = TlsMaterial::new(
            settings.cluster.cert_file.clone(),
            settings.cluster.key_file.clone(),
            settings.cluster.ca_file.clone(),
        );
        let acceptor = TlsAcceptor::from(tls.server_config()?);
        let connector = TlsConnector::from(tls.client_config()?);
        let router = Arc::new(Router::new());
        let replay = ReplayLog::open(format!("{}.replay", settings.state_file))?;
        let cluster_config = ClusterNodeConfig {
            heartbeat_interval: settings.heartbeat_interval(),
            authenticated_liveness_timeout: settings.authenticated_liveness_timeout(),
        };
        let cluster = ClusterNode::new(registry.clone(), router.clone(), replay, acceptor, connector, cluster_config);

        let notify_executor = Arc::new(CommandNotificationExecutor::new(
            "/etc/castellan/notify.sh {type} {checkable} {user} \"{output}\"",
            io_engine.clone(),
            Duration::from_secs(30),
        ));
        let notify = NotificationEngine::new(registry.clone(), notify_executor, &prom)?;
        notify.spawn_sweep(&timers, settings.notify_sweep_interval());

        let mut perfdata = PerfdataEngine::new();
        wire_perfdata(&mut perfdata, &settings);
        let perfdata = Arc::new(perfdata);
        perfdata.resume_all();

        let processor = Arc::new(ResultProcessor::new(notify.clone(), perfdata.clone(), 1024));

        let check_executor = Arc::new(ProcessCheckExecutor);
        let on_result: ResultSink = {
            let processor = processor.clone();
            Arc::new(move |checkable, result| {
                let processor = processor.clone();
                Box::pin(async move { processor.process(checkable, result).await })
            })
        };
        let scheduler_config = SchedulerConfig {
            tick_interval: settings.tick_interval(),
            max_in_flight: settings.scheduler.max_in_flight,
            postpone_slack: Duration::from_millis(settings.scheduler.postpone_slack_ms),
            local_endpoint: None,
        };
        let scheduler = Scheduler::new(
            registry.clone(),
            io_engine.clone(),
            check_executor,
            Some(cluster.clone()),
            on_result,
            &prom,
            scheduler_config,
        )?;
        scheduler.register_reply_handler(&router);
        register_execute_command_handler(&router, cluster.clone());

        let facade = Arc::new(DefaultFacade::new(registry.clone(), processor, notify.clone(), Arc::new(AllowAll)));

        Ok(Self { registry, timers, scheduler, cluster, notify, perfdata, facade, state, settings })
    }

    /// Start every background worker: timer sweep, scheduler tick loop, cluster
    /// listener. Returns once the listener is bound; the returned handles keep
    /// running until the process exits or is cancelled.
    pub async fn spawn(&self) -> anyhow::Result<Vec<tokio::task::JoinHandle<()>>> {
        let mut handles = Vec::new();
        handles.push(self.timers.spawn_worker());
        handles.push(self.scheduler.spawn_tick_loop());

        let addr: std::net::SocketAddr = self.settings.cluster.listen_addr.parse()?;
        let cluster = self.cluster.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = cluster.listen(addr).await {
                error!(error = %e, "cluster listener exited");
            }
        }));

        info!(listen_addr = %self.settings.cluster.listen_addr, "castellan started");
        Ok(handles)
    }

    /// Snapshot state and drain every perfdata writer; called on graceful
    /// shutdown and, separately, on a periodic snapshot timer.
    pub async fn checkpoint(&self) {
        if let Err(e) = self.state.snapshot(&self.registry) {
            error!(error = %e, "failed to snapshot persisted state");
        }
    }

    pub async fn shutdown(&self, timers: &[tokio::task::JoinHandle<()>]) {
        self.perfdata.pause_all().await;
        self.timers.stop(true).await;
        self.checkpoint().await;
        for handle in timers {
            handle.abort();
        }
    }
}

fn wire_perfdata(engine: &mut PerfdataEngine, settings: &Settings) {
    if settings.perfdata.line.enabled {
        let tls = if settings.perfdata.line.tls {
            Some((
                Arc::new(TlsMaterial::new(
                    settings.cluster.cert_file.clone(),
                    settings.cluster.key_file.clone(),
                    settings.cluster.ca_file.clone(),
                )),
                "perfdata".to_string(),
            ))
        } else {
            None
        };
        let addr = settings.perfdata.line.addr.clone();
        let writer = PerfdataWriter::new(WriterConfig::default(), move || {
            sinks::line::LineSink::new(sinks::line::LineSinkConfig { addr: addr.clone(), tls: tls.clone() })
        });
        engine.add_writer(writer);
    }
    if settings.perfdata.http.enabled {
        let endpoint = settings.perfdata.http.endpoint.clone();
        let token = settings.perfdata.http.bearer_token.clone();
        let writer = PerfdataWriter::new(WriterConfig::default(), move || {
            sinks::http::HttpBulkSink::new(sinks::http::HttpSinkConfig {
                endpoint: endpoint.clone(),
                bearer_token: token.clone(),
            })
        });
        engine.add_writer(writer);
    }
    if settings.perfdata.otlp.enabled {
        let endpoint = settings.perfdata.otlp.endpoint.clone();
        let service_name = settings.perfdata.otlp.service_name.clone();
        let instance_id = uuid::Uuid::new_v4().to_string();
        let writer = PerfdataWriter::new(WriterConfig::default(), move || {
            sinks::otlp::OtlpSink::new(sinks::otlp::OtlpSinkConfig {
                endpoint: endpoint.clone(),
                service_name: service_name.clone(),
                service_instance_id: instance_id.clone(),
                service_version: env!("CARGO_PKG_VERSION").to_string(),
            })
        });
        engine.add_writer(writer);
    }
}

/// Handles an inbound `event::ExecuteCommand` on behalf of a peer that delegated a
/// check to this node: runs the command and sends back an `event::CheckResult`
/// carrying the same `request_id` so the origin's pending oneshot resolves. This
/// is a fire-and-forget follow-up event rather than a framed reply, since the
/// origin's handler for it is registered by method, not by request id.
fn register_execute_command_handler(router: &Router, cluster: Arc<ClusterNode>) {
    router.register(
        events::EXECUTE_COMMAND,
        Arc::new(move |origin: Origin, params: serde_json::Value| {
            let cluster = cluster.clone();
            Box::pin(async move {
                let command = params.get("check_command").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let request_id = params.get("request_id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                let result: CheckResult = run_check_command(&command, Duration::from_secs(60)).await;

                if let Some(endpoint) = origin.endpoint {
                    let msg = castellan_cluster::Message::event(
                        events::CHECK_RESULT,
                        serde_json::json!({ "request_id": request_id, "result": result }),
                    );
                    if let Err(e) = cluster.dispatch_to_endpoint(&endpoint, msg).await {
                        error!(endpoint, error = %e, "failed to send check result back to requester");
                    }
                } else {
                    warn!("execute command request from an unauthenticated peer, dropping result");
                }
                None
            })
        }),
    );
}

//! Per-connection state machine, heartbeat/liveness enforcement, and the single
//! writer task that serializes outbound frames.
//!
//! `Connecting -> Handshaking -> Authenticated|Anonymous -> Running -> {Closing,
//! Failed}`. This module only models the post-handshake half (`Running` onward);
//! the handshake itself lives in [`crate::handshake`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::error::{ClusterError, ClusterResult};
use crate::router::{Origin, Router};
use crate::wire::{read_frame, write_frame, Message, DEFAULT_MAX_FRAME_BYTES};

pub const HEARTBEAT_METHOD: &str = "event::Heartbeat";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerIdentity {
    Authenticated(String),
    Anonymous,
}

impl PeerIdentity {
    pub fn name(&self) -> Option<String> {
        match self {
            PeerIdentity::Authenticated(name) => Some(name.clone()),
            PeerIdentity::Anonymous => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Running,
    Closing,
    Failed,
}

/// What the rest of the node holds on to for a connection once it is running:
/// enough to send frames and to tear it down, nothing about its wire internals.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    pub identity: PeerIdentity,
    outbound: mpsc::Sender<Message>,
    phase: Arc<RwLock<ConnectionPhase>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase.read()
    }

    pub async fn send(&self, msg: Message) -> ClusterResult<()> {
        self.outbound
            .send(msg)
            .await
            .map_err(|_| ClusterError::Protocol("connection writer has shut down".into()))
    }

    /// Request a graceful close; the connection drains its outbound queue and
    /// exits on its own.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

pub struct ConnectionConfig {
    pub heartbeat_interval: Duration,
    pub liveness_timeout: Duration,
    pub max_frame_bytes: usize,
}

impl ConnectionConfig {
    pub fn for_identity(identity: &PeerIdentity, authenticated_liveness: Duration, heartbeat_interval: Duration) -> Self {
        let liveness_timeout = match identity {
            PeerIdentity::Authenticated(_) => authenticated_liveness,
            PeerIdentity::Anonymous => authenticated_liveness / 6,
        };
        Self {
            heartbeat_interval,
            liveness_timeout,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Spawn the reader and writer tasks for an already-handshaken stream and return a
/// handle plus a join handle for the reader task (whose exit, ok or err, is this
/// connection's final outcome).
pub fn spawn<S>(
    identity: PeerIdentity,
    stream: S,
    router: Arc<Router>,
    config: ConnectionConfig,
) -> (ConnectionHandle, JoinHandle<ClusterResult<()>>)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let phase = Arc::new(RwLock::new(ConnectionPhase::Running));
    let (reader, writer) = tokio::io::split(stream);
    let (tx, rx) = mpsc::channel(256);

    let writer_cancel = cancel.clone();
    let writer_task = tokio::spawn(writer_loop(writer, rx, writer_cancel));

    let handle = ConnectionHandle {
        id,
        identity: identity.clone(),
        outbound: tx.clone(),
        phase: phase.clone(),
        cancel: cancel.clone(),
    };

    let span = tracing::info_span!(
        "cluster_connection",
        connection_id = %id,
        endpoint = identity.name().unwrap_or_else(|| "anonymous".into()),
    );
    let reader_phase = phase.clone();
    let join = tokio::spawn(
        async move {
            info!("connection running");
            let result = reader_loop(id, identity, reader, router, tx, &config, cancel).await;
            *reader_phase.write() = if result.is_ok() {
                ConnectionPhase::Closing
            } else {
                ConnectionPhase::Failed
            };
            let _ = writer_task.await;
            info!(ok = result.is_ok(), "connection finished");
            result
        }
        .instrument(span),
    );

    (handle, join)
}

async fn reader_loop<R>(
    id: Uuid,
    identity: PeerIdentity,
    mut reader: R,
    router: Arc<Router>,
    outbound: mpsc::Sender<Message>,
    config: &ConnectionConfig,
    cancel: CancellationToken,
) -> ClusterResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut heartbeat = tokio::time::interval(config.heartbeat_interval);
    heartbeat.tick().await; // first tick fires immediately; skip it, we just started

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = heartbeat.tick() => {
                let msg = Message::event(HEARTBEAT_METHOD, json!({})).with_ts(Utc::now().timestamp_millis());
                if outbound.send(msg).await.is_err() {
                    return Ok(());
                }
            }
            frame = tokio::time::timeout(config.liveness_timeout, read_frame(&mut reader, config.max_frame_bytes)) => {
                let (msg, _bytes) = frame.map_err(|_| ClusterError::LivenessTimeout)??;
                if msg.method == HEARTBEAT_METHOD {
                    continue;
                }
                let origin = Origin { endpoint: identity.name(), connection_id: id };
                let reply = router.dispatch(&msg.method, origin, msg.params.clone()).await;
                if let (Some(value), Some(request_id)) = (reply, msg.id.clone()) {
                    let reply_msg = Message {
                        jsonrpc: "2.0".to_string(),
                        method: msg.method.clone(),
                        params: value,
                        id: Some(request_id),
                        ts: None,
                    };
                    if outbound.send(reply_msg).await.is_err() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn writer_loop<W>(mut writer: W, mut rx: mpsc::Receiver<Message>, cancel: CancellationToken)
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => {
                match next {
                    Some(msg) => {
                        if write_frame(&mut writer, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::duplex;

    #[tokio::test]
    async fn heartbeat_is_sent_before_any_real_traffic() {
        let (client, server) = duplex(4096);
        let router = Arc::new(Router::new());
        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_millis(10),
            liveness_timeout: Duration::from_secs(5),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        };
        let (handle, _join) = spawn(PeerIdentity::Anonymous, server, router, config);
        let mut client = client;
        let (msg, _n) = read_frame(&mut client, DEFAULT_MAX_FRAME_BYTES).await.unwrap();
        assert_eq!(msg.method, HEARTBEAT_METHOD);
        handle.close();
    }

    #[tokio::test]
    async fn liveness_timeout_closes_silent_connection() {
        let (_client, server) = duplex(4096);
        let router = Arc::new(Router::new());
        let config = ConnectionConfig {
            heartbeat_interval: Duration::from_secs(60),
            liveness_timeout: Duration::from_millis(20),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        };
        let (_handle, join) = spawn(PeerIdentity::Anonymous, server, router, config);
        let result = join.await.unwrap();
        assert!(matches!(result, Err(ClusterError::LivenessTimeout)));
    }
}

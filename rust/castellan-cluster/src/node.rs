//! Wires together TLS, the router, connections and the replay log into a single
//! cluster node: listens for inbound peers, dials configured ones, and keeps each
//! `Endpoint` in the registry in sync with its live connection set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use castellan_registry::Registry;
use dashmap::DashMap;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::connection::{self, ConnectionConfig, ConnectionHandle, PeerIdentity};
use crate::error::{ClusterError, ClusterResult};
use crate::events;
use crate::handshake;
use crate::replay::ReplayLog;
use crate::router::Router;
use crate::wire::Message;

pub struct ClusterNodeConfig {
    pub heartbeat_interval: Duration,
    pub authenticated_liveness_timeout: Duration,
}

impl Default for ClusterNodeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            authenticated_liveness_timeout: Duration::from_secs(60),
        }
    }
}

/// A running cluster node: its router, its replay log, the registry it keeps
/// `Endpoint` connection state in, and every live connection keyed by id.
pub struct ClusterNode {
    pub router: Arc<Router>,
    pub registry: Arc<Registry>,
    pub replay: ReplayLog,
    connections: DashMap<Uuid, ConnectionHandle>,
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    config: ClusterNodeConfig,
}

impl ClusterNode {
    pub fn new(
        registry: Arc<Registry>,
        router: Arc<Router>,
        replay: ReplayLog,
        acceptor: TlsAcceptor,
        connector: TlsConnector,
        config: ClusterNodeConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            registry,
            replay,
            connections: DashMap::new(),
            acceptor,
            connector,
            config,
        })
    }

    /// Accept inbound connections forever; spawns a new task per accepted socket.
    pub async fn listen(self: &Arc<Self>, addr: SocketAddr) -> ClusterResult<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "cluster listener bound");
        loop {
            let (socket, peer_addr) = listener.accept().await?;
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.accept_one(socket).await {
                    warn!(%peer_addr, error = %e, "inbound cluster connection failed");
                }
            });
        }
    }

    async fn accept_one(self: &Arc<Self>, socket: TcpStream) -> ClusterResult<()> {
        let registry = self.registry.clone();
        let (stream, identity) = handshake::accept(&self.acceptor, socket, |name| registry.endpoint(name).is_some()).await?;
        self.adopt(stream, identity).await
    }

    /// Dial a configured peer by address, presenting our own client certificate.
    pub async fn connect(self: &Arc<Self>, addr: SocketAddr, server_name: rustls::pki_types::ServerName<'static>) -> ClusterResult<()> {
        let socket = TcpStream::connect(addr).await?;
        let stream = self
            .connector
            .connect(server_name, socket)
            .await
            .map_err(|e| ClusterError::Tls(e.to_string()))?;
        let certs = stream
            .get_ref()
            .1
            .peer_certificates()
            .map(|c| c.to_vec())
            .unwrap_or_default();
        let registry = self.registry.clone();
        let identity = handshake::resolve_identity(&certs, |name| registry.endpoint(name).is_some());
        self.adopt(stream, identity).await
    }

    async fn adopt<S>(self: &Arc<Self>, stream: S, identity: PeerIdentity) -> ClusterResult<()>
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin + 'static,
    {
        let config = ConnectionConfig::for_identity(
            &identity,
            self.config.authenticated_liveness_timeout,
            self.config.heartbeat_interval,
        );
        let (handle, join) = connection::spawn(identity.clone(), stream, self.router.clone(), config);

        if let PeerIdentity::Authenticated(name) = &identity {
            if let Some(endpoint) = self.registry.endpoint(name) {
                endpoint.set_connected(true);
                endpoint.add_connection();
                self.begin_replay_sync(name, &handle).await;
            }
        }

        self.connections.insert(handle.id, handle.clone());
        let connections = self.connections.clone();
        let registry = self.registry.clone();
        let name_for_cleanup = identity.name();
        tokio::spawn(async move {
            let result = join.await;
            connections.remove(&handle.id);
            if let Some(name) = name_for_cleanup {
                if let Some(endpoint) = registry.endpoint(&name) {
                    if endpoint.remove_connection() == 0 {
                        endpoint.set_connected(false);
                    }
                }
            }
            if let Ok(Err(e)) = result {
                error!(connection_id = %handle.id, error = %e, "connection ended with error");
            }
        });
        Ok(())
    }

    /// Mark the endpoint as syncing, stream every replay entry after its last
    /// acknowledged position, then clear the flag so the scheduler may dispatch to
    /// it again.
    async fn begin_replay_sync(&self, name: &str, handle: &ConnectionHandle) {
        let Some(endpoint) = self.registry.endpoint(name) else { return };
        endpoint.set_syncing(true);
        let position = endpoint.remote_log_position().unwrap_or(0) as u64;
        match self.replay.since(name, position) {
            Ok(backlog) => {
                for (_pos, msg) in backlog {
                    if handle.send(msg).await.is_err() {
                        break;
                    }
                }
            }
            Err(e) => warn!(endpoint = name, error = %e, "replay sync failed"),
        }
        endpoint.set_syncing(false);
    }

    /// Send a message to an endpoint's connection, appending it to the replay log
    /// first so it survives a disconnect.
    pub async fn dispatch_to_endpoint(&self, endpoint_name: &str, msg: Message) -> ClusterResult<()> {
        let endpoint = self
            .registry
            .endpoint(endpoint_name)
            .ok_or_else(|| ClusterError::EndpointUnavailable(endpoint_name.to_string()))?;
        if !endpoint.is_connected() {
            return Err(ClusterError::EndpointUnavailable(endpoint_name.to_string()));
        }
        if endpoint.is_syncing() {
            return Err(ClusterError::EndpointSyncing(endpoint_name.to_string()));
        }
        self.replay.append(endpoint_name, &msg)?;
        let handle = self
            .connections
            .iter()
            .find(|c| c.identity.name().as_deref() == Some(endpoint_name))
            .map(|c| c.clone())
            .ok_or_else(|| ClusterError::EndpointUnavailable(endpoint_name.to_string()))?;
        handle.send(msg).await
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Standard event sent as part of `event::ExecuteCommand` dispatch, kept here
    /// so the scheduler doesn't need to depend on `serde_json` just to build it.
    /// `request_id` is carried both as the frame's `id` (for any generic framed
    /// reply) and duplicated into `params`, since handlers registered on the
    /// router only see `params`, not the enclosing frame's `id`.
    pub fn execute_command_message(check_command: &str, request_id: &str) -> Message {
        Message::request(
            events::EXECUTE_COMMAND,
            json!({ "check_command": check_command, "request_id": request_id }),
            request_id,
        )
    }
}

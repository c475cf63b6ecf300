//! Cluster RPC transport: mandatory mutual TLS, netstring-framed JSON-RPC,
//! heartbeat/liveness enforcement, and a per-endpoint replay log for messages sent
//! while a peer was disconnected.

pub mod connection;
pub mod error;
pub mod events;
pub mod handshake;
pub mod node;
pub mod replay;
pub mod router;
pub mod wire;

pub use connection::{ConnectionConfig, ConnectionHandle, ConnectionPhase, PeerIdentity};
pub use error::{ClusterError, ClusterResult};
pub use node::{ClusterNode, ClusterNodeConfig};
pub use replay::ReplayLog;
pub use router::{HandlerFn, Origin, Router};
pub use wire::{read_frame, write_frame, Message, DEFAULT_MAX_FRAME_BYTES};

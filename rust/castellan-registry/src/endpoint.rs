use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use parking_lot::RwLock;

/// A named cluster peer with zero or more concurrent transport connections, a sliding
/// send/recv byte counter, a remote log position, and a syncing flag.
///
/// The connection list itself lives in `castellan-cluster` (this crate has no networking
/// dependency); `Endpoint` only tracks the bookkeeping the scheduler and transport both
/// need to agree on.
#[derive(Debug)]
pub struct Endpoint {
    pub name: String,
    pub zone: String,
    state: RwLock<EndpointState>,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    remote_log_position: AtomicI64,
    syncing: AtomicBool,
    connection_count: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Disconnected,
    Connected,
}

impl Endpoint {
    pub fn new(name: impl Into<String>, zone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            zone: zone.into(),
            state: RwLock::new(EndpointState::Disconnected),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            remote_log_position: AtomicI64::new(-1),
            syncing: AtomicBool::new(false),
            connection_count: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> EndpointState {
        *self.state.read()
    }

    pub fn set_connected(&self, connected: bool) {
        *self.state.write() = if connected {
            EndpointState::Connected
        } else {
            EndpointState::Disconnected
        };
        if !connected {
            self.connection_count.store(0, Ordering::SeqCst);
            self.set_syncing(false);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == EndpointState::Connected
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    pub fn set_syncing(&self, syncing: bool) {
        self.syncing.store(syncing, Ordering::Release);
    }

    /// Whether the scheduler may dispatch a remote check to this endpoint right now.
    pub fn is_dispatchable(&self) -> bool {
        self.is_connected() && !self.is_syncing()
    }

    pub fn add_connection(&self) {
        self.connection_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn remove_connection(&self) -> u64 {
        self.connection_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn record_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn remote_log_position(&self) -> Option<i64> {
        let v = self.remote_log_position.load(Ordering::Acquire);
        if v < 0 {
            None
        } else {
            Some(v)
        }
    }

    pub fn set_remote_log_position(&self, pos: i64) {
        self.remote_log_position.store(pos, Ordering::Release);
    }
}

/// A named group of endpoints; one zone is "local". Message routing is by zone
/// membership and the parent/child relationship between zones.
#[derive(Debug, Clone)]
pub struct Zone {
    pub name: String,
    pub endpoints: Vec<String>,
    pub parent: Option<String>,
    pub is_local: bool,
}

impl Zone {
    pub fn new(name: impl Into<String>, endpoints: Vec<String>) -> Self {
        Self {
            name: name.into(),
            endpoints,
            parent: None,
            is_local: false,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }
}

//! Typed, multi-subscriber event bus for result-processing signals. Any number of
//! collaborators (notification engine, perfdata writers, the facade's status feed)
//! can subscribe independently; none of them block the processor or each other.

use std::sync::Arc;

use castellan_registry::{CheckResult, CheckState, ObjectId};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub enum Signal {
    NewCheckResult {
        id: ObjectId,
        result: Arc<CheckResult>,
    },
    StateChange {
        id: ObjectId,
        previous: CheckState,
        current: CheckState,
        is_recovery: bool,
    },
    ReachabilityChanged {
        id: ObjectId,
        reachable: bool,
    },
}

#[derive(Clone)]
pub struct SignalBus {
    sender: broadcast::Sender<Signal>,
}

impl SignalBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.sender.subscribe()
    }

    pub fn emit(&self, signal: Signal) {
        // No receivers is a normal, expected state (e.g. in tests); a lagged
        // receiver drops old events rather than blocking the processor.
        let _ = self.sender.send(signal);
    }
}

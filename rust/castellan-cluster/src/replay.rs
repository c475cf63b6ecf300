//! Per-endpoint append-only replay log. Every outgoing message that should survive
//! a peer disconnect is appended here before being written to the socket; on
//! reconnect the peer's advertised `remote_log_position` tells us where to resume
//! streaming from, in order, ahead of new traffic.

use std::path::Path;

use crate::error::ClusterResult;
use crate::wire::Message;

#[derive(Clone)]
pub struct ReplayLog {
    db: sled::Db,
}

impl ReplayLog {
    pub fn open(path: impl AsRef<Path>) -> ClusterResult<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    /// In-memory log, for tests and for a node that runs with no persistence
    /// directory configured.
    pub fn temporary() -> ClusterResult<Self> {
        Ok(Self {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    pub fn append(&self, endpoint: &str, msg: &Message) -> ClusterResult<u64> {
        let tree = self.db.open_tree(endpoint)?;
        let id = self.db.generate_id()?;
        let bytes = serde_json::to_vec(msg)?;
        tree.insert(id.to_be_bytes(), bytes)?;
        Ok(id)
    }

    /// Every entry strictly after `position`, in ascending order.
    pub fn since(&self, endpoint: &str, position: u64) -> ClusterResult<Vec<(u64, Message)>> {
        let tree = self.db.open_tree(endpoint)?;
        let start = position.saturating_add(1).to_be_bytes();
        let mut out = Vec::new();
        for kv in tree.range(start.to_vec()..) {
            let (k, v) = kv?;
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&k);
            let id = u64::from_be_bytes(id_bytes);
            let msg: Message = serde_json::from_slice(&v)?;
            out.push((id, msg));
        }
        Ok(out)
    }

    pub fn latest_position(&self, endpoint: &str) -> ClusterResult<Option<u64>> {
        let tree = self.db.open_tree(endpoint)?;
        Ok(tree.last()?.map(|(k, _)| {
            let mut id_bytes = [0u8; 8];
            id_bytes.copy_from_slice(&k);
            u64::from_be_bytes(id_bytes)
        }))
    }

    pub fn flush(&self) -> ClusterResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn since_returns_only_entries_after_position() {
        let log = ReplayLog::temporary().unwrap();
        let a = log.append("satellite1", &Message::event("event::StateChange", json!({"n": 1}))).unwrap();
        let _b = log.append("satellite1", &Message::event("event::StateChange", json!({"n": 2}))).unwrap();
        let c = log.append("satellite1", &Message::event("event::StateChange", json!({"n": 3}))).unwrap();

        let replay = log.since("satellite1", a).unwrap();
        assert_eq!(replay.len(), 2);
        assert_eq!(replay.last().unwrap().0, c);
    }

    #[test]
    fn separate_endpoints_do_not_share_positions() {
        let log = ReplayLog::temporary().unwrap();
        log.append("sat1", &Message::event("event::Heartbeat", json!({}))).unwrap();
        let pos = log.latest_position("sat2").unwrap();
        assert_eq!(pos, None);
    }
}

//! Durable key-value state, backed by `sled`: last hard state, suppression
//! ledger, downtimes, acknowledgements and notification timestamps survive a
//! restart without replaying every historical check result.

use std::sync::Arc;

use castellan_registry::{Acknowledgement, CheckState, Checkable, Downtime, ObjectId, Registry, StateType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("opening state file: {0}")]
    Open(#[from] sled::Error),
    #[error("encoding state entry: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type StateResult<T> = Result<T, StateError>;

/// Everything persisted per checkable, snapshotted from its live `CheckableState`
/// and restored onto it at startup before the scheduler begins ticking.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckableRecord {
    hard_state: CheckState,
    state_type: StateType,
    downtimes: Vec<DowntimeRecord>,
    acknowledgement: Option<AcknowledgementRecord>,
    suppressed_notifications: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DowntimeRecord {
    id: u64,
    start: chrono::DateTime<chrono::Utc>,
    end: chrono::DateTime<chrono::Utc>,
    fixed: bool,
    author: String,
    comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AcknowledgementRecord {
    author: String,
    comment: String,
    sticky: bool,
    acknowledged_state: CheckState,
}

/// Wraps a single `sled::Tree` keyed by `ObjectId` display string. One instance is
/// shared between the shutdown snapshot and the periodic snapshot timer.
pub struct PersistedState {
    db: sled::Db,
}

impl PersistedState {
    pub fn open(path: &str) -> StateResult<Self> {
        Ok(Self { db: sled::open(path)? })
    }

    /// Snapshot every live checkable's durable fields into the tree, then flush.
    /// Called at shutdown and on the configured snapshot interval.
    pub fn snapshot(&self, registry: &Registry) -> StateResult<()> {
        let tree = self.db.open_tree("checkables")?;
        for checkable in registry.all_checkables() {
            let id = checkable_id(&checkable);
            let record = {
                let state = checkable.lock();
                CheckableRecord {
                    hard_state: state.hard_state,
                    state_type: state.state_type,
                    downtimes: state
                        .downtimes
                        .iter()
                        .map(|d| DowntimeRecord {
                            id: d.id,
                            start: d.start,
                            end: d.end,
                            fixed: d.fixed,
                            author: d.author.clone(),
                            comment: d.comment.clone(),
                        })
                        .collect(),
                    acknowledgement: state.acknowledgement.as_ref().map(|a| AcknowledgementRecord {
                        author: a.author.clone(),
                        comment: a.comment.clone(),
                        sticky: a.sticky,
                        acknowledged_state: a.acknowledged_state,
                    }),
                    suppressed_notifications: state.suppressed_notifications,
                }
            };
            tree.insert(id.to_string().as_bytes(), serde_json::to_vec(&record)?)?;
        }
        self.db.flush()?;
        debug!(checkables = tree.len(), "persisted state snapshot written");
        Ok(())
    }

    /// Restore every record found in the tree onto the matching live checkable.
    /// Records whose checkable no longer exists in the registry (removed config)
    /// are left untouched rather than reconstructed.
    pub fn restore(&self, registry: &Registry) -> StateResult<()> {
        let tree = self.db.open_tree("checkables")?;
        let mut restored = 0usize;
        for entry in tree.iter() {
            let (key, value) = entry?;
            let id_str = String::from_utf8_lossy(&key).to_string();
            let Some(checkable) = find_by_display(registry, &id_str) else {
                continue;
            };
            let record: CheckableRecord = serde_json::from_slice(&value)?;
            let mut state = checkable.lock();
            state.hard_state = record.hard_state;
            state.previous_hard_state = record.hard_state;
            state.state_type = record.state_type;
            state.suppressed_notifications = record.suppressed_notifications;
            state.downtimes = record
                .downtimes
                .into_iter()
                .map(|d| Downtime {
                    id: d.id,
                    start: d.start,
                    end: d.end,
                    fixed: d.fixed,
                    author: d.author,
                    comment: d.comment,
                })
                .collect();
            state.acknowledgement = record.acknowledgement.map(|a| Acknowledgement {
                author: a.author,
                comment: a.comment,
                sticky: a.sticky,
                acknowledged_state: a.acknowledged_state,
            });
            restored += 1;
        }
        debug!(restored, "persisted state restored");
        Ok(())
    }
}

fn checkable_id(checkable: &Checkable) -> ObjectId {
    let kind = match checkable.config.kind {
        castellan_registry::CheckableKind::Host => castellan_registry::ObjectKind::Host,
        castellan_registry::CheckableKind::Service => castellan_registry::ObjectKind::Service,
    };
    ObjectId::new(kind, checkable.name())
}

fn find_by_display(registry: &Registry, display: &str) -> Option<Arc<Checkable>> {
    registry.all_checkables().into_iter().find(|c| checkable_id(c).to_string() == display).or_else(|| {
        warn!(object = display, "persisted record has no matching live checkable, skipping");
        None
    })
}

use castellan_registry::{CheckResult, CheckState, Checkable, PerfdataValue};
use chrono::{DateTime, Utc};

/// The shape every writer encodes from, independent of wire format. Built once per
/// result and handed to whichever writers are subscribed.
#[derive(Debug, Clone)]
pub struct PerfdataRecord {
    pub checkable: String,
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub state: CheckState,
    pub values: Vec<PerfdataValue>,
}

impl PerfdataRecord {
    pub fn from_result(checkable: &Checkable, result: &CheckResult) -> Self {
        let kind = match checkable.config.kind {
            castellan_registry::CheckableKind::Host => "host",
            castellan_registry::CheckableKind::Service => "service",
        };
        Self {
            checkable: checkable.name().to_string(),
            kind,
            timestamp: result.execution_end,
            state: result.state,
            values: result.perfdata.clone(),
        }
    }

    /// Rough line-protocol ordering/urgency: a non-OK result is worth flushing
    /// ahead of a backlog of OK results from the same batch window.
    pub fn priority(&self) -> u8 {
        match self.state {
            CheckState::Critical => 0,
            CheckState::Unknown => 1,
            CheckState::Warning => 2,
            CheckState::Ok => 3,
        }
    }

    /// Approximate serialized size, used for the byte-threshold batching policy.
    pub fn approx_bytes(&self) -> usize {
        32 + self.checkable.len() + self.values.len() * 40
    }
}

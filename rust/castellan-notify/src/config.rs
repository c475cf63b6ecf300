use std::time::Duration;

use castellan_registry::StateFilter;

use crate::types::TypeFilter;

/// One notification configuration attached to a checkable. Mirrors the role of a
/// `Notification` object: a set of users, the event types and states it cares
/// about, an optional timeperiod gate, an optional escalation window relative to
/// when the problem started, and a reminder cadence.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub name: String,
    pub users: Vec<String>,
    pub types: TypeFilter,
    pub states: StateFilter,
    /// Gates delivery to a timeperiod; `None` means always open.
    pub period: Option<String>,
    /// Reminder cadence for a still-open problem. `None` disables reminders.
    pub interval: Option<Duration>,
    /// Only notify once the problem has persisted at least this long.
    pub begin: Option<Duration>,
    /// Stop notifying once the problem has persisted longer than this.
    pub end: Option<Duration>,
}

impl NotificationConfig {
    pub fn new(name: impl Into<String>, users: Vec<String>) -> Self {
        Self {
            name: name.into(),
            users,
            types: TypeFilter::all(),
            states: StateFilter::default_up().union(StateFilter::CRITICAL).union(StateFilter::UNKNOWN),
            period: None,
            interval: None,
            begin: None,
            end: None,
        }
    }

    pub fn in_window(&self, elapsed: Duration) -> bool {
        if let Some(begin) = self.begin {
            if elapsed < begin {
                return false;
            }
        }
        if let Some(end) = self.end {
            if elapsed > end {
                return false;
            }
        }
        true
    }
}

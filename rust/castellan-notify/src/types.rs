//! The eight notification types a config may filter on. Bit values are shared with
//! `castellan_registry::checkable::suppressed`, which tracks which of these are
//! currently deferred by a closed timeperiod for a given checkable.

use castellan_registry::checkable::suppressed;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationType {
    Problem,
    Recovery,
    Acknowledgement,
    DowntimeStart,
    DowntimeEnd,
    FlappingStart,
    FlappingEnd,
    Custom,
}

impl NotificationType {
    pub fn bit(self) -> u8 {
        match self {
            NotificationType::Problem => suppressed::PROBLEM,
            NotificationType::Recovery => suppressed::RECOVERY,
            NotificationType::Acknowledgement => suppressed::ACKNOWLEDGEMENT,
            NotificationType::DowntimeStart => suppressed::DOWNTIME_START,
            NotificationType::DowntimeEnd => suppressed::DOWNTIME_END,
            NotificationType::FlappingStart => suppressed::FLAPPING_START,
            NotificationType::FlappingEnd => suppressed::FLAPPING_END,
            NotificationType::Custom => suppressed::CUSTOM,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NotificationType::Problem => "problem",
            NotificationType::Recovery => "recovery",
            NotificationType::Acknowledgement => "acknowledgement",
            NotificationType::DowntimeStart => "downtime_start",
            NotificationType::DowntimeEnd => "downtime_end",
            NotificationType::FlappingStart => "flapping_start",
            NotificationType::FlappingEnd => "flapping_end",
            NotificationType::Custom => "custom",
        }
    }

    /// The type this type cancels when pending in the suppression ledger: a queued
    /// `Problem` is moot once the checkable has recovered, and vice versa.
    pub fn opposite(self) -> Option<NotificationType> {
        match self {
            NotificationType::Problem => Some(NotificationType::Recovery),
            NotificationType::Recovery => Some(NotificationType::Problem),
            NotificationType::FlappingStart => Some(NotificationType::FlappingEnd),
            NotificationType::FlappingEnd => Some(NotificationType::FlappingStart),
            _ => None,
        }
    }
}

/// Bitmask of [`NotificationType`]s a config reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeFilter(u8);

impl TypeFilter {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn with(mut self, t: NotificationType) -> Self {
        self.0 |= t.bit();
        self
    }

    pub fn all() -> Self {
        Self(0xFF)
    }

    pub fn contains(self, t: NotificationType) -> bool {
        self.0 & t.bit() != 0
    }
}

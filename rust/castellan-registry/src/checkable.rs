use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The two checkable kinds the core schedules. Both share the same state machine;
/// only the plugin output semantics differ, and that's opaque to this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckableKind {
    Host,
    Service,
}

/// Exit state of a check, shared by hosts and services. A host's `Down` is
/// represented as `Critical`; callers that need host-specific labels translate at
/// the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl CheckState {
    pub fn is_ok(self) -> bool {
        matches!(self, CheckState::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateType {
    Soft,
    Hard,
}

/// Bitmask of notification types currently deferred by a closed timeperiod. Shared
/// shape with `castellan-notify`'s `NotificationType`, duplicated here as plain bits so
/// this crate has no dependency on the notification engine.
pub mod suppressed {
    pub const PROBLEM: u8 = 0b0000_0001;
    pub const RECOVERY: u8 = 0b0000_0010;
    pub const ACKNOWLEDGEMENT: u8 = 0b0000_0100;
    pub const DOWNTIME_START: u8 = 0b0000_1000;
    pub const DOWNTIME_END: u8 = 0b0001_0000;
    pub const FLAPPING_START: u8 = 0b0010_0000;
    pub const FLAPPING_END: u8 = 0b0100_0000;
    pub const CUSTOM: u8 = 0b1000_0000;
}

/// A single performance data point attached to a check result, e.g. `rta=12.3ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerfdataValue {
    pub label: String,
    pub value: f64,
    pub unit: Option<String>,
    pub warn: Option<f64>,
    pub crit: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Immutable record produced by an executor, consumed by the result processor and
/// all perfdata writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub execution_start: DateTime<Utc>,
    pub execution_end: DateTime<Utc>,
    pub state: CheckState,
    pub output: String,
    pub perfdata: Vec<PerfdataValue>,
    /// `false` for passive results injected via the facade rather than produced by
    /// the scheduler's own executor.
    pub active: bool,
    pub origin: Option<String>,
}

/// A single active downtime interval.
#[derive(Debug, Clone)]
pub struct Downtime {
    pub id: u64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fixed: bool,
    pub author: String,
    pub comment: String,
}

impl Downtime {
    pub fn covers(&self, now: DateTime<Utc>) -> bool {
        self.fixed && now >= self.start && now <= self.end
    }
}

/// An acknowledgement of the current problem state.
#[derive(Debug, Clone)]
pub struct Acknowledgement {
    pub author: String,
    pub comment: String,
    pub sticky: bool,
    /// The severity that was acknowledged; a notification is suppressed only while
    /// the current state is at or below this severity.
    pub acknowledged_state: CheckState,
}

/// Immutable configuration for a checkable, set once at activation.
#[derive(Debug, Clone)]
pub struct CheckableConfig {
    pub name: String,
    pub kind: CheckableKind,
    pub check_command: String,
    pub check_interval: Duration,
    pub retry_interval: Duration,
    pub check_timeout: Duration,
    pub max_check_attempts: u32,
    pub zone: Option<String>,
    pub command_endpoint: Option<String>,
    pub check_period: Option<String>,
    pub ha_enabled: bool,
    pub flapping_threshold_low: f64,
    pub flapping_threshold_high: f64,
}

impl CheckableConfig {
    pub fn new(name: impl Into<String>, kind: CheckableKind, check_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            check_command: check_command.into(),
            check_interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(30),
            check_timeout: Duration::from_secs(10),
            max_check_attempts: 3,
            zone: None,
            command_endpoint: None,
            check_period: None,
            ha_enabled: false,
            flapping_threshold_low: 25.0,
            flapping_threshold_high: 30.0,
        }
    }
}

const FLAP_HISTORY_LEN: usize = 20;

/// Mutable runtime state of a checkable, always accessed through [`Checkable`]'s
/// per-object lock so that state transitions, notification dispatch, and writer
/// enqueues happen in program order (see the result processor in `castellan-results`).
#[derive(Debug)]
pub struct CheckableState {
    pub hard_state: CheckState,
    pub previous_hard_state: CheckState,
    pub state_type: StateType,
    pub attempt: u32,
    pub next_check: DateTime<Utc>,
    pub in_flight: bool,
    pub last_result: Option<Arc<CheckResult>>,
    pub last_state_change: DateTime<Utc>,
    pub last_hard_state_change: DateTime<Utc>,
    pub flapping_score: f64,
    pub flapping: bool,
    flap_history: VecDeque<bool>,
    pub suppressed_notifications: u8,
    pub active_checks_enabled: bool,
    pub notifications_enabled: bool,
    pub flapping_enabled: bool,
    pub downtimes: Vec<Downtime>,
    pub acknowledgement: Option<Acknowledgement>,
    /// Set when a hard-reachability-gating ancestor is itself down; gates
    /// notifications but not execution (see `castellan-scheduler`'s dependency filter).
    pub reachable: bool,
}

impl CheckableState {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            hard_state: CheckState::Ok,
            previous_hard_state: CheckState::Ok,
            state_type: StateType::Hard,
            attempt: 1,
            next_check: now,
            in_flight: false,
            last_result: None,
            last_state_change: now,
            last_hard_state_change: now,
            flapping_score: 0.0,
            flapping: false,
            flap_history: VecDeque::with_capacity(FLAP_HISTORY_LEN),
            suppressed_notifications: 0,
            active_checks_enabled: true,
            notifications_enabled: true,
            flapping_enabled: true,
            downtimes: Vec::new(),
            acknowledgement: None,
            reachable: true,
        }
    }

    /// Record a hard state transition into the flap-detection window, recompute
    /// the flap score as the weighted ratio of transitions within the window, and
    /// raise or clear `flapping` against the configured high/low thresholds. The
    /// two thresholds give the flag hysteresis: once raised by crossing `high`, it
    /// only clears again on dropping below `low`, not merely below `high`.
    pub fn record_transition(&mut self, changed: bool, threshold_low: f64, threshold_high: f64) {
        if self.flap_history.len() == FLAP_HISTORY_LEN {
            self.flap_history.pop_front();
        }
        self.flap_history.push_back(changed);
        let transitions = self.flap_history.iter().filter(|c| **c).count() as f64;
        self.flapping_score = (transitions / FLAP_HISTORY_LEN as f64) * 100.0;

        if !self.flapping_enabled {
            self.flapping = false;
            return;
        }
        if !self.flapping && self.flapping_score >= threshold_high {
            self.flapping = true;
        } else if self.flapping && self.flapping_score <= threshold_low {
            self.flapping = false;
        }
    }

    pub fn is_acknowledged_at(&self, state: CheckState) -> bool {
        match &self.acknowledgement {
            Some(ack) => severity_rank(state) <= severity_rank(ack.acknowledged_state),
            None => false,
        }
    }

    pub fn is_in_downtime(&self, now: DateTime<Utc>) -> bool {
        self.downtimes.iter().any(|d| d.covers(now))
    }

    pub fn clear_non_sticky_ack(&mut self) {
        if let Some(ack) = &self.acknowledgement {
            if !ack.sticky {
                self.acknowledgement = None;
            }
        }
    }
}

fn severity_rank(state: CheckState) -> u8 {
    match state {
        CheckState::Ok => 0,
        CheckState::Warning => 1,
        CheckState::Unknown => 2,
        CheckState::Critical => 3,
    }
}

/// The central monitored entity: a Host or Service, its immutable config and its
/// lock-protected mutable state.
#[derive(Debug)]
pub struct Checkable {
    pub config: CheckableConfig,
    state: Mutex<CheckableState>,
}

impl Checkable {
    pub fn new(config: CheckableConfig, now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            config,
            state: Mutex::new(CheckableState::new(now)),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Lock the per-object state. All result processing, notification gating and
    /// downtime/ack mutation must happen while holding this guard so that effects
    /// for a single checkable are totally ordered.
    pub fn lock(&self) -> parking_lot::MutexGuard<'_, CheckableState> {
        self.state.lock()
    }

    /// A read-only snapshot, useful for status queries that don't need the full
    /// state-transition machinery.
    pub fn snapshot(&self) -> CheckableSnapshot {
        let s = self.state.lock();
        CheckableSnapshot {
            name: self.config.name.clone(),
            hard_state: s.hard_state,
            state_type: s.state_type,
            attempt: s.attempt,
            max_attempts: self.config.max_check_attempts,
            next_check: s.next_check,
            flapping: s.flapping,
            flapping_score: s.flapping_score,
            in_downtime: s.is_in_downtime(Utc::now()),
            acknowledged: s.acknowledgement.is_some(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckableSnapshot {
    pub name: String,
    pub hard_state: CheckState,
    pub state_type: StateType,
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_check: DateTime<Utc>,
    pub flapping: bool,
    pub flapping_score: f64,
    pub in_downtime: bool,
    pub acknowledged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checkable_starts_hard_ok_with_attempt_one() {
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let c = Checkable::new(cfg, Utc::now());
        let s = c.lock();
        assert_eq!(s.attempt, 1);
        assert_eq!(s.state_type, StateType::Hard);
        assert!(s.hard_state.is_ok());
    }

    #[test]
    fn flap_score_rises_with_transitions() {
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let c = Checkable::new(cfg, Utc::now());
        let mut s = c.lock();
        for _ in 0..FLAP_HISTORY_LEN {
            s.record_transition(true, 25.0, 30.0);
        }
        assert!((s.flapping_score - 100.0).abs() < f64::EPSILON);
        assert!(s.flapping);
    }

    #[test]
    fn flapping_flag_has_hysteresis_between_thresholds() {
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let c = Checkable::new(cfg, Utc::now());
        let mut s = c.lock();
        for _ in 0..FLAP_HISTORY_LEN {
            s.record_transition(true, 25.0, 30.0);
        }
        assert!(s.flapping);

        for _ in 0..(FLAP_HISTORY_LEN - 3) {
            s.record_transition(false, 25.0, 30.0);
        }
        // score is now 3/20 * 100 = 15%, below both thresholds.
        assert!(!s.flapping);
    }

    #[test]
    fn acknowledgement_suppresses_at_or_below_severity() {
        let cfg = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        let c = Checkable::new(cfg, Utc::now());
        let mut s = c.lock();
        s.acknowledgement = Some(Acknowledgement {
            author: "op".into(),
            comment: "known issue".into(),
            sticky: false,
            acknowledged_state: CheckState::Warning,
        });
        assert!(s.is_acknowledged_at(CheckState::Warning));
        assert!(s.is_acknowledged_at(CheckState::Ok));
        assert!(!s.is_acknowledged_at(CheckState::Critical));
    }
}

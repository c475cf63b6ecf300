//! The hard/soft state machine, applied with the checkable's lock held.

use castellan_registry::{CheckResult, CheckableConfig, CheckableState, CheckState, StateType};

/// What happened as a result of applying one [`CheckResult`]. `hard_changed`
/// gates `OnStateChange`; `is_recovery` narrows it to the OK case; `still_in_state`
/// is purely informational (no notification fires from it alone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub hard_changed: bool,
    pub is_recovery: bool,
    pub still_in_state: bool,
    pub previous_hard_state: CheckState,
    pub new_state: CheckState,
}

pub fn apply_result(state: &mut CheckableState, config: &CheckableConfig, result: &CheckResult) -> Transition {
    let previous_value = state.hard_state;
    let previous_type = state.state_type;

    if result.state == previous_value {
        return match previous_type {
            StateType::Soft => {
                if state.attempt < config.max_check_attempts {
                    state.attempt += 1;
                }
                if state.attempt >= config.max_check_attempts {
                    state.state_type = StateType::Hard;
                    state.last_hard_state_change = result.execution_end;
                    state.record_transition(true, config.flapping_threshold_low, config.flapping_threshold_high);
                    Transition {
                        hard_changed: true,
                        is_recovery: false,
                        still_in_state: false,
                        previous_hard_state: previous_value,
                        new_state: result.state,
                    }
                } else {
                    state.record_transition(false, config.flapping_threshold_low, config.flapping_threshold_high);
                    Transition {
                        hard_changed: false,
                        is_recovery: false,
                        still_in_state: false,
                        previous_hard_state: previous_value,
                        new_state: result.state,
                    }
                }
            }
            StateType::Hard => {
                state.attempt = config.max_check_attempts;
                state.record_transition(false, config.flapping_threshold_low, config.flapping_threshold_high);
                Transition {
                    hard_changed: false,
                    is_recovery: false,
                    still_in_state: true,
                    previous_hard_state: previous_value,
                    new_state: result.state,
                }
            }
        };
    }

    state.previous_hard_state = previous_value;
    state.last_state_change = result.execution_end;
    state.hard_state = result.state;
    state.attempt = 1;

    if result.state == CheckState::Ok {
        state.state_type = StateType::Hard;
        state.last_hard_state_change = result.execution_end;
        state.clear_non_sticky_ack();
        state.record_transition(true, config.flapping_threshold_low, config.flapping_threshold_high);
        Transition {
            hard_changed: true,
            is_recovery: true,
            still_in_state: false,
            previous_hard_state: previous_value,
            new_state: result.state,
        }
    } else {
        state.state_type = StateType::Soft;
        if config.max_check_attempts <= 1 {
            state.state_type = StateType::Hard;
            state.last_hard_state_change = result.execution_end;
            state.record_transition(true, config.flapping_threshold_low, config.flapping_threshold_high);
            return Transition {
                hard_changed: true,
                is_recovery: false,
                still_in_state: false,
                previous_hard_state: previous_value,
                new_state: result.state,
            };
        }
        state.record_transition(false, config.flapping_threshold_low, config.flapping_threshold_high);
        Transition {
            hard_changed: false,
            is_recovery: false,
            still_in_state: false,
            previous_hard_state: previous_value,
            new_state: result.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellan_registry::{CheckableConfig, CheckableKind};
    use chrono::Utc;

    fn cfg(max_attempts: u32) -> CheckableConfig {
        let mut c = CheckableConfig::new("web1", CheckableKind::Host, "check-ping");
        c.max_check_attempts = max_attempts;
        c
    }

    fn result(state: CheckState) -> CheckResult {
        let now = Utc::now();
        CheckResult {
            scheduled_start: now,
            scheduled_end: now,
            execution_start: now,
            execution_end: now,
            state,
            output: String::new(),
            perfdata: Vec::new(),
            active: true,
            origin: None,
        }
    }

    #[test]
    fn three_soft_failures_promote_to_hard() {
        let config = cfg(3);
        let state = castellan_registry::Checkable::new(config.clone(), Utc::now());
        let mut s = state.lock();
        let t1 = apply_result(&mut s, &config, &result(CheckState::Critical));
        assert!(!t1.hard_changed);
        assert_eq!(s.attempt, 1);
        assert_eq!(s.state_type, StateType::Soft);

        let t2 = apply_result(&mut s, &config, &result(CheckState::Critical));
        assert!(!t2.hard_changed);
        assert_eq!(s.attempt, 2);

        let t3 = apply_result(&mut s, &config, &result(CheckState::Critical));
        assert!(t3.hard_changed);
        assert!(!t3.is_recovery);
        assert_eq!(s.attempt, 3);
        assert_eq!(s.state_type, StateType::Hard);
    }

    #[test]
    fn recovery_resets_attempt_and_fires() {
        let config = cfg(3);
        let checkable = castellan_registry::Checkable::new(config.clone(), Utc::now());
        let mut s = checkable.lock();
        s.hard_state = CheckState::Critical;
        s.state_type = StateType::Hard;
        s.attempt = 3;

        let t = apply_result(&mut s, &config, &result(CheckState::Ok));
        assert!(t.hard_changed);
        assert!(t.is_recovery);
        assert_eq!(s.attempt, 1);
        assert_eq!(s.state_type, StateType::Hard);
    }

    #[test]
    fn single_max_attempt_promotes_immediately() {
        let config = cfg(1);
        let checkable = castellan_registry::Checkable::new(config.clone(), Utc::now());
        let mut s = checkable.lock();
        let t = apply_result(&mut s, &config, &result(CheckState::Critical));
        assert!(t.hard_changed);
        assert_eq!(s.state_type, StateType::Hard);
    }

    #[test]
    fn hard_problem_repeating_raises_still_in_state() {
        let config = cfg(3);
        let checkable = castellan_registry::Checkable::new(config.clone(), Utc::now());
        let mut s = checkable.lock();
        s.hard_state = CheckState::Critical;
        s.state_type = StateType::Hard;
        s.attempt = 3;
        let t = apply_result(&mut s, &config, &result(CheckState::Critical));
        assert!(t.still_in_state);
        assert!(!t.hard_changed);
        assert_eq!(s.attempt, 3);
    }

    #[test]
    fn repeated_hard_flips_raise_flapping_flag() {
        let mut config = cfg(1);
        config.flapping_threshold_low = 25.0;
        config.flapping_threshold_high = 30.0;
        let checkable = castellan_registry::Checkable::new(config.clone(), Utc::now());
        let mut s = checkable.lock();

        let mut state = CheckState::Ok;
        for _ in 0..10 {
            state = if state == CheckState::Ok { CheckState::Critical } else { CheckState::Ok };
            apply_result(&mut s, &config, &result(state));
        }

        assert!(s.flapping);
        assert!(s.flapping_score >= config.flapping_threshold_high);
    }
}

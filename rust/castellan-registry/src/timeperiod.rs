use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

/// Day of the week a recurring [`TimeRange`] applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    fn matches(self, d: chrono::Weekday) -> bool {
        matches!(
            (self, d),
            (Weekday::Monday, chrono::Weekday::Mon)
                | (Weekday::Tuesday, chrono::Weekday::Tue)
                | (Weekday::Wednesday, chrono::Weekday::Wed)
                | (Weekday::Thursday, chrono::Weekday::Thu)
                | (Weekday::Friday, chrono::Weekday::Fri)
                | (Weekday::Saturday, chrono::Weekday::Sat)
                | (Weekday::Sunday, chrono::Weekday::Sun)
        )
    }
}

/// A single inclusion window: either a weekly recurrence (`weekday` set) bounded by
/// time-of-day, or a fixed one-off calendar span (`date` set).
#[derive(Debug, Clone)]
pub enum TimeRange {
    Weekly {
        weekday: Weekday,
        start_secs: u32,
        end_secs: u32,
    },
    Fixed {
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// A set of weekday/date ranges; answers [`TimePeriod::is_inside`]. Non-inclusion gates
/// both problem notifications and, optionally, active checks.
#[derive(Debug, Clone)]
pub struct TimePeriod {
    pub name: String,
    pub ranges: Vec<TimeRange>,
}

impl TimePeriod {
    pub fn new(name: impl Into<String>, ranges: Vec<TimeRange>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    /// An "always open" timeperiod, used as the default when a checkable or
    /// notification has none configured.
    pub fn always() -> Self {
        Self {
            name: "always".to_string(),
            ranges: vec![TimeRange::Weekly {
                weekday: Weekday::Monday,
                start_secs: 0,
                end_secs: 0,
            }],
        }
    }

    pub fn is_inside(&self, t: DateTime<Utc>) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        let secs_of_day = t.num_seconds_from_midnight();
        let date = t.date_naive();
        self.ranges.iter().any(|r| match r {
            TimeRange::Weekly {
                weekday,
                start_secs,
                end_secs,
            } => {
                // start == end == 0 is the conventional "whole day, every day" wildcard.
                if *start_secs == 0 && *end_secs == 0 {
                    return true;
                }
                weekday.matches(t.weekday()) && secs_of_day >= *start_secs && secs_of_day < *end_secs
            }
            TimeRange::Fixed { start, end } => date >= *start && date <= *end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn always_is_always_inside() {
        let tp = TimePeriod::always();
        let t = Utc.with_ymd_and_hms(2026, 7, 27, 3, 0, 0).unwrap();
        assert!(tp.is_inside(t));
    }

    #[test]
    fn weekly_window_gates_by_day_and_time() {
        let tp = TimePeriod::new(
            "business-hours",
            vec![TimeRange::Weekly {
                weekday: Weekday::Monday,
                start_secs: 9 * 3600,
                end_secs: 17 * 3600,
            }],
        );
        // 2026-07-27 is a Monday.
        let inside = Utc.with_ymd_and_hms(2026, 7, 27, 10, 0, 0).unwrap();
        let outside_time = Utc.with_ymd_and_hms(2026, 7, 27, 20, 0, 0).unwrap();
        let outside_day = Utc.with_ymd_and_hms(2026, 7, 28, 10, 0, 0).unwrap();
        assert!(tp.is_inside(inside));
        assert!(!tp.is_inside(outside_time));
        assert!(!tp.is_inside(outside_day));
    }

    #[test]
    fn fixed_range_covers_inclusive_dates() {
        let tp = TimePeriod::new(
            "maintenance-window",
            vec![TimeRange::Fixed {
                start: NaiveDate::from_ymd_opt(2026, 7, 20).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 7, 30).unwrap(),
            }],
        );
        assert!(tp.is_inside(Utc.with_ymd_and_hms(2026, 7, 25, 0, 0, 0).unwrap()));
        assert!(!tp.is_inside(Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap()));
    }
}

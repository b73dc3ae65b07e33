//! Time predicates for walker algorithms.
//!
//! The value grammar is `HH:MM` ("active until that time of day") or
//! `HH:MM-HH:MM` (a window, which may span midnight). Spacing around
//! the dash is tolerated.

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeSpec {
    /// Active from midnight until the given time.
    Until(NaiveTime),
    /// Active inside the window; `start > end` spans midnight.
    Window(NaiveTime, NaiveTime),
}

fn parse_clock(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.trim().split_once(':')?;
    let hour: u32 = h.trim().parse().ok()?;
    let minute: u32 = m.trim().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

impl TimeSpec {
    pub fn parse(value: &str) -> Option<TimeSpec> {
        let value = value.trim();
        match value.split_once('-') {
            Some((start, end)) => Some(TimeSpec::Window(parse_clock(start)?, parse_clock(end)?)),
            None => Some(TimeSpec::Until(parse_clock(value)?)),
        }
    }

    pub fn active(&self, now: DateTime<Utc>) -> bool {
        let t = now.time();
        match *self {
            TimeSpec::Until(end) => t <= end,
            TimeSpec::Window(start, end) => {
                if start <= end {
                    start <= t && t <= end
                } else {
                    t >= start || t <= end
                }
            }
        }
    }

    /// The next instant at which the window opens. None while already
    /// active.
    pub fn next_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.active(now) {
            return None;
        }
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())?;
        match *self {
            // Past the end time; reactivates at the next midnight.
            TimeSpec::Until(_) => Some(midnight + Duration::days(1)),
            TimeSpec::Window(start, _) => {
                let today = midnight + signed_from_midnight(start);
                if today > now {
                    Some(today)
                } else {
                    Some(today + Duration::days(1))
                }
            }
        }
    }
}

fn signed_from_midnight(t: NaiveTime) -> Duration {
    Duration::seconds(i64::from(t.num_seconds_from_midnight()))
}

/// `timer` predicate.
pub fn check_time_till_end(value: &str, now: DateTime<Utc>) -> bool {
    TimeSpec::parse(value).is_some_and(|spec| spec.active(now))
}

/// `period` predicate.
pub fn check_time_period(value: &str, now: DateTime<Utc>) -> bool {
    TimeSpec::parse(value).is_some_and(|spec| spec.active(now))
}

/// Unix timestamp of the next activation of a timer/period value.
pub fn next_activation(value: &str, now: DateTime<Utc>) -> Option<i64> {
    TimeSpec::parse(value)?
        .next_start(now)
        .map(|dt| dt.timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 29, hour, minute, 0).unwrap()
    }

    #[test]
    fn until_form_is_active_before_end() {
        assert!(check_time_till_end("18:30", at(10, 0)));
        assert!(!check_time_till_end("18:30", at(19, 0)));
    }

    #[test]
    fn window_form_bounds_both_sides() {
        assert!(check_time_period("06:00-08:00", at(7, 0)));
        assert!(!check_time_period("06:00-08:00", at(5, 59)));
        assert!(!check_time_period("06:00-08:00", at(8, 1)));
    }

    #[test]
    fn window_spanning_midnight() {
        assert!(check_time_period("22:00-04:00", at(23, 30)));
        assert!(check_time_period("22:00-04:00", at(2, 0)));
        assert!(!check_time_period("22:00-04:00", at(12, 0)));
    }

    #[test]
    fn tolerant_spacing() {
        assert!(check_time_period(" 06:00 - 08:00 ", at(7, 0)));
    }

    #[test]
    fn malformed_value_is_never_active() {
        assert!(!check_time_period("whenever", at(7, 0)));
        assert!(next_activation("whenever", at(7, 0)).is_none());
    }

    #[test]
    fn next_activation_of_window_today() {
        let wake = next_activation("14:00-16:00", at(10, 0)).unwrap();
        assert_eq!(wake, at(14, 0).timestamp());
    }

    #[test]
    fn next_activation_of_window_rolls_over() {
        let wake = next_activation("06:00-08:00", at(12, 0)).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2026, 8, 30, 6, 0, 0).unwrap();
        assert_eq!(wake, tomorrow.timestamp());
    }

    #[test]
    fn next_activation_while_active_is_none() {
        assert!(next_activation("06:00-08:00", at(7, 0)).is_none());
    }
}

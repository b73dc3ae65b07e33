//! The job updater: administrative job chains executed against
//! connected devices, serialized per origin.

mod catalog;
mod log;
mod updater;

pub use catalog::{JobCatalog, load_autocommands};
pub use log::JobLog;
pub use updater::{JobEventSink, JobUpdater, JobUpdaterConfig, TracingEventSink};

use chrono::{DateTime, Duration, NaiveTime, Utc};
use roverd_model::JobAlgo;

/// Unix timestamp of the next run of a recurring job.
pub fn next_processing(algo: JobAlgo, value: &str, now: DateTime<Utc>) -> Option<i64> {
    match algo {
        JobAlgo::Loop => {
            let minutes: i64 = value.trim().parse().ok()?;
            Some((now + Duration::minutes(minutes)).timestamp())
        }
        JobAlgo::Daily => {
            let (h, m) = value.trim().split_once(':')?;
            let at = NaiveTime::from_hms_opt(h.trim().parse().ok()?, m.trim().parse().ok()?, 0)?;
            let today = now.date_naive().and_time(at).and_utc();
            if today > now {
                Some(today.timestamp())
            } else {
                Some((today + Duration::days(1)).timestamp())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn loop_algo_adds_minutes() {
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
        assert_eq!(
            next_processing(JobAlgo::Loop, "90", now),
            Some((now + Duration::minutes(90)).timestamp())
        );
    }

    #[test]
    fn daily_algo_picks_next_occurrence() {
        let now = Utc.with_ymd_and_hms(2026, 8, 29, 12, 0, 0).unwrap();
        let today = Utc.with_ymd_and_hms(2026, 8, 29, 23, 30, 0).unwrap();
        assert_eq!(
            next_processing(JobAlgo::Daily, "23:30", now),
            Some(today.timestamp())
        );
        let tomorrow = Utc.with_ymd_and_hms(2026, 8, 30, 6, 0, 0).unwrap();
        assert_eq!(
            next_processing(JobAlgo::Daily, "06:00", now),
            Some(tomorrow.timestamp())
        );
    }

    #[test]
    fn malformed_values_yield_none() {
        let now = Utc::now();
        assert_eq!(next_processing(JobAlgo::Loop, "soon", now), None);
        assert_eq!(next_processing(JobAlgo::Daily, "25:99", now), None);
    }
}

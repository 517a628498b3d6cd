//! Calendar source for the daily rollover.

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use std::sync::{Arc, Mutex};

/// Supplies "today" in the user's local calendar.
pub trait Clock: Send {
    fn today(&self) -> NaiveDate;
}

/// Wall clock in the local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock whose date is set by hand. Clones share the same date.
#[derive(Debug, Clone)]
pub struct ManualClock {
    day: Arc<Mutex<NaiveDate>>,
}

impl ManualClock {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day: Arc::new(Mutex::new(day)),
        }
    }

    pub fn set(&self, day: NaiveDate) {
        if let Ok(mut guard) = self.day.lock() {
            *guard = day;
        }
    }

    /// Move forward by `days` calendar days.
    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.day.lock() {
            *guard += Duration::days(days);
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        match self.day.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// The first local midnight strictly after `now`.
///
/// On days where midnight does not exist (DST gaps) the earliest valid
/// instant of the next day is used.
pub fn next_local_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let next_day = now.date_naive() + Duration::days(1);
    let mut probe = next_day.and_hms_opt(0, 0, 0).unwrap_or_default();
    for _ in 0..4 {
        if let Some(at) = tz.from_local_datetime(&probe).earliest() {
            return at;
        }
        probe += Duration::minutes(30);
    }
    now.clone() + Duration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn manual_clock_shares_date() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let other = clock.clone();
        other.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        clock.set(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(other.today(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn next_midnight_is_strictly_after() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(
            next_local_midnight(&now),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
        );

        let at_midnight = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert_eq!(
            next_local_midnight(&at_midnight),
            Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_midnight_respects_offset() {
        let tz = FixedOffset::east_opt(9 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        let midnight = next_local_midnight(&now);
        assert_eq!(midnight, tz.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap());
        assert_eq!((midnight - now).num_hours(), 16);
    }
}

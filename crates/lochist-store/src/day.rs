//! Calendar-day queries.
//!
//! A day is the half-open window `[midnight, next midnight)` in a given time
//! zone, so a record captured exactly at midnight belongs to the day that
//! starts there.

use chrono::{Days, Local, NaiveDate, NaiveTime, TimeZone};
use tracing::debug;

use lochist_types::LocationRecord;

use crate::error::{Error, Result};
use crate::store::Store;

/// Epoch-millisecond bounds `[from, to)` of a calendar day in `tz`.
///
/// `month` is 1-based. Dates that do not exist (month 13, February 30, ...)
/// return [`Error::InvalidDate`]; nothing is clamped.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use lochist_store::day_bounds;
///
/// assert_eq!(day_bounds(&Utc, 1970, 1, 2)?, (86_400_000, 172_800_000));
/// assert!(day_bounds(&Utc, 2024, 2, 30).is_err());
/// # Ok::<(), lochist_store::Error>(())
/// ```
pub fn day_bounds<Tz: TimeZone>(tz: &Tz, year: i32, month: u32, day: u32) -> Result<(i64, i64)> {
    let invalid = || Error::InvalidDate { year, month, day };

    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)?;
    let next = date.checked_add_days(Days::new(1)).ok_or_else(invalid)?;

    let from = start_of_day(tz, date).ok_or_else(invalid)?;
    let to = start_of_day(tz, next).ok_or_else(invalid)?;
    Ok((from, to))
}

/// First instant of `date` in `tz`, in epoch milliseconds.
///
/// When midnight is skipped by a DST change the day starts at the first
/// local time that exists; when it occurs twice the earlier one is used.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<i64> {
    (0..24 * 4).find_map(|quarter: u32| {
        let time = NaiveTime::from_hms_opt(quarter / 4, (quarter % 4) * 15, 0)?;
        tz.from_local_datetime(&date.and_time(time))
            .earliest()
            .map(|dt| dt.timestamp_millis())
    })
}

// Day queries
impl Store {
    /// Records captured on a local calendar day, newest first.
    ///
    /// Uses the system time zone. Equivalent to
    /// `select_day_in(&chrono::Local, year, month, day)`.
    pub fn select_day(&self, year: i32, month: u32, day: u32) -> Result<Vec<LocationRecord>> {
        self.select_day_in(&Local, year, month, day)
    }

    /// Records captured on a calendar day in `tz`, newest first.
    ///
    /// The date is validated before the database is touched.
    pub fn select_day_in<Tz: TimeZone>(
        &self,
        tz: &Tz,
        year: i32,
        month: u32,
        day: u32,
    ) -> Result<Vec<LocationRecord>> {
        let (from, to) = day_bounds(tz, year, month, day)?;
        debug!(
            "Selecting {:04}-{:02}-{:02} as [{}, {})",
            year, month, day, from, to
        );
        self.query_range(from, to)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, Utc};
    use lochist_types::CandidateRecord;

    use super::*;

    fn tokyo() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).unwrap()
    }

    fn insert(store: &Store, lat: f64, lon: f64, t: i64) {
        store
            .insert_batch(&[CandidateRecord::new(lat, lon, t).unwrap()])
            .unwrap();
    }

    #[test]
    fn test_day_bounds_utc() {
        assert_eq!(day_bounds(&Utc, 1970, 1, 1).unwrap(), (0, 86_400_000));
    }

    #[test]
    fn test_day_bounds_fixed_offset() {
        // 2024-05-01T00:00+09:00 is 2024-04-30T15:00Z
        let (from, to) = day_bounds(&tokyo(), 2024, 5, 1).unwrap();
        assert_eq!(from, 1_714_489_200_000);
        assert_eq!(to - from, 86_400_000);
    }

    #[test]
    fn test_day_bounds_month_and_year_rollover() {
        let (_, end_of_feb) = day_bounds(&Utc, 2024, 2, 29).unwrap();
        let (start_of_march, _) = day_bounds(&Utc, 2024, 3, 1).unwrap();
        assert_eq!(end_of_feb, start_of_march);

        let (_, end_of_year) = day_bounds(&Utc, 2023, 12, 31).unwrap();
        let (new_year, _) = day_bounds(&Utc, 2024, 1, 1).unwrap();
        assert_eq!(end_of_year, new_year);
    }

    #[test]
    fn test_invalid_dates_are_rejected() {
        for (y, m, d) in [(2024, 5, 32), (2024, 13, 1), (2024, 0, 1), (2023, 2, 29), (2024, 4, 0)] {
            let err = day_bounds(&Utc, y, m, d).unwrap_err();
            assert!(
                matches!(err, Error::InvalidDate { year, month, day } if (year, month, day) == (y, m, d))
            );
        }
    }

    #[test]
    fn test_invalid_date_message() {
        let err = day_bounds(&Utc, 2024, 5, 32).unwrap_err();
        assert_eq!(err.to_string(), "Invalid date: 2024-05-32");
    }

    #[test]
    fn test_select_day_scenario() {
        let store = Store::open_in_memory().unwrap();
        let tz = tokyo();
        let (may_1, may_2) = day_bounds(&tz, 2024, 5, 1).unwrap();

        insert(&store, 35.0, 135.0, may_1 + 1000);
        insert(&store, 36.0, 136.0, may_2 - 1000);

        let day = store.select_day_in(&tz, 2024, 5, 1).unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].latitude, 36.0);
        assert_eq!(day[1].latitude, 35.0);

        assert!(store.select_day_in(&tz, 2024, 5, 2).unwrap().is_empty());
    }

    #[test]
    fn test_midnight_belongs_to_the_new_day() {
        let store = Store::open_in_memory().unwrap();
        let tz = tokyo();
        let (midnight, _) = day_bounds(&tz, 2024, 5, 2).unwrap();
        insert(&store, 35.0, 135.0, midnight);

        assert_eq!(store.select_day_in(&tz, 2024, 5, 2).unwrap().len(), 1);
        assert!(store.select_day_in(&tz, 2024, 5, 1).unwrap().is_empty());
    }

    #[test]
    fn test_empty_day_is_not_an_error() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.select_day(2024, 5, 1).unwrap().is_empty());
    }

    #[test]
    fn test_select_day_rejects_invalid_date() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.select_day(2024, 2, 30),
            Err(Error::InvalidDate { .. })
        ));
    }

    #[test]
    fn test_select_day_local_matches_bounds() {
        let store = Store::open_in_memory().unwrap();
        let (from, to) = day_bounds(&Local, 2024, 5, 1).unwrap();
        insert(&store, 1.0, 1.0, from);
        insert(&store, 2.0, 2.0, to - 1);
        insert(&store, 3.0, 3.0, to);

        let day = store.select_day(2024, 5, 1).unwrap();
        let lats: Vec<f64> = day.iter().map(|r| r.latitude).collect();
        assert_eq!(lats, vec![2.0, 1.0]);
    }
}

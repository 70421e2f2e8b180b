//! Local calendar days as UTC instants.
//!
//! Timestamps are stored in UTC while reporting windows (digest day, stats
//! month) follow the server's local calendar.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// The instant `day` begins in `tz`. When a DST jump skips midnight the
/// first valid local time that morning is used.
pub fn day_start<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_time(NaiveTime::default());
    tz.from_local_datetime(&midnight)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(midnight + Duration::hours(1))).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

pub fn local_day_start(day: NaiveDate) -> DateTime<Utc> {
    day_start(&Local, day)
}

/// Seconds `tz` is ahead of UTC on `day`.
pub fn utc_offset<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> i32 {
    tz.offset_from_utc_datetime(&day.and_time(NaiveTime::default()))
        .fix()
        .local_minus_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn mountain() -> FixedOffset {
        FixedOffset::west_opt(6 * 3600).unwrap()
    }

    #[test]
    fn local_midnight_in_utc() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(day_start(&mountain(), day), Utc.with_ymd_and_hms(2025, 6, 1, 6, 0, 0).unwrap());
        assert_eq!(day_start(&Utc, day), Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn offsets_are_signed() {
        let day = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(utc_offset(&mountain(), day), -6 * 3600);
        assert_eq!(utc_offset(&FixedOffset::east_opt(3600).unwrap(), day), 3600);
        assert_eq!(utc_offset(&Utc, day), 0);
    }
}

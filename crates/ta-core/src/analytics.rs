//! Aggregate shapes returned by `GET /analytics`.

use chrono::{DateTime, Days, Local, Months, NaiveDate, TimeZone, Utc};

use crate::clock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaTotals {
    pub area_id: i64,
    pub area_name: String,
    pub total_reports: i64,
    pub total_hours: f64,
    pub total_trees: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthTotals {
    /// `YYYY-MM`
    pub month: String,
    pub total_reports: i64,
    pub total_hours: f64,
    pub total_trees: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardTrail {
    pub trail_id: i64,
    pub trail_name: String,
    pub area_name: String,
    pub hazard_count: i64,
    pub safety_hazards: i64,
    pub washouts: i64,
    pub overgrowth: i64,
    pub downed_trees: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallTotals {
    pub total_reports: i64,
    pub trails_maintained: i64,
    pub total_volunteers: i64,
    pub total_hours: f64,
    pub total_trees: i64,
    pub corridor_work: i64,
    pub raking_work: i64,
    pub drain_work: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecentTotals {
    pub reports_30d: i64,
    pub hours_30d: f64,
    pub trees_30d: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub total_resolved: i64,
    pub resolved_30d: i64,
    pub resolved_7d: i64,
    pub currently_active: i64,
    pub total_outstanding: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolver {
    pub user_id: i64,
    pub display_name: String,
    pub resolutions: i64,
    pub latest_resolution: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthResolutions {
    pub month: String,
    pub resolutions: i64,
    pub unique_resolvers: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentResolution {
    pub photo_id: i64,
    pub trail_name: String,
    pub caption: Option<String>,
    pub resolved_by_name: String,
    pub resolved_at: DateTime<Utc>,
    pub image_url: Option<String>,
    /// Used to build `image_url`
    #[serde(skip)]
    pub media_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analytics {
    pub by_area: Vec<AreaTotals>,
    pub by_month: Vec<MonthTotals>,
    pub hazard_trails: Vec<HazardTrail>,
    pub overall: OverallTotals,
    pub recent: RecentTotals,
    pub resolution_stats: ResolutionStats,
    pub top_resolvers: Vec<Resolver>,
    pub resolutions_by_month: Vec<MonthResolutions>,
    pub recent_resolutions: Vec<RecentResolution>,
}

/// Cut-offs for the rolling windows, relative to a local `today`.
///
/// Work dates are local calendar dates and compare against the date
/// fields; stored timestamps are UTC and compare against the instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub twelve_months: NaiveDate,
    pub thirty_days: NaiveDate,
    pub twelve_months_at: DateTime<Utc>,
    pub thirty_days_at: DateTime<Utc>,
    pub seven_days_at: DateTime<Utc>,
    /// Seconds the local calendar is ahead of UTC, for grouping
    /// timestamps by local month.
    pub utc_offset: i32,
}

impl Windows {
    pub fn new<Tz: TimeZone>(tz: &Tz, today: NaiveDate) -> Self {
        let twelve_months = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        let thirty_days = today - Days::new(30);
        Self {
            twelve_months,
            thirty_days,
            twelve_months_at: clock::day_start(tz, twelve_months),
            thirty_days_at: clock::day_start(tz, thirty_days),
            seven_days_at: clock::day_start(tz, today - Days::new(7)),
            utc_offset: clock::utc_offset(tz, today),
        }
    }

    pub fn local(today: NaiveDate) -> Self {
        Self::new(&Local, today)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_handle_month_ends() {
        let w = Windows::new(&Utc, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(w.twelve_months, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());
        assert_eq!(w.thirty_days, NaiveDate::from_ymd_opt(2024, 1, 30).unwrap());
        assert_eq!(w.seven_days_at, Utc.with_ymd_and_hms(2024, 2, 22, 0, 0, 0).unwrap());
        assert_eq!(w.utc_offset, 0);
    }

    #[test]
    fn instants_follow_the_local_calendar() {
        let mountain = chrono::FixedOffset::west_opt(6 * 3600).unwrap();
        let w = Windows::new(&mountain, NaiveDate::from_ymd_opt(2025, 7, 15).unwrap());
        assert_eq!(w.thirty_days, NaiveDate::from_ymd_opt(2025, 6, 15).unwrap());
        assert_eq!(w.thirty_days_at, Utc.with_ymd_and_hms(2025, 6, 15, 6, 0, 0).unwrap());
        assert_eq!(w.utc_offset, -6 * 3600);
    }
}

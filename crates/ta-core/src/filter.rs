//! # Listing filters
//!
//! Query strings are parsed into typed, allow-listed filters here so that the
//! storage layer only ever sees values it can bind as parameters.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub const DEFAULT_PER_PAGE: i64 = 10;
pub const MAX_PER_PAGE: i64 = 50;
/// Photos attached to each listed report.
pub const PHOTOS_PER_REPORT: usize = 6;
pub const MAX_OUTSTANDING_ROWS: i64 = 200;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    CreatedAt,
    TreesCleared,
}

impl OrderBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderBy::CreatedAt => "created_at",
            OrderBy::TreesCleared => "trees_cleared",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Condition columns that may be filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionFlag {
    Hazards,
    Washout,
    Overgrowth,
    Muddy,
}

impl ConditionFlag {
    pub fn column(&self) -> &'static str {
        match self {
            ConditionFlag::Hazards => "cond_hazards",
            ConditionFlag::Washout => "cond_washout",
            ConditionFlag::Overgrowth => "cond_overgrowth",
            ConditionFlag::Muddy => "cond_muddy",
        }
    }
}

/// Typed, validated report listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFilter {
    pub page: i64,
    pub per_page: i64,
    pub trail_id: Option<i64>,
    pub area_id: Option<i64>,
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub has_photos: bool,
    pub min_trees: Option<i64>,
    pub conditions: Vec<(ConditionFlag, bool)>,
    pub order_by: OrderBy,
    pub order: SortOrder,
}

impl Default for ReportFilter {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
            trail_id: None,
            area_id: None,
            date_min: None,
            date_max: None,
            has_photos: false,
            min_trees: None,
            conditions: Vec::new(),
            order_by: OrderBy::default(),
            order: SortOrder::default(),
        }
    }
}

impl ReportFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.per_page
    }
}

/// Raw query string of `GET /reports`. Everything is a string so that
/// `1`/`0`/`true`/`false` and empty values are all accepted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportListQuery {
    pub page: Option<String>,
    pub per_page: Option<String>,
    pub trail_id: Option<String>,
    pub area_id: Option<String>,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    pub has_photos: Option<String>,
    pub min_trees: Option<String>,
    pub cond_hazards: Option<String>,
    pub cond_washout: Option<String>,
    pub cond_overgrowth: Option<String>,
    pub cond_muddy: Option<String>,
    pub orderby: Option<String>,
    pub order: Option<String>,
    pub sanity: Option<String>,
}

impl ReportListQuery {
    pub fn is_sanity(&self) -> bool {
        parse_flag(self.sanity.as_deref()).unwrap_or(false)
    }

    pub fn into_filter(self) -> Result<ReportFilter> {
        let page = parse_int(self.page.as_deref(), "page")?.unwrap_or(1).max(1);
        let per_page = parse_int(self.per_page.as_deref(), "per_page")?
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);

        let order_by = match non_empty(self.orderby.as_deref()) {
            None | Some("created_at") => OrderBy::CreatedAt,
            Some("trees_cleared") => OrderBy::TreesCleared,
            Some(other) => return Err(AppError::invalid(format!("orderby is not one of created_at, trees_cleared: {other}"))),
        };
        let order = match non_empty(self.order.as_deref()).map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };

        let mut conditions = Vec::new();
        for (flag, raw) in [
            (ConditionFlag::Hazards, &self.cond_hazards),
            (ConditionFlag::Washout, &self.cond_washout),
            (ConditionFlag::Overgrowth, &self.cond_overgrowth),
            (ConditionFlag::Muddy, &self.cond_muddy),
        ] {
            if let Some(value) = parse_flag(raw.as_deref()) {
                conditions.push((flag, value));
            }
        }

        let min_trees = parse_int(self.min_trees.as_deref(), "min_trees")?;
        if matches!(min_trees, Some(n) if n < 0) {
            return Err(AppError::invalid("min_trees must be greater than or equal to 0"));
        }

        Ok(ReportFilter {
            page,
            per_page,
            trail_id: parse_int(self.trail_id.as_deref(), "trail_id")?.filter(|id| *id > 0),
            area_id: parse_int(self.area_id.as_deref(), "area_id")?.filter(|id| *id > 0),
            date_min: parse_date(self.date_min.as_deref(), "date_min")?,
            date_max: parse_date(self.date_max.as_deref(), "date_max")?,
            has_photos: parse_flag(self.has_photos.as_deref()).unwrap_or(false),
            min_trees,
            conditions,
            order_by,
            order,
        })
    }
}

pub const DEFAULT_TRAIL_PAGE: i64 = 200;
pub const MAX_TRAIL_PAGE: i64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct TrailFilter {
    pub per_page: i64,
    pub search: Option<String>,
    pub area_id: Option<i64>,
}

impl Default for TrailFilter {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_TRAIL_PAGE,
            search: None,
            area_id: None,
        }
    }
}

/// Raw query string of `GET /trails`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrailListQuery {
    pub per_page: Option<String>,
    pub search: Option<String>,
    pub area: Option<String>,
}

impl TrailListQuery {
    pub fn into_filter(self) -> Result<TrailFilter> {
        Ok(TrailFilter {
            per_page: parse_int(self.per_page.as_deref(), "per_page")?
                .unwrap_or(DEFAULT_TRAIL_PAGE)
                .clamp(1, MAX_TRAIL_PAGE),
            search: non_empty(self.search.as_deref()).map(str::to_string),
            area_id: parse_int(self.area.as_deref(), "area")?.filter(|id| *id > 0),
        })
    }
}

/// Review queue shown on the admin page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewFilter {
    #[default]
    Unreviewed,
    Outstanding,
    Dismissed,
    Resolved,
    All,
}

impl ReviewFilter {
    pub fn parse_lenient(s: Option<&str>) -> Self {
        match non_empty(s) {
            Some("outstanding") => ReviewFilter::Outstanding,
            Some("dismissed") => ReviewFilter::Dismissed,
            Some("resolved") => ReviewFilter::Resolved,
            Some("all") => ReviewFilter::All,
            _ => ReviewFilter::Unreviewed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewFilter::Unreviewed => "unreviewed",
            ReviewFilter::Outstanding => "outstanding",
            ReviewFilter::Dismissed => "dismissed",
            ReviewFilter::Resolved => "resolved",
            ReviewFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutstandingFilter {
    pub review: ReviewFilter,
    pub trail_id: Option<i64>,
    pub area_id: Option<i64>,
    pub user_id: Option<i64>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutstandingQuery {
    pub filter: Option<String>,
    pub trail_id: Option<String>,
    pub area_id: Option<String>,
    pub user_id: Option<String>,
    pub date_start: Option<String>,
    pub date_end: Option<String>,
}

impl OutstandingQuery {
    pub fn into_filter(self) -> Result<OutstandingFilter> {
        Ok(OutstandingFilter {
            review: ReviewFilter::parse_lenient(self.filter.as_deref()),
            trail_id: parse_int(self.trail_id.as_deref(), "trail_id")?.filter(|id| *id > 0),
            area_id: parse_int(self.area_id.as_deref(), "area_id")?.filter(|id| *id > 0),
            user_id: parse_int(self.user_id.as_deref(), "user_id")?.filter(|id| *id > 0),
            date_start: parse_date(self.date_start.as_deref(), "date_start")?,
            date_end: parse_date(self.date_end.as_deref(), "date_end")?,
        })
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// `None` when absent or empty.
pub fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match non_empty(raw)?.to_ascii_lowercase().as_str() {
        "0" | "false" | "no" | "off" => Some(false),
        _ => Some(true),
    }
}

fn parse_int(raw: Option<&str>, name: &str) -> Result<Option<i64>> {
    non_empty(raw)
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::invalid(format!("{name} is not of type integer")))
        })
        .transpose()
}

fn parse_date(raw: Option<&str>, name: &str) -> Result<Option<NaiveDate>> {
    non_empty(raw)
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| AppError::invalid(format!("{name} must be a YYYY-MM-DD date")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ReportListQuery {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    #[test]
    fn defaults_apply_when_empty() {
        let filter = ReportListQuery::default().into_filter().unwrap();
        assert_eq!(filter, ReportFilter::default());
        assert_eq!(filter.offset(), 0);
    }

    #[test]
    fn per_page_is_clamped() {
        let f = query(&[("per_page", "500")]).into_filter().unwrap();
        assert_eq!(f.per_page, MAX_PER_PAGE);
        let f = query(&[("per_page", "0"), ("page", "-2")]).into_filter().unwrap();
        assert_eq!(f.per_page, 1);
        assert_eq!(f.page, 1);
    }

    #[test]
    fn flags_accept_numeric_and_words() {
        let f = query(&[("cond_hazards", "1"), ("cond_muddy", "false"), ("cond_washout", "")])
            .into_filter()
            .unwrap();
        assert_eq!(
            f.conditions,
            vec![(ConditionFlag::Hazards, true), (ConditionFlag::Muddy, false)]
        );
    }

    #[test]
    fn rejects_bad_dates_and_orderby() {
        assert!(query(&[("date_min", "yesterday")]).into_filter().is_err());
        assert!(query(&[("orderby", "hours_spent")]).into_filter().is_err());
        assert!(query(&[("min_trees", "-1")]).into_filter().is_err());
    }

    #[test]
    fn trail_query_clamps_and_trims() {
        let q = TrailListQuery {
            per_page: Some("9000".into()),
            search: Some("  ".into()),
            area: Some("4".into()),
        };
        let f = q.into_filter().unwrap();
        assert_eq!(f.per_page, MAX_TRAIL_PAGE);
        assert_eq!(f.search, None);
        assert_eq!(f.area_id, Some(4));
        assert_eq!(TrailListQuery::default().into_filter().unwrap(), TrailFilter::default());
    }

    #[test]
    fn review_filter_defaults_to_unreviewed() {
        assert_eq!(ReviewFilter::parse_lenient(None), ReviewFilter::Unreviewed);
        assert_eq!(ReviewFilter::parse_lenient(Some("bogus")), ReviewFilter::Unreviewed);
        assert_eq!(ReviewFilter::parse_lenient(Some("resolved")), ReviewFilter::Resolved);
    }
}

//! # Domain Models
//!
//! These structs represent the core entities of trail-agent.
//! Identifiers are SQLite rowids, so they are plain `i64`s.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::roles::Role;

/// Current condition of a trail, as shown on the map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrailStatus {
    #[default]
    Open,
    Closed,
    Seasonal,
    Muddy,
    Hazardous,
}

impl TrailStatus {
    pub const ALL: [TrailStatus; 5] = [
        TrailStatus::Open,
        TrailStatus::Closed,
        TrailStatus::Seasonal,
        TrailStatus::Muddy,
        TrailStatus::Hazardous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrailStatus::Open => "open",
            TrailStatus::Closed => "closed",
            TrailStatus::Seasonal => "seasonal",
            TrailStatus::Muddy => "muddy",
            TrailStatus::Hazardous => "hazardous",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TrailStatus::Open => "Open",
            TrailStatus::Closed => "Closed",
            TrailStatus::Seasonal => "Seasonally Closed",
            TrailStatus::Muddy => "Muddy",
            TrailStatus::Hazardous => "Hazardous",
        }
    }

    /// Polyline color on the trail map.
    pub fn color(&self) -> &'static str {
        match self {
            TrailStatus::Open => "#10b981",
            TrailStatus::Closed => "#6b7280",
            TrailStatus::Seasonal => "#3b82f6",
            TrailStatus::Muddy => "#fbbf24",
            TrailStatus::Hazardous => "#ef4444",
        }
    }
}

impl fmt::Display for TrailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrailStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrailStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s.trim())
            .ok_or_else(|| AppError::invalid("Invalid trail status"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Moderate,
    Advanced,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Moderate => "moderate",
            Difficulty::Advanced => "advanced",
            Difficulty::Expert => "expert",
        }
    }

    /// Unknown values fall back to `Moderate`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim() {
            "easy" => Difficulty::Easy,
            "advanced" => Difficulty::Advanced,
            "expert" => Difficulty::Expert,
            _ => Difficulty::Moderate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Axis-aligned bounding box of a GPX track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

/// A parsed GPX track: `[lat, lng]` pairs plus their bounds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GpxTrack {
    pub coordinates: Vec<[f64; 2]>,
    pub bounds: Option<Bounds>,
}

/// Area summary attached to a trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// A hierarchical grouping of trails (e.g., "Aspen", "Red Hill").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Area {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub parent_id: Option<i64>,
    /// Number of trails assigned to this area
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trail {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub difficulty: Difficulty,
    pub status: TrailStatus,
    pub region: Option<String>,
    pub land_manager: Option<String>,
    pub trailhead: Option<LatLng>,
    pub map_url: Option<String>,
    pub gpx: Option<GpxTrack>,
    pub seasonal_close_date: Option<String>,
    pub seasonal_open_date: Option<String>,
    pub areas: Vec<AreaRef>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a trail outside of GPX import.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTrail {
    pub title: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub status: TrailStatus,
    pub region: Option<String>,
    pub land_manager: Option<String>,
    pub trailhead: Option<LatLng>,
    pub map_url: Option<String>,
    #[serde(default)]
    pub areas: Vec<String>,
}

/// Admin status change for a single trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailStatusUpdate {
    pub status: TrailStatus,
    pub close_date: Option<String>,
    pub open_date: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Approved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Approved => "approved",
        }
    }

    pub fn parse_lenient(s: &str) -> Self {
        if s == "approved" {
            ReportStatus::Approved
        } else {
            ReportStatus::Pending
        }
    }
}

/// Work done and conditions observed on one outing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkLog {
    pub hours_spent: f64,
    pub trees_cleared: i64,
    pub corridor_cleared: bool,
    pub raking: bool,
    pub installed_drains: bool,
    pub rocks_cleared: bool,
    /// Number of downed trees still across the trail
    pub cond_trees: i64,
    pub cond_hazards: bool,
    pub cond_washout: bool,
    pub cond_overgrowth: bool,
    pub cond_muddy: bool,
    pub cond_comment: String,
    pub summary: String,
}

/// A validated report ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub user_id: i64,
    pub trail_id: i64,
    pub work_date: NaiveDate,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
    pub work: WorkLog,
    pub photos: Vec<NewPhoto>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub attachment_id: i64,
    pub photo_type: String,
    pub caption: String,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub user_id: i64,
    pub trail_id: i64,
    pub work_date: Option<NaiveDate>,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
    #[serde(flatten)]
    pub work: WorkLog,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Photo as returned alongside a listed report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPhoto {
    pub id: i64,
    pub report_id: i64,
    pub attachment_id: i64,
    /// Content hash handled by the MediaStore
    #[serde(skip_serializing)]
    pub media_id: Option<String>,
    pub caption: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
    pub thumb_url: String,
    pub full_url: String,
}

/// One row of the paginated report listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: i64,
    pub trail_id: i64,
    pub user_id: i64,
    pub work_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub work: WorkLog,
    pub created_at: DateTime<Utc>,
    pub photo_count: i64,
    pub sample_attachment_id: i64,
    pub photos: Vec<ReportPhoto>,
    pub user_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPage {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub rows: Vec<ReportRow>,
}

impl ReportPage {
    pub fn new(page: i64, per_page: i64, total: i64, rows: Vec<ReportRow>) -> Self {
        let per_page = per_page.max(1);
        Self {
            page,
            per_page,
            total,
            total_pages: (total + per_page - 1) / per_page,
            rows,
        }
    }
}

/// An uploaded file known to the MediaStore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub media_id: String,
    pub mime: String,
    pub filename: Option<String>,
    pub uploaded_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
}

/// `(id, name)` pair used by filter drop-downs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedId {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOptions {
    pub trails: Vec<NamedId>,
    pub areas: Vec<NamedId>,
    pub users: Vec<NamedId>,
}

/// Whether a GPX upsert created a new trail or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportOutcome {
    Created(i64),
    Updated(i64),
}

impl ImportOutcome {
    pub fn trail_id(&self) -> i64 {
        match self {
            ImportOutcome::Created(id) | ImportOutcome::Updated(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupeSummary {
    pub deleted: usize,
    pub updated_reports: u64,
    pub retitled: usize,
    pub meta_merged: usize,
    pub terms_merged: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_status_round_trips_through_str() {
        for st in TrailStatus::ALL {
            assert_eq!(st.as_str().parse::<TrailStatus>().unwrap(), st);
        }
        assert!("flooded".parse::<TrailStatus>().is_err());
    }

    #[test]
    fn total_pages_is_ceiling_division() {
        assert_eq!(ReportPage::new(1, 10, 25, vec![]).total_pages, 3);
        assert_eq!(ReportPage::new(1, 10, 20, vec![]).total_pages, 2);
        assert_eq!(ReportPage::new(1, 10, 0, vec![]).total_pages, 0);
    }

    #[test]
    fn unknown_difficulty_is_moderate() {
        assert_eq!(Difficulty::parse_lenient("double_black"), Difficulty::Moderate);
        assert_eq!(Difficulty::parse_lenient("expert"), Difficulty::Expert);
    }
}

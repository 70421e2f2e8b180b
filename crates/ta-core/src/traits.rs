//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Infrastructure failures travel as `anyhow::Error`; expected domain
//! results are spelled out in the return types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::analytics::{Analytics, Windows};
use crate::filter::{OutstandingFilter, ReportFilter, TrailFilter};
use crate::models::{
    Area, Attachment, DedupeSummary, FilterOptions, GpxTrack, ImportOutcome, NewReport, NewTrail,
    NewUser, Report, ReportPage, Trail, TrailStatusUpdate, User,
};
use crate::notices::{DigestRow, Notice};
use crate::review::{OutstandingPhoto, OutstandingStats, ReviewAction, ReviewOutcome};

/// Trails, areas and their maintenance.
#[async_trait]
pub trait TrailRepo: Send + Sync {
    async fn list_trails(&self, filter: &TrailFilter) -> anyhow::Result<Vec<Trail>>;
    async fn get_trail(&self, id: i64) -> anyhow::Result<Option<Trail>>;
    async fn create_trail(&self, trail: &NewTrail) -> anyhow::Result<i64>;
    /// `false` when no trail has this id.
    async fn update_trail_status(&self, id: i64, update: &TrailStatusUpdate) -> anyhow::Result<bool>;

    async fn list_areas(&self) -> anyhow::Result<Vec<Area>>;
    /// Returns the id of the area named `name`, creating it when missing.
    async fn ensure_area(&self, name: &str, parent_id: Option<i64>) -> anyhow::Result<i64>;

    /// Matches on exact title: refreshes the track of a known trail, or
    /// creates an open trail in `area_name`.
    async fn upsert_gpx_trail(&self, title: &str, area_name: &str, track: &GpxTrack) -> anyhow::Result<ImportOutcome>;

    /// Merges trails whose titles differ only by `*`, case or padding.
    async fn dedupe_trails(&self, dry_run: bool) -> anyhow::Result<DedupeSummary>;
}

/// Field reports, their photos and the uploads they reference.
#[async_trait]
pub trait ReportRepo: Send + Sync {
    /// Inserts the report and its photos atomically. Photos pointing at
    /// unknown attachments are skipped.
    async fn create_report(&self, report: &NewReport) -> anyhow::Result<i64>;
    async fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>>;
    /// Photo URLs in the returned rows are left empty for the caller to fill.
    async fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<ReportPage>;

    async fn create_attachment(
        &self,
        media_id: &str,
        mime: &str,
        filename: Option<&str>,
        uploaded_by: i64,
    ) -> anyhow::Result<Attachment>;
    async fn get_attachment(&self, id: i64) -> anyhow::Result<Option<Attachment>>;

    async fn analytics(&self, windows: &Windows) -> anyhow::Result<Analytics>;
    /// Per-trail totals for reports created in `[from, until)`.
    async fn digest_rows(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> anyhow::Result<Vec<DigestRow>>;
}

/// Outstanding-maintenance review of report photos.
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn list_outstanding(&self, filter: &OutstandingFilter) -> anyhow::Result<Vec<OutstandingPhoto>>;
    async fn apply_review(&self, photo_id: i64, action: ReviewAction, now: DateTime<Utc>) -> anyhow::Result<ReviewOutcome>;
    /// `since` is the start of the current local month.
    async fn outstanding_stats(&self, since: DateTime<Utc>) -> anyhow::Result<OutstandingStats>;
    async fn filter_options(&self) -> anyhow::Result<FilterOptions>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> anyhow::Result<i64>;
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<User>>;
    /// Looks up by username, then by email.
    async fn find_user_by_login(&self, login: &str) -> anyhow::Result<Option<User>>;
    async fn username_exists(&self, username: &str) -> anyhow::Result<bool>;
    async fn email_exists(&self, email: &str) -> anyhow::Result<bool>;
}

/// Everything the HTTP layer needs from persistence.
pub trait Repository: TrailRepo + ReportRepo + ReviewRepo + UserRepo {}

impl<T> Repository for T where T: TrailRepo + ReportRepo + ReviewRepo + UserRepo {}

/// Media storage contract for handling uploads and thumbnails.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Saves raw bytes and returns a media_id for the Attachment row.
    async fn save_upload(&self, data: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
    /// Returns the URL or path to the original media.
    async fn get_url(&self, media_id: &str) -> String;
    /// Returns the URL of the thumbnail, or of the original when none exists.
    async fn get_thumbnail_url(&self, media_id: &str) -> String;
    async fn read_original(&self, media_id: &str) -> anyhow::Result<Vec<u8>>;
}

/// Credentials and per-session tokens.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;
    async fn verify_password(&self, password: &str, hash: &str) -> bool;
    /// Fresh token echoed back by clients in `X-TA-Nonce`.
    fn issue_nonce(&self) -> String;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &Notice) -> anyhow::Result<()>;
}

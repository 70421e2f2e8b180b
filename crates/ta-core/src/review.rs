//! # Outstanding-maintenance review
//!
//! Every report photo carries a small set of independent review flags. The
//! transitions below are plain flag updates and may be re-applied at will;
//! only `resolve` checks a precondition.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::filter::ReviewFilter;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFlags {
    pub is_outstanding: bool,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<i64>,
    pub resolution_notes: Option<String>,
    pub resolution_date: Option<NaiveDate>,
}

/// Derived view of the flags, matching the admin queue tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewState {
    Unreviewed,
    Outstanding,
    Dismissed,
    Resolved,
}

/// Requested via `set-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetStatus {
    Outstanding,
    NotOutstanding,
}

impl SetStatus {
    pub fn parse_lenient(s: Option<&str>) -> Self {
        if s.map(str::trim) == Some("outstanding") {
            SetStatus::Outstanding
        } else {
            SetStatus::NotOutstanding
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub resolved_by: i64,
    pub notes: String,
    pub date: NaiveDate,
}

impl ReviewFlags {
    pub fn state(&self) -> ReviewState {
        match (self.is_outstanding, self.resolved_at.is_some(), self.reviewed_at.is_some()) {
            (true, true, _) => ReviewState::Resolved,
            (true, false, _) => ReviewState::Outstanding,
            (false, _, true) => ReviewState::Dismissed,
            (false, _, false) => ReviewState::Unreviewed,
        }
    }

    pub fn matches(&self, filter: ReviewFilter) -> bool {
        match filter {
            ReviewFilter::All => true,
            ReviewFilter::Unreviewed => self.reviewed_at.is_none() && self.resolved_at.is_none(),
            ReviewFilter::Outstanding => self.is_outstanding && self.resolved_at.is_none(),
            ReviewFilter::Resolved => self.is_outstanding && self.resolved_at.is_some(),
            ReviewFilter::Dismissed => self.reviewed_at.is_some() && !self.is_outstanding,
        }
    }

    fn clear_resolution(&mut self) {
        self.resolved_at = None;
        self.resolved_by = None;
        self.resolution_notes = None;
        self.resolution_date = None;
    }

    pub fn mark_outstanding(&mut self, now: DateTime<Utc>) {
        self.is_outstanding = true;
        self.reviewed_at = Some(now);
        self.clear_resolution();
    }

    pub fn clear_outstanding(&mut self, now: DateTime<Utc>) {
        self.is_outstanding = false;
        self.reviewed_at = Some(now);
        self.clear_resolution();
    }

    /// Flips `is_outstanding`; returns the new value.
    pub fn toggle(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_outstanding {
            self.clear_outstanding(now);
        } else {
            self.mark_outstanding(now);
        }
        self.is_outstanding
    }

    pub fn set_status(&mut self, status: SetStatus, now: DateTime<Utc>) {
        match status {
            SetStatus::Outstanding => self.mark_outstanding(now),
            SetStatus::NotOutstanding => self.clear_outstanding(now),
        }
    }

    /// Reviewed, nothing to do. Resolution notes and date are left in place.
    pub fn dismiss(&mut self, now: DateTime<Utc>) {
        self.is_outstanding = false;
        self.resolved_at = None;
        self.resolved_by = None;
        self.reviewed_at = Some(now);
    }

    pub fn resolve(&mut self, resolution: Resolution, now: DateTime<Utc>) -> Result<()> {
        if !self.is_outstanding {
            return Err(AppError::Conflict(
                "photo is not marked as outstanding".to_string(),
            ));
        }
        self.resolved_at = Some(now);
        self.resolved_by = Some(resolution.resolved_by);
        self.resolution_notes = Some(resolution.notes);
        self.resolution_date = Some(resolution.date);
        self.reviewed_at = Some(now);
        Ok(())
    }

    pub fn apply(&mut self, action: ReviewAction, now: DateTime<Utc>) -> Result<()> {
        match action {
            ReviewAction::Toggle => {
                self.toggle(now);
            }
            ReviewAction::SetStatus(status) => self.set_status(status, now),
            ReviewAction::Dismiss => self.dismiss(now),
            ReviewAction::Resolve(resolution) => self.resolve(resolution, now)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewAction {
    Toggle,
    SetStatus(SetStatus),
    Dismiss,
    Resolve(Resolution),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewOutcome {
    Applied(ReviewFlags),
    PhotoNotFound,
    /// The action's precondition did not hold; nothing was written.
    Rejected(String),
}

/// Counters for the agent page header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutstandingStats {
    pub active: i64,
    pub resolved_this_month: i64,
}

/// A photo in the review queue, joined with its report context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutstandingPhoto {
    pub id: i64,
    pub attachment_id: i64,
    #[serde(skip_serializing)]
    pub media_id: Option<String>,
    pub caption: Option<String>,
    pub photo_type: String,
    pub gps_lat: Option<f64>,
    pub gps_lng: Option<f64>,
    #[serde(flatten)]
    pub flags: ReviewFlags,
    pub report_id: i64,
    pub work_date: Option<NaiveDate>,
    pub trail_id: i64,
    pub trail_name: String,
    pub user_id: i64,
    pub user_name: String,
    pub resolved_by_name: Option<String>,
    pub cond_comment: Option<String>,
    pub summary: Option<String>,
    pub cond_trees: i64,
    pub cond_hazards: bool,
    pub cond_washout: bool,
    pub cond_overgrowth: bool,
    pub cond_muddy: bool,
    pub created_at: DateTime<Utc>,
    pub image_url: String,
    pub thumb_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()
    }

    fn resolution() -> Resolution {
        Resolution {
            resolved_by: 9,
            notes: "Bucked the log".into(),
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
        }
    }

    #[test]
    fn fresh_photo_is_unreviewed() {
        let flags = ReviewFlags::default();
        assert_eq!(flags.state(), ReviewState::Unreviewed);
        assert!(flags.matches(ReviewFilter::Unreviewed));
        assert!(!flags.matches(ReviewFilter::Dismissed));
    }

    #[test]
    fn resolve_requires_outstanding() {
        let mut flags = ReviewFlags::default();
        assert!(matches!(
            flags.resolve(resolution(), now()),
            Err(AppError::Conflict(_))
        ));

        flags.dismiss(now());
        assert!(flags.resolve(resolution(), now()).is_err());
        assert_eq!(flags.state(), ReviewState::Dismissed);
    }

    #[test]
    fn outstanding_then_resolved() {
        let mut flags = ReviewFlags::default();
        flags.mark_outstanding(now());
        assert_eq!(flags.state(), ReviewState::Outstanding);

        flags.resolve(resolution(), now()).unwrap();
        assert_eq!(flags.state(), ReviewState::Resolved);
        assert_eq!(flags.resolved_by, Some(9));
        assert!(flags.matches(ReviewFilter::Resolved));
        assert!(!flags.matches(ReviewFilter::Outstanding));
    }

    #[test]
    fn marking_again_clears_resolution() {
        let mut flags = ReviewFlags::default();
        flags.mark_outstanding(now());
        flags.resolve(resolution(), now()).unwrap();
        flags.mark_outstanding(now());
        assert_eq!(flags.state(), ReviewState::Outstanding);
        assert_eq!(flags.resolution_notes, None);
    }

    #[test]
    fn toggle_flips_and_marks_reviewed() {
        let mut flags = ReviewFlags::default();
        assert!(flags.toggle(now()));
        assert!(!flags.toggle(now()));
        assert_eq!(flags.state(), ReviewState::Dismissed);
        assert_eq!(flags.reviewed_at, Some(now()));
    }

    #[test]
    fn apply_dispatches_and_surfaces_conflicts() {
        let mut flags = ReviewFlags::default();
        flags.apply(ReviewAction::SetStatus(SetStatus::Outstanding), now()).unwrap();
        assert_eq!(flags.state(), ReviewState::Outstanding);
        flags.apply(ReviewAction::Resolve(resolution()), now()).unwrap();
        flags.apply(ReviewAction::Toggle, now()).unwrap();
        assert_eq!(flags.state(), ReviewState::Dismissed);
        assert!(flags.apply(ReviewAction::Resolve(resolution()), now()).is_err());
    }

    #[test]
    fn dismiss_keeps_notes() {
        let mut flags = ReviewFlags::default();
        flags.mark_outstanding(now());
        flags.resolve(resolution(), now()).unwrap();
        flags.dismiss(now());
        assert_eq!(flags.resolved_at, None);
        assert_eq!(flags.resolution_notes.as_deref(), Some("Bucked the log"));
    }
}

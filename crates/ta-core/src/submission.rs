//! # Report submission
//!
//! Field clients send loosely-typed JSON: numbers may arrive as strings and
//! checkboxes as `"1"`, `"on"`, `true` or `1`. This module turns such a
//! payload into a validated [`NewReport`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{NewPhoto, NewReport, WorkLog};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSubmission {
    #[serde(default)]
    pub trail_id: Option<Value>,
    #[serde(default)]
    pub work_date: Option<String>,
    #[serde(default)]
    pub gps_lat: Option<Value>,
    #[serde(default)]
    pub gps_lng: Option<Value>,
    #[serde(default)]
    pub hours_spent: Option<Value>,
    #[serde(default)]
    pub trees_cleared: Option<Value>,
    #[serde(default)]
    pub corridor_cleared: Option<Value>,
    #[serde(default)]
    pub raking: Option<Value>,
    #[serde(default)]
    pub installed_drains: Option<Value>,
    #[serde(default)]
    pub rocks_cleared: Option<Value>,
    #[serde(default)]
    pub cond_trees: Option<Value>,
    #[serde(default)]
    pub cond_hazards: Option<Value>,
    #[serde(default)]
    pub cond_washout: Option<Value>,
    #[serde(default)]
    pub cond_overgrowth: Option<Value>,
    #[serde(default)]
    pub cond_muddy: Option<Value>,
    #[serde(default)]
    pub cond_comment: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub photos: Vec<PhotoSubmission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhotoSubmission {
    #[serde(default)]
    pub attachment_id: Option<Value>,
    #[serde(default)]
    pub photo_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub gps_lat: Option<Value>,
    #[serde(default)]
    pub gps_lng: Option<Value>,
}

impl ReportSubmission {
    /// The trail id as submitted, `None` when absent, zero or unparseable.
    pub fn trail_id(&self) -> Option<i64> {
        self.trail_id.as_ref().and_then(as_i64).filter(|id| *id > 0)
    }

    /// Validates and coerces the payload. Trail existence is checked by the
    /// caller, which owns the repository.
    pub fn into_new_report(self, user_id: i64, today: NaiveDate) -> Result<NewReport> {
        let trail_id = self
            .trail_id()
            .ok_or_else(|| AppError::invalid("Invalid trail_id"))?;

        let work = WorkLog {
            hours_spent: non_negative_f64(self.hours_spent.as_ref()),
            trees_cleared: non_negative_i64(self.trees_cleared.as_ref()),
            corridor_cleared: truthy(self.corridor_cleared.as_ref()),
            raking: truthy(self.raking.as_ref()),
            installed_drains: truthy(self.installed_drains.as_ref()),
            rocks_cleared: truthy(self.rocks_cleared.as_ref()),
            cond_trees: non_negative_i64(self.cond_trees.as_ref()),
            cond_hazards: truthy(self.cond_hazards.as_ref()),
            cond_washout: truthy(self.cond_washout.as_ref()),
            cond_overgrowth: truthy(self.cond_overgrowth.as_ref()),
            cond_muddy: truthy(self.cond_muddy.as_ref()),
            cond_comment: sanitize_textarea(self.cond_comment.as_deref().unwrap_or_default()),
            summary: sanitize_textarea(self.summary.as_deref().unwrap_or_default()),
        };

        let photos = self
            .photos
            .into_iter()
            .filter_map(PhotoSubmission::into_new_photo)
            .collect();

        Ok(NewReport {
            user_id,
            trail_id,
            work_date: resolve_work_date(self.work_date.as_deref(), today),
            gps_lat: self.gps_lat.as_ref().and_then(as_f64),
            gps_lng: self.gps_lng.as_ref().and_then(as_f64),
            work,
            photos,
        })
    }
}

impl PhotoSubmission {
    /// Entries without a usable attachment id are dropped.
    fn into_new_photo(self) -> Option<NewPhoto> {
        let attachment_id = self.attachment_id.as_ref().and_then(as_i64)?;
        if attachment_id <= 0 {
            return None;
        }
        let photo_type = self
            .photo_type
            .as_deref()
            .map(sanitize_key)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "work".to_string());
        Some(NewPhoto {
            attachment_id,
            photo_type,
            caption: sanitize_line(self.caption.as_deref().unwrap_or_default()),
            gps_lat: self.gps_lat.as_ref().and_then(as_f64),
            gps_lng: self.gps_lng.as_ref().and_then(as_f64),
        })
    }
}

/// `YYYY-MM-DD` when it names a real calendar day, otherwise `today`.
pub fn resolve_work_date(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.len() != 10 {
        return today;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap_or(today)
}

/// Loose truthiness: null, false, 0, "", "0", "false", "off" and empty arrays are false.
pub fn truthy(v: Option<&Value>) -> bool {
    match v {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("off"))
        }
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

pub fn as_f64(v: &Value) -> Option<f64> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f: &f64| f.is_finite())
}

pub fn as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn non_negative_f64(v: Option<&Value>) -> f64 {
    v.and_then(as_f64).unwrap_or(0.0).max(0.0)
}

fn non_negative_i64(v: Option<&Value>) -> i64 {
    v.and_then(as_i64).unwrap_or(0).max(0)
}

/// Removes markup, keeps line breaks, trims the ends.
pub fn sanitize_textarea(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for ch in raw.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if in_tag => {}
            '\r' => {}
            c if c.is_control() && c != '\n' && c != '\t' => {}
            c => out.push(c),
        }
    }
    out.trim().to_string()
}

/// Single-line variant: whitespace runs collapse to one space.
pub fn sanitize_line(raw: &str) -> String {
    sanitize_textarea(raw)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase alphanumerics, `_` and `-` only.
pub fn sanitize_key(raw: &str) -> String {
    raw.chars()
        .filter_map(|c| {
            let c = c.to_ascii_lowercase();
            (c.is_ascii_alphanumeric() || c == '_' || c == '-').then_some(c)
        })
        .collect()
}

//! Plain-text notices sent through a [`Notifier`](crate::traits::Notifier).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::Report;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub fn report_created(to: &str, trail: &str, agent: &str, report: &Report) -> Notice {
    let w = &report.work;
    Notice {
        to: to.to_string(),
        subject: format!("[TCR] New report: {trail}"),
        body: format!(
            "Trail: {trail}\nAgent: {agent}\nHours: {:.2}\nTrees: {}\nCorridor: {}\nRocks: {}\nSummary: {}\n",
            w.hours_spent,
            w.trees_cleared,
            u8::from(w.corridor_cleared),
            u8::from(w.rocks_cleared),
            w.summary,
        ),
    }
}

/// Per-trail totals for one digest window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigestRow {
    pub trail_id: i64,
    pub trail_name: String,
    pub reports: i64,
    pub hours: f64,
    pub trees: i64,
    pub corridor: i64,
    pub rocks: i64,
}

/// `None` when there was no activity in the window.
pub fn daily_digest(to: &str, from: NaiveDate, until: NaiveDate, rows: &[DigestRow]) -> Option<Notice> {
    if rows.is_empty() {
        return None;
    }
    let mut lines = vec![format!(
        "Trail Agent digest ({} 00:00:00 → {} 00:00:00)",
        from.format("%Y-%m-%d"),
        until.format("%Y-%m-%d")
    )];
    lines.extend(rows.iter().map(|r| {
        format!(
            "- {}: {} reports, {:.2} hrs, trees {}, corridor {}, rocks {}",
            r.trail_name, r.reports, r.hours, r.trees, r.corridor, r.rocks
        )
    }));
    Some(Notice {
        to: to.to_string(),
        subject: "[TCR] Daily digest".to_string(),
        body: lines.join("\n"),
    })
}

pub fn welcome(to: &str, first_name: &str, username: &str, login_url: &str) -> Notice {
    Notice {
        to: to.to_string(),
        subject: "Welcome to Trail Agent!".to_string(),
        body: format!(
            "Hi {first_name},\n\n\
             Welcome to the Trail Agent community!\n\n\
             Your account has been created successfully.\n\n\
             Username: {username}\n\
             Email: {to}\n\n\
             You can now login at: {login_url}\n\n\
             Thank you for joining us in keeping our trails safe!\n\n\
             Best regards,\nThe Trail Agent Team"
        ),
    }
}

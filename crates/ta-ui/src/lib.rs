//! Server-rendered pages. Handlers build these structs; askama renders the
//! templates under `templates/`.

use std::collections::{BTreeSet, HashMap};

use askama::Template;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use ta_core::analytics::{Analytics, RecentResolution, Resolver};
use ta_core::filter::{ConditionFlag, OrderBy, ReportFilter, ReviewFilter, SortOrder};
use ta_core::review::{OutstandingPhoto, OutstandingStats, ReviewState};
use ta_core::{
    Area, FilterOptions, GpxTrack, NamedId, ReportPage, ReportRow, Trail, TrailStatus,
};

/// Area shown for trails without one.
pub const FALLBACK_AREA: &str = "Other";

/// JSON safe to drop inside a `<script>` element.
fn script_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    Ok(serde_json::to_string(value)?.replace("</", "<\\/"))
}

/// One polyline on the trail map.
#[derive(Debug, Clone, Serialize)]
pub struct MapTrail {
    pub id: i64,
    pub name: String,
    pub status: TrailStatus,
    pub area: String,
    pub gpx_data: Option<GpxTrack>,
    pub close_date: Option<String>,
    pub open_date: Option<String>,
}

impl From<&Trail> for MapTrail {
    fn from(trail: &Trail) -> Self {
        Self {
            id: trail.id,
            name: trail.title.clone(),
            status: trail.status,
            area: trail
                .areas
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_else(|| FALLBACK_AREA.to_string()),
            gpx_data: trail.gpx.clone(),
            close_date: trail.seasonal_close_date.clone(),
            open_date: trail.seasonal_open_date.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub status: &'static str,
    pub label: &'static str,
    pub color: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MapPayload<'a> {
    trails: &'a [MapTrail],
    center: [f64; 2],
    zoom: u8,
    api_url: &'a str,
    legend: &'a [LegendEntry],
}

#[derive(Template)]
#[template(path = "map.html")]
pub struct MapPage {
    pub height: String,
    pub areas: Vec<String>,
    pub legend: Vec<LegendEntry>,
    pub trail_count: usize,
    pub payload: String,
}

impl MapPage {
    pub fn new(
        trails: &[Trail],
        center: [f64; 2],
        zoom: u8,
        height: &str,
        api_url: &str,
    ) -> serde_json::Result<Self> {
        let trails: Vec<MapTrail> = trails.iter().map(MapTrail::from).collect();
        let areas: BTreeSet<String> = trails.iter().map(|t| t.area.clone()).collect();
        let legend: Vec<LegendEntry> = TrailStatus::ALL
            .iter()
            .map(|s| LegendEntry { status: s.as_str(), label: s.label(), color: s.color() })
            .collect();
        let payload = script_json(&MapPayload {
            trails: &trails,
            center,
            zoom,
            api_url,
            legend: &legend,
        })?;
        Ok(Self {
            height: height.to_string(),
            areas: areas.into_iter().collect(),
            legend,
            trail_count: trails.len(),
            payload,
        })
    }
}

/// Labels for reported trail conditions, `flags` being hazards, washout,
/// overgrowth and mud in that order.
fn condition_tags(trees: i64, flags: [bool; 4]) -> Vec<&'static str> {
    let mut tags = Vec::new();
    if trees > 0 {
        tags.push("Downed trees");
    }
    for (set, label) in flags.into_iter().zip(["Hazards", "Washout", "Overgrowth", "Muddy"]) {
        if set {
            tags.push(label);
        }
    }
    tags
}

/// A review-queue photo flattened for display.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub id: i64,
    pub image_url: String,
    pub thumb_url: String,
    pub trail_name: String,
    pub work_date: String,
    pub user_name: String,
    pub caption: String,
    pub cond_comment: String,
    pub summary: String,
    pub conditions: Vec<&'static str>,
    pub state: &'static str,
    pub is_outstanding: bool,
    pub resolved: bool,
    pub resolved_by_name: String,
    pub resolution_notes: String,
    pub resolution_date: String,
}

impl From<&OutstandingPhoto> for QueueItem {
    fn from(photo: &OutstandingPhoto) -> Self {
        let conditions = condition_tags(
            photo.cond_trees,
            [photo.cond_hazards, photo.cond_washout, photo.cond_overgrowth, photo.cond_muddy],
        );
        let state = photo.flags.state();
        Self {
            id: photo.id,
            image_url: photo.image_url.clone(),
            thumb_url: photo.thumb_url.clone(),
            trail_name: photo.trail_name.clone(),
            work_date: photo.work_date.map(|d| d.format("%b %-d, %Y").to_string()).unwrap_or_default(),
            user_name: photo.user_name.clone(),
            caption: photo.caption.clone().unwrap_or_default(),
            cond_comment: photo.cond_comment.clone().unwrap_or_default(),
            summary: photo.summary.clone().unwrap_or_default(),
            conditions,
            state: match state {
                ReviewState::Unreviewed => "Unreviewed",
                ReviewState::Outstanding => "Outstanding",
                ReviewState::Dismissed => "Dismissed",
                ReviewState::Resolved => "Resolved",
            },
            is_outstanding: photo.flags.is_outstanding,
            resolved: state == ReviewState::Resolved,
            resolved_by_name: photo.resolved_by_name.clone().unwrap_or_default(),
            resolution_notes: photo.flags.resolution_notes.clone().unwrap_or_default(),
            resolution_date: photo
                .flags
                .resolution_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Template)]
#[template(path = "outstanding.html")]
pub struct OutstandingPage {
    /// `None` renders the login prompt.
    pub display_name: Option<String>,
    pub nonce: String,
    pub api_url: String,
    pub stats: OutstandingStats,
    pub items: Vec<QueueItem>,
    pub today: String,
}

impl OutstandingPage {
    pub fn anonymous(api_url: &str) -> Self {
        Self {
            display_name: None,
            nonce: String::new(),
            api_url: api_url.to_string(),
            stats: OutstandingStats::default(),
            items: Vec::new(),
            today: String::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Choice {
    pub id: i64,
    pub name: String,
    pub selected: bool,
}

fn choices(options: &[NamedId], selected: Option<i64>) -> Vec<Choice> {
    options
        .iter()
        .map(|o| Choice { id: o.id, name: o.name.clone(), selected: Some(o.id) == selected })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Tab {
    pub key: &'static str,
    pub label: &'static str,
    pub active: bool,
}

/// Admin queue filters as currently applied.
#[derive(Debug, Clone, Default)]
pub struct AdminSelection {
    pub review: ReviewFilter,
    pub trail_id: Option<i64>,
    pub area_id: Option<i64>,
    pub user_id: Option<i64>,
    pub date_start: String,
    pub date_end: String,
}

#[derive(Template)]
#[template(path = "outstanding_admin.html")]
pub struct OutstandingAdminPage {
    /// `false` renders the permission message.
    pub allowed: bool,
    pub nonce: String,
    pub api_url: String,
    pub tabs: Vec<Tab>,
    pub filter: &'static str,
    pub trails: Vec<Choice>,
    pub areas: Vec<Choice>,
    pub users: Vec<Choice>,
    pub date_start: String,
    pub date_end: String,
    pub items: Vec<QueueItem>,
}

impl OutstandingAdminPage {
    pub fn new(
        nonce: &str,
        api_url: &str,
        selection: &AdminSelection,
        options: &FilterOptions,
        photos: &[OutstandingPhoto],
    ) -> Self {
        let tabs = [
            (ReviewFilter::Unreviewed, "Unreviewed"),
            (ReviewFilter::Outstanding, "Outstanding"),
            (ReviewFilter::Resolved, "Resolved"),
            (ReviewFilter::Dismissed, "Dismissed"),
            (ReviewFilter::All, "All"),
        ]
        .into_iter()
        .map(|(f, label)| Tab { key: f.as_str(), label, active: f == selection.review })
        .collect();

        Self {
            allowed: true,
            nonce: nonce.to_string(),
            api_url: api_url.to_string(),
            tabs,
            filter: selection.review.as_str(),
            trails: choices(&options.trails, selection.trail_id),
            areas: choices(&options.areas, selection.area_id),
            users: choices(&options.users, selection.user_id),
            date_start: selection.date_start.clone(),
            date_end: selection.date_end.clone(),
            items: photos.iter().map(QueueItem::from).collect(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            allowed: false,
            nonce: String::new(),
            api_url: String::new(),
            tabs: Vec::new(),
            filter: ReviewFilter::default().as_str(),
            trails: Vec::new(),
            areas: Vec::new(),
            users: Vec::new(),
            date_start: String::new(),
            date_end: String::new(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoLink {
    pub thumb_url: String,
    pub full_url: String,
    pub caption: String,
}

/// A listed report flattened for the browser.
#[derive(Debug, Clone)]
pub struct ReportCard {
    pub id: i64,
    pub trail_name: String,
    pub user_name: String,
    pub work_date: String,
    pub hours: String,
    pub trees_cleared: i64,
    pub work: Vec<&'static str>,
    pub conditions: Vec<&'static str>,
    pub cond_trees: i64,
    pub cond_comment: String,
    pub summary: String,
    pub photo_count: i64,
    pub photos: Vec<PhotoLink>,
}

impl ReportCard {
    fn new(row: &ReportRow, trail_names: &HashMap<i64, &str>) -> Self {
        let w = &row.work;
        let work = [
            (w.corridor_cleared, "Corridor cleared"),
            (w.raking, "Raking"),
            (w.installed_drains, "Drains installed"),
            (w.rocks_cleared, "Rocks cleared"),
        ]
        .into_iter()
        .filter_map(|(done, label)| done.then_some(label))
        .collect();
        Self {
            id: row.id,
            trail_name: trail_names
                .get(&row.trail_id)
                .map(|name| name.to_string())
                .unwrap_or_else(|| format!("Trail #{}", row.trail_id)),
            user_name: row.user_name.clone(),
            work_date: row.work_date.map(|d| d.format("%b %-d, %Y").to_string()).unwrap_or_default(),
            hours: format!("{:.1}", w.hours_spent),
            trees_cleared: w.trees_cleared,
            work,
            conditions: condition_tags(
                w.cond_trees,
                [w.cond_hazards, w.cond_washout, w.cond_overgrowth, w.cond_muddy],
            ),
            cond_trees: w.cond_trees,
            cond_comment: w.cond_comment.clone(),
            summary: w.summary.clone(),
            photo_count: row.photo_count,
            photos: row
                .photos
                .iter()
                .map(|p| PhotoLink {
                    thumb_url: p.thumb_url.clone(),
                    full_url: p.full_url.clone(),
                    caption: p.caption.clone().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FlagBox {
    pub key: &'static str,
    pub label: &'static str,
    pub checked: bool,
}

/// Query string of `filter` pointed at another page.
fn report_query(filter: &ReportFilter, page: i64) -> String {
    let mut parts = vec![format!("page={page}"), format!("per_page={}", filter.per_page)];
    if let Some(id) = filter.area_id {
        parts.push(format!("area_id={id}"));
    }
    if let Some(id) = filter.trail_id {
        parts.push(format!("trail_id={id}"));
    }
    if let Some(date) = filter.date_min {
        parts.push(format!("date_min={date}"));
    }
    if let Some(date) = filter.date_max {
        parts.push(format!("date_max={date}"));
    }
    if filter.has_photos {
        parts.push("has_photos=1".to_string());
    }
    if let Some(n) = filter.min_trees {
        parts.push(format!("min_trees={n}"));
    }
    for (flag, value) in &filter.conditions {
        parts.push(format!("{}={}", flag.column(), u8::from(*value)));
    }
    parts.push(format!("orderby={}", filter.order_by.as_str()));
    parts.push(format!("order={}", filter.order.as_str()));
    parts.join("&")
}

#[derive(Template)]
#[template(path = "reports.html")]
pub struct ReportsPage {
    pub areas: Vec<Choice>,
    pub trails: Vec<Choice>,
    pub date_min: String,
    pub date_max: String,
    pub min_trees: String,
    pub has_photos: bool,
    pub flags: Vec<FlagBox>,
    pub by_trees: bool,
    pub ascending: bool,
    pub reports: Vec<ReportCard>,
    pub page: i64,
    pub total: i64,
    pub total_pages: i64,
    pub prev_query: Option<String>,
    pub next_query: Option<String>,
}

impl ReportsPage {
    pub fn new(filter: &ReportFilter, areas: &[Area], trails: &[Trail], listing: &ReportPage) -> Self {
        let area_options: Vec<NamedId> =
            areas.iter().map(|a| NamedId { id: a.id, name: a.name.clone() }).collect();
        let trail_options: Vec<NamedId> =
            trails.iter().map(|t| NamedId { id: t.id, name: t.title.clone() }).collect();
        let trail_names: HashMap<i64, &str> = trails.iter().map(|t| (t.id, t.title.as_str())).collect();

        let flags = [
            (ConditionFlag::Hazards, "Hazards"),
            (ConditionFlag::Washout, "Washout"),
            (ConditionFlag::Overgrowth, "Overgrowth"),
            (ConditionFlag::Muddy, "Muddy"),
        ]
        .into_iter()
        .map(|(flag, label)| FlagBox {
            key: flag.column(),
            label,
            checked: filter.conditions.contains(&(flag, true)),
        })
        .collect();

        let page = listing.page;
        Self {
            areas: choices(&area_options, filter.area_id),
            trails: choices(&trail_options, filter.trail_id),
            date_min: filter.date_min.map(|d| d.to_string()).unwrap_or_default(),
            date_max: filter.date_max.map(|d| d.to_string()).unwrap_or_default(),
            min_trees: filter.min_trees.map(|n| n.to_string()).unwrap_or_default(),
            has_photos: filter.has_photos,
            flags,
            by_trees: filter.order_by == OrderBy::TreesCleared,
            ascending: filter.order == SortOrder::Asc,
            reports: listing.rows.iter().map(|row| ReportCard::new(row, &trail_names)).collect(),
            page,
            total: listing.total,
            total_pages: listing.total_pages,
            prev_query: (page > 1).then(|| report_query(filter, page - 1)),
            next_query: (page < listing.total_pages).then(|| report_query(filter, page + 1)),
        }
    }
}

#[derive(Template)]
#[template(path = "analytics.html")]
pub struct AnalyticsPage {
    pub data: Analytics,
}

fn local_day(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%b %-d, %Y").to_string()
}

impl AnalyticsPage {
    fn hours(&self, value: &f64) -> String {
        format!("{value:.1}")
    }

    fn latest(&self, resolver: &Resolver) -> String {
        resolver.latest_resolution.as_ref().map(local_day).unwrap_or_default()
    }

    fn resolved_on(&self, item: &RecentResolution) -> String {
        local_day(&item.resolved_at)
    }
}

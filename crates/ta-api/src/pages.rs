//! HTML pages rendered with askama.

use actix_web::{web, HttpResponse};
use askama::Template;
use ta_core::filter::{OutstandingFilter, OutstandingQuery, ReportListQuery, ReviewFilter, TrailFilter};
use ta_core::Capability;
use ta_ui::{
    AdminSelection, AnalyticsPage, MapPage, OutstandingAdminPage, OutstandingPage, QueueItem,
    ReportsPage,
};

use crate::error::{ApiError, ApiResult};
use crate::handlers::{fill_photo_urls, load_analytics, today};
use crate::outstanding::{load_queue, month_start};
use crate::session::CurrentUser;
use crate::state::AppState;
use crate::API_PREFIX;

fn render<T: Template>(page: T) -> ApiResult<HttpResponse> {
    let body = page
        .render()
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("template render failed: {e}")))?;
    Ok(HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body))
}

/// Every trail, not one API page of them.
fn all_trails() -> TrailFilter {
    TrailFilter { per_page: i64::MAX, ..Default::default() }
}

pub async fn map_page(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let trails = data.repo.list_trails(&all_trails()).await?;
    let cfg = &data.config;
    let page = MapPage::new(&trails, cfg.map_center, cfg.map_zoom, &cfg.map_height, API_PREFIX)
        .map_err(|e| ApiError::Internal(e.into()))?;
    render(page)
}

pub async fn outstanding_page(
    data: web::Data<AppState>,
    user: Option<CurrentUser>,
) -> ApiResult<HttpResponse> {
    let Some(user) = user else {
        return render(OutstandingPage::anonymous(API_PREFIX));
    };
    let today = today();
    let filter = OutstandingFilter { review: ReviewFilter::Outstanding, ..Default::default() };
    let items = load_queue(&data, &filter).await?;
    let stats = data.repo.outstanding_stats(month_start(today)).await?;

    render(OutstandingPage {
        display_name: Some(user.display_name.clone()),
        nonce: user.nonce.clone(),
        api_url: API_PREFIX.to_string(),
        stats,
        items: items.iter().map(QueueItem::from).collect(),
        today: today.format("%Y-%m-%d").to_string(),
    })
}

pub async fn outstanding_admin_page(
    data: web::Data<AppState>,
    user: Option<CurrentUser>,
    query: web::Query<OutstandingQuery>,
) -> ApiResult<HttpResponse> {
    let user = match user {
        Some(user) if user.role.can(Capability::ManageOptions) => user,
        _ => return render(OutstandingAdminPage::forbidden()),
    };
    let filter = query.into_inner().into_filter()?;
    let photos = load_queue(&data, &filter).await?;
    let options = data.repo.filter_options().await?;

    let selection = AdminSelection {
        review: filter.review,
        trail_id: filter.trail_id,
        area_id: filter.area_id,
        user_id: filter.user_id,
        date_start: filter.date_start.map(|d| d.to_string()).unwrap_or_default(),
        date_end: filter.date_end.map(|d| d.to_string()).unwrap_or_default(),
    };
    render(OutstandingAdminPage::new(&user.nonce, API_PREFIX, &selection, &options, &photos))
}

pub async fn reports_page(
    data: web::Data<AppState>,
    query: web::Query<ReportListQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.into_inner().into_filter()?;
    let mut listing = data.repo.list_reports(&filter).await?;
    for row in &mut listing.rows {
        fill_photo_urls(&*data.store, &mut row.photos).await;
    }
    let areas = data.repo.list_areas().await?;
    let trails = data.repo.list_trails(&all_trails()).await?;
    render(ReportsPage::new(&filter, &areas, &trails, &listing))
}

pub async fn analytics_page(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    render(AnalyticsPage { data: load_analytics(&data).await? })
}

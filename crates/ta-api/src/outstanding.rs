//! Review queue for report photos: admins flag maintenance work, agents
//! resolve it.

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use ta_core::filter::{OutstandingFilter, OutstandingQuery};
use ta_core::review::{OutstandingPhoto, Resolution, ReviewAction, ReviewFlags, ReviewOutcome, SetStatus};
use ta_core::submission::{resolve_work_date, sanitize_textarea};
use ta_core::{clock, AppError, Capability};

use crate::error::{ApiError, ApiResult};
use crate::handlers::today;
use crate::session::{CurrentUser, NonceUser};
use crate::state::AppState;

/// Queue rows with their image URLs filled in.
pub(crate) async fn load_queue(
    data: &AppState,
    filter: &OutstandingFilter,
) -> Result<Vec<OutstandingPhoto>, ApiError> {
    let mut photos = data.repo.list_outstanding(filter).await?;
    for photo in &mut photos {
        if let Some(media_id) = &photo.media_id {
            photo.image_url = data.store.get_url(media_id).await;
            photo.thumb_url = data.store.get_thumbnail_url(media_id).await;
        }
    }
    Ok(photos)
}

async fn review(data: &AppState, photo_id: i64, action: ReviewAction) -> Result<ReviewFlags, ApiError> {
    match data.repo.apply_review(photo_id, action, Utc::now()).await? {
        ReviewOutcome::Applied(flags) => Ok(flags),
        ReviewOutcome::PhotoNotFound => Err(AppError::not_found("Photo", photo_id).into()),
        ReviewOutcome::Rejected(reason) => Err(AppError::Conflict(reason).into()),
    }
}

pub async fn photos(
    data: web::Data<AppState>,
    _user: CurrentUser,
    query: web::Query<OutstandingQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.into_inner().into_filter()?;
    Ok(HttpResponse::Ok().json(load_queue(&data, &filter).await?))
}

pub async fn toggle(
    data: web::Data<AppState>,
    user: NonceUser,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    let flags = review(&data, path.into_inner(), ReviewAction::Toggle).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "is_outstanding": flags.is_outstanding })))
}

pub async fn dismiss(
    data: web::Data<AppState>,
    user: NonceUser,
    path: web::Path<i64>,
) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    let flags = review(&data, path.into_inner(), ReviewAction::Dismiss).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "reviewed_at": flags.reviewed_at })))
}

#[derive(Debug, Default, Deserialize)]
pub struct SetStatusBody {
    #[serde(default)]
    pub status: Option<String>,
}

pub async fn set_status(
    data: web::Data<AppState>,
    user: NonceUser,
    path: web::Path<i64>,
    body: Option<web::Json<SetStatusBody>>,
) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    let body = body.map(web::Json::into_inner).unwrap_or_default();
    let status = SetStatus::parse_lenient(body.status.as_deref());
    let flags = review(&data, path.into_inner(), ReviewAction::SetStatus(status)).await?;
    let label = if flags.is_outstanding { "outstanding" } else { "not_outstanding" };
    Ok(HttpResponse::Ok().json(json!({ "success": true, "status": label })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

pub async fn resolve(
    data: web::Data<AppState>,
    user: NonceUser,
    path: web::Path<i64>,
    body: Option<web::Json<ResolveBody>>,
) -> ApiResult<HttpResponse> {
    user.require_any(&[Capability::SubmitReports, Capability::ManageOptions])?;
    let photo_id = path.into_inner();
    let body = body.map(web::Json::into_inner).unwrap_or_default();

    let resolution = Resolution {
        resolved_by: user.id,
        notes: sanitize_textarea(body.notes.as_deref().unwrap_or_default()),
        date: resolve_work_date(body.date.as_deref(), today()),
    };
    let flags = review(&data, photo_id, ReviewAction::Resolve(resolution)).await?;
    log::info!("photo #{photo_id} resolved by user #{}", user.id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "resolved_at": flags.resolved_at,
        "resolved_by": flags.resolved_by,
        "resolution_notes": flags.resolution_notes,
        "resolution_date": flags.resolution_date,
    })))
}

/// Start of the local month containing `day`.
pub(crate) fn month_start(day: NaiveDate) -> DateTime<Utc> {
    clock::local_day_start(day.with_day(1).unwrap_or(day))
}

pub async fn stats(data: web::Data<AppState>, _user: CurrentUser) -> ApiResult<HttpResponse> {
    let stats = data.repo.outstanding_stats(month_start(today())).await?;
    Ok(HttpResponse::Ok().json(stats))
}

pub async fn filter_options(data: web::Data<AppState>, user: CurrentUser) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    Ok(HttpResponse::Ok().json(data.repo.filter_options().await?))
}

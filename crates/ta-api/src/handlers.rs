use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use chrono::{Local, NaiveDate, Utc};
use futures_util::TryStreamExt;
use mime::Mime;
use serde::{Deserialize, Serialize};
use serde_json::json;
use ta_core::analytics::{Analytics, Windows};
use ta_core::exif;
use ta_core::filter::{ReportListQuery, TrailListQuery};
use ta_core::gpx::import_gpx_dir;
use ta_core::notices;
use ta_core::submission::{sanitize_line, ReportSubmission};
use ta_core::traits::MediaStore;
use ta_core::{
    AppError, AreaRef, Capability, LatLng, NewPhoto, ReportPage, ReportPhoto, ReportRow,
    TrailStatus, TrailStatusUpdate, WorkLog,
};

use crate::error::ApiResult;
use crate::session::NonceUser;
use crate::state::AppState;

const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub async fn ping() -> impl Responder {
    HttpResponse::Ok().json(json!({ "ok": true, "ts": Utc::now().timestamp() }))
}

/// Fills `thumb_url`/`full_url` from the media store.
pub(crate) async fn fill_photo_urls(store: &dyn MediaStore, photos: &mut [ReportPhoto]) {
    for photo in photos {
        if let Some(media_id) = &photo.media_id {
            photo.full_url = store.get_url(media_id).await;
            photo.thumb_url = store.get_thumbnail_url(media_id).await;
        }
    }
}

/// EXIF position of a stored JPEG attachment, if it has one.
async fn attachment_gps(data: &AppState, attachment_id: i64) -> anyhow::Result<Option<LatLng>> {
    let Some(attachment) = data.repo.get_attachment(attachment_id).await? else {
        return Ok(None);
    };
    if !attachment.mime.eq_ignore_ascii_case("image/jpeg") {
        return Ok(None);
    }
    let bytes = data.store.read_original(&attachment.media_id).await?;
    web::block(move || exif::gps_from_jpeg(&bytes))
        .await
        .map_err(|e| anyhow::anyhow!("exif worker: {e}"))
}

/// Only the coordinate the client left out is taken from EXIF.
async fn fill_missing_gps(data: &AppState, photo: &mut NewPhoto) {
    if photo.gps_lat.is_some() && photo.gps_lng.is_some() {
        return;
    }
    match attachment_gps(data, photo.attachment_id).await {
        Ok(Some(gps)) => {
            photo.gps_lat.get_or_insert(gps.lat);
            photo.gps_lng.get_or_insert(gps.lng);
        }
        Ok(None) => {}
        Err(e) => log::warn!("exif lookup for attachment #{} failed: {e:#}", photo.attachment_id),
    }
}

pub async fn create_report(
    data: web::Data<AppState>,
    user: NonceUser,
    body: web::Json<ReportSubmission>,
) -> ApiResult<HttpResponse> {
    user.require(Capability::SubmitReports)?;
    let submission = body.into_inner();

    let trail = match submission.trail_id() {
        Some(id) => data.repo.get_trail(id).await?,
        None => None,
    }
    .ok_or_else(|| AppError::invalid("Invalid trail_id"))?;

    let mut report = submission.into_new_report(user.id, today())?;
    for photo in &mut report.photos {
        fill_missing_gps(&data, photo).await;
    }

    let id = data.repo.create_report(&report).await?;
    log::info!(
        "report #{id} on trail #{} by user #{} with {} photo(s)",
        trail.id,
        user.id,
        report.photos.len()
    );

    match data.repo.get_report(id).await {
        Ok(Some(stored)) => {
            let notice = notices::report_created(
                &data.config.admin_email,
                &trail.title,
                &user.display_name,
                &stored,
            );
            if let Err(e) = data.notifier.send(&notice).await {
                log::warn!("report #{id} notice not sent: {e:#}");
            }
        }
        Ok(None) => log::warn!("report #{id} vanished before its notice was sent"),
        Err(e) => log::warn!("report #{id} notice not sent: {e:#}"),
    }

    Ok(HttpResponse::Created().json(json!({ "ok": true, "id": id })))
}

fn sanity_page() -> ReportPage {
    let row = ReportRow {
        id: 999,
        trail_id: 0,
        user_id: 0,
        work_date: Some(today()),
        work: WorkLog {
            trees_cleared: 3,
            cond_hazards: true,
            cond_overgrowth: true,
            cond_comment: "REST sanity payload".into(),
            ..Default::default()
        },
        created_at: Utc::now(),
        photo_count: 0,
        sample_attachment_id: 0,
        photos: Vec::new(),
        user_name: "Unknown".into(),
    };
    ReportPage::new(1, 1, 1, vec![row])
}

pub async fn list_reports(
    data: web::Data<AppState>,
    query: web::Query<ReportListQuery>,
) -> ApiResult<HttpResponse> {
    let query = query.into_inner();
    if query.is_sanity() {
        return Ok(HttpResponse::Ok().json(sanity_page()));
    }
    let filter = query.into_filter()?;
    let mut page = data.repo.list_reports(&filter).await?;
    for row in &mut page.rows {
        fill_photo_urls(&*data.store, &mut row.photos).await;
    }
    Ok(HttpResponse::Ok().json(page))
}

struct Upload {
    filename: Option<String>,
    declared: Option<Mime>,
    bytes: Vec<u8>,
}

/// The declared type when it is an allowed image type, else a guess from
/// the file name.
fn upload_mime(upload: &Upload) -> Option<&'static str> {
    let guessed = upload
        .filename
        .as_deref()
        .and_then(|name| mime_guess::from_path(name).first());
    upload.declared.iter().chain(guessed.as_ref()).find_map(|m| {
        ALLOWED_IMAGE_TYPES
            .into_iter()
            .find(|allowed| allowed.eq_ignore_ascii_case(m.essence_str()))
    })
}

pub async fn upload_media(
    data: web::Data<AppState>,
    user: NonceUser,
    mut payload: Multipart,
) -> ApiResult<HttpResponse> {
    user.require(Capability::SubmitReports)?;
    let limit = data.config.max_upload_bytes;

    let mut upload = None;
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("file") || upload.is_some() {
            while field.try_next().await?.is_some() {}
            continue;
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(sanitize_line)
            .filter(|name| !name.is_empty());
        let declared = field.content_type().cloned();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::invalid(format!("File is larger than {limit} bytes")).into());
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some(Upload { filename, declared, bytes });
    }

    let upload = upload.ok_or_else(|| AppError::invalid("No file uploaded"))?;
    if upload.bytes.is_empty() {
        return Err(AppError::invalid("Uploaded file is empty").into());
    }
    let mime = upload_mime(&upload)
        .ok_or_else(|| AppError::invalid("Only JPEG, PNG, WebP and GIF images are accepted"))?;

    let Upload { filename, bytes, .. } = upload;
    let (bytes, gps) = web::block(move || {
        let gps = exif::gps_from_jpeg(&bytes);
        (bytes, gps)
    })
    .await?;

    let media_id = data.store.save_upload(bytes, mime).await?;
    let attachment = data
        .repo
        .create_attachment(&media_id, mime, filename.as_deref(), user.id)
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "id": attachment.id,
        "mime": mime,
        "filename": attachment.filename,
        "url": data.store.get_url(&media_id).await,
        "thumb_url": data.store.get_thumbnail_url(&media_id).await,
        "gps": gps,
    })))
}

#[derive(Serialize)]
struct TrailRow {
    id: i64,
    title: String,
    areas: Vec<AreaRef>,
}

pub async fn list_trails(
    data: web::Data<AppState>,
    query: web::Query<TrailListQuery>,
) -> ApiResult<HttpResponse> {
    let filter = query.into_inner().into_filter()?;
    let rows: Vec<TrailRow> = data
        .repo
        .list_trails(&filter)
        .await?
        .into_iter()
        .map(|t| TrailRow { id: t.id, title: t.title, areas: t.areas })
        .collect();
    Ok(HttpResponse::Ok().json(json!({ "rows": rows })))
}

pub async fn list_areas(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let rows = data.repo.list_areas().await?;
    Ok(HttpResponse::Ok().json(json!({ "rows": rows })))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
    #[serde(default)]
    pub close_date: Option<String>,
    #[serde(default)]
    pub open_date: Option<String>,
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| sanitize_line(&s)).filter(|s| !s.is_empty())
}

pub async fn update_trail_status(
    data: web::Data<AppState>,
    user: NonceUser,
    path: web::Path<i64>,
    body: web::Json<StatusBody>,
) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    let trail_id = path.into_inner();
    let body = body.into_inner();

    let update = TrailStatusUpdate {
        status: body.status.parse::<TrailStatus>()?,
        close_date: non_blank(body.close_date),
        open_date: non_blank(body.open_date),
    };
    if !data.repo.update_trail_status(trail_id, &update).await? {
        return Err(AppError::not_found("Trail", trail_id).into());
    }
    log::info!("trail #{trail_id} set to {} by user #{}", update.status, user.id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "trail_id": trail_id,
        "status": update.status,
        "close_date": update.close_date,
        "open_date": update.open_date,
    })))
}

pub async fn import_gpx(data: web::Data<AppState>, user: NonceUser) -> ApiResult<HttpResponse> {
    user.require(Capability::ManageOptions)?;
    let summary = import_gpx_dir(&*data.repo, &data.config.gpx_dir).await?;
    log::info!(
        "gpx import by user #{}: {} tracks ({} new, {} refreshed), {} error(s)",
        user.id,
        summary.imported,
        summary.created,
        summary.updated,
        summary.errors.len()
    );
    Ok(HttpResponse::Ok().json(summary))
}

/// Analytics for the local today, with resolution thumbnails filled in.
pub(crate) async fn load_analytics(data: &AppState) -> anyhow::Result<Analytics> {
    let mut analytics = data.repo.analytics(&Windows::local(today())).await?;
    for item in &mut analytics.recent_resolutions {
        if let Some(media_id) = &item.media_id {
            item.image_url = Some(data.store.get_thumbnail_url(media_id).await);
        }
    }
    Ok(analytics)
}

pub async fn analytics(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(load_analytics(&data).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(declared: Option<&str>, filename: Option<&str>) -> Upload {
        Upload {
            filename: filename.map(String::from),
            declared: declared.map(|m| m.parse().unwrap()),
            bytes: vec![1],
        }
    }

    #[test]
    fn declared_image_types_win() {
        assert_eq!(upload_mime(&upload(Some("image/png"), Some("x.jpg"))), Some("image/png"));
        assert_eq!(upload_mime(&upload(Some("IMAGE/JPEG"), None)), Some("image/jpeg"));
    }

    #[test]
    fn octet_streams_fall_back_to_the_extension() {
        let up = upload(Some("application/octet-stream"), Some("IMG_0042.webp"));
        assert_eq!(upload_mime(&up), Some("image/webp"));
        assert_eq!(upload_mime(&upload(None, Some("notes.pdf"))), None);
        assert_eq!(upload_mime(&upload(Some("text/html"), None)), None);
    }

    #[test]
    fn sanity_page_is_fixed() {
        let page = sanity_page();
        assert_eq!((page.page, page.per_page, page.total, page.total_pages), (1, 1, 1, 1));
        let row = &page.rows[0];
        assert_eq!(row.id, 999);
        assert_eq!(row.work.trees_cleared, 3);
        assert!(row.work.cond_hazards && row.work.cond_overgrowth);
        assert!(!row.work.cond_washout && !row.work.cond_muddy);
        assert!(row.photos.is_empty());
    }
}

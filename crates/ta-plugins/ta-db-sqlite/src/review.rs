//! Review flags on report photos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use ta_core::error::AppError;
use ta_core::filter::{OutstandingFilter, ReviewFilter, MAX_OUTSTANDING_ROWS};
use ta_core::models::{FilterOptions, NamedId};
use ta_core::review::{OutstandingPhoto, OutstandingStats, ReviewAction, ReviewFlags, ReviewOutcome};
use ta_core::traits::ReviewRepo;

use crate::SqliteRepo;

fn flags_from_row(row: &SqliteRow) -> ReviewFlags {
    ReviewFlags {
        is_outstanding: row.get("is_outstanding"),
        reviewed_at: row.get("reviewed_at"),
        resolved_at: row.get("resolved_at"),
        resolved_by: row.get("resolved_by"),
        resolution_notes: row.get("resolution_notes"),
        resolution_date: row.get("resolution_date"),
    }
}

fn review_clause(filter: ReviewFilter) -> &'static str {
    match filter {
        ReviewFilter::Unreviewed => " AND p.reviewed_at IS NULL AND p.resolved_at IS NULL",
        ReviewFilter::Outstanding => " AND p.is_outstanding = 1 AND p.resolved_at IS NULL",
        ReviewFilter::Resolved => " AND p.is_outstanding = 1 AND p.resolved_at IS NOT NULL",
        ReviewFilter::Dismissed => " AND p.reviewed_at IS NOT NULL AND p.is_outstanding = 0",
        ReviewFilter::All => "",
    }
}

async fn named(pool: &sqlx::SqlitePool, sql: &str) -> sqlx::Result<Vec<NamedId>> {
    Ok(sqlx::query(sql)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|row| NamedId { id: row.get("id"), name: row.get("name") })
        .collect())
}

#[async_trait]
impl ReviewRepo for SqliteRepo {
    async fn list_outstanding(&self, filter: &OutstandingFilter) -> anyhow::Result<Vec<OutstandingPhoto>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT p.id, p.attachment_id, p.caption, p.photo_type, p.gps_lat, p.gps_lng,
                    p.is_outstanding, p.reviewed_at, p.resolved_at, p.resolved_by,
                    p.resolution_notes, p.resolution_date,
                    r.id AS report_id, r.work_date, r.trail_id, r.user_id, r.cond_comment, r.summary,
                    r.cond_trees, r.cond_hazards, r.cond_washout, r.cond_overgrowth, r.cond_muddy,
                    r.created_at,
                    COALESCE(t.title, 'Unknown Trail') AS trail_name,
                    COALESCE(u.display_name, 'Unknown') AS user_name,
                    ru.display_name AS resolver_name,
                    a.media_id
             FROM trail_report_photos p
             JOIN trail_reports r ON r.id = p.report_id
             LEFT JOIN trails t ON t.id = r.trail_id
             LEFT JOIN users u ON u.id = r.user_id
             LEFT JOIN users ru ON ru.id = p.resolved_by
             LEFT JOIN attachments a ON a.id = p.attachment_id
             WHERE 1=1",
        );
        qb.push(review_clause(filter.review));
        if let Some(trail_id) = filter.trail_id {
            qb.push(" AND r.trail_id = ").push_bind(trail_id);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND r.user_id = ").push_bind(user_id);
        }
        if let Some(area_id) = filter.area_id {
            qb.push(" AND EXISTS (SELECT 1 FROM trail_areas ta WHERE ta.trail_id = r.trail_id AND ta.area_id = ")
                .push_bind(area_id)
                .push(")");
        }
        if let Some(start) = filter.date_start {
            qb.push(" AND r.work_date >= ").push_bind(start);
        }
        if let Some(end) = filter.date_end {
            qb.push(" AND r.work_date <= ").push_bind(end);
        }
        qb.push(" ORDER BY p.is_outstanding DESC, r.work_date DESC, p.id DESC LIMIT ")
            .push_bind(MAX_OUTSTANDING_ROWS);

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let flags = flags_from_row(row);
                let resolved_by_name = flags.resolved_by.map(|_| {
                    row.get::<Option<String>, _>("resolver_name")
                        .unwrap_or_else(|| "Unknown".to_string())
                });
                OutstandingPhoto {
                    id: row.get("id"),
                    attachment_id: row.get("attachment_id"),
                    media_id: row.get("media_id"),
                    caption: row.get("caption"),
                    photo_type: row.get("photo_type"),
                    gps_lat: row.get("gps_lat"),
                    gps_lng: row.get("gps_lng"),
                    flags,
                    report_id: row.get("report_id"),
                    work_date: row.get("work_date"),
                    trail_id: row.get("trail_id"),
                    trail_name: row.get("trail_name"),
                    user_id: row.get("user_id"),
                    user_name: row.get("user_name"),
                    resolved_by_name,
                    cond_comment: row.get("cond_comment"),
                    summary: row.get("summary"),
                    cond_trees: row.get("cond_trees"),
                    cond_hazards: row.get("cond_hazards"),
                    cond_washout: row.get("cond_washout"),
                    cond_overgrowth: row.get("cond_overgrowth"),
                    cond_muddy: row.get("cond_muddy"),
                    created_at: row.get("created_at"),
                    image_url: String::new(),
                    thumb_url: String::new(),
                }
            })
            .collect())
    }

    async fn apply_review(&self, photo_id: i64, action: ReviewAction, now: DateTime<Utc>) -> anyhow::Result<ReviewOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT is_outstanding, reviewed_at, resolved_at, resolved_by, resolution_notes, resolution_date
             FROM trail_report_photos WHERE id = ?",
        )
        .bind(photo_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(ReviewOutcome::PhotoNotFound);
        };

        let mut flags = flags_from_row(&row);
        match flags.apply(action, now) {
            Ok(()) => {}
            Err(AppError::Conflict(msg)) => {
                log::info!("review of photo #{photo_id} rejected: {msg}");
                return Ok(ReviewOutcome::Rejected(msg));
            }
            Err(e) => return Err(e.into()),
        }

        sqlx::query(
            "UPDATE trail_report_photos
             SET is_outstanding = ?, reviewed_at = ?, resolved_at = ?, resolved_by = ?,
                 resolution_notes = ?, resolution_date = ?
             WHERE id = ?",
        )
        .bind(flags.is_outstanding)
        .bind(flags.reviewed_at)
        .bind(flags.resolved_at)
        .bind(flags.resolved_by)
        .bind(&flags.resolution_notes)
        .bind(flags.resolution_date)
        .bind(photo_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ReviewOutcome::Applied(flags))
    }

    async fn outstanding_stats(&self, since: DateTime<Utc>) -> anyhow::Result<OutstandingStats> {
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN is_outstanding = 1 AND resolved_at IS NULL THEN 1 ELSE 0 END), 0) AS active,
                COALESCE(SUM(CASE WHEN is_outstanding = 1 AND julianday(resolved_at) >= julianday(?) THEN 1 ELSE 0 END), 0) AS resolved_this_month
             FROM trail_report_photos",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(OutstandingStats {
            active: row.get("active"),
            resolved_this_month: row.get("resolved_this_month"),
        })
    }

    async fn filter_options(&self) -> anyhow::Result<FilterOptions> {
        Ok(FilterOptions {
            trails: named(&self.pool, "SELECT id, title AS name FROM trails ORDER BY title COLLATE NOCASE").await?,
            areas: named(&self.pool, "SELECT id, name FROM areas ORDER BY name COLLATE NOCASE").await?,
            users: named(
                &self.pool,
                "SELECT DISTINCT u.id, u.display_name AS name FROM users u
                 JOIN trail_reports r ON r.user_id = u.id
                 ORDER BY u.display_name COLLATE NOCASE",
            )
            .await?,
        })
    }
}

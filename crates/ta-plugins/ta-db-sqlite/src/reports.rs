//! Field reports, their photos and uploaded attachments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use ta_core::analytics::{Analytics, Windows};
use ta_core::filter::{OrderBy, ReportFilter, PHOTOS_PER_REPORT};
use ta_core::models::{
    Attachment, NewReport, Report, ReportPage, ReportPhoto, ReportRow, ReportStatus, WorkLog,
};
use ta_core::notices::DigestRow;
use ta_core::traits::ReportRepo;

use crate::{analytics, SqliteRepo};

pub(crate) fn work_from_row(row: &SqliteRow) -> WorkLog {
    WorkLog {
        hours_spent: row.get("hours_spent"),
        trees_cleared: row.get("trees_cleared"),
        corridor_cleared: row.get("corridor_cleared"),
        raking: row.get("raking"),
        installed_drains: row.get("installed_drains"),
        rocks_cleared: row.get("rocks_cleared"),
        cond_trees: row.get("cond_trees"),
        cond_hazards: row.get("cond_hazards"),
        cond_washout: row.get("cond_washout"),
        cond_overgrowth: row.get("cond_overgrowth"),
        cond_muddy: row.get("cond_muddy"),
        cond_comment: row.get::<Option<String>, _>("cond_comment").unwrap_or_default(),
        summary: row.get::<Option<String>, _>("summary").unwrap_or_default(),
    }
}

/// Display name for a report author; anonymous reports carry user id 0.
fn author_name(user_id: i64, display_name: Option<String>) -> String {
    match display_name {
        Some(name) if !name.is_empty() => name,
        _ if user_id == 0 => "Unknown".to_string(),
        _ => format!("User #{user_id}"),
    }
}

fn attachment_from_row(row: &SqliteRow) -> Attachment {
    Attachment {
        id: row.get("id"),
        media_id: row.get("media_id"),
        mime: row.get("mime"),
        filename: row.get("filename"),
        uploaded_by: row.get("uploaded_by"),
        created_at: row.get("created_at"),
    }
}

/// WHERE clauses shared by the page query and its count.
fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ReportFilter) {
    qb.push(" WHERE 1=1");
    if let Some(trail_id) = filter.trail_id {
        qb.push(" AND r.trail_id = ").push_bind(trail_id);
    }
    if let Some(area_id) = filter.area_id {
        qb.push(" AND EXISTS (SELECT 1 FROM trail_areas ta WHERE ta.trail_id = r.trail_id AND ta.area_id = ")
            .push_bind(area_id)
            .push(")");
    }
    if let Some(min) = filter.date_min {
        qb.push(" AND COALESCE(r.work_date, date(r.created_at)) >= ").push_bind(min);
    }
    if let Some(max) = filter.date_max {
        qb.push(" AND COALESCE(r.work_date, date(r.created_at)) <= ").push_bind(max);
    }
    if filter.has_photos {
        qb.push(" AND EXISTS (SELECT 1 FROM trail_report_photos p WHERE p.report_id = r.id)");
    }
    if let Some(min_trees) = filter.min_trees {
        qb.push(" AND r.trees_cleared >= ").push_bind(min_trees);
    }
    for (flag, value) in &filter.conditions {
        qb.push(format!(" AND r.{} = ", flag.column())).push_bind(i64::from(*value));
    }
}

#[async_trait]
impl ReportRepo for SqliteRepo {
    async fn create_report(&self, report: &NewReport) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let w = &report.work;

        let id = sqlx::query(
            "INSERT INTO trail_reports (
                user_id, trail_id, work_date, gps_lat, gps_lng, hours_spent, trees_cleared,
                corridor_cleared, raking, installed_drains, rocks_cleared, cond_trees, cond_hazards,
                cond_washout, cond_overgrowth, cond_muddy, cond_comment, summary, status,
                created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(report.user_id)
        .bind(report.trail_id)
        .bind(report.work_date)
        .bind(report.gps_lat)
        .bind(report.gps_lng)
        .bind(w.hours_spent)
        .bind(w.trees_cleared)
        .bind(w.corridor_cleared)
        .bind(w.raking)
        .bind(w.installed_drains)
        .bind(w.rocks_cleared)
        .bind(w.cond_trees)
        .bind(w.cond_hazards)
        .bind(w.cond_washout)
        .bind(w.cond_overgrowth)
        .bind(w.cond_muddy)
        .bind(&w.cond_comment)
        .bind(&w.summary)
        .bind(ReportStatus::Pending.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for photo in &report.photos {
            let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachments WHERE id = ?")
                .bind(photo.attachment_id)
                .fetch_one(&mut *tx)
                .await?;
            if known == 0 {
                log::warn!(
                    "report #{id}: skipping photo with unknown attachment #{}",
                    photo.attachment_id
                );
                continue;
            }
            sqlx::query(
                "INSERT INTO trail_report_photos (report_id, attachment_id, photo_type, caption, gps_lat, gps_lng)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(photo.attachment_id)
            .bind(&photo.photo_type)
            .bind(&photo.caption)
            .bind(photo.gps_lat)
            .bind(photo.gps_lng)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        log::info!("report #{id} created for trail #{} by user #{}", report.trail_id, report.user_id);
        Ok(id)
    }

    async fn get_report(&self, id: i64) -> anyhow::Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM trail_reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| Report {
            id: row.get("id"),
            user_id: row.get("user_id"),
            trail_id: row.get("trail_id"),
            work_date: row.get("work_date"),
            gps_lat: row.get("gps_lat"),
            gps_lng: row.get("gps_lng"),
            work: work_from_row(&row),
            status: ReportStatus::parse_lenient(row.get::<&str, _>("status")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn list_reports(&self, filter: &ReportFilter) -> anyhow::Result<ReportPage> {
        let mut conn = self.pool.acquire().await?;

        let mut count: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM trail_reports r");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT r.*, u.display_name AS author,
                    (SELECT COUNT(*) FROM trail_report_photos p WHERE p.report_id = r.id) AS photo_count,
                    COALESCE((SELECT MIN(p.attachment_id) FROM trail_report_photos p
                              WHERE p.report_id = r.id), 0) AS sample_attachment_id
             FROM trail_reports r LEFT JOIN users u ON u.id = r.user_id",
        );
        push_filters(&mut qb, filter);
        let order_col = match filter.order_by {
            OrderBy::CreatedAt => "r.created_at",
            OrderBy::TreesCleared => "r.trees_cleared",
        };
        qb.push(format!(" ORDER BY {order_col} {}, r.id DESC LIMIT ", filter.order.as_sql()))
            .push_bind(filter.per_page)
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let rows = qb.build().fetch_all(&mut *conn).await?;

        let mut photos: HashMap<i64, Vec<ReportPhoto>> = HashMap::new();
        if !rows.is_empty() {
            let mut pq: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT p.id, p.report_id, p.attachment_id, p.caption, p.gps_lat, p.gps_lng, a.media_id
                 FROM trail_report_photos p LEFT JOIN attachments a ON a.id = p.attachment_id
                 WHERE p.report_id IN (",
            );
            let mut ids = pq.separated(", ");
            for row in &rows {
                ids.push_bind(row.get::<i64, _>("id"));
            }
            pq.push(") ORDER BY p.report_id, p.id");

            for row in pq.build().fetch_all(&mut *conn).await? {
                let list = photos.entry(row.get("report_id")).or_default();
                if list.len() >= PHOTOS_PER_REPORT {
                    continue;
                }
                list.push(ReportPhoto {
                    id: row.get("id"),
                    report_id: row.get("report_id"),
                    attachment_id: row.get("attachment_id"),
                    media_id: row.get("media_id"),
                    caption: row.get("caption"),
                    gps_lat: row.get("gps_lat"),
                    gps_lng: row.get("gps_lng"),
                    thumb_url: String::new(),
                    full_url: String::new(),
                });
            }
        }

        let rows = rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                let user_id: i64 = row.get("user_id");
                ReportRow {
                    id,
                    trail_id: row.get("trail_id"),
                    user_id,
                    work_date: row.get("work_date"),
                    work: work_from_row(row),
                    created_at: row.get("created_at"),
                    photo_count: row.get("photo_count"),
                    sample_attachment_id: row.get("sample_attachment_id"),
                    photos: photos.remove(&id).unwrap_or_default(),
                    user_name: author_name(user_id, row.get("author")),
                }
            })
            .collect();

        Ok(ReportPage::new(filter.page, filter.per_page, total, rows))
    }

    async fn create_attachment(
        &self,
        media_id: &str,
        mime: &str,
        filename: Option<&str>,
        uploaded_by: i64,
    ) -> anyhow::Result<Attachment> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO attachments (media_id, mime, filename, uploaded_by, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(media_id)
        .bind(mime)
        .bind(filename)
        .bind(uploaded_by)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Attachment {
            id,
            media_id: media_id.to_string(),
            mime: mime.to_string(),
            filename: filename.map(str::to_string),
            uploaded_by: Some(uploaded_by),
            created_at: now,
        })
    }

    async fn get_attachment(&self, id: i64) -> anyhow::Result<Option<Attachment>> {
        let row = sqlx::query("SELECT * FROM attachments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(attachment_from_row))
    }

    async fn analytics(&self, windows: &Windows) -> anyhow::Result<Analytics> {
        analytics::collect(&self.pool, windows).await
    }

    async fn digest_rows(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> anyhow::Result<Vec<DigestRow>> {
        let rows = sqlx::query(
            "SELECT r.trail_id,
                    COALESCE(t.title, 'Unknown Trail') AS trail_name,
                    COUNT(r.id) AS reports,
                    CAST(COALESCE(SUM(r.hours_spent), 0) AS REAL) AS hours,
                    COALESCE(SUM(r.trees_cleared), 0) AS trees,
                    COALESCE(SUM(r.corridor_cleared), 0) AS corridor,
                    COALESCE(SUM(r.rocks_cleared), 0) AS rocks
             FROM trail_reports r LEFT JOIN trails t ON t.id = r.trail_id
             WHERE julianday(r.created_at) >= julianday(?) AND julianday(r.created_at) < julianday(?)
             GROUP BY r.trail_id
             ORDER BY hours DESC, trail_name COLLATE NOCASE",
        )
        .bind(from)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DigestRow {
                trail_id: row.get("trail_id"),
                trail_name: row.get("trail_name"),
                reports: row.get("reports"),
                hours: row.get("hours"),
                trees: row.get("trees"),
                corridor: row.get("corridor"),
                rocks: row.get("rocks"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{self, at, day};
    use chrono::{FixedOffset, TimeZone};
    use ta_core::clock::day_start;
    use ta_core::filter::{ConditionFlag, SortOrder};
    use ta_core::traits::TrailRepo;

    async fn backdate(repo: &SqliteRepo, report_id: i64, when: chrono::DateTime<Utc>) {
        sqlx::query("UPDATE trail_reports SET created_at = ? WHERE id = ?")
            .bind(when)
            .bind(report_id)
            .execute(repo.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn report_without_photos_is_stored() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let user = testutil::user(&repo, "sam", "Sam Lee").await;

        let mut new = testutil::report(user, trail, day(2025, 6, 1));
        new.work.corridor_cleared = true;
        new.work.cond_comment = "Log at mile 2".into();
        let id = repo.create_report(&new).await.unwrap();

        let stored = repo.get_report(id).await.unwrap().unwrap();
        assert_eq!(stored.work_date, Some(day(2025, 6, 1)));
        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.work, new.work);

        let page = repo.list_reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].photo_count, 0);
        assert_eq!(page.rows[0].sample_attachment_id, 0);
        assert_eq!(page.rows[0].user_name, "Sam Lee");
    }

    #[tokio::test]
    async fn unknown_attachments_are_skipped() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let user = testutil::user(&repo, "sam", "Sam Lee").await;
        let att = testutil::attachment(&repo, user).await;

        let mut new = testutil::report(user, trail, day(2025, 6, 1));
        new.photos = vec![testutil::photo(att, "before"), testutil::photo(att + 100, "ghost")];
        repo.create_report(&new).await.unwrap();

        let page = repo.list_reports(&ReportFilter::default()).await.unwrap();
        let row = &page.rows[0];
        assert_eq!(row.photo_count, 1);
        assert_eq!(row.sample_attachment_id, att);
        assert_eq!(row.photos[0].caption.as_deref(), Some("before"));
        assert_eq!(row.photos[0].media_id.as_deref(), Some("abcdef0123456789"));
    }

    #[tokio::test]
    async fn listing_caps_photos_per_row() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let user = testutil::user(&repo, "sam", "Sam Lee").await;
        let att = testutil::attachment(&repo, user).await;

        let mut new = testutil::report(user, trail, day(2025, 6, 1));
        new.photos = (0..8).map(|i| testutil::photo(att, &format!("p{i}"))).collect();
        repo.create_report(&new).await.unwrap();

        let row = &repo.list_reports(&ReportFilter::default()).await.unwrap().rows[0];
        assert_eq!(row.photo_count, 8);
        assert_eq!(row.photos.len(), PHOTOS_PER_REPORT);
    }

    #[tokio::test]
    async fn pages_through_twenty_five_reports() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        for _ in 0..25 {
            repo.create_report(&testutil::report(0, trail, day(2025, 6, 1))).await.unwrap();
        }

        let mut filter = ReportFilter { per_page: 10, ..Default::default() };
        let first = repo.list_reports(&filter).await.unwrap();
        assert_eq!((first.total, first.total_pages, first.rows.len()), (25, 3, 10));
        assert_eq!(first.rows[0].user_name, "Unknown");

        filter.page = 3;
        let last = repo.list_reports(&filter).await.unwrap();
        assert_eq!(last.rows.len(), 5);
        // Ties on created_at break on id, newest first
        assert!(first.rows[0].id > first.rows[9].id);
        assert_eq!(last.rows[4].id, 1);
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let repo = testutil::repo().await;
        let hunter = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let red = testutil::trail(&repo, "Red Hill Loop", "Red Hill").await;
        let user = testutil::user(&repo, "sam", "Sam Lee").await;
        let att = testutil::attachment(&repo, user).await;

        let mut a = testutil::report(user, hunter, day(2025, 6, 1));
        a.work.cond_hazards = true;
        a.work.trees_cleared = 5;
        a.photos = vec![testutil::photo(att, "tree")];
        let a = repo.create_report(&a).await.unwrap();

        let mut b = testutil::report(user, hunter, day(2025, 7, 1));
        b.work.cond_hazards = true;
        repo.create_report(&b).await.unwrap();

        let mut c = testutil::report(user, red, day(2025, 6, 2));
        c.work.trees_cleared = 9;
        repo.create_report(&c).await.unwrap();

        let aspen = repo.list_areas().await.unwrap().into_iter().find(|x| x.name == "Aspen").unwrap().id;
        let filter = ReportFilter {
            area_id: Some(aspen),
            date_min: Some(day(2025, 6, 1)),
            date_max: Some(day(2025, 6, 30)),
            has_photos: true,
            min_trees: Some(3),
            conditions: vec![(ConditionFlag::Hazards, true)],
            ..Default::default()
        };
        let page = repo.list_reports(&filter).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.rows[0].id, a);

        let by_trees = ReportFilter {
            order_by: OrderBy::TreesCleared,
            order: SortOrder::Desc,
            ..Default::default()
        };
        let page = repo.list_reports(&by_trees).await.unwrap();
        let trees: Vec<_> = page.rows.iter().map(|r| r.work.trees_cleared).collect();
        assert_eq!(trees, [9, 5, 2]);

        let not_hazard = ReportFilter {
            conditions: vec![(ConditionFlag::Hazards, false)],
            ..Default::default()
        };
        assert_eq!(repo.list_reports(&not_hazard).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn attachments_round_trip() {
        let repo = testutil::repo().await;
        let att = repo
            .create_attachment("0011223344556677", "image/png", None, 3)
            .await
            .unwrap();
        let back = repo.get_attachment(att.id).await.unwrap().unwrap();
        assert_eq!(back.media_id, "0011223344556677");
        assert_eq!(back.uploaded_by, Some(3));
        assert!(repo.get_attachment(att.id + 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn digest_covers_half_open_window() {
        let repo = testutil::repo().await;
        let hunter = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let red = testutil::trail(&repo, "Red Hill Loop", "Red Hill").await;

        let mut corridor = testutil::report(0, hunter, day(2025, 6, 1));
        corridor.work.corridor_cleared = true;
        let r1 = repo.create_report(&corridor).await.unwrap();
        let r2 = repo.create_report(&testutil::report(0, hunter, day(2025, 6, 1))).await.unwrap();
        let r3 = repo.create_report(&testutil::report(0, red, day(2025, 6, 2))).await.unwrap();
        backdate(&repo, r1, at(2025, 6, 1)).await;
        backdate(&repo, r2, at(2025, 6, 1)).await;
        backdate(&repo, r3, at(2025, 6, 2)).await;

        let rows = repo.digest_rows(day_start(&Utc, day(2025, 6, 1)), day_start(&Utc, day(2025, 6, 2))).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].trail_name, "Hunter Creek");
        assert_eq!(rows[0].reports, 2);
        assert_eq!(rows[0].hours, 3.0);
        assert_eq!(rows[0].trees, 4);
        assert_eq!(rows[0].corridor, 1);

        assert!(repo
            .digest_rows(day_start(&Utc, day(2025, 5, 1)), day_start(&Utc, day(2025, 6, 1)))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn digest_day_is_the_local_day() {
        let repo = testutil::repo().await;
        let hunter = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let late = repo.create_report(&testutil::report(0, hunter, day(2025, 6, 1))).await.unwrap();
        // 23:30 on June 1 in UTC-6
        backdate(&repo, late, Utc.with_ymd_and_hms(2025, 6, 2, 5, 30, 0).unwrap()).await;

        let mountain = FixedOffset::west_opt(6 * 3600).unwrap();
        let window = |d| day_start(&mountain, d);
        let june_1 = repo.digest_rows(window(day(2025, 6, 1)), window(day(2025, 6, 2))).await.unwrap();
        assert_eq!(june_1.len(), 1);
        assert_eq!(june_1[0].reports, 1);
        let june_2 = repo.digest_rows(window(day(2025, 6, 2)), window(day(2025, 6, 3))).await.unwrap();
        assert!(june_2.is_empty());
    }
}

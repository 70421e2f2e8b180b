//! Aggregates behind `GET /analytics`.
//!
//! A report's effective date is its work date, or the day it was created
//! for rows that predate the work-date column. Resolution timestamps are
//! UTC and are compared as instants, then grouped by local month.

use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use ta_core::analytics::{
    Analytics, AreaTotals, HazardTrail, MonthResolutions, MonthTotals, OverallTotals,
    RecentResolution, RecentTotals, ResolutionStats, Resolver, Windows,
};

const EFFECTIVE_DATE: &str = "COALESCE(r.work_date, date(r.created_at))";

/// SQLite date modifier shifting a UTC timestamp onto the local calendar.
fn local_shift(win: &Windows) -> String {
    format!("{:+} seconds", win.utc_offset)
}

pub(crate) async fn collect(pool: &SqlitePool, win: &Windows) -> anyhow::Result<Analytics> {
    Ok(Analytics {
        by_area: by_area(pool).await?,
        by_month: by_month(pool, win.twelve_months).await?,
        hazard_trails: hazard_trails(pool).await?,
        overall: overall(pool).await?,
        recent: recent(pool, win.thirty_days).await?,
        resolution_stats: resolution_stats(pool, win).await?,
        top_resolvers: top_resolvers(pool).await?,
        resolutions_by_month: resolutions_by_month(pool, win).await?,
        recent_resolutions: recent_resolutions(pool).await?,
    })
}

async fn by_area(pool: &SqlitePool) -> sqlx::Result<Vec<AreaTotals>> {
    let rows = sqlx::query(
        "SELECT a.id AS area_id, a.name AS area_name,
                COUNT(r.id) AS total_reports,
                CAST(COALESCE(SUM(r.hours_spent), 0) AS REAL) AS total_hours,
                COALESCE(SUM(r.trees_cleared), 0) AS total_trees
         FROM trail_reports r
         JOIN trail_areas ta ON ta.trail_id = r.trail_id
         JOIN areas a ON a.id = ta.area_id
         GROUP BY a.id, a.name
         ORDER BY total_reports DESC, a.name",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| AreaTotals {
            area_id: row.get("area_id"),
            area_name: row.get("area_name"),
            total_reports: row.get("total_reports"),
            total_hours: row.get("total_hours"),
            total_trees: row.get("total_trees"),
        })
        .collect())
}

async fn by_month(pool: &SqlitePool, since: NaiveDate) -> sqlx::Result<Vec<MonthTotals>> {
    let rows = sqlx::query(&format!(
        "SELECT strftime('%Y-%m', {EFFECTIVE_DATE}) AS month,
                COUNT(r.id) AS total_reports,
                CAST(COALESCE(SUM(r.hours_spent), 0) AS REAL) AS total_hours,
                COALESCE(SUM(r.trees_cleared), 0) AS total_trees
         FROM trail_reports r
         WHERE {EFFECTIVE_DATE} >= ?
         GROUP BY month
         ORDER BY month DESC"
    ))
    .bind(since)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MonthTotals {
            month: row.get("month"),
            total_reports: row.get("total_reports"),
            total_hours: row.get("total_hours"),
            total_trees: row.get("total_trees"),
        })
        .collect())
}

async fn hazard_trails(pool: &SqlitePool) -> sqlx::Result<Vec<HazardTrail>> {
    let rows = sqlx::query(
        "SELECT r.trail_id,
                COALESCE(t.title, 'Unknown Trail') AS trail_name,
                COALESCE((SELECT a.name FROM trail_areas ta JOIN areas a ON a.id = ta.area_id
                          WHERE ta.trail_id = r.trail_id ORDER BY a.name LIMIT 1), '') AS area_name,
                COUNT(r.id) AS hazard_count,
                SUM(CASE WHEN r.cond_hazards = 1 THEN 1 ELSE 0 END) AS safety_hazards,
                SUM(CASE WHEN r.cond_washout = 1 THEN 1 ELSE 0 END) AS washouts,
                SUM(CASE WHEN r.cond_overgrowth = 1 THEN 1 ELSE 0 END) AS overgrowth,
                COALESCE(SUM(r.cond_trees), 0) AS downed_trees
         FROM trail_reports r LEFT JOIN trails t ON t.id = r.trail_id
         WHERE r.cond_hazards = 1 OR r.cond_washout = 1 OR r.cond_overgrowth = 1 OR r.cond_trees > 0
         GROUP BY r.trail_id
         ORDER BY hazard_count DESC, r.trail_id
         LIMIT 10",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| HazardTrail {
            trail_id: row.get("trail_id"),
            trail_name: row.get("trail_name"),
            area_name: row.get("area_name"),
            hazard_count: row.get("hazard_count"),
            safety_hazards: row.get("safety_hazards"),
            washouts: row.get("washouts"),
            overgrowth: row.get("overgrowth"),
            downed_trees: row.get("downed_trees"),
        })
        .collect())
}

async fn overall(pool: &SqlitePool) -> sqlx::Result<OverallTotals> {
    let row = sqlx::query(
        "SELECT COUNT(id) AS total_reports,
                COUNT(DISTINCT trail_id) AS trails_maintained,
                COUNT(DISTINCT user_id) AS total_volunteers,
                CAST(COALESCE(SUM(hours_spent), 0) AS REAL) AS total_hours,
                COALESCE(SUM(trees_cleared), 0) AS total_trees,
                COALESCE(SUM(CASE WHEN corridor_cleared = 1 THEN 1 ELSE 0 END), 0) AS corridor_work,
                COALESCE(SUM(CASE WHEN raking = 1 THEN 1 ELSE 0 END), 0) AS raking_work,
                COALESCE(SUM(CASE WHEN installed_drains = 1 THEN 1 ELSE 0 END), 0) AS drain_work
         FROM trail_reports",
    )
    .fetch_one(pool)
    .await?;

    Ok(OverallTotals {
        total_reports: row.get("total_reports"),
        trails_maintained: row.get("trails_maintained"),
        total_volunteers: row.get("total_volunteers"),
        total_hours: row.get("total_hours"),
        total_trees: row.get("total_trees"),
        corridor_work: row.get("corridor_work"),
        raking_work: row.get("raking_work"),
        drain_work: row.get("drain_work"),
    })
}

async fn recent(pool: &SqlitePool, since: NaiveDate) -> sqlx::Result<RecentTotals> {
    let row = sqlx::query(&format!(
        "SELECT COUNT(r.id) AS reports_30d,
                CAST(COALESCE(SUM(r.hours_spent), 0) AS REAL) AS hours_30d,
                COALESCE(SUM(r.trees_cleared), 0) AS trees_30d
         FROM trail_reports r
         WHERE {EFFECTIVE_DATE} >= ?"
    ))
    .bind(since)
    .fetch_one(pool)
    .await?;

    Ok(RecentTotals {
        reports_30d: row.get("reports_30d"),
        hours_30d: row.get("hours_30d"),
        trees_30d: row.get("trees_30d"),
    })
}

async fn resolution_stats(pool: &SqlitePool, win: &Windows) -> sqlx::Result<ResolutionStats> {
    let row = sqlx::query(
        "SELECT
            COALESCE(SUM(CASE WHEN is_outstanding = 1 AND resolved_at IS NOT NULL THEN 1 ELSE 0 END), 0) AS total_resolved,
            COALESCE(SUM(CASE WHEN is_outstanding = 1 AND julianday(resolved_at) >= julianday(?) THEN 1 ELSE 0 END), 0) AS resolved_30d,
            COALESCE(SUM(CASE WHEN is_outstanding = 1 AND julianday(resolved_at) >= julianday(?) THEN 1 ELSE 0 END), 0) AS resolved_7d,
            COALESCE(SUM(CASE WHEN is_outstanding = 1 AND resolved_at IS NULL THEN 1 ELSE 0 END), 0) AS currently_active,
            COALESCE(SUM(CASE WHEN is_outstanding = 1 THEN 1 ELSE 0 END), 0) AS total_outstanding
         FROM trail_report_photos",
    )
    .bind(win.thirty_days_at)
    .bind(win.seven_days_at)
    .fetch_one(pool)
    .await?;

    Ok(ResolutionStats {
        total_resolved: row.get("total_resolved"),
        resolved_30d: row.get("resolved_30d"),
        resolved_7d: row.get("resolved_7d"),
        currently_active: row.get("currently_active"),
        total_outstanding: row.get("total_outstanding"),
    })
}

async fn top_resolvers(pool: &SqlitePool) -> sqlx::Result<Vec<Resolver>> {
    let rows = sqlx::query(
        "SELECT p.resolved_by AS user_id,
                COALESCE(u.display_name, 'Unknown') AS display_name,
                COUNT(p.id) AS resolutions,
                MAX(p.resolved_at) AS latest_resolution
         FROM trail_report_photos p LEFT JOIN users u ON u.id = p.resolved_by
         WHERE p.is_outstanding = 1 AND p.resolved_at IS NOT NULL AND p.resolved_by IS NOT NULL
         GROUP BY p.resolved_by
         ORDER BY resolutions DESC, latest_resolution DESC
         LIMIT 10",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Resolver {
            user_id: row.get("user_id"),
            display_name: row.get("display_name"),
            resolutions: row.get("resolutions"),
            latest_resolution: row.get("latest_resolution"),
        })
        .collect())
}

async fn resolutions_by_month(pool: &SqlitePool, win: &Windows) -> sqlx::Result<Vec<MonthResolutions>> {
    let rows = sqlx::query(
        "SELECT strftime('%Y-%m', resolved_at, ?) AS month,
                COUNT(id) AS resolutions,
                COUNT(DISTINCT resolved_by) AS unique_resolvers
         FROM trail_report_photos
         WHERE is_outstanding = 1 AND resolved_at IS NOT NULL AND julianday(resolved_at) >= julianday(?)
         GROUP BY month
         ORDER BY month DESC",
    )
    .bind(local_shift(win))
    .bind(win.twelve_months_at)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MonthResolutions {
            month: row.get("month"),
            resolutions: row.get("resolutions"),
            unique_resolvers: row.get("unique_resolvers"),
        })
        .collect())
}

async fn recent_resolutions(pool: &SqlitePool) -> sqlx::Result<Vec<RecentResolution>> {
    let rows = sqlx::query(
        "SELECT p.id AS photo_id, p.caption, p.resolved_at,
                COALESCE(t.title, 'Unknown Trail') AS trail_name,
                COALESCE(u.display_name, 'Unknown') AS resolved_by_name,
                a.media_id
         FROM trail_report_photos p
         JOIN trail_reports r ON r.id = p.report_id
         LEFT JOIN trails t ON t.id = r.trail_id
         LEFT JOIN users u ON u.id = p.resolved_by
         LEFT JOIN attachments a ON a.id = p.attachment_id
         WHERE p.is_outstanding = 1 AND p.resolved_at IS NOT NULL
         ORDER BY p.resolved_at DESC, p.id DESC
         LIMIT 10",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| RecentResolution {
            photo_id: row.get("photo_id"),
            trail_name: row.get("trail_name"),
            caption: row.get("caption"),
            resolved_by_name: row.get("resolved_by_name"),
            resolved_at: row.get("resolved_at"),
            image_url: None,
            media_id: row.get("media_id"),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone, Utc};
    use ta_core::analytics::Windows;

    use crate::testutil::{self, at, day};
    use ta_core::review::{ReviewAction, Resolution, SetStatus};
    use ta_core::traits::{ReportRepo, ReviewRepo};

    #[tokio::test]
    async fn empty_database_reports_zeroes() {
        let repo = testutil::repo().await;
        let a = repo.analytics(&Windows::new(&Utc, day(2025, 7, 15))).await.unwrap();
        assert!(a.by_area.is_empty());
        assert_eq!(a.overall.total_reports, 0);
        assert_eq!(a.overall.total_hours, 0.0);
        assert_eq!(a.recent.reports_30d, 0);
        assert_eq!(a.resolution_stats.total_resolved, 0);
    }

    #[tokio::test]
    async fn aggregates_by_area_month_and_hazard() {
        let repo = testutil::repo().await;
        let hunter = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let red = testutil::trail(&repo, "Red Hill Loop", "Red Hill").await;
        let sam = testutil::user(&repo, "sam", "Sam Lee").await;
        let kim = testutil::user(&repo, "kim", "Kim Park").await;

        let mut washed = testutil::report(sam, hunter, day(2025, 7, 10));
        washed.work.cond_washout = true;
        washed.work.cond_trees = 3;
        washed.work.corridor_cleared = true;
        repo.create_report(&washed).await.unwrap();
        repo.create_report(&testutil::report(kim, hunter, day(2025, 5, 2))).await.unwrap();
        let mut old = testutil::report(kim, red, day(2023, 1, 5));
        old.work.raking = true;
        repo.create_report(&old).await.unwrap();

        let a = repo.analytics(&Windows::new(&Utc, day(2025, 7, 15))).await.unwrap();

        assert_eq!(a.by_area[0].area_name, "Aspen");
        assert_eq!(a.by_area[0].total_reports, 2);
        assert_eq!(a.by_area[0].total_hours, 3.0);

        let months: Vec<_> = a.by_month.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, ["2025-07", "2025-05"]);

        assert_eq!(a.hazard_trails.len(), 1);
        let h = &a.hazard_trails[0];
        assert_eq!((h.trail_name.as_str(), h.area_name.as_str()), ("Hunter Creek", "Aspen"));
        assert_eq!((h.washouts, h.downed_trees, h.safety_hazards), (1, 3, 0));

        assert_eq!(a.overall.total_reports, 3);
        assert_eq!(a.overall.trails_maintained, 2);
        assert_eq!(a.overall.total_volunteers, 2);
        assert_eq!(a.overall.total_trees, 6);
        assert_eq!((a.overall.corridor_work, a.overall.raking_work, a.overall.drain_work), (1, 1, 0));

        assert_eq!(a.recent.reports_30d, 1);
        assert_eq!(a.recent.trees_30d, 2);
    }

    #[tokio::test]
    async fn resolution_leaderboard() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let sam = testutil::user(&repo, "sam", "Sam Lee").await;
        let att = testutil::attachment(&repo, sam).await;

        let mut new = testutil::report(sam, trail, day(2025, 7, 1));
        new.photos = vec![
            testutil::photo(att, "log"),
            testutil::photo(att, "rut"),
            testutil::photo(att, "sign"),
        ];
        let report = repo.create_report(&new).await.unwrap();
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM trail_report_photos WHERE report_id = ? ORDER BY id")
            .bind(report)
            .fetch_all(repo.pool())
            .await
            .unwrap();

        for id in &ids {
            repo.apply_review(*id, ReviewAction::SetStatus(SetStatus::Outstanding), at(2025, 7, 2))
                .await
                .unwrap();
        }
        for (id, when) in [(ids[0], at(2025, 7, 12)), (ids[1], at(2025, 6, 1))] {
            let resolution = Resolution { resolved_by: sam, notes: "done".into(), date: when.date_naive() };
            repo.apply_review(id, ReviewAction::Resolve(resolution), when).await.unwrap();
        }

        let a = repo.analytics(&Windows::new(&Utc, day(2025, 7, 15))).await.unwrap();
        let s = &a.resolution_stats;
        assert_eq!((s.total_resolved, s.resolved_30d, s.resolved_7d), (2, 1, 1));
        assert_eq!((s.currently_active, s.total_outstanding), (1, 3));

        assert_eq!(a.top_resolvers.len(), 1);
        assert_eq!(a.top_resolvers[0].display_name, "Sam Lee");
        assert_eq!(a.top_resolvers[0].resolutions, 2);
        assert_eq!(a.top_resolvers[0].latest_resolution, Some(at(2025, 7, 12)));

        let months: Vec<_> = a.resolutions_by_month.iter().map(|m| (m.month.as_str(), m.resolutions)).collect();
        assert_eq!(months, [("2025-07", 1), ("2025-06", 1)]);

        assert_eq!(a.recent_resolutions[0].photo_id, ids[0]);
        assert_eq!(a.recent_resolutions[0].caption.as_deref(), Some("log"));
        assert_eq!(a.recent_resolutions[0].media_id.as_deref(), Some("abcdef0123456789"));
    }

    #[tokio::test]
    async fn resolution_windows_follow_the_local_calendar() {
        let repo = testutil::repo().await;
        let trail = testutil::trail(&repo, "Hunter Creek", "Aspen").await;
        let sam = testutil::user(&repo, "sam", "Sam Lee").await;
        let att = testutil::attachment(&repo, sam).await;

        let mut new = testutil::report(sam, trail, day(2025, 7, 1));
        new.photos = vec![testutil::photo(att, "log")];
        let report = repo.create_report(&new).await.unwrap();
        let id: i64 = sqlx::query_scalar("SELECT id FROM trail_report_photos WHERE report_id = ?")
            .bind(report)
            .fetch_one(repo.pool())
            .await
            .unwrap();

        repo.apply_review(id, ReviewAction::SetStatus(SetStatus::Outstanding), at(2025, 6, 1))
            .await
            .unwrap();
        // 21:30 on June 30 in UTC-6, already July 1 in UTC
        let when = Utc.with_ymd_and_hms(2025, 7, 1, 3, 30, 0).unwrap();
        let resolution = Resolution { resolved_by: sam, notes: "cut".into(), date: day(2025, 6, 30) };
        repo.apply_review(id, ReviewAction::Resolve(resolution), when).await.unwrap();

        let mountain = FixedOffset::west_opt(6 * 3600).unwrap();
        // the 7-day window from local July 7 opens at June 30 06:00 UTC
        let a = repo.analytics(&Windows::new(&mountain, day(2025, 7, 7))).await.unwrap();
        assert_eq!(a.resolution_stats.resolved_7d, 1);
        let a = repo.analytics(&Windows::new(&mountain, day(2025, 7, 8))).await.unwrap();
        assert_eq!(a.resolution_stats.resolved_7d, 0);

        let months: Vec<_> = a.resolutions_by_month.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, ["2025-06"]);
        let a = repo.analytics(&Windows::new(&Utc, day(2025, 7, 8))).await.unwrap();
        let months: Vec<_> = a.resolutions_by_month.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, ["2025-07"]);
    }
}

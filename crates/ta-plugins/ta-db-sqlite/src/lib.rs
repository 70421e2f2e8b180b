//! # ta-db-sqlite Implementation
//!
//! This crate implements the data mapping between the SQLite relational model
//! and the `ta-core` domain models. One `SqliteRepo` serves every repository
//! trait; each trait lives in its own module.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

mod analytics;
mod reports;
mod review;
pub mod schema;
mod trails;
mod users;

pub struct SqliteRepo {
    pool: SqlitePool,
}

impl SqliteRepo {
    /// Connects (creating the database file if needed) and runs migrations.
    /// In-memory databases are pinned to a single connection so that every
    /// query sees the same data.
    pub async fn new(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let in_memory = url.contains(":memory:") || url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(max_connections.max(1))
        };
        let pool = pool_options.connect_with(options).await?;

        let repo = Self { pool };
        repo.migrate().await?;
        Ok(repo)
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        let upgraded = schema::migrate(&mut tx).await?;
        tx.commit().await?;
        Ok(upgraded)
    }

    /// Inserts the default areas that are not there yet.
    pub async fn seed_default_areas(&self) -> anyhow::Result<usize> {
        let mut created = 0;
        for name in ta_core::DEFAULT_AREAS {
            let done = sqlx::query("INSERT OR IGNORE INTO areas (name, slug) VALUES (?, ?)")
                .bind(name)
                .bind(ta_core::slugify(name))
                .execute(&self.pool)
                .await?;
            created += done.rows_affected() as usize;
        }
        if created > 0 {
            log::info!("seeded {created} default areas");
        }
        Ok(created)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use ta_core::models::{NewPhoto, NewReport, NewTrail, NewUser, WorkLog};
    use ta_core::traits::{ReportRepo, TrailRepo, UserRepo};
    use ta_core::Role;

    pub async fn repo() -> SqliteRepo {
        SqliteRepo::new("sqlite::memory:", 1).await.unwrap()
    }

    pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn at(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    pub async fn trail(repo: &SqliteRepo, title: &str, area: &str) -> i64 {
        repo.create_trail(&NewTrail {
            title: title.to_string(),
            areas: vec![area.to_string()],
            ..Default::default()
        })
        .await
        .unwrap()
    }

    pub async fn user(repo: &SqliteRepo, username: &str, display_name: &str) -> i64 {
        repo.create_user(&NewUser {
            username: username.to_string(),
            email: format!("{username}@example.org"),
            display_name: display_name.to_string(),
            password_hash: "x".to_string(),
            role: Role::TrailAgent,
        })
        .await
        .unwrap()
    }

    pub async fn attachment(repo: &SqliteRepo, user_id: i64) -> i64 {
        repo.create_attachment("abcdef0123456789", "image/jpeg", Some("photo.jpg"), user_id)
            .await
            .unwrap()
            .id
    }

    pub fn report(user_id: i64, trail_id: i64, work_date: NaiveDate) -> NewReport {
        NewReport {
            user_id,
            trail_id,
            work_date,
            gps_lat: None,
            gps_lng: None,
            work: WorkLog {
                hours_spent: 1.5,
                trees_cleared: 2,
                ..Default::default()
            },
            photos: Vec::new(),
        }
    }

    pub fn photo(attachment_id: i64, caption: &str) -> NewPhoto {
        NewPhoto {
            attachment_id,
            photo_type: "work".to_string(),
            caption: caption.to_string(),
            gps_lat: None,
            gps_lng: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn fresh_database_reaches_current_shape() {
        let repo = testutil::repo().await;
        let mut conn = repo.pool.acquire().await.unwrap();
        for col in ["work_date", "corridor_cleared", "raking", "installed_drains", "cond_trees", "cond_comment"] {
            assert!(schema::column_exists(&mut conn, "trail_reports", col).await.unwrap(), "{col}");
        }
        assert!(!schema::column_exists(&mut conn, "trail_reports", "brush_cleared").await.unwrap());
        assert!(!schema::column_exists(&mut conn, "trail_reports", "cond_obstructions").await.unwrap());
        for col in ["gps_lat", "is_outstanding", "resolved_by", "resolution_date"] {
            assert!(schema::column_exists(&mut conn, "trail_report_photos", col).await.unwrap(), "{col}");
        }
    }

    #[tokio::test]
    async fn migrating_twice_is_a_no_op() {
        let repo = testutil::repo().await;
        assert!(!repo.migrate().await.unwrap());

        sqlx::query("UPDATE ta_options SET value = '1.0.0' WHERE name = 'db_version'")
            .execute(&repo.pool)
            .await
            .unwrap();
        assert!(repo.migrate().await.unwrap());
        assert!(!repo.migrate().await.unwrap());
    }

    #[tokio::test]
    async fn legacy_rows_survive_the_upgrade() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        // A first-release database: no version, old column names
        for stmt in [
            "CREATE TABLE trails (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, slug TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'moderate', status TEXT NOT NULL DEFAULT 'open', region TEXT,
                land_manager TEXT, trailhead_lat REAL, trailhead_lng REAL, map_url TEXT, gpx_data TEXT,
                seasonal_close_date TEXT, seasonal_open_date TEXT, created_at TEXT NOT NULL)",
            "CREATE TABLE trail_reports (id INTEGER PRIMARY KEY AUTOINCREMENT, user_id INTEGER NOT NULL DEFAULT 0,
                trail_id INTEGER NOT NULL, gps_lat REAL, gps_lng REAL, hours_spent REAL NOT NULL DEFAULT 0,
                trees_cleared INTEGER NOT NULL DEFAULT 0, brush_cleared INTEGER NOT NULL DEFAULT 0,
                rocks_cleared INTEGER NOT NULL DEFAULT 0, cond_obstructions INTEGER NOT NULL DEFAULT 0,
                cond_hazards INTEGER NOT NULL DEFAULT 0, summary TEXT, status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)",
            "INSERT INTO trails (title, slug, created_at) VALUES ('Hunter Creek', 'hunter-creek', '2023-05-01 08:00:00')",
            "INSERT INTO trail_reports (trail_id, hours_spent, brush_cleared, rocks_cleared, cond_obstructions, cond_hazards, created_at)
                VALUES (1, 3, 4, 2, 1, 1, '2023-06-10 17:30:00')",
            "INSERT INTO trail_reports (trail_id, hours_spent, brush_cleared, cond_obstructions, created_at)
                VALUES (1, 1.5, 0, 0, '2023-06-11 09:00:00')",
        ] {
            sqlx::query(stmt).execute(&pool).await.unwrap();
        }

        let repo = SqliteRepo::from_pool(pool);
        assert!(repo.migrate().await.unwrap());

        let rows = sqlx::query(
            "SELECT work_date, corridor_cleared, rocks_cleared, cond_trees, cond_hazards, raking, hours_spent
             FROM trail_reports ORDER BY id",
        )
        .fetch_all(&repo.pool)
        .await
        .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get::<String, _>("work_date"), "2023-06-10");
        assert_eq!(rows[0].get::<i64, _>("corridor_cleared"), 1);
        assert_eq!(rows[0].get::<i64, _>("rocks_cleared"), 1);
        assert_eq!(rows[0].get::<i64, _>("cond_trees"), 1);
        assert_eq!(rows[0].get::<i64, _>("cond_hazards"), 1);
        assert_eq!(rows[0].get::<i64, _>("raking"), 0);
        assert_eq!(rows[0].get::<f64, _>("hours_spent"), 3.0);
        assert_eq!(rows[1].get::<String, _>("work_date"), "2023-06-11");
        assert_eq!(rows[1].get::<i64, _>("cond_trees"), 0);

        let version: String = sqlx::query_scalar("SELECT value FROM ta_options WHERE name = 'db_version'")
            .fetch_one(&repo.pool)
            .await
            .unwrap();
        assert_eq!(version, schema::DB_VERSION);
    }

    #[tokio::test]
    async fn default_areas_are_seeded_once() {
        let repo = testutil::repo().await;
        assert_eq!(repo.seed_default_areas().await.unwrap(), ta_core::DEFAULT_AREAS.len());
        assert_eq!(repo.seed_default_areas().await.unwrap(), 0);
    }
}

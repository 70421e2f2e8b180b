//! # Schema migrations
//!
//! Base tables are created with `IF NOT EXISTS`. The report tables start in
//! their first-release shape and are then brought forward by a series of
//! guarded upgrades, so an old database and a fresh one end up identical.
//! Every step checks the live schema before touching it; running the whole
//! sequence twice changes nothing.

use sqlx::{Sqlite, SqliteConnection, Transaction};

pub const DB_VERSION: &str = "1.3.0";
const VERSION_OPTION: &str = "db_version";

const BASE_TABLES: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS ta_options (
        name  TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT NOT NULL UNIQUE COLLATE NOCASE,
        email         TEXT NOT NULL UNIQUE COLLATE NOCASE,
        display_name  TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role          TEXT NOT NULL DEFAULT 'trail_agent',
        created_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS areas (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        name      TEXT NOT NULL UNIQUE,
        slug      TEXT NOT NULL UNIQUE,
        parent_id INTEGER REFERENCES areas(id) ON DELETE SET NULL
    )",
    "CREATE TABLE IF NOT EXISTS trails (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        title               TEXT NOT NULL,
        slug                TEXT NOT NULL,
        difficulty          TEXT NOT NULL DEFAULT 'moderate',
        status              TEXT NOT NULL DEFAULT 'open',
        region              TEXT,
        land_manager        TEXT,
        trailhead_lat       REAL,
        trailhead_lng       REAL,
        map_url             TEXT,
        gpx_data            TEXT,
        seasonal_close_date TEXT,
        seasonal_open_date  TEXT,
        created_at          TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_trails_title ON trails (title)",
    "CREATE TABLE IF NOT EXISTS trail_areas (
        trail_id INTEGER NOT NULL REFERENCES trails(id) ON DELETE CASCADE,
        area_id  INTEGER NOT NULL REFERENCES areas(id) ON DELETE CASCADE,
        PRIMARY KEY (trail_id, area_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_trail_areas_area ON trail_areas (area_id)",
    "CREATE TABLE IF NOT EXISTS attachments (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        media_id    TEXT NOT NULL,
        mime        TEXT NOT NULL,
        filename    TEXT,
        uploaded_by INTEGER,
        created_at  TEXT NOT NULL
    )",
    // First-release report shape; see `upgrade` for the rest.
    "CREATE TABLE IF NOT EXISTS trail_reports (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id           INTEGER NOT NULL DEFAULT 0,
        trail_id          INTEGER NOT NULL REFERENCES trails(id),
        gps_lat           REAL,
        gps_lng           REAL,
        hours_spent       REAL NOT NULL DEFAULT 0,
        trees_cleared     INTEGER NOT NULL DEFAULT 0,
        brush_cleared     INTEGER NOT NULL DEFAULT 0,
        rocks_cleared     INTEGER NOT NULL DEFAULT 0,
        cond_obstructions INTEGER NOT NULL DEFAULT 0,
        summary           TEXT,
        status            TEXT NOT NULL DEFAULT 'pending',
        created_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at        TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_reports_trail ON trail_reports (trail_id)",
    "CREATE INDEX IF NOT EXISTS idx_reports_user ON trail_reports (user_id)",
    "CREATE INDEX IF NOT EXISTS idx_reports_created ON trail_reports (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_reports_trail_created ON trail_reports (trail_id, created_at)",
    "CREATE TABLE IF NOT EXISTS trail_report_photos (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        report_id     INTEGER NOT NULL REFERENCES trail_reports(id) ON DELETE CASCADE,
        attachment_id INTEGER NOT NULL,
        photo_type    TEXT NOT NULL DEFAULT 'work',
        caption       TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_photos_report ON trail_report_photos (report_id)",
    "CREATE INDEX IF NOT EXISTS idx_photos_type ON trail_report_photos (photo_type)",
];

/// Parses `x.y.z`; missing or garbled parts count as zero.
pub fn parse_version(v: &str) -> (u32, u32, u32) {
    let mut parts = v.trim().split('.').map(|p| p.parse::<u32>().unwrap_or(0));
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

pub async fn column_exists(conn: &mut SqliteConnection, table: &str, column: &str) -> sqlx::Result<bool> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
        .bind(table)
        .bind(column)
        .fetch_one(&mut *conn)
        .await?;
    Ok(n > 0)
}

async fn add_column(conn: &mut SqliteConnection, table: &str, column: &str, decl: &str) -> sqlx::Result<bool> {
    if column_exists(conn, table, column).await? {
        return Ok(false);
    }
    log::info!("migration: adding {table}.{column}");
    sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"))
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

async fn stored_version(conn: &mut SqliteConnection) -> sqlx::Result<Option<String>> {
    sqlx::query_scalar("SELECT value FROM ta_options WHERE name = ?")
        .bind(VERSION_OPTION)
        .fetch_optional(&mut *conn)
        .await
}

/// Creates missing tables and upgrades outdated ones. Returns `true` when an
/// upgrade ran.
pub async fn migrate(tx: &mut Transaction<'_, Sqlite>) -> sqlx::Result<bool> {
    for stmt in BASE_TABLES {
        sqlx::query(stmt).execute(&mut **tx).await?;
    }

    let stored = stored_version(tx).await?;
    let outdated = stored
        .as_deref()
        .map_or(true, |v| parse_version(v) < parse_version(DB_VERSION));
    if !outdated {
        return Ok(false);
    }

    log::info!(
        "migration: upgrading schema from {} to {DB_VERSION}",
        stored.as_deref().unwrap_or("nothing")
    );
    upgrade(tx).await?;

    sqlx::query("INSERT INTO ta_options (name, value) VALUES (?, ?) ON CONFLICT(name) DO UPDATE SET value = excluded.value")
        .bind(VERSION_OPTION)
        .bind(DB_VERSION)
        .execute(&mut **tx)
        .await?;
    Ok(true)
}

async fn upgrade(conn: &mut SqliteConnection) -> sqlx::Result<()> {
    let rpt = "trail_reports";
    let pho = "trail_report_photos";

    // Work date, backfilled from the creation timestamp
    if add_column(conn, rpt, "work_date", "TEXT").await? {
        sqlx::query("UPDATE trail_reports SET work_date = date(created_at) WHERE work_date IS NULL")
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_reports_work_date ON trail_reports (work_date)")
        .execute(&mut *conn)
        .await?;

    // brush_cleared held a count; corridor_cleared is a flag
    let has_brush = column_exists(conn, rpt, "brush_cleared").await?;
    let has_corridor = column_exists(conn, rpt, "corridor_cleared").await?;
    if has_brush && !has_corridor {
        log::info!("migration: renaming brush_cleared to corridor_cleared");
        sqlx::query("ALTER TABLE trail_reports RENAME COLUMN brush_cleared TO corridor_cleared")
            .execute(&mut *conn)
            .await?;
    } else if !has_corridor {
        add_column(conn, rpt, "corridor_cleared", "INTEGER NOT NULL DEFAULT 0").await?;
    }
    sqlx::query("UPDATE trail_reports SET corridor_cleared = 1 WHERE corridor_cleared > 1")
        .execute(&mut *conn)
        .await?;

    add_column(conn, rpt, "raking", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column(conn, rpt, "installed_drains", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column(conn, rpt, "rocks_cleared", "INTEGER NOT NULL DEFAULT 0").await?;
    sqlx::query("UPDATE trail_reports SET rocks_cleared = 1 WHERE rocks_cleared > 1")
        .execute(&mut *conn)
        .await?;

    // The obstruction checkbox became a count of downed trees
    add_column(conn, rpt, "cond_trees", "INTEGER NOT NULL DEFAULT 0").await?;
    if column_exists(conn, rpt, "cond_obstructions").await? {
        log::info!("migration: folding cond_obstructions into cond_trees");
        sqlx::query("UPDATE trail_reports SET cond_trees = MAX(cond_trees, 1) WHERE cond_obstructions = 1")
            .execute(&mut *conn)
            .await?;
        sqlx::query("ALTER TABLE trail_reports DROP COLUMN cond_obstructions")
            .execute(&mut *conn)
            .await?;
    }

    for flag in ["cond_hazards", "cond_washout", "cond_overgrowth", "cond_muddy"] {
        add_column(conn, rpt, flag, "INTEGER NOT NULL DEFAULT 0").await?;
    }
    add_column(conn, rpt, "cond_comment", "TEXT").await?;

    // Photos: location and review state
    add_column(conn, pho, "gps_lat", "REAL").await?;
    add_column(conn, pho, "gps_lng", "REAL").await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photo_gps ON trail_report_photos (gps_lat, gps_lng)")
        .execute(&mut *conn)
        .await?;

    add_column(conn, pho, "is_outstanding", "INTEGER NOT NULL DEFAULT 0").await?;
    add_column(conn, pho, "reviewed_at", "TEXT").await?;
    add_column(conn, pho, "resolved_at", "TEXT").await?;
    add_column(conn, pho, "resolved_by", "INTEGER").await?;
    add_column(conn, pho, "resolution_notes", "TEXT").await?;
    add_column(conn, pho, "resolution_date", "TEXT").await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_photo_review ON trail_report_photos (is_outstanding, resolved_at, reviewed_at)")
        .execute(&mut *conn)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_numerically() {
        assert!(parse_version("1.2.10") > parse_version("1.2.9"));
        assert!(parse_version("1.0") < parse_version(DB_VERSION));
        assert_eq!(parse_version("garbage"), (0, 0, 0));
    }
}

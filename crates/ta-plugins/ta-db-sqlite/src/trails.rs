//! Trails, areas and the trail/area join.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use ta_core::dedupe;
use ta_core::filter::TrailFilter;
use ta_core::models::{
    Area, AreaRef, DedupeSummary, Difficulty, GpxTrack, ImportOutcome, LatLng, NewTrail, Trail,
    TrailStatus, TrailStatusUpdate,
};
use ta_core::traits::TrailRepo;
use ta_core::slugify;

use crate::SqliteRepo;

const TRAIL_COLUMNS: &str = "t.id, t.title, t.slug, t.difficulty, t.status, t.region, t.land_manager, \
    t.trailhead_lat, t.trailhead_lng, t.map_url, t.gpx_data, t.seasonal_close_date, \
    t.seasonal_open_date, t.created_at";

/// Nullable trail columns a duplicate may fill in on its canonical trail.
const MERGEABLE_COLUMNS: [&str; 8] = [
    "region",
    "land_manager",
    "trailhead_lat",
    "trailhead_lng",
    "map_url",
    "gpx_data",
    "seasonal_close_date",
    "seasonal_open_date",
];

fn trail_from_row(row: &SqliteRow, areas: Vec<AreaRef>) -> Trail {
    let id: i64 = row.get("id");
    let gpx = row
        .get::<Option<String>, _>("gpx_data")
        .and_then(|raw| match serde_json::from_str::<GpxTrack>(&raw) {
            Ok(track) => Some(track),
            Err(e) => {
                log::warn!("trail #{id}: unreadable gpx_data: {e}");
                None
            }
        });
    let trailhead = match (
        row.get::<Option<f64>, _>("trailhead_lat"),
        row.get::<Option<f64>, _>("trailhead_lng"),
    ) {
        (Some(lat), Some(lng)) => Some(LatLng { lat, lng }),
        _ => None,
    };

    Trail {
        id,
        title: row.get("title"),
        slug: row.get("slug"),
        difficulty: Difficulty::parse_lenient(row.get::<&str, _>("difficulty")),
        status: row
            .get::<&str, _>("status")
            .parse()
            .unwrap_or(TrailStatus::Open),
        region: row.get("region"),
        land_manager: row.get("land_manager"),
        trailhead,
        map_url: row.get("map_url"),
        gpx,
        seasonal_close_date: row.get("seasonal_close_date"),
        seasonal_open_date: row.get("seasonal_open_date"),
        areas,
        created_at: row.get("created_at"),
    }
}

/// Areas for each of `trail_ids`, sorted by name.
async fn areas_for(conn: &mut SqliteConnection, trail_ids: &[i64]) -> sqlx::Result<HashMap<i64, Vec<AreaRef>>> {
    let mut out: HashMap<i64, Vec<AreaRef>> = HashMap::new();
    if trail_ids.is_empty() {
        return Ok(out);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT ta.trail_id, a.id, a.name, a.slug FROM trail_areas ta \
         JOIN areas a ON a.id = ta.area_id WHERE ta.trail_id IN (",
    );
    let mut ids = qb.separated(", ");
    for id in trail_ids {
        ids.push_bind(*id);
    }
    qb.push(") ORDER BY a.name COLLATE NOCASE, a.id");

    for row in qb.build().fetch_all(&mut *conn).await? {
        out.entry(row.get("trail_id")).or_default().push(AreaRef {
            id: row.get("id"),
            name: row.get("name"),
            slug: row.get("slug"),
        });
    }
    Ok(out)
}

/// Id of the area called `name`, inserting it when missing.
pub(crate) async fn ensure_area_on(conn: &mut SqliteConnection, name: &str, parent_id: Option<i64>) -> anyhow::Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("area name must not be empty");
    }
    if let Some(id) = sqlx::query_scalar::<_, i64>("SELECT id FROM areas WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
    {
        return Ok(id);
    }

    let base = slugify(name);
    let base = if base.is_empty() { "area".to_string() } else { base };
    let mut slug = base.clone();
    let mut n = 2;
    while sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM areas WHERE slug = ?")
        .bind(&slug)
        .fetch_one(&mut *conn)
        .await?
        > 0
    {
        slug = format!("{base}-{n}");
        n += 1;
    }

    let id = sqlx::query("INSERT INTO areas (name, slug, parent_id) VALUES (?, ?, ?)")
        .bind(name)
        .bind(&slug)
        .bind(parent_id)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();
    log::info!("created area #{id} {name:?}");
    Ok(id)
}

async fn insert_trail(conn: &mut SqliteConnection, trail: &NewTrail, gpx: Option<&GpxTrack>) -> anyhow::Result<i64> {
    let title = trail.title.trim();
    if title.is_empty() {
        anyhow::bail!("trail title must not be empty");
    }
    let gpx_json = gpx.map(serde_json::to_string).transpose()?;

    let id = sqlx::query(
        "INSERT INTO trails (title, slug, difficulty, status, region, land_manager, trailhead_lat, trailhead_lng, map_url, gpx_data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(title)
    .bind(slugify(title))
    .bind(trail.difficulty.as_str())
    .bind(trail.status.as_str())
    .bind(&trail.region)
    .bind(&trail.land_manager)
    .bind(trail.trailhead.map(|p| p.lat))
    .bind(trail.trailhead.map(|p| p.lng))
    .bind(&trail.map_url)
    .bind(gpx_json)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    for area in &trail.areas {
        let area_id = ensure_area_on(conn, area, None).await?;
        sqlx::query("INSERT OR IGNORE INTO trail_areas (trail_id, area_id) VALUES (?, ?)")
            .bind(id)
            .bind(area_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(id)
}

/// Escapes LIKE wildcards so user text matches literally under `ESCAPE '\'`.
fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn blank_to_none(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[async_trait]
impl TrailRepo for SqliteRepo {
    async fn list_trails(&self, filter: &TrailFilter) -> anyhow::Result<Vec<Trail>> {
        let mut conn = self.pool.acquire().await?;

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {TRAIL_COLUMNS} FROM trails t WHERE 1=1"));
        if let Some(search) = &filter.search {
            qb.push(" AND t.title LIKE ")
                .push_bind(format!("%{}%", escape_like(search)))
                .push(" ESCAPE '\\'");
        }
        if let Some(area_id) = filter.area_id {
            qb.push(" AND EXISTS (SELECT 1 FROM trail_areas ta WHERE ta.trail_id = t.id AND ta.area_id = ")
                .push_bind(area_id)
                .push(")");
        }
        qb.push(" ORDER BY t.title COLLATE NOCASE ASC, t.id ASC LIMIT ")
            .push_bind(filter.per_page);

        let rows = qb.build().fetch_all(&mut *conn).await?;
        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        let mut areas = areas_for(&mut conn, &ids).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                trail_from_row(row, areas.remove(&id).unwrap_or_default())
            })
            .collect())
    }

    async fn get_trail(&self, id: i64) -> anyhow::Result<Option<Trail>> {
        let mut conn = self.pool.acquire().await?;
        let row = sqlx::query(&format!("SELECT {TRAIL_COLUMNS} FROM trails t WHERE t.id = ?"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => {
                let mut areas = areas_for(&mut conn, &[id]).await?;
                Ok(Some(trail_from_row(&row, areas.remove(&id).unwrap_or_default())))
            }
            None => Ok(None),
        }
    }

    async fn create_trail(&self, trail: &NewTrail) -> anyhow::Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_trail(&mut tx, trail, None).await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn update_trail_status(&self, id: i64, update: &TrailStatusUpdate) -> anyhow::Result<bool> {
        let done = sqlx::query(
            "UPDATE trails SET status = ?, seasonal_close_date = ?, seasonal_open_date = ? WHERE id = ?",
        )
        .bind(update.status.as_str())
        .bind(blank_to_none(&update.close_date))
        .bind(blank_to_none(&update.open_date))
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_areas(&self) -> anyhow::Result<Vec<Area>> {
        let rows = sqlx::query(
            "SELECT a.id, a.name, a.slug, a.parent_id,
                    (SELECT COUNT(*) FROM trail_areas ta WHERE ta.area_id = a.id) AS count
             FROM areas a ORDER BY a.name COLLATE NOCASE",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| Area {
                id: row.get("id"),
                name: row.get("name"),
                slug: row.get("slug"),
                parent_id: row.get("parent_id"),
                count: row.get("count"),
            })
            .collect())
    }

    async fn ensure_area(&self, name: &str, parent_id: Option<i64>) -> anyhow::Result<i64> {
        let mut conn = self.pool.acquire().await?;
        ensure_area_on(&mut conn, name, parent_id).await
    }

    async fn upsert_gpx_trail(&self, title: &str, area_name: &str, track: &GpxTrack) -> anyhow::Result<ImportOutcome> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM trails WHERE title = ? ORDER BY id LIMIT 1")
            .bind(title)
            .fetch_optional(&mut *tx)
            .await?;

        let outcome = match existing {
            Some(id) => {
                sqlx::query("UPDATE trails SET gpx_data = ? WHERE id = ?")
                    .bind(serde_json::to_string(track)?)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                ImportOutcome::Updated(id)
            }
            None => {
                let new_trail = NewTrail {
                    title: title.to_string(),
                    status: TrailStatus::Open,
                    areas: vec![area_name.to_string()],
                    ..Default::default()
                };
                ImportOutcome::Created(insert_trail(&mut tx, &new_trail, Some(track)).await?)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn dedupe_trails(&self, dry_run: bool) -> anyhow::Result<DedupeSummary> {
        let mut tx = self.pool.begin().await?;

        let trails: Vec<(i64, String)> = sqlx::query("SELECT id, title FROM trails ORDER BY id")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .map(|row| (row.get("id"), row.get("title")))
            .collect();

        let mut summary = DedupeSummary::default();
        for group in dedupe::plan(&trails) {
            let canonical = group.canonical;

            if let Some(clean) = &group.retitle {
                if !dry_run {
                    sqlx::query("UPDATE trails SET title = ?, slug = ? WHERE id = ?")
                        .bind(clean)
                        .bind(slugify(clean))
                        .bind(canonical)
                        .execute(&mut *tx)
                        .await?;
                }
                summary.retitled += 1;
            }

            // Areas: union onto the canonical trail
            let mut canon_areas: HashSet<i64> = sqlx::query_scalar("SELECT area_id FROM trail_areas WHERE trail_id = ?")
                .bind(canonical)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();
            for dup in &group.duplicates {
                let dup_areas: Vec<i64> = sqlx::query_scalar("SELECT area_id FROM trail_areas WHERE trail_id = ?")
                    .bind(dup)
                    .fetch_all(&mut *tx)
                    .await?;
                let missing: Vec<i64> = dup_areas.into_iter().filter(|a| !canon_areas.contains(a)).collect();
                if missing.is_empty() {
                    continue;
                }
                if !dry_run {
                    for area_id in &missing {
                        sqlx::query("INSERT OR IGNORE INTO trail_areas (trail_id, area_id) VALUES (?, ?)")
                            .bind(canonical)
                            .bind(area_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                }
                canon_areas.extend(missing);
                summary.terms_merged += 1;
            }

            // Metadata: only fill what the canonical trail lacks
            let mut filled: HashSet<&str> = HashSet::new();
            for dup in &group.duplicates {
                for col in MERGEABLE_COLUMNS {
                    if filled.contains(col) {
                        continue;
                    }
                    let fillable: i64 = sqlx::query_scalar(&format!(
                        "SELECT COUNT(*) FROM trails c, trails d
                         WHERE c.id = ? AND d.id = ? AND c.{col} IS NULL AND d.{col} IS NOT NULL"
                    ))
                    .bind(canonical)
                    .bind(dup)
                    .fetch_one(&mut *tx)
                    .await?;
                    if fillable == 0 {
                        continue;
                    }
                    if !dry_run {
                        sqlx::query(&format!(
                            "UPDATE trails SET {col} = (SELECT {col} FROM trails WHERE id = ?) WHERE id = ?"
                        ))
                        .bind(dup)
                        .bind(canonical)
                        .execute(&mut *tx)
                        .await?;
                    }
                    filled.insert(col);
                    summary.meta_merged += 1;
                }
            }

            // Reports follow the canonical trail, then duplicates go
            for dup in &group.duplicates {
                let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trail_reports WHERE trail_id = ?")
                    .bind(dup)
                    .fetch_one(&mut *tx)
                    .await?;
                if n > 0 && !dry_run {
                    sqlx::query("UPDATE trail_reports SET trail_id = ? WHERE trail_id = ?")
                        .bind(canonical)
                        .bind(dup)
                        .execute(&mut *tx)
                        .await?;
                }
                summary.updated_reports += n as u64;

                if !dry_run {
                    sqlx::query("DELETE FROM trails WHERE id = ?")
                        .bind(dup)
                        .execute(&mut *tx)
                        .await?;
                }
                summary.deleted += 1;
            }
        }

        if dry_run {
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }
        log::info!(
            "dedupe{}: deleted {}, retitled {}, reports re-pointed {}, meta merged {}, areas merged {}",
            if dry_run { " (dry run)" } else { "" },
            summary.deleted,
            summary.retitled,
            summary.updated_reports,
            summary.meta_merged,
            summary.terms_merged
        );
        Ok(summary)
    }
}

//! # GPX import
//!
//! Trail tracks arrive as one zip per area (`Red_Hill_GPX.zip`), each holding
//! one `.gpx` file per trail. Parsing is synchronous; [`import_gpx_dir`]
//! moves it off the async runtime and upserts through a [`TrailRepo`].

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use quick_xml::events::Event;
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{Bounds, GpxTrack, ImportOutcome};
use crate::traits::TrailRepo;

const GPX_1_1: &[u8] = b"http://www.topografix.com/GPX/1/1";
const GPX_1_0: &[u8] = b"http://www.topografix.com/GPX/1/0";

/// Extracts `trkpt` coordinates. Points in the GPX 1.1 namespace win over
/// GPX 1.0, which win over unqualified `trkpt` elements.
pub fn parse_gpx(xml: &[u8]) -> anyhow::Result<GpxTrack> {
    let mut reader = NsReader::from_reader(xml);

    let mut v11 = Vec::new();
    let mut v10 = Vec::new();
    let mut bare = Vec::new();

    loop {
        let (ns, event) = reader
            .read_resolved_event()
            .context("malformed GPX document")?;
        match event {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"trkpt" => {
                let bucket = match ns {
                    ResolveResult::Bound(Namespace(GPX_1_1)) => &mut v11,
                    ResolveResult::Bound(Namespace(GPX_1_0)) => &mut v10,
                    ResolveResult::Unbound => &mut bare,
                    _ => continue,
                };

                let mut lat = None;
                let mut lon = None;
                for attr in e.attributes() {
                    let attr = attr.context("malformed trkpt attribute")?;
                    let value = String::from_utf8_lossy(&attr.value);
                    match attr.key.as_ref() {
                        b"lat" => lat = value.trim().parse::<f64>().ok(),
                        b"lon" => lon = value.trim().parse::<f64>().ok(),
                        _ => {}
                    }
                }
                if let (Some(lat), Some(lon)) = (lat, lon) {
                    bucket.push([lat, lon]);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let coordinates = [v11, v10, bare]
        .into_iter()
        .find(|points| !points.is_empty())
        .unwrap_or_default();
    let bounds = bounds_of(&coordinates);
    Ok(GpxTrack { coordinates, bounds })
}

pub fn bounds_of(coordinates: &[[f64; 2]]) -> Option<Bounds> {
    let (first, rest) = coordinates.split_first()?;
    let init = Bounds {
        min_lat: first[0],
        max_lat: first[0],
        min_lon: first[1],
        max_lon: first[1],
    };
    Some(rest.iter().fold(init, |b, [lat, lon]| Bounds {
        min_lat: b.min_lat.min(*lat),
        max_lat: b.max_lat.max(*lat),
        min_lon: b.min_lon.min(*lon),
        max_lon: b.max_lon.max(*lon),
    }))
}

/// `Red_Hill_GPX.zip` -> `Red Hill`.
pub fn area_name_from_zip(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = stem.strip_suffix("_GPX").unwrap_or(&stem);
    stem.replace('_', " ")
}

/// A `.gpx` member of an area archive.
#[derive(Debug, Clone)]
pub struct GpxEntry {
    pub trail_name: String,
    pub data: Vec<u8>,
}

/// Largest `.gpx` member read out of an archive; bigger ones are skipped.
pub const MAX_GPX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Reads every `.gpx` file out of a zip. Directories and macOS resource
/// forks are ignored; the trail name is the entry's file stem.
pub fn read_archive(path: &Path) -> anyhow::Result<Vec<GpxEntry>> {
    read_archive_limited(path, MAX_GPX_ENTRY_BYTES)
}

fn read_archive_limited(path: &Path, max_entry_bytes: u64) -> anyhow::Result<Vec<GpxEntry>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("reading zip {}", path.display()))?;

    let mut entries = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        if member.is_dir() || member.name().starts_with("__MACOSX/") {
            continue;
        }
        let Some(name) = member.enclosed_name() else {
            log::warn!("gpx: skipping unsafe entry {:?} in {}", member.name(), path.display());
            continue;
        };
        let is_gpx = name
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("gpx"));
        if !is_gpx {
            continue;
        }
        let trail_name = name
            .file_stem()
            .map(|s| s.to_string_lossy().trim().to_string())
            .unwrap_or_default();
        if trail_name.is_empty() {
            continue;
        }

        // the declared size is untrusted; read at most one byte past the cap
        let mut data = Vec::new();
        (&mut member).take(max_entry_bytes + 1).read_to_end(&mut data)?;
        if data.len() as u64 > max_entry_bytes {
            log::warn!(
                "gpx: skipping {:?} in {}: larger than {max_entry_bytes} bytes",
                member.name(),
                path.display()
            );
            continue;
        }
        entries.push(GpxEntry { trail_name, data });
    }
    Ok(entries)
}

/// Parsed contents of one area archive.
#[derive(Debug, Clone)]
pub struct AreaArchive {
    pub area_name: String,
    pub tracks: Vec<(String, GpxTrack)>,
}

/// Result of scanning the GPX directory: what parsed, and what did not.
#[derive(Debug, Default)]
pub struct DirScan {
    pub archives: Vec<AreaArchive>,
    pub errors: Vec<String>,
}

/// Blocking scan of every `*.zip` in `dir`, sorted by file name.
pub fn scan_gpx_dir(dir: &Path) -> anyhow::Result<DirScan> {
    let mut zips: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect();
    zips.sort();

    let mut scan = DirScan::default();
    for zip_path in zips {
        let area_name = area_name_from_zip(&zip_path);
        let entries = match read_archive(&zip_path) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("gpx: {e:#}");
                scan.errors.push(format!("Failed to open {}", zip_path.display()));
                continue;
            }
        };

        let mut tracks = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_gpx(&entry.data) {
                Ok(track) => tracks.push((entry.trail_name, track)),
                Err(e) => {
                    log::warn!("gpx: {} in {}: {e:#}", entry.trail_name, zip_path.display());
                    scan.errors.push(format!("Failed to parse {} in {}", entry.trail_name, zip_path.display()));
                }
            }
        }
        scan.archives.push(AreaArchive { area_name, tracks });
    }
    Ok(scan)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GpxImportSummary {
    pub success: bool,
    pub imported: usize,
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Imports every archive under `dir`. Re-running refreshes tracks of
/// already-known trails instead of duplicating them.
pub async fn import_gpx_dir<R>(repo: &R, dir: &Path) -> anyhow::Result<GpxImportSummary>
where
    R: TrailRepo + ?Sized,
{
    if !dir.is_dir() {
        return Err(AppError::not_found("GPX directory", dir.display()).into());
    }

    let owned = dir.to_path_buf();
    let scan = tokio::task::spawn_blocking(move || scan_gpx_dir(&owned)).await??;

    let mut summary = GpxImportSummary {
        errors: scan.errors,
        ..Default::default()
    };
    for archive in scan.archives {
        for (trail_name, track) in &archive.tracks {
            match repo.upsert_gpx_trail(trail_name, &archive.area_name, track).await? {
                ImportOutcome::Created(id) => {
                    log::info!("gpx: created trail #{id} {trail_name:?} in {:?}", archive.area_name);
                    summary.created += 1;
                }
                ImportOutcome::Updated(id) => {
                    log::debug!("gpx: refreshed trail #{id} {trail_name:?}");
                    summary.updated += 1;
                }
            }
            summary.imported += 1;
        }
    }
    summary.success = true;
    Ok(summary)
}

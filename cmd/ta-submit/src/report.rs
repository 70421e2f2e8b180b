//! Local photos and the report payload built from the command line.

use std::path::Path;

use serde_json::{json, Value};
use ta_core::exif;
use ta_core::LatLng;

use crate::error::SubmitError;

#[derive(Debug, Clone)]
pub struct LocalPhoto {
    pub file_name: String,
    pub mime: String,
    pub data: Vec<u8>,
    pub caption: String,
    pub gps: Option<LatLng>,
}

impl LocalPhoto {
    pub fn from_bytes(file_name: &str, data: Vec<u8>, caption: &str) -> Self {
        let mime = mime_guess::from_path(file_name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        let gps = exif::gps_from_jpeg(&data);
        Self {
            file_name: file_name.to_string(),
            mime,
            data,
            caption: caption.trim().to_string(),
            gps,
        }
    }

    pub async fn load(path: &Path, caption: &str) -> Result<Self, SubmitError> {
        let data = tokio::fs::read(path).await.map_err(|source| SubmitError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "photo.jpg".to_string());
        Ok(Self::from_bytes(&file_name, data, caption))
    }
}

/// Work and conditions as given on the command line.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ReportArgs {
    /// Trail id (see GET /ta/v1/trails)
    #[arg(long)]
    pub trail: i64,
    /// Work date, YYYY-MM-DD (defaults to today on the server)
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long, default_value_t = 0.0)]
    pub hours: f64,
    #[arg(long, default_value_t = 0)]
    pub trees: i64,
    #[arg(long)]
    pub corridor: bool,
    #[arg(long)]
    pub raking: bool,
    #[arg(long)]
    pub drains: bool,
    #[arg(long)]
    pub rocks: bool,
    /// Downed trees still across the trail
    #[arg(long, default_value_t = 0)]
    pub cond_trees: i64,
    #[arg(long)]
    pub hazards: bool,
    #[arg(long)]
    pub washout: bool,
    #[arg(long)]
    pub overgrowth: bool,
    #[arg(long)]
    pub muddy: bool,
    #[arg(long, default_value = "")]
    pub comment: String,
    #[arg(long, default_value = "")]
    pub summary: String,
}

/// `uploads` pairs each attachment id with the photo it came from, in
/// upload order.
pub fn report_payload(args: &ReportArgs, uploads: &[(i64, &LocalPhoto)]) -> Value {
    let photos: Vec<Value> = uploads
        .iter()
        .map(|(attachment_id, photo)| {
            json!({
                "attachment_id": attachment_id,
                "caption": photo.caption,
                "gps_lat": photo.gps.map(|g| g.lat),
                "gps_lng": photo.gps.map(|g| g.lng),
            })
        })
        .collect();
    // the report position is the first geotagged photo's
    let position = uploads.iter().find_map(|(_, p)| p.gps);

    json!({
        "trail_id": args.trail,
        "work_date": args.date,
        "gps_lat": position.map(|g| g.lat),
        "gps_lng": position.map(|g| g.lng),
        "hours_spent": args.hours,
        "trees_cleared": args.trees,
        "corridor_cleared": args.corridor,
        "raking": args.raking,
        "installed_drains": args.drains,
        "rocks_cleared": args.rocks,
        "cond_trees": args.cond_trees,
        "cond_hazards": args.hazards,
        "cond_washout": args.washout,
        "cond_overgrowth": args.overgrowth,
        "cond_muddy": args.muddy,
        "cond_comment": args.comment,
        "summary": args.summary,
        "photos": photos,
    })
}

use std::path::PathBuf;

use ta_config::Settings;
use ta_core::traits::{AuthProvider, MediaStore, Notifier, Repository};

/// Shared handles every handler receives through `web::Data`.
pub struct AppState {
    pub repo: Box<dyn Repository>,
    pub store: Box<dyn MediaStore>,
    pub auth: Box<dyn AuthProvider>,
    pub notifier: Box<dyn Notifier>,
    pub config: AppConfig,
}

/// The slice of `Settings` the HTTP layer reads at request time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub admin_email: String,
    pub base_url: String,
    pub gpx_dir: PathBuf,
    pub map_center: [f64; 2],
    pub map_zoom: u8,
    pub map_height: String,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            admin_email: settings.mail.admin_email.clone(),
            base_url: settings.server.base_url.trim_end_matches('/').to_string(),
            gpx_dir: settings.gpx.dir.clone(),
            map_center: [settings.map.center_lat, settings.map.center_lng],
            map_zoom: settings.map.zoom,
            map_height: settings.map.height.clone(),
            max_upload_bytes: settings.media.max_upload_bytes,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            admin_email: "admin@localhost".into(),
            base_url: "http://127.0.0.1:8080".into(),
            gpx_dir: PathBuf::from("./gpx_files"),
            map_center: [39.4, -107.0],
            map_zoom: 10,
            map_height: "600px".into(),
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

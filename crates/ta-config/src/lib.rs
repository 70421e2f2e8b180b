//! # ta-config
//!
//! Layered settings: built-in defaults, then an optional TOML file
//! (`trail-agent.toml`, or the path in `TA_CONFIG`), then `TA__SECTION__KEY`
//! environment variables. A `.env` file is loaded first when present.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;

pub use secrecy::ExposeSecret;

pub const DEFAULT_CONFIG_FILE: &str = "trail-agent.toml";

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub media: MediaSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
    pub gpx: GpxSettings,
    pub map: MapSettings,
    pub digest: DigestSettings,
}

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Signs the session cookie. At least 32 bytes; a random key is used
    /// (and sessions do not survive restarts) when empty.
    pub secret_key: SecretString,
    /// Public origin, used in links sent by mail.
    pub base_url: String,
    pub cors_origin: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize)]
pub struct MediaSettings {
    pub root: PathBuf,
    pub url_prefix: String,
    pub thumb_size: u32,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize)]
pub struct AuthSettings {
    pub nonce_salt: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct MailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
    pub admin_email: String,
    pub use_tls: bool,
    /// Log messages instead of delivering them
    pub mock: bool,
}

#[derive(Debug, Deserialize)]
pub struct GpxSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct MapSettings {
    pub center_lat: f64,
    pub center_lng: f64,
    pub zoom: u8,
    pub height: String,
}

#[derive(Debug, Deserialize)]
pub struct DigestSettings {
    pub enabled: bool,
    /// Local hour (0-23) at which the previous day's digest goes out
    pub hour: u32,
}

impl Settings {
    /// Loads `.env`, then the config file named by `TA_CONFIG` (default
    /// `trail-agent.toml`, optional), then the environment.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }
        let path = std::env::var("TA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Some(Path::new(&path)))
    }

    pub fn load_from(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = defaults(Config::builder())?;
        if let Some(path) = path {
            builder = builder.add_source(
                File::new(&path.to_string_lossy(), FileFormat::Toml).required(false),
            );
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("TA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.digest.hour > 23 {
            anyhow::bail!("digest.hour must be between 0 and 23, got {}", self.digest.hour);
        }
        if !self.media.url_prefix.starts_with('/') {
            anyhow::bail!("media.url_prefix must start with '/'");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

type Builder = config::ConfigBuilder<config::builder::DefaultState>;

fn defaults(builder: Builder) -> Result<Builder, config::ConfigError> {
    builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("server.secret_key", "")?
        .set_default("server.base_url", "http://127.0.0.1:8080")?
        .set_default("database.url", "sqlite://trail-agent.db")?
        .set_default("database.max_connections", 5)?
        .set_default("media.root", "./uploads")?
        .set_default("media.url_prefix", "/media")?
        .set_default("media.thumb_size", 250)?
        .set_default("media.max_upload_bytes", 20 * 1024 * 1024)?
        .set_default("auth.nonce_salt", "")?
        .set_default("mail.smtp_host", "localhost")?
        .set_default("mail.smtp_port", 1025)?
        .set_default("mail.from", "Trail Agent <noreply@localhost>")?
        .set_default("mail.admin_email", "admin@localhost")?
        .set_default("mail.use_tls", false)?
        .set_default("mail.mock", true)?
        .set_default("gpx.dir", "./gpx_files")?
        .set_default("map.center_lat", 39.4)?
        .set_default("map.center_lng", -107.0)?
        .set_default("map.zoom", 10)?
        .set_default("map.height", "600px")?
        .set_default("digest.enabled", true)?
        .set_default("digest.hour", 6)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_load_without_a_file() {
        let s = Settings::load_from(None).unwrap();
        assert_eq!(s.server.port, 8080);
        assert_eq!(s.media.url_prefix, "/media");
        assert_eq!(s.media.thumb_size, 250);
        assert!(s.mail.mock);
        assert!(s.server.secret_key.expose_secret().is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9090
secret_key = "0123456789abcdef0123456789abcdef"

[mail]
mock = false
admin_email = "trails@example.org"
password = "hunter2"

[digest]
hour = 18
"#
        )
        .unwrap();

        let s = Settings::load_from(Some(file.path())).unwrap();
        assert_eq!(s.server.port, 9090);
        assert_eq!(s.server.host, "127.0.0.1");
        assert!(!s.mail.mock);
        assert_eq!(s.mail.admin_email, "trails@example.org");
        assert_eq!(s.mail.password.as_ref().map(|p| p.expose_secret().to_string()), Some("hunter2".into()));
        assert_eq!(s.digest.hour, 18);
    }

    #[test]
    fn rejects_out_of_range_digest_hour() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[digest]\nhour = 24").unwrap();
        assert!(Settings::load_from(Some(file.path())).is_err());
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let s = Settings::load_from(None).unwrap();
        let dump = format!("{:?}", s.auth);
        assert!(!dump.contains("nonce_salt: \"\""));
    }
}

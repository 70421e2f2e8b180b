//! # seed
//!
//! Maintenance commands run against the configured database: default
//! areas, the first administrator, GPX imports and trail de-duplication.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use ta_auth_simple::SimpleAuthProvider;
use ta_config::{ExposeSecret, Settings};
use ta_core::gpx::import_gpx_dir;
use ta_core::traits::{AuthProvider, TrailRepo, UserRepo};
use ta_core::{NewUser, Role};
use ta_db_sqlite::SqliteRepo;
use validator::ValidateEmail;

#[derive(Parser)]
#[command(name = "seed")]
#[command(about = "trail-agent database maintenance", long_about = None)]
struct Cli {
    /// Config file (defaults to $TA_CONFIG or trail-agent.toml)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the default areas that do not exist yet
    Areas,

    /// Create an administrator account
    Admin {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        /// Display name (defaults to the username)
        #[arg(long)]
        name: Option<String>,
        #[arg(long, env = "TA_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Import every GPX archive in a directory
    ImportGpx {
        /// Directory of `*_GPX.zip` files (defaults to gpx.dir)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Merge trails whose titles differ only by `*`, case or padding
    Dedupe {
        /// Report what would change without writing
        #[arg(long)]
        dry: bool,
    },
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file {} does not exist", path.display());
            }
            Settings::load_from(Some(path))
        }
        None => Settings::load(),
    }
}

async fn create_admin(
    settings: &Settings,
    repo: &SqliteRepo,
    username: &str,
    email: &str,
    name: Option<&str>,
    password: &str,
) -> anyhow::Result<i64> {
    let username = username.trim();
    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        anyhow::bail!("username may only contain letters, numbers, and underscores");
    }
    if !email.trim().validate_email() {
        anyhow::bail!("{email:?} is not a valid email address");
    }
    if password.chars().count() < 8 {
        anyhow::bail!("password must be at least 8 characters long");
    }
    if repo.username_exists(username).await? {
        anyhow::bail!("username {username:?} already exists");
    }
    if repo.email_exists(email).await? {
        anyhow::bail!("email {email:?} is already registered");
    }

    let auth = SimpleAuthProvider::new(settings.auth.nonce_salt.expose_secret());
    let user = NewUser {
        username: username.to_string(),
        email: email.trim().to_string(),
        display_name: name.map(str::trim).filter(|n| !n.is_empty()).unwrap_or(username).to_string(),
        password_hash: auth.hash_password(password)?,
        role: Role::Administrator,
    };
    repo.create_user(&user).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref())?;
    let repo = SqliteRepo::new(&settings.database.url, settings.database.max_connections).await?;

    match cli.command {
        Command::Areas => {
            let created = repo.seed_default_areas().await?;
            log::info!("{created} area(s) created, {} total", repo.list_areas().await?.len());
        }
        Command::Admin { username, email, name, password } => {
            let id = create_admin(&settings, &repo, &username, &email, name.as_deref(), &password).await?;
            log::info!("administrator {username} created (user #{id})");
        }
        Command::ImportGpx { dir } => {
            let dir = dir.unwrap_or_else(|| settings.gpx.dir.clone());
            let summary = import_gpx_dir(&repo, &dir).await?;
            log::info!(
                "imported {} track(s): {} new, {} refreshed",
                summary.imported, summary.created, summary.updated
            );
            for error in &summary.errors {
                log::warn!("gpx: {error}");
            }
        }
        Command::Dedupe { dry } => {
            let summary = repo.dedupe_trails(dry).await?;
            let verb = if dry { "would be" } else { "were" };
            log::info!(
                "{} duplicate trail(s) {verb} deleted, {} report(s) moved, {} title(s) cleaned, {} metadata field(s) and {} area link(s) merged",
                summary.deleted, summary.updated_reports, summary.retitled, summary.meta_merged, summary.terms_merged
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn admins_are_validated_before_insert() {
        let settings = Settings::load_from(None).unwrap();
        let repo = SqliteRepo::new("sqlite::memory:", 1).await.unwrap();

        let err = create_admin(&settings, &repo, "ada lovelace", "ada@example.org", None, "long-enough")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("underscores"));
        assert!(create_admin(&settings, &repo, "ada", "nope", None, "long-enough").await.is_err());
        assert!(create_admin(&settings, &repo, "ada", "ada@example.org", None, "short").await.is_err());

        let id = create_admin(&settings, &repo, "ada", "ada@example.org", Some("Ada L."), "long-enough")
            .await
            .unwrap();
        let user = repo.get_user(id).await.unwrap().unwrap();
        assert_eq!(user.role, Role::Administrator);
        assert_eq!(user.display_name, "Ada L.");

        assert!(create_admin(&settings, &repo, "ada", "other@example.org", None, "long-enough")
            .await
            .is_err());
    }
}

//! # trail-agent
//!
//! The entry point that assembles the application based on compile-time features.

mod digest;

use actix_files::Files;
use actix_session::storage::CookieSessionStore;
use actix_session::SessionMiddleware;
use actix_web::cookie::Key;
use actix_web::{web, App, HttpServer};
use ta_api::{configure_routes, middleware, AppConfig, AppState};
use ta_config::{ExposeSecret, Settings};

// Feature-gated imports
#[cfg(feature = "db-sqlite")]
use ta_db_sqlite::SqliteRepo;

#[cfg(feature = "storage-local")]
use ta_storage_local::LocalMediaStore;

#[cfg(feature = "auth-simple")]
use ta_auth_simple::SimpleAuthProvider;

#[cfg(feature = "mail-smtp")]
use ta_mail_smtp::SmtpNotifier;

const SESSION_COOKIE: &str = "ta_session";

/// Signing key for the session cookie. Short or missing secrets get a
/// random key, so sessions end when the process restarts.
fn session_key(secret: &str) -> Key {
    if secret.len() >= 32 {
        Key::derive_from(secret.as_bytes())
    } else {
        log::warn!("server.secret_key is shorter than 32 bytes; using a random session key");
        Key::generate()
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let settings = Settings::load()?;

    // 1. Database
    #[cfg(feature = "db-sqlite")]
    let repo = {
        let repo = SqliteRepo::new(&settings.database.url, settings.database.max_connections).await?;
        repo.seed_default_areas().await?;
        repo
    };

    // 2. Media storage
    #[cfg(feature = "storage-local")]
    let store = {
        std::fs::create_dir_all(&settings.media.root)?;
        LocalMediaStore::new(
            settings.media.root.clone(),
            settings.media.url_prefix.clone(),
            settings.media.thumb_size,
        )
    };

    // 3. Credentials
    #[cfg(feature = "auth-simple")]
    let auth = SimpleAuthProvider::new(settings.auth.nonce_salt.expose_secret());

    // 4. Mail
    #[cfg(feature = "mail-smtp")]
    let notifier = SmtpNotifier::from_settings(&settings.mail)?;

    let state = web::Data::new(AppState {
        repo: Box::new(repo),
        store: Box::new(store),
        auth: Box::new(auth),
        notifier: Box::new(notifier),
        config: AppConfig::from_settings(&settings),
    });

    if settings.digest.enabled {
        digest::spawn(state.clone(), settings.digest.hour);
    }

    let key = session_key(settings.server.secret_key.expose_secret());
    let secure_cookie = settings.server.base_url.starts_with("https://");
    let cors_origin = settings.server.cors_origin.clone();
    let media_root = settings.media.root.clone();
    let media_prefix = settings.media.url_prefix.clone();
    let (host, port) = settings.bind_addr();

    log::info!("trail-agent listening on http://{host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(
                SessionMiddleware::builder(CookieSessionStore::default(), key.clone())
                    .cookie_name(SESSION_COOKIE.to_string())
                    .cookie_secure(secure_cookie)
                    .build(),
            )
            .wrap(middleware::cors_policy(cors_origin.as_deref()))
            .wrap(middleware::security_headers())
            .wrap(middleware::standard_middleware())
            .configure(configure_routes)
            .service(Files::new(&media_prefix, &media_root))
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;
    Ok(())
}

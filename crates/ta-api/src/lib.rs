//! # ta-api
//!
//! The web routing and orchestration layer for trail-agent.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod outstanding;
pub mod pages;
pub mod session;
pub mod state;

use actix_web::web;
use ta_core::AppError;

pub use error::{ApiError, ApiResult};
pub use state::{AppConfig, AppState};

/// Mount point of the JSON API.
pub const API_PREFIX: &str = "/ta/v1";

/// Malformed JSON bodies and query strings answer in the same
/// `{code, message}` shape as every other error.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _| ApiError::from(AppError::invalid(err.to_string())).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _| ApiError::from(AppError::invalid(err.to_string())).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _| ApiError::from(AppError::invalid(err.to_string())).into())
}

/// Configures the API scope and the HTML pages.
///
/// The binary wraps the app with the session middleware; every handler
/// that identifies a user relies on it.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope(API_PREFIX)
            .app_data(json_config())
            .app_data(query_config())
            .app_data(path_config())
            .route("/ping", web::get().to(handlers::ping))
            .route("/report", web::post().to(handlers::create_report))
            .route("/reports", web::get().to(handlers::list_reports))
            .route("/media", web::post().to(handlers::upload_media))
            .route("/trails", web::get().to(handlers::list_trails))
            .route("/trails/import-gpx", web::post().to(handlers::import_gpx))
            .route("/trails/{id}/status", web::post().to(handlers::update_trail_status))
            .route("/areas", web::get().to(handlers::list_areas))
            .route("/analytics", web::get().to(handlers::analytics))
            .service(
                web::scope("/outstanding")
                    .route("/photos", web::get().to(outstanding::photos))
                    .route("/toggle/{id}", web::post().to(outstanding::toggle))
                    .route("/dismiss/{id}", web::post().to(outstanding::dismiss))
                    .route("/set-status/{id}", web::post().to(outstanding::set_status))
                    .route("/resolve/{id}", web::post().to(outstanding::resolve))
                    .route("/stats", web::get().to(outstanding::stats))
                    .route("/filter-options", web::get().to(outstanding::filter_options)),
            )
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(auth::register))
                    .route("/login", web::post().to(auth::login))
                    .route("/logout", web::post().to(auth::logout))
                    .route("/me", web::get().to(auth::me)),
            ),
    )
    .route("/map", web::get().to(pages::map_page))
    .route("/outstanding", web::get().to(pages::outstanding_page))
    .route("/outstanding/admin", web::get().to(pages::outstanding_admin_page))
    .route("/reports", web::get().to(pages::reports_page))
    .route("/analytics", web::get().to(pages::analytics_page));
}

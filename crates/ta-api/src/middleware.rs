//! Logging, CORS and security headers applied to every route.

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::{DefaultHeaders, Logger};

use crate::session::NONCE_HEADER;

/// `remote-ip "request-line" status size "referrer" "user-agent" duration`
pub fn standard_middleware() -> Logger {
    Logger::default()
}

/// Same-origin only unless an origin is configured; that origin may send
/// the session cookie and the nonce header.
pub fn cors_policy(origin: Option<&str>) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .allowed_header(NONCE_HEADER)
        .max_age(3600);
    match origin.map(str::trim).filter(|o| !o.is_empty()) {
        Some(origin) => cors.allowed_origin(origin).supports_credentials(),
        None => cors,
    }
}

pub fn security_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .add((header::REFERRER_POLICY, "strict-origin-when-cross-origin"))
        .add((header::X_FRAME_OPTIONS, "SAMEORIGIN"))
}

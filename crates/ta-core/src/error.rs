//! Domain errors. `ta-api` maps each variant onto an HTTP status.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (e.g., Trail, Photo)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., unknown trail, malformed date)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// No session, or bad credentials
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but lacking a capability or a valid nonce
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Infrastructure failure (e.g., DB down, disk full)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Request conflicts with current state (e.g., resolving a non-outstanding photo)
    #[error("conflict: {0}")]
    Conflict(String),
}

impl AppError {
    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        AppError::NotFound(kind.to_string(), id.to_string())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

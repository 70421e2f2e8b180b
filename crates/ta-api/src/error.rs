//! Mapping of domain and infrastructure failures onto HTTP responses.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use ta_core::AppError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] AppError),
    #[error(transparent)]
    Internal(anyhow::Error),
}

/// Domain errors raised below a port trait travel inside `anyhow` and are
/// recovered here.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AppError>() {
            Ok(domain) => ApiError::Domain(domain),
            Err(other) => ApiError::Internal(other),
        }
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(err: actix_web::error::BlockingError) -> Self {
        ApiError::Internal(anyhow::anyhow!(err.to_string()))
    }
}

impl From<actix_multipart::MultipartError> for ApiError {
    fn from(err: actix_multipart::MultipartError) -> Self {
        ApiError::Domain(AppError::invalid(format!("malformed upload: {err}")))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Domain(AppError::NotFound(..)) => "not_found",
            ApiError::Domain(AppError::ValidationError(_)) => "invalid_param",
            ApiError::Domain(AppError::Unauthorized(_)) => "unauthorized",
            ApiError::Domain(AppError::Forbidden(_)) => "forbidden",
            ApiError::Domain(AppError::Conflict(_)) => "conflict",
            ApiError::Domain(AppError::Internal(_)) | ApiError::Internal(_) => "internal_error",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Domain(AppError::ValidationError(msg))
            | ApiError::Domain(AppError::Unauthorized(msg))
            | ApiError::Domain(AppError::Forbidden(msg))
            | ApiError::Domain(AppError::Conflict(msg)) => msg.clone(),
            ApiError::Domain(e @ AppError::NotFound(..)) => e.to_string(),
            ApiError::Domain(AppError::Internal(_)) | ApiError::Internal(_) => {
                "internal server error".to_string()
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Domain(AppError::NotFound(..)) => StatusCode::NOT_FOUND,
            ApiError::Domain(AppError::ValidationError(_)) => StatusCode::BAD_REQUEST,
            ApiError::Domain(AppError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Domain(AppError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Domain(AppError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Domain(AppError::Internal(_)) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("request failed: {self:#}");
        }
        HttpResponse::build(self.status_code()).json(ErrorBody {
            code: self.code(),
            message: self.message(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_survive_anyhow() {
        let err: ApiError = anyhow::Error::from(AppError::not_found("GPX directory", "./gpx")).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err: ApiError = anyhow::anyhow!("disk full").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), "internal server error");
    }

    #[test]
    fn conflicts_keep_their_message() {
        let err = ApiError::from(AppError::Conflict("photo is not marked as outstanding".into()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "conflict");
        assert_eq!(err.message(), "photo is not marked as outstanding");
    }
}

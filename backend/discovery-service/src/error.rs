/// Error types for Discovery Service
///
/// Service-layer errors are converted to JSON HTTP responses of the form
/// `{"error": "...", "status": 400}`.
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use thiserror::Error;

use crate::services::{DiscoveryError, SummaryError};

/// Result type for HTTP handlers
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The content store cannot be reached; callers may retry.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// The summary provider failed.
    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let error_msg = self.to_string();

        HttpResponse::build(status).json(serde_json::json!({
            "error": error_msg,
            "status": status.as_u16(),
        }))
    }
}

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidFilter(msg) | DiscoveryError::InvalidCursor(msg) => {
                AppError::BadRequest(msg)
            }
            DiscoveryError::NotFound(id) => AppError::NotFound(format!("content {}", id)),
            DiscoveryError::RepositoryUnavailable(msg) => AppError::Unavailable(msg),
            DiscoveryError::Summary(SummaryError::NotConfigured) => {
                AppError::Unavailable(SummaryError::NotConfigured.to_string())
            }
            DiscoveryError::Summary(other) => AppError::Upstream(other.to_string()),
        }
    }
}

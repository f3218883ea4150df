//! Error types for the Lectern server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The extraction job failed upstream; the client may retry
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// Coordination wait budget exhausted; the client may retry
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, retryable, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", false, msg.clone()),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", false, msg.clone())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    false,
                    "Internal server error".to_string(),
                )
            }
            AppError::ExtractionFailed(msg) => {
                tracing::warn!("Extraction failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "extraction_failed", true, msg.clone())
            }
            AppError::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, "busy", true, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database",
                    false,
                    "Database error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            retryable,
        });

        (status, body).into_response()
    }
}

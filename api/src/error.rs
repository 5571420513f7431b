//! Error types for the message feed server
//!
//! - `ConfigError`: invalid or missing environment configuration
//! - `AppError`: handler errors, rendered as JSON responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use messagefeed::domain::entities::LoginMethod;
use messagefeed::{FeedError, LedgerError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),

    #[error("Unsupported login method: {0}")]
    UnsupportedLoginMethod(LoginMethod),
}

/// Application layer errors - used by HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    /// No feed exists yet; bootstrap is running or will be retried
    #[error("Loading")]
    Loading,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Error response body for JSON responses
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Loading => (StatusCode::INTERNAL_SERVER_ERROR, "Loading", None),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Feed(e) => {
                tracing::error!("Feed error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    Some(e.user_message().to_string()),
                )
            }
            AppError::Ledger(e) => {
                tracing::error!("Ledger error: {}", e);
                (StatusCode::BAD_GATEWAY, "Ledger error", None)
            }
        };

        let body = Json(ErrorResponse {
            error: error.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

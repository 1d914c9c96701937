//! Centralized error handling.
//!
//! Provides a unified error type for the application,
//! with automatic HTTP response conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::infra::StoreError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Startup
    #[error("Primary store unavailable: {0}")]
    PrimaryStoreUnavailable(#[source] StoreError),

    #[error("Unhealthy: {0}")]
    Unhealthy(String),

    // Lifecycle misuse
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Resource errors
    #[error("Resource not found")]
    NotFound,

    #[error("Invalid input: {0}")]
    BadRequest(String),

    // External service errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{} store connection(s) failed to close", .0.len())]
    Teardown(Vec<StoreError>),

    // Internal
    #[error("Internal server error")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl AppError {
    /// Get error code for client
    pub fn code(&self) -> &'static str {
        match self {
            AppError::PrimaryStoreUnavailable(_) => "PRIMARY_STORE_UNAVAILABLE",
            AppError::Unhealthy(_) => "UNHEALTHY",
            AppError::InvalidState(_) => "INVALID_STATE",
            AppError::NotFound => "NOT_FOUND",
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Store(_) => "STORE_ERROR",
            AppError::Teardown(_) => "TEARDOWN_FAILED",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::PrimaryStoreUnavailable(_) | AppError::Unhealthy(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Teardown(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get user-facing message (hides internal details)
    pub fn user_message(&self) -> String {
        match self {
            // Show full message for client errors
            AppError::BadRequest(msg) => msg.clone(),
            AppError::InvalidState(msg) => msg.clone(),
            AppError::Unhealthy(msg) => msg.clone(),

            // Hide details for internal errors
            AppError::PrimaryStoreUnavailable(e) => {
                tracing::error!("Primary store unavailable: {:?}", e);
                "The primary store is unavailable".to_string()
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {:?}", e);
                "A store error occurred".to_string()
            }
            AppError::Teardown(errors) => {
                tracing::error!("Teardown errors: {:?}", errors);
                "Store connections failed to close".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }

            // Use default message for others
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.user_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias
pub type AppResult<T> = Result<T, AppError>;

/// Convenience constructors
impl AppError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        AppError::InvalidState(msg.into())
    }

    pub fn unhealthy(msg: impl Into<String>) -> Self {
        AppError::Unhealthy(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AppError::Internal(msg.into())
    }
}

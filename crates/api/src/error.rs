//! HTTP error mapping

use alerting::{AlertError, ErrorCategory};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;
use tracing::{error, warn};

/// Errors surfaced by the HTTP handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Alert(#[from] AlertError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("{0}")]
    BadRequest(String),
}

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub category: ErrorCategory,
}

impl ApiError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ApiError::Alert(err) => err.category(),
            ApiError::Storage(StorageError::NotFound(_)) => ErrorCategory::NotFound,
            ApiError::Storage(StorageError::UniqueViolation(_)) => ErrorCategory::Conflict,
            ApiError::Storage(StorageError::VersionMismatch { .. }) => ErrorCategory::Transient,
            ApiError::Storage(StorageError::DatabaseError(_)) => ErrorCategory::Internal,
            ApiError::BadRequest(_) => ErrorCategory::Validation,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCategory::Permanent | ErrorCategory::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        } else {
            warn!("Request rejected ({}): {}", status, self);
        }

        let body = ErrorBody {
            error: self.to_string(),
            category: self.category(),
        };
        (status, Json(body)).into_response()
    }
}

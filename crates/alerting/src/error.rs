//! Alerting Error Types

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable error category callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Conflict,
    Transient,
    Permanent,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Transient => "transient",
            ErrorCategory::Permanent => "permanent",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the alert lifecycle engines and their collaborators
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    /// Malformed input, rejected before any store mutation
    #[error("invalid input: {0}")]
    Validation(String),

    /// Requested resource does not exist
    #[error("{0} not found")]
    NotFound(String),

    /// Alert was already acknowledged
    #[error("alert already acknowledged")]
    AlreadyAcknowledged,

    /// Alert is resolved; resolution is terminal
    #[error("alert already resolved")]
    AlreadyResolved,

    /// A firing alert already exists for this fingerprint
    #[error("firing alert already exists for fingerprint {0}")]
    DuplicateFingerprint(String),

    /// Stored version changed since the alert was loaded
    #[error("alert {id} was modified concurrently (expected version {expected}, found {actual})")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    /// Retryable infrastructure failure (network, rate limit, 5xx, timeout)
    #[error("transient failure: {message}")]
    Transient { message: String },

    /// Non-retryable infrastructure failure (4xx, auth)
    #[error("permanent failure: {message}")]
    Permanent { message: String },

    /// The request was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,

    /// Unexpected failure
    #[error("internal error: {0}")]
    Internal(String),
}

impl AlertError {
    pub fn transient(message: impl Into<String>) -> Self {
        AlertError::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        AlertError::Permanent {
            message: message.into(),
        }
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            AlertError::Validation(_) => ErrorCategory::Validation,
            AlertError::NotFound(_) => ErrorCategory::NotFound,
            AlertError::AlreadyAcknowledged
            | AlertError::AlreadyResolved
            | AlertError::DuplicateFingerprint(_) => ErrorCategory::Conflict,
            AlertError::VersionConflict { .. }
            | AlertError::Transient { .. }
            | AlertError::Cancelled => ErrorCategory::Transient,
            AlertError::Permanent { .. } => ErrorCategory::Permanent,
            AlertError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether a caller may retry the failed operation
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

//! Storage Layer
//!
//! In-memory persistence for alerts, ack events, and silences. Enforces
//! the one-firing-alert-per-fingerprint constraint on insert and
//! compare-and-swap on update.

mod repository;
mod transaction;

pub use repository::Repository;
pub use transaction::MemoryUnitOfWork;

use alerting::AlertError;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Unique constraint violated: firing alert exists for fingerprint {0}")]
    UniqueViolation(String),
    #[error("Version mismatch on {id}: expected {expected}, found {actual}")]
    VersionMismatch { id: String, expected: u64, actual: u64 },
}

impl From<StorageError> for AlertError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DatabaseError(msg) => AlertError::Internal(msg),
            StorageError::NotFound(what) => AlertError::NotFound(what),
            StorageError::UniqueViolation(fingerprint) => {
                AlertError::DuplicateFingerprint(fingerprint)
            }
            StorageError::VersionMismatch {
                id,
                expected,
                actual,
            } => AlertError::VersionConflict {
                id,
                expected,
                actual,
            },
        }
    }
}

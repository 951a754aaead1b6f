//! Database capability errors

use thiserror::Error;

/// Result type for database capability operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors surfaced by a [`super::Database`] implementation.
///
/// The capability keeps its error surface small; managers translate
/// these into the step-level taxonomy (index conflicts, migration
/// failures, validator rejections).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DbError {
    /// Transport-level failure; the operation may be retried
    #[error("database unavailable: {0}")]
    Unavailable(String),

    /// The store rejected the request as malformed
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store accepted the request but could not complete it
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

impl DbError {
    /// Stable code used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            DbError::Unavailable(_) => "DB_UNAVAILABLE",
            DbError::InvalidArgument(_) => "DB_INVALID_ARGUMENT",
            DbError::OperationFailed(_) => "DB_OPERATION_FAILED",
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DbError::Unavailable(_))
    }
}

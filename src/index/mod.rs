//! Index management
//!
//! Creation probes by name before calling the store: re-creating an
//! identical index is a no-op, a different definition under the same
//! name is a conflict. Dropping is idempotent; a missing name is
//! skipped and logged at INFO.

use thiserror::Error;

use crate::db::{Database, DbError, IndexSpec};
use crate::observability::LogEvent;

/// Errors from index operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// A different index already exists under this name
    #[error("index '{name}' already exists with a different definition")]
    Conflict { name: String },

    /// The spec is malformed
    #[error("invalid index spec '{name}': {reason}")]
    Invalid { name: String, reason: String },

    /// Transport failure; retriable
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// What a create call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    /// An identical index was already present.
    AlreadyExists,
}

/// What a drop call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Dropped,
    /// No index by that name existed.
    Missing,
}

/// Drives index creation and deletion through the database capability.
pub struct IndexManager<'a> {
    db: &'a dyn Database,
}

impl<'a> IndexManager<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Create `spec` on `collection`, probing by name first.
    pub fn create(&self, collection: &str, spec: &IndexSpec) -> Result<CreateOutcome, IndexError> {
        if spec.name.is_empty() {
            return Err(IndexError::Invalid {
                name: spec.name.clone(),
                reason: "index name must not be empty".to_string(),
            });
        }
        if spec.key.is_empty() {
            return Err(IndexError::Invalid {
                name: spec.name.clone(),
                reason: "index key must not be empty".to_string(),
            });
        }

        let existing = self
            .db
            .list_indexes(collection)
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if let Some(present) = existing.iter().find(|i| i.name == spec.name) {
            if present.key == spec.key && present.options == spec.options {
                return Ok(CreateOutcome::AlreadyExists);
            }
            return Err(IndexError::Conflict {
                name: spec.name.clone(),
            });
        }

        match self.db.create_index(collection, spec) {
            Ok(()) => Ok(CreateOutcome::Created),
            Err(DbError::Unavailable(message)) => Err(IndexError::Unavailable(message)),
            Err(DbError::InvalidArgument(reason)) => Err(IndexError::Invalid {
                name: spec.name.clone(),
                reason,
            }),
            // The probe passed, so a same-name failure is a concurrent
            // creation with a different definition.
            Err(DbError::OperationFailed(_)) => Err(IndexError::Conflict {
                name: spec.name.clone(),
            }),
        }
    }

    /// Drop `index_name` from `collection`. Absence is success.
    pub fn drop(&self, collection: &str, index_name: &str) -> Result<DropOutcome, IndexError> {
        let existing = self
            .db
            .list_indexes(collection)
            .map_err(|e| IndexError::Unavailable(e.to_string()))?;

        if !existing.iter().any(|i| i.name == index_name) {
            LogEvent::info("index_drop_skipped")
                .collection(collection)
                .index(index_name)
                .emit();
            return Ok(DropOutcome::Missing);
        }

        match self.db.drop_index(collection, index_name) {
            Ok(()) => Ok(DropOutcome::Dropped),
            // Lost a race with another drop; still idempotent.
            Err(DbError::OperationFailed(_)) => Ok(DropOutcome::Missing),
            Err(DbError::Unavailable(message)) => Err(IndexError::Unavailable(message)),
            Err(DbError::InvalidArgument(reason)) => Err(IndexError::Invalid {
                name: index_name.to_string(),
                reason,
            }),
        }
    }
}

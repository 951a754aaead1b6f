//! Validator application
//!
//! Installing a schema on a collection is a two-step affair: remove
//! whatever validator is present (absence is not an error), then install
//! the freshly rendered BSON schema with `validationLevel=moderate` and
//! `validationAction=error`.

use serde_json::Value;
use thiserror::Error;

use crate::db::{Database, DbError, ValidationAction, ValidationLevel};

/// Errors from validator application.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApplyError {
    /// The store refused the schema document
    #[error("validator rejected: {0}")]
    Rejected(String),

    /// Transport failure; retriable
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl From<DbError> for ApplyError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::Unavailable(message) => ApplyError::Unavailable(message),
            DbError::InvalidArgument(message) | DbError::OperationFailed(message) => {
                ApplyError::Rejected(message)
            }
        }
    }
}

/// Removes and installs collection validators.
pub struct SchemaApplier<'a> {
    db: &'a dyn Database,
}

impl<'a> SchemaApplier<'a> {
    pub fn new(db: &'a dyn Database) -> Self {
        Self { db }
    }

    /// Remove any existing validator.
    pub fn remove(&self, collection: &str) -> Result<(), ApplyError> {
        self.db.clear_validator(collection).map_err(ApplyError::from)
    }

    /// Install `bson_schema` as the document validator.
    pub fn install(&self, collection: &str, bson_schema: &Value) -> Result<(), ApplyError> {
        self.db
            .set_validator(
                collection,
                bson_schema,
                ValidationLevel::Moderate,
                ValidationAction::Error,
            )
            .map_err(ApplyError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDatabase;
    use serde_json::json;

    #[test]
    fn test_remove_is_idempotent() {
        let db = MemoryDatabase::new();
        let applier = SchemaApplier::new(&db);
        applier.remove("users").unwrap();
        applier.remove("users").unwrap();
    }

    #[test]
    fn test_install_sets_moderate_error_posture() {
        let db = MemoryDatabase::new();
        let applier = SchemaApplier::new(&db);
        let schema = json!({"bsonType": "object", "additionalProperties": false});

        applier.install("users", &schema).unwrap();

        let stored = db.validator("users").unwrap();
        assert_eq!(stored.schema, schema);
        assert_eq!(stored.level, ValidationLevel::Moderate);
        assert_eq!(stored.action, ValidationAction::Error);
    }

    #[test]
    fn test_non_document_schema_is_rejected() {
        let db = MemoryDatabase::new();
        let applier = SchemaApplier::new(&db);
        let err = applier.install("users", &json!("not a schema")).unwrap_err();
        assert!(matches!(err, ApplyError::Rejected(_)));
    }
}

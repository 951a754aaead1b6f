//! Database capability
//!
//! The engine never talks to a wire client directly. Everything it needs
//! from the document store is expressed by the [`Database`] trait;
//! embedders inject a driver-backed implementation, tests and the CLI
//! rehearsal mode use [`MemoryDatabase`].

mod errors;
mod memory;

pub use errors::{DbError, DbResult};
pub use memory::{FaultPoint, MemoryDatabase};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named index over an ordered key document.
///
/// `key` preserves authored field order; `options` is passed through to
/// the store untouched (`unique`, `sparse`, collation, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub key: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl IndexSpec {
    /// Convenience constructor for a single-field ascending index.
    pub fn ascending(name: impl Into<String>, field: impl Into<String>) -> Self {
        let mut key = Map::new();
        key.insert(field.into(), Value::from(1));
        Self {
            name: name.into(),
            key,
            options: Map::new(),
        }
    }

    /// Add an opaque option.
    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.options.insert(name.into(), value);
        self
    }
}

/// Document validation strictness installed alongside a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationLevel {
    Off,
    Moderate,
    Strict,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Off => "off",
            ValidationLevel::Moderate => "moderate",
            ValidationLevel::Strict => "strict",
        }
    }
}

/// What the store does with a write that violates the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValidationAction {
    Warn,
    Error,
}

impl ValidationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationAction::Warn => "warn",
            ValidationAction::Error => "error",
        }
    }
}

/// Options applied to every migration aggregate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateOptions {
    pub allow_disk_use: bool,
    pub majority_read_concern: bool,
    pub majority_write_concern: bool,
}

impl AggregateOptions {
    /// The posture migrations always run with.
    pub fn migration() -> Self {
        Self {
            allow_disk_use: true,
            majority_read_concern: true,
            majority_write_concern: true,
        }
    }
}

/// The operations the engine consumes from the document store.
///
/// Connection parameters (URI, database name, TLS) belong to the
/// implementation; the engine never sees them.
pub trait Database: Send + Sync {
    /// Names of all collections in the database.
    fn list_collections(&self) -> DbResult<Vec<String>>;

    /// The `$jsonSchema` currently installed on a collection, if any.
    fn get_validator(&self, collection: &str) -> DbResult<Option<Value>>;

    /// Install a document validator.
    fn set_validator(
        &self,
        collection: &str,
        bson_schema: &Value,
        level: ValidationLevel,
        action: ValidationAction,
    ) -> DbResult<()>;

    /// Remove any document validator. Absence is not an error.
    fn clear_validator(&self, collection: &str) -> DbResult<()>;

    /// Existing indexes, including the implicit `_id_` index.
    fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexSpec>>;

    /// Create an index. The caller probes for conflicts beforehand.
    fn create_index(&self, collection: &str, spec: &IndexSpec) -> DbResult<()>;

    /// Drop an index by name. Dropping a missing index is an error at
    /// this level; the index manager layers idempotence on top.
    fn drop_index(&self, collection: &str, index_name: &str) -> DbResult<()>;

    /// Run an aggregation pipeline. Returns cursor documents; pipelines
    /// ending in `$merge`/`$out` return nothing.
    fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Value],
        options: &AggregateOptions,
    ) -> DbResult<Vec<Value>>;

    /// All documents matching an equality filter.
    ///
    /// The version store needs the full match list to detect corrupt
    /// (multi-record) markers, so the contract's `findOne` is the
    /// single-result view over this.
    fn find(&self, collection: &str, filter: &Value) -> DbResult<Vec<Value>>;

    /// First document matching an equality filter.
    fn find_one(&self, collection: &str, filter: &Value) -> DbResult<Option<Value>> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    /// Replace the single document matching `filter` with `document`,
    /// inserting it when no match exists.
    fn upsert_one(&self, collection: &str, filter: &Value, document: &Value) -> DbResult<()>;

    /// Bulk insert (test-data loader only).
    fn insert_many(&self, collection: &str, documents: &[Value]) -> DbResult<()>;
}

//! Per-collection version markers
//!
//! One dedicated collection holds `{collection_name, current_version}`
//! records, exactly one per managed collection. A missing record means
//! the collection was never processed; multiple records are treated as
//! corrupt and read as never-processed with a warning.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::{Database, DbResult};
use crate::observability::LogEvent;
use crate::version::VersionNumber;

/// One marker record, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionVersion {
    pub collection_name: String,
    pub current_version: String,
}

/// Reads and writes the version markers.
pub struct VersionStore<'a> {
    db: &'a dyn Database,
    collection: String,
}

impl<'a> VersionStore<'a> {
    pub fn new(db: &'a dyn Database, collection: impl Into<String>) -> Self {
        Self {
            db,
            collection: collection.into(),
        }
    }

    /// The current version of `name`, or `0.0.0.0` when no single valid
    /// record exists.
    pub fn read(&self, name: &str) -> DbResult<VersionNumber> {
        let filter = json!({ "collection_name": name });
        let records = self.db.find(&self.collection, &filter)?;

        match records.as_slice() {
            [] => Ok(VersionNumber::ZERO),
            [record] => {
                let raw = record
                    .get("current_version")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                match VersionNumber::parse(raw) {
                    Ok(version) => Ok(version),
                    Err(_) => {
                        LogEvent::warn("version_record_unparseable")
                            .collection(name)
                            .detail(raw)
                            .emit();
                        Ok(VersionNumber::ZERO)
                    }
                }
            }
            _ => {
                LogEvent::warn("version_record_duplicated")
                    .collection(name)
                    .count(records.len())
                    .emit();
                Ok(VersionNumber::ZERO)
            }
        }
    }

    /// Upsert the marker for `name`. Called only as the terminal step of
    /// a successful transition.
    pub fn write(&self, name: &str, version: &VersionNumber) -> DbResult<()> {
        let filter = json!({ "collection_name": name });
        let record = json!({
            "collection_name": name,
            "current_version": version.to_string(),
        });
        self.db.upsert_one(&self.collection, &filter, &record)
    }

    /// Every stored marker, in store order.
    pub fn list(&self) -> DbResult<Vec<CollectionVersion>> {
        let records = self.db.find(&self.collection, &json!({}))?;
        Ok(records
            .into_iter()
            .filter_map(|record| serde_json::from_value(record).ok())
            .collect())
    }
}

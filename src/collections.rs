//! Collection configuration model
//!
//! One file under `collections/` declares one collection: its name and
//! the ordered list of version specs the processor advances through.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::IndexSpec;
use crate::version::{BadVersionString, VersionNumber};

/// Declarative configuration for one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    pub versions: Vec<VersionSpec>,
}

/// One declared version of a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionSpec {
    /// Raw version string; validated during the pre-run pass so a bad
    /// string surfaces as an issue rather than a load failure.
    pub version: String,

    /// Index names to drop before migrating.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop_indexes: Vec<String>,

    /// Indexes to create after migrating.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add_indexes: Vec<IndexSpec>,

    /// Ordered migration pipelines; each one is a list of stage
    /// documents passed opaquely to the database.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregations: Vec<Vec<Value>>,

    /// Name of a test-data file, loaded only when the service is
    /// configured to load test data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_data: Option<String>,
}

impl VersionSpec {
    /// The parsed version number.
    pub fn version_number(&self) -> Result<VersionNumber, BadVersionString> {
        VersionNumber::parse(&self.version)
    }

    /// The stem the test-data file is keyed under, with any `.json`
    /// extension removed.
    pub fn test_data_stem(&self) -> Option<&str> {
        self.test_data
            .as_deref()
            .map(|name| name.strip_suffix(".json").unwrap_or(name))
    }
}

impl CollectionConfig {
    /// Deserialize a loaded document into a configuration.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        serde_json::from_value(value.clone()).map_err(|e| e.to_string())
    }

    /// Collection names are slugs: 2-64 characters of `[A-Za-z0-9_-]`.
    pub fn is_valid_slug(name: &str) -> bool {
        (2..=64).contains(&name.len())
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    }

    /// The highest declared version, when every version parses.
    pub fn latest_version(&self) -> Option<VersionNumber> {
        self.versions
            .iter()
            .filter_map(|v| v.version_number().ok())
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_with_defaults() {
        let config = CollectionConfig::from_value(&json!({
            "name": "users",
            "versions": [
                {"version": "1.0.0.1"},
                {
                    "version": "1.0.0.2",
                    "drop_indexes": ["statusIdx"],
                    "test_data": "users.1.0.0.2.json"
                }
            ]
        }))
        .unwrap();

        assert_eq!(config.name, "users");
        assert_eq!(config.versions.len(), 2);
        assert!(config.versions[0].drop_indexes.is_empty());
        assert!(config.versions[0].add_indexes.is_empty());
        assert!(config.versions[0].aggregations.is_empty());
        assert_eq!(config.versions[1].test_data_stem(), Some("users.1.0.0.2"));
    }

    #[test]
    fn test_latest_version() {
        let config = CollectionConfig::from_value(&json!({
            "name": "users",
            "versions": [{"version": "1.0.0.1"}, {"version": "1.0.1.1"}]
        }))
        .unwrap();
        assert_eq!(config.latest_version(), Some(VersionNumber::new(1, 0, 1, 1)));
    }

    #[test]
    fn test_slug_rules() {
        assert!(CollectionConfig::is_valid_slug("users"));
        assert!(CollectionConfig::is_valid_slug("user_events-2024"));
        assert!(!CollectionConfig::is_valid_slug("u"));
        assert!(!CollectionConfig::is_valid_slug("users.archive"));
        assert!(!CollectionConfig::is_valid_slug(&"x".repeat(65)));
    }

    #[test]
    fn test_index_specs_deserialize_in_order() {
        let config = CollectionConfig::from_value(&json!({
            "name": "users",
            "versions": [{
                "version": "1.0.0.1",
                "add_indexes": [
                    {"name": "nameIdx", "key": {"userName": 1}, "options": {"unique": true}},
                    {"name": "statusIdx", "key": {"status": 1}}
                ]
            }]
        }))
        .unwrap();

        let indexes = &config.versions[0].add_indexes;
        assert_eq!(indexes[0].name, "nameIdx");
        assert_eq!(indexes[0].options["unique"], json!(true));
        assert_eq!(indexes[1].name, "statusIdx");
    }
}

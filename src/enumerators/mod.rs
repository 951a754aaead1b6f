//! Versioned enumerator sets
//!
//! One file (`data/enumerators.json`) holds every enumerator snapshot.
//! Each snapshot carries an integer version; a collection's fourth
//! version component selects the snapshot whose `version` matches, and
//! enumerator names resolve inside that snapshot only.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::validation::{IssueKind, ValidationIssue};

/// Lifecycle state of an enumerator set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumeratorStatus {
    Active,
    Deprecated,
}

/// One versioned snapshot of every enumerator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnumeratorSet {
    pub name: String,
    pub status: EnumeratorStatus,
    pub version: u32,
    /// enumerator name → (value → description), in authored order.
    pub enumerators: Map<String, Value>,
}

/// Errors from `(name, version)` lookups.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnumeratorError {
    #[error("no enumerator named '{name}' in set version {version}")]
    UnknownEnumerator { name: String, version: u32 },

    #[error("no enumerator set with version {version}")]
    UnknownEnumeratorVersion { version: u32 },
}

/// Registry of all loaded enumerator sets, keyed by integer version.
#[derive(Debug, Default)]
pub struct EnumeratorRegistry {
    sets: Vec<EnumeratorSet>,
    by_version: HashMap<u32, usize>,
}

impl EnumeratorRegistry {
    /// Build a registry from the parsed enumerators document.
    ///
    /// Structural problems (non-list document, malformed entries,
    /// duplicate set versions) are reported as issues; well-formed
    /// entries are still registered so later checks can proceed.
    pub fn build(document: Option<&Value>) -> (Self, Vec<ValidationIssue>) {
        let mut registry = Self::default();
        let mut issues = Vec::new();
        let path = "data/enumerators";

        let Some(document) = document else {
            return (registry, issues);
        };

        let Some(entries) = document.as_array() else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MalformedFile,
                "enumerators document must be a list of sets",
            ));
            return (registry, issues);
        };

        for (position, entry) in entries.iter().enumerate() {
            let set: EnumeratorSet = match serde_json::from_value(entry.clone()) {
                Ok(set) => set,
                Err(e) => {
                    issues.push(ValidationIssue::new(
                        format!("{}[{}]", path, position),
                        IssueKind::MalformedFile,
                        format!("invalid enumerator set: {}", e),
                    ));
                    continue;
                }
            };

            if registry.by_version.contains_key(&set.version) {
                issues.push(ValidationIssue::new(
                    format!("{}[{}]", path, position),
                    IssueKind::DuplicateEnumeratorSet,
                    format!("duplicate enumerator set for version {}", set.version),
                ));
                continue;
            }

            for (enum_name, values) in &set.enumerators {
                if !values.is_object() {
                    issues.push(ValidationIssue::new(
                        format!("{}[{}].{}", path, position, enum_name),
                        IssueKind::MalformedFile,
                        "enumerator must map values to string descriptions",
                    ));
                }
            }

            registry.by_version.insert(set.version, registry.sets.len());
            registry.sets.push(set);
        }

        (registry, issues)
    }

    /// The set at an integer version, regardless of status.
    pub fn set(&self, version: u32) -> Option<&EnumeratorSet> {
        self.by_version.get(&version).map(|&i| &self.sets[i])
    }

    /// The Active set at an integer version, if any.
    pub fn active_set(&self, version: u32) -> Option<&EnumeratorSet> {
        self.set(version)
            .filter(|s| s.status == EnumeratorStatus::Active)
    }

    /// Resolve `(name, version)` to the frozen value→description map.
    pub fn resolve(&self, name: &str, version: u32) -> Result<&Map<String, Value>, EnumeratorError> {
        let set = self
            .set(version)
            .ok_or(EnumeratorError::UnknownEnumeratorVersion { version })?;
        set.enumerators
            .get(name)
            .and_then(Value::as_object)
            .ok_or_else(|| EnumeratorError::UnknownEnumerator {
                name: name.to_string(),
                version,
            })
    }

    /// The allowed values for `(name, version)`, in authored order.
    /// These become rendered `enum` lists.
    pub fn values(&self, name: &str, version: u32) -> Result<Vec<String>, EnumeratorError> {
        Ok(self.resolve(name, version)?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_document() -> Value {
        json!([
            {
                "name": "Enumerations",
                "status": "Deprecated",
                "version": 0,
                "enumerators": {}
            },
            {
                "name": "Enumerations",
                "status": "Active",
                "version": 1,
                "enumerators": {
                    "media_status": {"draft": "Work in progress", "published": "Visible"},
                    "media_type": {"book": "A book", "movie": "A movie"}
                }
            }
        ])
    }

    #[test]
    fn test_resolve_by_version() {
        let (registry, issues) = EnumeratorRegistry::build(Some(&sample_document()));
        assert!(issues.is_empty());

        let values = registry.values("media_status", 1).unwrap();
        assert_eq!(values, vec!["draft", "published"]);
    }

    #[test]
    fn test_unknown_enumerator() {
        let (registry, _) = EnumeratorRegistry::build(Some(&sample_document()));
        let err = registry.values("missing_enumerator", 1).unwrap_err();
        assert_eq!(
            err,
            EnumeratorError::UnknownEnumerator {
                name: "missing_enumerator".to_string(),
                version: 1
            }
        );
    }

    #[test]
    fn test_unknown_version() {
        let (registry, _) = EnumeratorRegistry::build(Some(&sample_document()));
        let err = registry.values("media_status", 9).unwrap_err();
        assert_eq!(err, EnumeratorError::UnknownEnumeratorVersion { version: 9 });
    }

    #[test]
    fn test_active_set_filters_deprecated() {
        let (registry, _) = EnumeratorRegistry::build(Some(&sample_document()));
        assert!(registry.active_set(1).is_some());
        assert!(registry.set(0).is_some());
        assert!(registry.active_set(0).is_none());
    }

    #[test]
    fn test_duplicate_set_version_reported() {
        let mut doc = sample_document();
        let copy = doc.as_array().unwrap()[1].clone();
        doc.as_array_mut().unwrap().push(copy);

        let (registry, issues) = EnumeratorRegistry::build(Some(&doc));
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("duplicate"));
        // The first occurrence stays registered.
        assert!(registry.set(1).is_some());
    }

    #[test]
    fn test_values_preserve_authored_order() {
        let doc = json!([
            {
                "name": "Enumerations",
                "status": "Active",
                "version": 1,
                "enumerators": {
                    "priority": {"zebra": "z", "alpha": "a", "mid": "m"}
                }
            }
        ]);
        let (registry, _) = EnumeratorRegistry::build(Some(&doc));
        assert_eq!(registry.values("priority", 1).unwrap(), vec!["zebra", "alpha", "mid"]);
    }
}

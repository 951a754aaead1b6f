//! The pre-run validation pass
//!
//! Runs the entire load + resolve pipeline in dry mode and returns the
//! complete, ordered list of problems. Nothing here touches a database.

use std::collections::HashSet;

use crate::collections::CollectionConfig;
use crate::enumerators::EnumeratorRegistry;
use crate::loader::SourceTree;
use crate::schema::{SchemaNode, SchemaResolver};
use crate::types::{TypeDef, TypeDictionary};
use crate::version::VersionNumber;

use super::issue::{IssueKind, ValidationIssue};

/// Aggregating validator over a loaded source tree.
pub struct ValidationPass;

impl ValidationPass {
    /// Validate everything; the run is successful iff the list is empty.
    pub fn run(sources: &SourceTree) -> Vec<ValidationIssue> {
        let mut issues: Vec<ValidationIssue> = sources.issues.clone();

        let (enumerators, enum_issues) = EnumeratorRegistry::build(sources.enumerators.as_ref());
        issues.extend(enum_issues);

        let (types, type_issues) = TypeDictionary::build(&sources.types);
        issues.extend(type_issues);

        // Structural scan of every dictionary file and complex type,
        // referenced or not. Reference and enumerator checks happen
        // during per-collection resolution below.
        for (stem, document) in &sources.dictionary {
            let mut scratch = Vec::new();
            SchemaNode::parse(document, &format!("dictionary/{}", stem), &mut scratch);
            issues.extend(scratch);
        }
        for name in types.names() {
            if let Some(entry) = types.get(name) {
                if let TypeDef::Complex(document) = &entry.def {
                    let mut scratch = Vec::new();
                    SchemaNode::parse(document, &format!("dictionary/types/{}", name), &mut scratch);
                    issues.extend(scratch);
                }
            }
        }

        let mut resolver = SchemaResolver::new(&sources.dictionary, &types, &enumerators);
        for (stem, document) in &sources.collections {
            validate_collection(stem, document, sources, &enumerators, &mut resolver, &mut issues);
        }

        dedup_preserving_order(issues)
    }
}

fn validate_collection(
    stem: &str,
    document: &serde_json::Value,
    sources: &SourceTree,
    enumerators: &EnumeratorRegistry,
    resolver: &mut SchemaResolver<'_>,
    issues: &mut Vec<ValidationIssue>,
) {
    let file_path = format!("collections/{}", stem);

    let config = match CollectionConfig::from_value(document) {
        Ok(config) => config,
        Err(message) => {
            issues.push(ValidationIssue::new(
                &file_path,
                IssueKind::MalformedFile,
                format!("invalid collection configuration: {}", message),
            ));
            return;
        }
    };

    if !CollectionConfig::is_valid_slug(&config.name) {
        issues.push(ValidationIssue::new(
            &file_path,
            IssueKind::MalformedFile,
            format!(
                "collection name '{}' must be 2-64 characters of letters, digits, '_' or '-'",
                config.name
            ),
        ));
    }

    if config.versions.is_empty() {
        issues.push(ValidationIssue::new(
            &file_path,
            IssueKind::MalformedFile,
            "collection must declare at least one version",
        ));
        return;
    }

    let mut previous: Option<VersionNumber> = None;
    for (position, spec) in config.versions.iter().enumerate() {
        let version_path = format!("{}.versions[{}]", file_path, position);

        let version = match spec.version_number() {
            Ok(version) => version,
            Err(e) => {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::BadVersionString,
                    e.to_string(),
                ));
                continue;
            }
        };

        match previous {
            Some(prior) if version == prior => {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::DuplicateVersion,
                    format!("version {} is declared twice", version),
                ));
            }
            Some(prior) if version < prior => {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::VersionOutOfOrder,
                    format!("version {} does not exceed preceding {}", version, prior),
                ));
            }
            _ => {}
        }
        previous = Some(version);

        match enumerators.set(version.enumerator_version()) {
            None => {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::UnknownEnumeratorVersion,
                    format!("no enumerator set with version {}", version.enumerator_version()),
                ));
            }
            Some(set) if enumerators.active_set(version.enumerator_version()).is_none() => {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::UnknownEnumeratorVersion,
                    format!(
                        "enumerator set version {} ('{}') is not Active",
                        version.enumerator_version(),
                        set.name
                    ),
                ));
            }
            Some(_) => {}
        }

        if let Some(test_data) = spec.test_data_stem() {
            if !sources.test_data.contains_key(test_data) {
                issues.push(ValidationIssue::new(
                    &version_path,
                    IssueKind::UnknownRef,
                    format!("no test-data file '{}'", test_data),
                ));
            }
        }

        let outcome = resolver.resolve_collection(&config.name, &version);
        issues.extend(outcome.issues);
    }
}

/// Drop exact duplicates while keeping the first occurrence in place.
/// The structural scan and per-collection resolution both visit shared
/// files, so identical findings can be reported twice.
fn dedup_preserving_order(issues: Vec<ValidationIssue>) -> Vec<ValidationIssue> {
    let mut seen = HashSet::new();
    issues
        .into_iter()
        .filter(|issue| seen.insert((issue.path.clone(), issue.kind, issue.message.clone())))
        .collect()
}

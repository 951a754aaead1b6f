//! Input-tree loader
//!
//! Walks the read-only input tree and yields parsed documents keyed by
//! relative path:
//!
//! ```text
//! <input>/
//!   collections/<name>.yaml
//!   dictionary/<name>.<M>.<m>.<p>.yaml
//!   dictionary/types/<type>.yaml
//!   data/enumerators.json
//!   data/<name>.<M>.<m>.<p>.<e>.json
//! ```
//!
//! Loading never fails fast: unreadable, unparseable or unexpected files
//! become issues on the returned [`SourceTree`] and the walk continues.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::validation::{IssueKind, ValidationIssue};

/// Everything the engine reads from disk, parsed and keyed by file stem.
#[derive(Debug, Default)]
pub struct SourceTree {
    /// Collection configurations, ordered by file stem.
    pub collections: Vec<(String, Value)>,
    /// Dictionary schema documents keyed by stem (`users.1.0.0`).
    pub dictionary: BTreeMap<String, Value>,
    /// Custom type documents keyed by stem.
    pub types: BTreeMap<String, Value>,
    /// The enumerators document, when present.
    pub enumerators: Option<Value>,
    /// Test-data documents keyed by stem (`users.1.0.0.1`).
    pub test_data: BTreeMap<String, Value>,
    /// Problems discovered while loading.
    pub issues: Vec<ValidationIssue>,
}

/// Loads the input tree from a directory root.
#[derive(Debug, Clone)]
pub struct FileLoader {
    root: PathBuf,
}

impl FileLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Load and parse every file in the tree.
    pub fn load(&self) -> SourceTree {
        let mut tree = SourceTree::default();

        let collections_dir = self.root.join("collections");
        if !collections_dir.is_dir() {
            tree.issues.push(ValidationIssue::new(
                "collections",
                IssueKind::MalformedFile,
                format!("directory not found: {}", collections_dir.display()),
            ));
        } else {
            for (stem, path) in sorted_files(&collections_dir) {
                let rel = format!("collections/{}", file_name(&path));
                match parse_document(&path, &rel, &mut tree.issues) {
                    Some(doc) => tree.collections.push((stem, doc)),
                    None => continue,
                }
            }
        }

        let dictionary_dir = self.root.join("dictionary");
        for (stem, path) in sorted_files(&dictionary_dir) {
            let rel = format!("dictionary/{}", file_name(&path));
            if let Some(doc) = parse_document(&path, &rel, &mut tree.issues) {
                tree.dictionary.insert(stem, doc);
            }
        }

        let types_dir = dictionary_dir.join("types");
        for (stem, path) in sorted_files(&types_dir) {
            let rel = format!("dictionary/types/{}", file_name(&path));
            if let Some(doc) = parse_document(&path, &rel, &mut tree.issues) {
                tree.types.insert(stem, doc);
            }
        }

        let data_dir = self.root.join("data");
        for (stem, path) in sorted_files(&data_dir) {
            let rel = format!("data/{}", file_name(&path));
            if let Some(doc) = parse_document(&path, &rel, &mut tree.issues) {
                if stem == "enumerators" {
                    tree.enumerators = Some(doc);
                } else {
                    tree.test_data.insert(stem, doc);
                }
            }
        }

        tree
    }
}

/// Regular files in `dir` with a parseable extension, sorted by name.
/// Dotfiles and subdirectories are skipped; files with unexpected
/// extensions are reported by `parse_document` when encountered, so they
/// are kept here.
fn sorted_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| !file_name(p).starts_with('.'))
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            (stem, path)
        })
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Parse one file by extension. Returns `None` (and records an issue)
/// for unreadable, unparseable, or unsupported files.
fn parse_document(path: &Path, rel: &str, issues: &mut Vec<ValidationIssue>) -> Option<Value> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let supported = matches!(extension.as_str(), "yaml" | "yml" | "json");
    if !supported {
        issues.push(ValidationIssue::new(
            rel,
            IssueKind::UnsupportedFileKind,
            format!("unsupported file extension '{}'", extension),
        ));
        return None;
    }

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            issues.push(ValidationIssue::new(
                rel,
                IssueKind::MalformedFile,
                format!("unreadable file: {}", e),
            ));
            return None;
        }
    };

    let parsed: Result<Value, String> = if extension == "json" {
        serde_json::from_str(&content).map_err(|e| e.to_string())
    } else {
        serde_yaml::from_str(&content).map_err(|e| e.to_string())
    };

    match parsed {
        Ok(doc) => Some(doc),
        Err(message) => {
            issues.push(ValidationIssue::new(rel, IssueKind::MalformedFile, message));
            None
        }
    }
}

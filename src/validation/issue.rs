//! Validation issue records
//!
//! Issues are data, not exceptions: every check appends to a list and
//! the caller decides what an empty or non-empty list means.

use std::fmt;

use serde::Serialize;

/// The kind of a pre-run validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A version string did not parse
    BadVersionString,
    /// A declared version does not strictly exceed its predecessor
    VersionOutOfOrder,
    /// The same version is declared twice for one collection
    DuplicateVersion,
    /// A named type is neither built in nor in the type dictionary
    UnknownType,
    /// Custom type resolution revisited a name already on the path
    CircularTypeReference,
    /// A schema node is missing a structural field (type, properties, ...)
    MissingTypeField,
    /// A property has no description
    MissingDescription,
    /// An enumerator name is absent from the selected set
    UnknownEnumerator,
    /// No enumerator set exists at the requested integer version
    UnknownEnumeratorVersion,
    /// Two enumerator sets share the same integer version
    DuplicateEnumeratorSet,
    /// A `$ref` or file reference has no matching file
    UnknownRef,
    /// `$ref` resolution revisited a file already on the path
    CircularReference,
    /// A file failed to parse
    MalformedFile,
    /// A file with an unexpected extension sits in a load directory
    UnsupportedFileKind,
    /// A `one_of` discriminator does not name a declared base property
    InvalidDiscriminator,
}

impl IssueKind {
    /// Stable string form used in logs and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::BadVersionString => "bad_version_string",
            IssueKind::VersionOutOfOrder => "version_out_of_order",
            IssueKind::DuplicateVersion => "duplicate_version",
            IssueKind::UnknownType => "unknown_type",
            IssueKind::CircularTypeReference => "circular_type_reference",
            IssueKind::MissingTypeField => "missing_type_field",
            IssueKind::MissingDescription => "missing_description",
            IssueKind::UnknownEnumerator => "unknown_enumerator",
            IssueKind::UnknownEnumeratorVersion => "unknown_enumerator_version",
            IssueKind::DuplicateEnumeratorSet => "duplicate_enumerator_set",
            IssueKind::UnknownRef => "unknown_ref",
            IssueKind::CircularReference => "circular_reference",
            IssueKind::MalformedFile => "malformed_file",
            IssueKind::UnsupportedFileKind => "unsupported_file_kind",
            IssueKind::InvalidDiscriminator => "invalid_discriminator",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discovered problem, anchored to the place it was found.
///
/// `path` is a dotted location: a relative file path for load issues, or
/// `file.property.subproperty` for schema issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.path, self.message)
    }
}

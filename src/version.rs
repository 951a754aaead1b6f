//! Four-component collection version numbers
//!
//! Version format: `major.minor.patch.enumerator`, e.g. `1.0.0.1`.
//! The first three components address a schema file in the dictionary;
//! the fourth selects an enumerator set by its integer version.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Largest permitted value for any single version component.
const MAX_COMPONENT: u64 = i32::MAX as u64;

/// Error produced when a version string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BadVersionString {
    /// The offending input, verbatim.
    pub input: String,
    /// What made it unparseable.
    pub reason: String,
}

impl BadVersionString {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BadVersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for BadVersionString {}

/// An immutable `major.minor.patch.enumerator` version.
///
/// Ordering is strictly tuple-lexicographic. `0.0.0.0` is the sentinel
/// for "never applied".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber {
    parts: [u32; 4],
}

impl VersionNumber {
    /// The "never applied" sentinel, `0.0.0.0`.
    pub const ZERO: VersionNumber = VersionNumber { parts: [0, 0, 0, 0] };

    /// Parse a version string.
    ///
    /// Exactly three dots, each field a decimal non-negative integer with
    /// no sign and no surrounding whitespace. Leading zeros are accepted.
    /// Components above 2^31-1 are rejected.
    pub fn parse(input: &str) -> Result<Self, BadVersionString> {
        let fields: Vec<&str> = input.split('.').collect();
        if fields.len() != 4 {
            return Err(BadVersionString::new(
                input,
                format!("expected 4 dot-separated components, found {}", fields.len()),
            ));
        }

        let mut parts = [0u32; 4];
        for (i, field) in fields.iter().enumerate() {
            if field.is_empty() {
                return Err(BadVersionString::new(input, "empty version component"));
            }
            if !field.bytes().all(|b| b.is_ascii_digit()) {
                return Err(BadVersionString::new(
                    input,
                    format!("component '{}' is not a decimal integer", field),
                ));
            }
            let value: u64 = field
                .parse()
                .map_err(|_| BadVersionString::new(input, format!("component '{}' out of range", field)))?;
            if value > MAX_COMPONENT {
                return Err(BadVersionString::new(
                    input,
                    format!("component '{}' exceeds {}", field, MAX_COMPONENT),
                ));
            }
            parts[i] = value as u32;
        }

        Ok(Self { parts })
    }

    /// Build a version from its four components.
    pub fn new(major: u32, minor: u32, patch: u32, enumerator: u32) -> Self {
        Self {
            parts: [major, minor, patch, enumerator],
        }
    }

    /// Whether this is the `0.0.0.0` sentinel.
    pub fn is_zero(&self) -> bool {
        self.parts == [0, 0, 0, 0]
    }

    pub fn major(&self) -> u32 {
        self.parts[0]
    }

    pub fn minor(&self) -> u32 {
        self.parts[1]
    }

    pub fn patch(&self) -> u32 {
        self.parts[2]
    }

    /// The three-part `major.minor.patch` string that addresses a schema
    /// file in the dictionary.
    pub fn schema_version(&self) -> String {
        format!("{}.{}.{}", self.parts[0], self.parts[1], self.parts[2])
    }

    /// The fourth component, selecting an enumerator set.
    pub fn enumerator_version(&self) -> u32 {
        self.parts[3]
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.parts[0], self.parts[1], self.parts[2], self.parts[3]
        )
    }
}

impl FromStr for VersionNumber {
    type Err = BadVersionString;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for VersionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        VersionNumber::parse(&raw).map_err(de::Error::custom)
    }
}

//! Custom type dictionary
//!
//! Types live under `dictionary/types/`. A type is either *primitive*
//! (directly renderable) or *complex* (a schema-language document that
//! resolves recursively through the schema resolver).
//!
//! A primitive in *common* form carries one `schema` object reused for
//! both output formats; the BSON rendering renames the top-level `type`
//! to `bsonType` and maps `integer` → `int` and `number` → `double`.
//! A *format-specific* primitive carries `json_schema` and `bson_schema`
//! objects that are used verbatim.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::validation::{IssueKind, ValidationIssue};

/// How a primitive type renders.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveForm {
    /// One schema for both formats, modulo the `type`/`bsonType` rename.
    Common(Value),
    /// Separate schemas used verbatim per format.
    Split { json: Value, bson: Value },
}

/// One entry in the dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Primitive(PrimitiveForm),
    /// Raw schema-language document; the resolver parses and expands it.
    Complex(Value),
}

/// A named custom type with its authored description.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeEntry {
    pub description: Option<String>,
    pub def: TypeDef,
}

/// All custom types, keyed by name.
#[derive(Debug, Default)]
pub struct TypeDictionary {
    entries: BTreeMap<String, TypeEntry>,
}

impl TypeDictionary {
    /// Build the dictionary from parsed `dictionary/types/*` documents.
    ///
    /// Unclassifiable documents are reported and skipped; everything
    /// else is registered so resolution can proceed.
    pub fn build(documents: &BTreeMap<String, Value>) -> (Self, Vec<ValidationIssue>) {
        let mut dictionary = Self::default();
        let mut issues = Vec::new();

        for (name, doc) in documents {
            let path = format!("dictionary/types/{}", name);
            let Some(fields) = doc.as_object() else {
                issues.push(ValidationIssue::new(
                    &path,
                    IssueKind::MalformedFile,
                    "type definition must be a mapping",
                ));
                continue;
            };

            let description = fields
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);

            let has_schema = fields.contains_key("schema");
            let has_json = fields.contains_key("json_schema");
            let has_bson = fields.contains_key("bson_schema");

            let def = if has_schema {
                if has_json || has_bson {
                    issues.push(ValidationIssue::new(
                        &path,
                        IssueKind::MissingTypeField,
                        "primitive type cannot mix 'schema' with format-specific schemas",
                    ));
                    continue;
                }
                TypeDef::Primitive(PrimitiveForm::Common(fields["schema"].clone()))
            } else if has_json && has_bson {
                TypeDef::Primitive(PrimitiveForm::Split {
                    json: fields["json_schema"].clone(),
                    bson: fields["bson_schema"].clone(),
                })
            } else if has_json || has_bson {
                issues.push(ValidationIssue::new(
                    &path,
                    IssueKind::MissingTypeField,
                    "format-specific primitive requires both 'json_schema' and 'bson_schema'",
                ));
                continue;
            } else if fields.contains_key("type") {
                TypeDef::Complex(doc.clone())
            } else {
                issues.push(ValidationIssue::new(
                    &path,
                    IssueKind::MissingTypeField,
                    "type definition requires 'schema', 'json_schema'/'bson_schema', or 'type'",
                ));
                continue;
            };

            dictionary.entries.insert(name.clone(), TypeEntry { description, def });
        }

        (dictionary, issues)
    }

    pub fn get(&self, name: &str) -> Option<&TypeEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all registered types.
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }
}

/// BSON rendering of a common-form primitive schema: the top-level
/// `type` key becomes `bsonType`, with `integer` → `int` and `number` →
/// `double`. No other transformation is applied.
pub fn bson_from_common(schema: &Value) -> Value {
    let Some(fields) = schema.as_object() else {
        return schema.clone();
    };

    let mut result = Map::new();
    for (key, value) in fields {
        if key == "type" {
            let mapped = match value.as_str() {
                Some("integer") => Value::from("int"),
                Some("number") => Value::from("double"),
                _ => value.clone(),
            };
            result.insert("bsonType".to_string(), mapped);
        } else {
            result.insert(key.clone(), value.clone());
        }
    }
    Value::Object(result)
}

//! Schema node model
//!
//! Nodes are parsed into a tagged sum so the resolver can match
//! exhaustively instead of probing maps. Parsing accumulates issues and
//! keeps going; a node that cannot be represented at all yields `None`
//! while its siblings continue to load.

use serde_json::Value;

use crate::validation::{IssueKind, ValidationIssue};

/// One node of the schema language.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    /// Authored description, propagated verbatim into rendered output.
    pub description: Option<String>,
    /// Whether the enclosing object lists this node in `required`.
    pub required: bool,
    pub kind: SchemaKind,
}

/// The node variants of the schema language.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Object {
        properties: Vec<(String, SchemaNode)>,
        additional_properties: bool,
    },
    Array {
        items: Box<SchemaNode>,
    },
    Enum {
        enums: String,
    },
    EnumArray {
        enums: String,
    },
    OneOf {
        type_property: String,
        /// Common properties shared by every branch (may be empty).
        properties: Vec<(String, SchemaNode)>,
        /// Discriminator value → branch schema, in authored order.
        schemas: Vec<(String, SchemaNode)>,
    },
    /// A named custom type, resolved through the type dictionary.
    Named {
        name: String,
    },
    /// A reference to another dictionary file.
    Ref {
        target: String,
    },
}

impl SchemaNode {
    /// Parse a node from a loaded document value.
    ///
    /// `path` anchors any recorded issues (`file.property.subproperty`).
    pub fn parse(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) -> Option<SchemaNode> {
        let Some(fields) = value.as_object() else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MalformedFile,
                "schema node must be a mapping",
            ));
            return None;
        };

        let description = fields
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);
        let required = fields.get("required").and_then(Value::as_bool).unwrap_or(false);

        if let Some(target) = fields.get("$ref") {
            let Some(target) = target.as_str() else {
                issues.push(ValidationIssue::new(
                    path,
                    IssueKind::UnknownRef,
                    "$ref must be a file name",
                ));
                return None;
            };
            return Some(SchemaNode {
                description,
                required,
                kind: SchemaKind::Ref {
                    target: target.to_string(),
                },
            });
        }

        let Some(type_name) = fields.get("type") else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                "schema node requires a 'type' (or '$ref')",
            ));
            return None;
        };
        let Some(type_name) = type_name.as_str() else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                "'type' must be a string",
            ));
            return None;
        };

        let kind = match type_name {
            "object" => Self::parse_object(fields, path, issues)?,
            "array" => Self::parse_array(fields, path, issues)?,
            "enum" | "enum_array" => Self::parse_enum(fields, type_name, path, issues)?,
            "one_of" => Self::parse_one_of(fields, path, issues)?,
            name => SchemaKind::Named {
                name: name.to_string(),
            },
        };

        Some(SchemaNode {
            description,
            required,
            kind,
        })
    }

    fn parse_object(
        fields: &serde_json::Map<String, Value>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<SchemaKind> {
        let Some(raw_properties) = fields.get("properties").and_then(Value::as_object) else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                "object type requires a 'properties' mapping",
            ));
            return None;
        };

        let properties = parse_properties(raw_properties, path, issues);

        let additional_properties = fields
            .get("additionalProperties")
            .or_else(|| fields.get("additional_properties"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Some(SchemaKind::Object {
            properties,
            additional_properties,
        })
    }

    fn parse_array(
        fields: &serde_json::Map<String, Value>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<SchemaKind> {
        let Some(raw_items) = fields.get("items") else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                "array type requires an 'items' definition",
            ));
            return None;
        };

        let items = SchemaNode::parse(raw_items, &format!("{}.items", path), issues)?;
        Some(SchemaKind::Array {
            items: Box::new(items),
        })
    }

    fn parse_enum(
        fields: &serde_json::Map<String, Value>,
        type_name: &str,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<SchemaKind> {
        let Some(enums) = fields.get("enums").and_then(Value::as_str) else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                format!("{} type requires an 'enums' reference", type_name),
            ));
            return None;
        };

        let enums = enums.to_string();
        Some(if type_name == "enum" {
            SchemaKind::Enum { enums }
        } else {
            SchemaKind::EnumArray { enums }
        })
    }

    fn parse_one_of(
        fields: &serde_json::Map<String, Value>,
        path: &str,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<SchemaKind> {
        let type_property = fields.get("type_property").and_then(Value::as_str);
        if type_property.is_none() {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::MissingTypeField,
                "one_of type requires a 'type_property' discriminator",
            ));
        }

        let schemas = fields.get("schemas").and_then(Value::as_object);
        match schemas {
            None => {
                issues.push(ValidationIssue::new(
                    path,
                    IssueKind::MissingTypeField,
                    "one_of type requires a 'schemas' mapping",
                ));
            }
            Some(map) if map.is_empty() => {
                issues.push(ValidationIssue::new(
                    path,
                    IssueKind::MissingTypeField,
                    "one_of 'schemas' mapping must not be empty",
                ));
            }
            Some(_) => {}
        }

        let (type_property, schemas) = (type_property?, schemas.filter(|m| !m.is_empty())?);

        let properties = fields
            .get("properties")
            .and_then(Value::as_object)
            .map(|raw| parse_properties(raw, path, issues))
            .unwrap_or_default();

        // The discriminator must name a declared base property when the
        // base declares any; with no declared properties it is
        // synthesized into the base at render time.
        if !properties.is_empty() && !properties.iter().any(|(name, _)| name == type_property) {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::InvalidDiscriminator,
                format!(
                    "type_property '{}' does not name a declared property",
                    type_property
                ),
            ));
        }

        let mut branches = Vec::new();
        for (value, branch) in schemas {
            let branch_path = format!("{}.schemas.{}", path, value);
            if let Some(node) = SchemaNode::parse(branch, &branch_path, issues) {
                branches.push((value.clone(), node));
            }
        }

        Some(SchemaKind::OneOf {
            type_property: type_property.to_string(),
            properties,
            schemas: branches,
        })
    }
}

/// Parse an object's property map in authored order, enforcing the
/// description requirement on every property that is not a `$ref`.
fn parse_properties(
    raw: &serde_json::Map<String, Value>,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<(String, SchemaNode)> {
    let mut properties = Vec::new();
    for (name, value) in raw {
        let child_path = format!("{}.{}", path, name);
        let Some(child) = SchemaNode::parse(value, &child_path, issues) else {
            continue;
        };
        if child.description.is_none() && !matches!(child.kind, SchemaKind::Ref { .. }) {
            issues.push(ValidationIssue::new(
                &child_path,
                IssueKind::MissingDescription,
                "property requires a description",
            ));
        }
        properties.push((name.clone(), child));
    }
    properties
}

//! Schema resolution
//!
//! Expands a parsed node tree into a pair of concrete schema documents:
//! one JSON-Schema form and one BSON-schema form, built side by side so
//! they can never drift. Resolution is deterministic (output key order
//! is input insertion order), memoizes `$ref` targets per enumerator
//! version, and accumulates every problem instead of stopping at the
//! first.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};

use crate::enumerators::{EnumeratorError, EnumeratorRegistry};
use crate::types::{bson_from_common, PrimitiveForm, TypeDef, TypeDictionary};
use crate::validation::{IssueKind, ValidationIssue};
use crate::version::VersionNumber;

use super::node::{SchemaKind, SchemaNode};

/// A fully-expanded schema in both output forms.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub json: Value,
    pub bson: Value,
}

impl ResolvedSchema {
    /// Emitted where resolution failed, so siblings can still resolve.
    fn placeholder() -> Self {
        Self {
            json: Value::Object(Map::new()),
            bson: Value::Object(Map::new()),
        }
    }
}

/// The result of resolving one `(collection, version)` pair.
#[derive(Debug)]
pub struct ResolveOutcome {
    /// Best-effort resolved schema; `None` when the schema file itself
    /// was missing or unparseable.
    pub schema: Option<ResolvedSchema>,
    pub issues: Vec<ValidationIssue>,
}

impl ResolveOutcome {
    /// True when resolution produced a schema and no issues.
    pub fn is_clean(&self) -> bool {
        self.schema.is_some() && self.issues.is_empty()
    }
}

/// Per-traversal state: the enumerator version in effect plus the
/// in-flight reference chains used for cycle detection. These stacks are
/// deliberately separate from the memo of finished results.
struct Traversal {
    enum_version: u32,
    ref_stack: Vec<String>,
    type_stack: Vec<String>,
}

impl Traversal {
    fn new(enum_version: u32) -> Self {
        Self {
            enum_version,
            ref_stack: Vec::new(),
            type_stack: Vec::new(),
        }
    }
}

/// Expands schema nodes against the dictionary, type dictionary and
/// enumerator registry.
pub struct SchemaResolver<'a> {
    dictionary: &'a BTreeMap<String, Value>,
    types: &'a TypeDictionary,
    enumerators: &'a EnumeratorRegistry,
    memo: HashMap<(String, u32), ResolvedSchema>,
}

impl<'a> SchemaResolver<'a> {
    pub fn new(
        dictionary: &'a BTreeMap<String, Value>,
        types: &'a TypeDictionary,
        enumerators: &'a EnumeratorRegistry,
    ) -> Self {
        Self {
            dictionary,
            types,
            enumerators,
            memo: HashMap::new(),
        }
    }

    /// Resolve the schema for one collection at one declared version.
    ///
    /// The first three version components address the dictionary file;
    /// the fourth selects the enumerator set.
    pub fn resolve_collection(&mut self, collection: &str, version: &VersionNumber) -> ResolveOutcome {
        let stem = format!("{}.{}", collection, version.schema_version());
        let mut issues = Vec::new();
        let mut ctx = Traversal::new(version.enumerator_version());
        let schema = self.resolve_stem(&stem, &format!("dictionary/{}", stem), &mut ctx, &mut issues);
        ResolveOutcome { schema, issues }
    }

    /// Resolve one dictionary file by stem, following `$ref`s.
    fn resolve_stem(
        &mut self,
        stem: &str,
        at: &str,
        ctx: &mut Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> Option<ResolvedSchema> {
        if ctx.ref_stack.iter().any(|s| s == stem) {
            issues.push(ValidationIssue::new(
                at,
                IssueKind::CircularReference,
                format!("circular $ref chain through '{}'", stem),
            ));
            return None;
        }

        if let Some(hit) = self.memo.get(&(stem.to_string(), ctx.enum_version)) {
            return Some(hit.clone());
        }

        let Some(document) = self.dictionary.get(stem) else {
            issues.push(ValidationIssue::new(
                at,
                IssueKind::UnknownRef,
                format!("no dictionary file '{}'", stem),
            ));
            return None;
        };
        let document = document.clone();

        ctx.ref_stack.push(stem.to_string());
        let path = format!("dictionary/{}", stem);
        let resolved = match SchemaNode::parse(&document, &path, issues) {
            Some(node) => self.resolve_node(&node, &path, ctx, issues),
            None => ResolvedSchema::placeholder(),
        };
        ctx.ref_stack.pop();

        self.memo
            .insert((stem.to_string(), ctx.enum_version), resolved.clone());
        Some(resolved)
    }

    /// Resolve one node into both output forms.
    fn resolve_node(
        &mut self,
        node: &SchemaNode,
        path: &str,
        ctx: &mut Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> ResolvedSchema {
        match &node.kind {
            SchemaKind::Object {
                properties,
                additional_properties,
            } => self.resolve_object(node, properties, *additional_properties, path, ctx, issues),
            SchemaKind::Array { items } => {
                let resolved_items = self.resolve_node(items, &format!("{}.items", path), ctx, issues);
                let mut json = described_map(node);
                let mut bson = described_map(node);
                json.insert("type".into(), Value::from("array"));
                bson.insert("bsonType".into(), Value::from("array"));
                json.insert("items".into(), resolved_items.json);
                bson.insert("items".into(), resolved_items.bson);
                ResolvedSchema {
                    json: Value::Object(json),
                    bson: Value::Object(bson),
                }
            }
            SchemaKind::Enum { enums } => {
                let values = self.enum_values(enums, path, ctx, issues);
                let mut json = described_map(node);
                let mut bson = described_map(node);
                json.insert("type".into(), Value::from("string"));
                bson.insert("bsonType".into(), Value::from("string"));
                json.insert("enum".into(), values.clone());
                bson.insert("enum".into(), values);
                ResolvedSchema {
                    json: Value::Object(json),
                    bson: Value::Object(bson),
                }
            }
            SchemaKind::EnumArray { enums } => {
                let values = self.enum_values(enums, path, ctx, issues);
                let mut json_items = Map::new();
                json_items.insert("type".into(), Value::from("string"));
                json_items.insert("enum".into(), values.clone());
                let mut bson_items = Map::new();
                bson_items.insert("bsonType".into(), Value::from("string"));
                bson_items.insert("enum".into(), values);

                let mut json = described_map(node);
                let mut bson = described_map(node);
                json.insert("type".into(), Value::from("array"));
                bson.insert("bsonType".into(), Value::from("array"));
                json.insert("items".into(), Value::Object(json_items));
                bson.insert("items".into(), Value::Object(bson_items));
                ResolvedSchema {
                    json: Value::Object(json),
                    bson: Value::Object(bson),
                }
            }
            SchemaKind::OneOf {
                type_property,
                properties,
                schemas,
            } => self.resolve_one_of(node, type_property, properties, schemas, path, ctx, issues),
            SchemaKind::Named { name } => self.resolve_named(node, name, path, ctx, issues),
            SchemaKind::Ref { target } => {
                let stem = strip_extension(target);
                let resolved = self
                    .resolve_stem(stem, path, ctx, issues)
                    .unwrap_or_else(ResolvedSchema::placeholder);
                override_description(resolved, node.description.as_deref())
            }
        }
    }

    fn resolve_object(
        &mut self,
        node: &SchemaNode,
        properties: &[(String, SchemaNode)],
        additional_properties: bool,
        path: &str,
        ctx: &mut Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> ResolvedSchema {
        let mut json_props = Map::new();
        let mut bson_props = Map::new();
        let mut required = Vec::new();

        for (name, child) in properties {
            let resolved = self.resolve_node(child, &format!("{}.{}", path, name), ctx, issues);
            json_props.insert(name.clone(), resolved.json);
            bson_props.insert(name.clone(), resolved.bson);
            if child.required {
                required.push(Value::from(name.clone()));
            }
        }

        let mut json = described_map(node);
        let mut bson = described_map(node);
        json.insert("type".into(), Value::from("object"));
        bson.insert("bsonType".into(), Value::from("object"));
        json.insert("properties".into(), Value::Object(json_props));
        bson.insert("properties".into(), Value::Object(bson_props));
        if !required.is_empty() {
            json.insert("required".into(), Value::Array(required.clone()));
            bson.insert("required".into(), Value::Array(required));
        }
        json.insert("additionalProperties".into(), Value::Bool(additional_properties));
        bson.insert("additionalProperties".into(), Value::Bool(additional_properties));

        ResolvedSchema {
            json: Value::Object(json),
            bson: Value::Object(bson),
        }
    }

    fn resolve_one_of(
        &mut self,
        node: &SchemaNode,
        type_property: &str,
        properties: &[(String, SchemaNode)],
        schemas: &[(String, SchemaNode)],
        path: &str,
        ctx: &mut Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> ResolvedSchema {
        let discriminators: Vec<Value> = schemas.iter().map(|(v, _)| Value::from(v.clone())).collect();

        let declared_tp = properties
            .iter()
            .find(|(name, _)| name == type_property)
            .map(|(_, n)| n);
        let tp_description = declared_tp.and_then(|n| n.description.clone());

        let discriminator_schema = |type_key: &str, type_value: &str| {
            let mut m = Map::new();
            if let Some(d) = &tp_description {
                m.insert("description".into(), Value::from(d.clone()));
            }
            m.insert(type_key.into(), Value::from(type_value));
            m.insert("enum".into(), Value::Array(discriminators.clone()));
            Value::Object(m)
        };

        let mut json_props = Map::new();
        let mut bson_props = Map::new();
        let mut required = vec![Value::from(type_property)];

        // A discriminator absent from the declared base properties is
        // synthesized as the first property.
        if declared_tp.is_none() {
            json_props.insert(type_property.into(), discriminator_schema("type", "string"));
            bson_props.insert(type_property.into(), discriminator_schema("bsonType", "string"));
        }

        for (name, child) in properties {
            if name == type_property {
                json_props.insert(name.clone(), discriminator_schema("type", "string"));
                bson_props.insert(name.clone(), discriminator_schema("bsonType", "string"));
                continue;
            }
            let resolved = self.resolve_node(child, &format!("{}.{}", path, name), ctx, issues);
            json_props.insert(name.clone(), resolved.json);
            bson_props.insert(name.clone(), resolved.bson);
            if child.required {
                required.push(Value::from(name.clone()));
            }
        }

        let mut one_of_json = Vec::new();
        let mut one_of_bson = Vec::new();
        for (value, branch) in schemas {
            let resolved = self.resolve_node(branch, &format!("{}.schemas.{}", path, value), ctx, issues);
            one_of_json.push(alternative(type_property, value, resolved.json));
            one_of_bson.push(alternative(type_property, value, resolved.bson));
        }

        let mut json = described_map(node);
        let mut bson = described_map(node);
        json.insert("type".into(), Value::from("object"));
        bson.insert("bsonType".into(), Value::from("object"));
        json.insert("properties".into(), Value::Object(json_props));
        bson.insert("properties".into(), Value::Object(bson_props));
        json.insert("required".into(), Value::Array(required.clone()));
        bson.insert("required".into(), Value::Array(required));
        json.insert("oneOf".into(), Value::Array(one_of_json));
        bson.insert("oneOf".into(), Value::Array(one_of_bson));

        ResolvedSchema {
            json: Value::Object(json),
            bson: Value::Object(bson),
        }
    }

    fn resolve_named(
        &mut self,
        node: &SchemaNode,
        name: &str,
        path: &str,
        ctx: &mut Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> ResolvedSchema {
        let Some(entry) = self.types.get(name) else {
            issues.push(ValidationIssue::new(
                path,
                IssueKind::UnknownType,
                format!("unknown type '{}'", name),
            ));
            return ResolvedSchema::placeholder();
        };

        let description = node
            .description
            .as_deref()
            .or(entry.description.as_deref())
            .map(str::to_string);

        match entry.def.clone() {
            TypeDef::Primitive(PrimitiveForm::Common(schema)) => ResolvedSchema {
                bson: with_description(bson_from_common(&schema), description.as_deref()),
                json: with_description(schema, description.as_deref()),
            },
            TypeDef::Primitive(PrimitiveForm::Split { json, bson }) => ResolvedSchema {
                json: with_description(json, description.as_deref()),
                bson: with_description(bson, description.as_deref()),
            },
            TypeDef::Complex(document) => {
                if ctx.type_stack.iter().any(|n| n == name) {
                    issues.push(ValidationIssue::new(
                        path,
                        IssueKind::CircularTypeReference,
                        format!("circular type reference through '{}'", name),
                    ));
                    return ResolvedSchema::placeholder();
                }

                ctx.type_stack.push(name.to_string());
                let type_path = format!("dictionary/types/{}", name);
                let resolved = match SchemaNode::parse(&document, &type_path, issues) {
                    Some(parsed) => self.resolve_node(&parsed, &type_path, ctx, issues),
                    None => ResolvedSchema::placeholder(),
                };
                ctx.type_stack.pop();

                override_description(resolved, node.description.as_deref())
            }
        }
    }

    fn enum_values(
        &self,
        enums: &str,
        path: &str,
        ctx: &Traversal,
        issues: &mut Vec<ValidationIssue>,
    ) -> Value {
        match self.enumerators.values(enums, ctx.enum_version) {
            Ok(values) => Value::Array(values.into_iter().map(Value::from).collect()),
            Err(error) => {
                let kind = match error {
                    EnumeratorError::UnknownEnumerator { .. } => IssueKind::UnknownEnumerator,
                    EnumeratorError::UnknownEnumeratorVersion { .. } => {
                        IssueKind::UnknownEnumeratorVersion
                    }
                };
                issues.push(ValidationIssue::new(path, kind, error.to_string()));
                Value::Array(Vec::new())
            }
        }
    }
}

/// One `oneOf` alternative: `{ if: { properties: { <tp>: { const: v } } },
/// then: <branch> }`.
fn alternative(type_property: &str, value: &str, branch: Value) -> Value {
    let mut const_map = Map::new();
    const_map.insert("const".into(), Value::from(value));
    let mut tp_map = Map::new();
    tp_map.insert(type_property.into(), Value::Object(const_map));
    let mut props_map = Map::new();
    props_map.insert("properties".into(), Value::Object(tp_map));
    let mut alt = Map::new();
    alt.insert("if".into(), Value::Object(props_map));
    alt.insert("then".into(), branch);
    Value::Object(alt)
}

/// A fresh output map carrying the node's description, when present.
fn described_map(node: &SchemaNode) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(d) = &node.description {
        map.insert("description".into(), Value::from(d.clone()));
    }
    map
}

/// Rebuild `schema` with `description` as the leading key.
fn with_description(schema: Value, description: Option<&str>) -> Value {
    let Some(description) = description else {
        return schema;
    };
    let Some(fields) = schema.as_object() else {
        return schema;
    };

    let mut result = Map::new();
    result.insert("description".into(), Value::from(description));
    for (key, value) in fields {
        if key != "description" {
            result.insert(key.clone(), value.clone());
        }
    }
    Value::Object(result)
}

/// Overwrite the resolved description when the referring node has one.
fn override_description(resolved: ResolvedSchema, description: Option<&str>) -> ResolvedSchema {
    match description {
        Some(d) => ResolvedSchema {
            json: with_description(resolved.json, Some(d)),
            bson: with_description(resolved.bson, Some(d)),
        },
        None => resolved,
    }
}

fn strip_extension(target: &str) -> &str {
    target
        .strip_suffix(".yaml")
        .or_else(|| target.strip_suffix(".yml"))
        .or_else(|| target.strip_suffix(".json"))
        .unwrap_or(target)
}

//! Schema renderers
//!
//! Pure functions from a resolved schema to the three external
//! documents: a JSON-Schema fragment for API consumers, a BSON-schema
//! fragment ready to install as a `$jsonSchema` validator, and a
//! minimal OpenAPI component excerpt.

use serde_json::{Map, Value};

use super::resolver::ResolvedSchema;

/// Draft tag stamped on rendered JSON-Schema documents.
pub const JSON_SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// The JSON-Schema document, with the `$schema` draft tag leading.
pub fn render_json_schema(resolved: &ResolvedSchema) -> Value {
    let Some(fields) = resolved.json.as_object() else {
        return resolved.json.clone();
    };

    let mut result = Map::new();
    result.insert("$schema".into(), Value::from(JSON_SCHEMA_DRAFT));
    for (key, value) in fields {
        result.insert(key.clone(), value.clone());
    }
    Value::Object(result)
}

/// The BSON-schema fragment suitable for a collection validator.
pub fn render_bson_schema(resolved: &ResolvedSchema) -> Value {
    resolved.bson.clone()
}

/// A component-schemas excerpt naming the collection.
pub fn render_openapi(collection: &str, resolved: &ResolvedSchema) -> Value {
    let mut schemas = Map::new();
    schemas.insert(collection.to_string(), resolved.json.clone());
    let mut components = Map::new();
    components.insert("schemas".into(), Value::Object(schemas));
    let mut root = Map::new();
    root.insert("components".into(), Value::Object(components));
    Value::Object(root)
}

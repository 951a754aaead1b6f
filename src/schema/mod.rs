//! Schema language: node model, resolver, renderers
//!
//! Dictionary files are written in a small YAML-expressed dialect with
//! named custom types, enumerator references, discriminated unions and
//! file references. This module parses those documents into a tagged
//! node tree, expands the tree into concrete JSON-Schema and
//! BSON-schema forms, and renders the external documents.

mod node;
mod renderer;
mod resolver;

pub use node::{SchemaKind, SchemaNode};
pub use renderer::{render_bson_schema, render_json_schema, render_openapi, JSON_SCHEMA_DRAFT};
pub use resolver::{ResolveOutcome, ResolvedSchema, SchemaResolver};

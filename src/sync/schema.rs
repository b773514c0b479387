//! Document shapes at the storage boundary
//!
//! Typed collections are stored as `{ <field>: payload }`. Reading accepts
//! exactly two shapes per collection:
//! - the wrapped document (extra metadata fields ignored)
//! - a bare payload of the right kind (array or object), as older caches hold
//!
//! Anything else is rejected; typed loaders turn a rejection into the empty
//! value and log it.

use super::models::{Collection, Shape};
use serde_json::{Map, Value};

/// Fields the engine stamps on every remote write
pub const METADATA_FIELDS: [&str; 3] = ["userId", "updatedAt", "syncedAt"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("{collection}: expected {expected}, found {found}")]
    WrongShape {
        collection: Collection,
        expected: &'static str,
        found: &'static str,
    },
}

/// Wrap a payload into the stored document shape
pub fn wrap(collection: Collection, payload: Value) -> Value {
    let mut document = Map::new();
    document.insert(collection.field().to_string(), payload);
    Value::Object(document)
}

/// Extract and validate the payload of a stored document
pub fn normalize(collection: Collection, raw: &Value) -> Result<Value, ShapeError> {
    if raw.is_null() {
        return Ok(collection.empty_value());
    }

    let payload = match raw.get(collection.field()) {
        Some(Value::Null) => return Ok(collection.empty_value()),
        Some(inner) => inner,
        None => raw,
    };

    match (collection.shape(), payload) {
        (Shape::List, Value::Array(_)) => Ok(payload.clone()),
        (Shape::Map, Value::Object(map)) => {
            let mut map = map.clone();
            for field in METADATA_FIELDS {
                map.remove(field);
            }
            Ok(Value::Object(map))
        }
        (shape, other) => Err(ShapeError::WrongShape {
            collection,
            expected: match shape {
                Shape::List => "array",
                Shape::Map => "object",
            },
            found: kind(other),
        }),
    }
}

/// `normalize`, falling back to the empty value on a shape mismatch
pub fn normalize_or_empty(collection: Collection, raw: &Value) -> Value {
    normalize(collection, raw).unwrap_or_else(|e| {
        log::warn!("Discarding malformed document: {}", e);
        collection.empty_value()
    })
}

/// Items of a list collection; empty for anything malformed
pub fn list_items(collection: Collection, raw: &Value) -> Vec<Value> {
    match normalize_or_empty(collection, raw) {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

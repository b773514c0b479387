//! Item-level merge for array-valued collections
//!
//! Last-writer-wins keyed by item `id`:
//! - cloud items seed the result, tagged `source: "cloud"`
//! - a local item replaces its cloud twin only when its `updatedAt`
//!   (falling back to `timestamp`) is strictly greater; ties keep cloud
//! - items without an `id` are dropped
//! - output is sorted newest first by `timestamp` (falling back to `createdAt`)
//!
//! Whole items win; fields of the same item are never combined.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::HashMap;

pub const SOURCE_FIELD: &str = "source";
pub const SOURCE_CLOUD: &str = "cloud";
pub const SOURCE_LOCAL: &str = "local";

/// Merge divergent cloud and local copies of one collection.
///
/// Either side may be the bare item array or a document carrying the array
/// under `field`. When one side is not an array at all, the non-empty side is
/// returned unchanged (cloud wins when both are non-empty).
pub fn intelligent_merge(cloud: &Value, local: &Value, field: &str) -> Value {
    let cloud_items = unwrap_field(cloud, field);
    let local_items = unwrap_field(local, field);

    if !cloud_items.is_array() || !local_items.is_array() {
        log::warn!("Cannot merge '{}': payload is not an item list", field);
        return if !is_empty_value(&cloud_items) || is_empty_value(&local_items) {
            cloud_items
        } else {
            local_items
        };
    }
    let cloud_list = cloud_items.as_array().map(Vec::as_slice).unwrap_or_default();
    let local_list = local_items.as_array().map(Vec::as_slice).unwrap_or_default();

    let mut merged: Vec<Value> = Vec::with_capacity(cloud_list.len() + local_list.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for item in cloud_list {
        let Some(id) = item_id(item) else { continue };
        let tagged = tag_source(item, SOURCE_CLOUD);
        match positions.get(&id) {
            Some(&pos) => merged[pos] = tagged,
            None => {
                positions.insert(id, merged.len());
                merged.push(tagged);
            }
        }
    }

    for item in local_list {
        let Some(id) = item_id(item) else { continue };
        match positions.get(&id) {
            Some(&pos) => {
                if updated_at_millis(item) > updated_at_millis(&merged[pos]) {
                    merged[pos] = tag_source(item, SOURCE_LOCAL);
                }
            }
            None => {
                positions.insert(id, merged.len());
                merged.push(tag_source(item, SOURCE_LOCAL));
            }
        }
    }

    // Stable, so equal timestamps keep insertion order
    merged.sort_by(|a, b| sort_millis(b).cmp(&sort_millis(a)));

    log::debug!(
        "Merged '{}': {} cloud + {} local -> {} items",
        field,
        cloud_list.len(),
        local_list.len(),
        merged.len()
    );

    Value::Array(merged)
}

/// `doc[field]` when present, the value itself otherwise; null becomes `[]`
fn unwrap_field(value: &Value, field: &str) -> Value {
    let inner = match value.get(field) {
        Some(inner) if !inner.is_null() => inner,
        _ => value,
    };
    if inner.is_null() {
        Value::Array(Vec::new())
    } else {
        inner.clone()
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Item identity; string or numeric ids are accepted
pub fn item_id(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn tag_source(item: &Value, source: &str) -> Value {
    let mut tagged = item.clone();
    if let Value::Object(map) = &mut tagged {
        map.insert(SOURCE_FIELD.to_string(), Value::String(source.to_string()));
    }
    tagged
}

/// Conflict timestamp: `updatedAt`, then `timestamp`, else epoch
pub fn updated_at_millis(item: &Value) -> i64 {
    first_timestamp(item, &["updatedAt", "timestamp"])
}

/// Ordering timestamp: `timestamp`, then `createdAt`, else epoch
pub fn sort_millis(item: &Value) -> i64 {
    first_timestamp(item, &["timestamp", "createdAt"])
}

/// The first field that is set decides; an unparsable value counts as epoch
fn first_timestamp(item: &Value, fields: &[&str]) -> i64 {
    fields
        .iter()
        .filter_map(|field| item.get(*field))
        .find(|value| is_set(value))
        .and_then(timestamp_millis)
        .unwrap_or(0)
}

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// Epoch milliseconds from a number or a date string.
///
/// Accepted strings: RFC 3339, offset-less date-times and plain dates (read
/// as UTC), or a bare millisecond count.
pub fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) if !s.is_empty() => parse_date_string(s.trim()),
        _ => None,
    }
}

fn parse_date_string(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis());
    }
    s.parse::<i64>().ok()
}

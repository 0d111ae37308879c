// ABOUTME: Raw item to normalized record transformation with defaults and coercion
// ABOUTME: Never fails; missing or malformed source fields degrade to declared defaults
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Record Transformer
//!
//! [`transform`] maps one raw item onto a [`NormalizedRecord`] using the
//! route's declarative field mappings. It never fails: upstream data is
//! untrusted, and a partial record with defaults beats a failed sync.
//!
//! Coercion rules:
//!
//! - numeric columns safe-parse string values; malformed input falls back
//!   to the declared default instead of erroring
//! - date/time columns are normalized to RFC 3339 UTC regardless of the
//!   source format
//! - `json_text` columns serialize nested arrays/objects to canonical JSON
//!   text, the deliberate flat-schema simplification used by the
//!   destination
//!
//! Primary key invariant: key columns are always present and non-null in
//! the output, substituting a deterministic derived key when the source
//! omits the field entirely.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

use riptide_core::NormalizedRecord;

use crate::catalog::{ColumnType, FieldMapping, PrimaryKey, Route};

/// Resolve a source location within an item
///
/// Accepts a JSON pointer (`/profile/name`) or a bare top-level field name.
#[must_use]
pub fn lookup<'v>(item: &'v Value, source: &str) -> Option<&'v Value> {
    if source.starts_with('/') {
        item.pointer(source)
    } else {
        item.get(source)
    }
}

/// Map one raw item to a normalized record
///
/// `index` is the item's running position within the route's run, used for
/// parent-index keys and derived-key fallbacks.
#[must_use]
pub fn transform(route: &Route, item: &Value, index: usize) -> NormalizedRecord {
    let mut fields = std::collections::BTreeMap::new();
    for mapping in &route.mapping {
        let value = coerce(lookup(item, &mapping.source), mapping);
        fields.insert(mapping.column.clone(), value);
    }

    if let PrimaryKey::ParentIndex { index_column, .. } = &route.primary_key {
        fields.insert(index_column.clone(), Value::from(index as u64));
    }

    let key_columns: Vec<String> = route
        .primary_key
        .columns()
        .into_iter()
        .map(str::to_owned)
        .collect();

    // Key columns must never be absent or null; derive a deterministic
    // fallback from the route name and item position when the source
    // omits the field.
    for column in &key_columns {
        let missing = fields
            .get(column)
            .is_none_or(|value| matches!(value, Value::Null));
        if missing {
            fields.insert(column.clone(), Value::String(format!("{}-{index}", route.name)));
        }
    }

    NormalizedRecord {
        table: route.table.clone(),
        key_columns,
        fields,
    }
}

fn coerce(value: Option<&Value>, mapping: &FieldMapping) -> Value {
    let Some(value) = value else {
        return mapping.default.clone();
    };
    if value.is_null() {
        return mapping.default.clone();
    }
    match mapping.ty {
        ColumnType::String => coerce_string(value).unwrap_or_else(|| mapping.default.clone()),
        ColumnType::Int => coerce_int(value).unwrap_or_else(|| mapping.default.clone()),
        ColumnType::Float => coerce_float(value).unwrap_or_else(|| mapping.default.clone()),
        ColumnType::Bool => coerce_bool(value).unwrap_or_else(|| mapping.default.clone()),
        ColumnType::UtcDatetime => {
            coerce_datetime(value).unwrap_or_else(|| mapping.default.clone())
        }
        // Canonical JSON text of the nested value, whatever its shape
        ColumnType::JsonText => Value::String(value.to_string()),
    }
}

fn coerce_string(value: &Value) -> Option<Value> {
    match value {
        Value::String(s) => Some(Value::String(s.clone())),
        Value::Number(n) => Some(Value::String(n.to_string())),
        Value::Bool(b) => Some(Value::String(b.to_string())),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Value::from),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n.as_f64().map(Value::from),
        Value::String(s) => s.trim().parse::<f64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(b) => Some(Value::Bool(*b)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_datetime(value: &Value) -> Option<Value> {
    let text = value.as_str()?;
    canonical_utc(text).map(Value::String)
}

/// Normalize a textual date/time to RFC 3339 UTC
///
/// Accepts RFC 3339 with any offset, a naive `YYYY-MM-DD HH:MM:SS`, or a
/// bare `YYYY-MM-DD` date (midnight UTC). Returns `None` for anything
/// unrecognized.
#[must_use]
pub fn canonical_utc(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(
            parsed
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Some(
            Utc.from_utc_datetime(&naive)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(
            Utc.from_utc_datetime(&midnight)
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        );
    }
    None
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::catalog::{Auth, HttpMethod, Pagination};

    fn route_with(mapping: Vec<FieldMapping>, primary_key: PrimaryKey) -> Route {
        Route {
            name: "activity".into(),
            endpoint: "https://example.com/v1/activity".into(),
            method: HttpMethod::Get,
            body: None,
            params: BTreeMap::new(),
            pagination: Pagination::None,
            frequency: None,
            table: "daily_activity".into(),
            items_pointer: "/data".into(),
            auth: Auth::None,
            mapping,
            primary_key,
            max_records: None,
            request_delay_ms: 0,
        }
    }

    fn mapping(source: &str, column: &str, ty: ColumnType, default: Value) -> FieldMapping {
        FieldMapping {
            source: source.into(),
            column: column.into(),
            ty,
            default,
        }
    }

    #[test]
    fn missing_fields_get_declared_defaults() {
        let route = route_with(
            vec![
                mapping("id", "id", ColumnType::String, Value::Null),
                mapping("score", "score", ColumnType::Int, json!(0)),
                mapping("label", "label", ColumnType::String, json!("Unknown")),
            ],
            PrimaryKey::Field { column: "id".into() },
        );
        let record = transform(&route, &json!({"id": "r1"}), 0);
        assert_eq!(record.fields["score"], json!(0));
        assert_eq!(record.fields["label"], json!("Unknown"));
    }

    #[test]
    fn malformed_numeric_string_falls_back_to_default() {
        let route = route_with(
            vec![
                mapping("id", "id", ColumnType::String, Value::Null),
                mapping("steps", "steps", ColumnType::Int, json!(0)),
                mapping("hrv", "hrv", ColumnType::Float, Value::Null),
            ],
            PrimaryKey::Field { column: "id".into() },
        );
        let record = transform(
            &route,
            &json!({"id": "r1", "steps": "not-a-number", "hrv": "63.5"}),
            0,
        );
        assert_eq!(record.fields["steps"], json!(0));
        assert_eq!(record.fields["hrv"], json!(63.5));
    }

    #[test]
    fn string_numbers_safe_parse() {
        let route = route_with(
            vec![
                mapping("id", "id", ColumnType::String, Value::Null),
                mapping("count", "count", ColumnType::Int, Value::Null),
            ],
            PrimaryKey::Field { column: "id".into() },
        );
        let record = transform(&route, &json!({"id": "r1", "count": "42"}), 0);
        assert_eq!(record.fields["count"], json!(42));
    }

    #[test]
    fn dates_normalize_to_rfc3339_utc() {
        assert_eq!(
            canonical_utc("2024-01-01T06:00:00+05:00").unwrap(),
            "2024-01-01T01:00:00Z"
        );
        assert_eq!(
            canonical_utc("2024-06-01 12:30:00").unwrap(),
            "2024-06-01T12:30:00Z"
        );
        assert_eq!(canonical_utc("2024-06-01").unwrap(), "2024-06-01T00:00:00Z");
        assert!(canonical_utc("last tuesday").is_none());
    }

    #[test]
    fn nested_collections_serialize_to_json_text() {
        let route = route_with(
            vec![
                mapping("id", "id", ColumnType::String, Value::Null),
                mapping(
                    "movement_30_sec",
                    "movement_30_sec",
                    ColumnType::JsonText,
                    json!("[]"),
                ),
            ],
            PrimaryKey::Field { column: "id".into() },
        );
        let record = transform(
            &route,
            &json!({"id": "r1", "movement_30_sec": [1, 2, 3]}),
            0,
        );
        assert_eq!(record.fields["movement_30_sec"], json!("[1,2,3]"));
    }

    #[test]
    fn primary_key_never_null_even_when_source_omits_it() {
        let route = route_with(
            vec![mapping("id", "id", ColumnType::String, Value::Null)],
            PrimaryKey::Field { column: "id".into() },
        );
        let record = transform(&route, &json!({"name": "no id here"}), 7);
        assert_eq!(record.fields["id"], json!("activity-7"));
        assert!(record.key_values().iter().all(|v| !v.is_null()));
    }

    #[test]
    fn parent_index_key_synthesizes_index_column() {
        let route = route_with(
            vec![mapping("park_id", "park_id", ColumnType::String, Value::Null)],
            PrimaryKey::ParentIndex {
                parent_column: "park_id".into(),
                index_column: "position".into(),
            },
        );
        let record = transform(&route, &json!({"park_id": "yose"}), 3);
        assert_eq!(record.fields["position"], json!(3));
        assert_eq!(record.key_text(), "yose:3");
    }

    #[test]
    fn pointer_sources_resolve_nested_fields() {
        let item = json!({"profile": {"name": "Ada"}});
        assert_eq!(lookup(&item, "/profile/name"), Some(&json!("Ada")));
        assert_eq!(lookup(&item, "profile"), Some(&json!({"name": "Ada"})));
        assert!(lookup(&item, "/missing/path").is_none());
    }
}

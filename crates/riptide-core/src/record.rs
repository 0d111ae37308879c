// ABOUTME: Raw API pages and normalized output records
// ABOUTME: Pages are ephemeral pagination output; records are the engine's only data product
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One raw, decoded API response body
///
/// Owned solely by the pagination stream that produced it and dropped as
/// soon as its items have been transformed.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// 1-based page number within the current run, for logging
    pub number: usize,
    /// Decoded JSON response body
    pub body: Value,
}

impl RawPage {
    /// Wrap a decoded body as a page
    #[must_use]
    pub const fn new(number: usize, body: Value) -> Self {
        Self { number, body }
    }
}

/// A fully normalized output record, ready for an upsert-based sink
///
/// Invariant: every primary key column is present and non-null. Missing
/// source fields were replaced with declared defaults before this record
/// was constructed; a record is all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Destination table name
    pub table: String,
    /// Primary key column names, in declaration order
    pub key_columns: Vec<String>,
    /// Column → value map, defaults already substituted
    pub fields: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    /// Primary key values in declaration order
    ///
    /// Values are guaranteed present and non-null by construction.
    #[must_use]
    pub fn key_values(&self) -> Vec<&Value> {
        self.key_columns
            .iter()
            .filter_map(|column| self.fields.get(column))
            .collect()
    }

    /// Canonical textual key, used for logging and keyed deduplication
    #[must_use]
    pub fn key_text(&self) -> String {
        self.key_columns
            .iter()
            .map(|column| match self.fields.get(column) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            })
            .collect::<Vec<_>>()
            .join(":")
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn key_text_joins_composite_columns() {
        let record = NormalizedRecord {
            table: "visit".into(),
            key_columns: vec!["park_id".into(), "index".into()],
            fields: BTreeMap::from([
                ("park_id".into(), json!("yose")),
                ("index".into(), json!(3)),
                ("name".into(), json!("Hiking")),
            ]),
        };
        assert_eq!(record.key_text(), "yose:3");
        assert_eq!(record.key_values().len(), 2);
    }
}

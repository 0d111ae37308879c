// ABOUTME: Declarative route catalog describing each logical data source
// ABOUTME: Routes carry endpoint templates, pagination style, field mappings, and key rules
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Route Catalog
//!
//! A [`Route`] is the declarative description of one logical data source:
//! where to fetch it, how it paginates, how its items map onto destination
//! columns, and how its primary key is derived. The catalog is loaded once
//! at process start, validated eagerly, and read-only thereafter.
//!
//! Load-time validation is deliberately strict: a malformed catalog fails
//! the whole run with a configuration error before any route performs work.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use riptide_core::{SyncError, SyncResult};

/// How credentials are attached to a route's requests
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum Auth {
    /// No authentication (public API)
    #[default]
    None,
    /// `Authorization: Bearer <credential>` header
    Bearer,
    /// Credential in a named header, e.g. `X-Api-Key`
    Header {
        /// Header name carrying the credential
        name: String,
    },
    /// Credential in a named query parameter, e.g. `api_key`
    Query {
        /// Query parameter name carrying the credential
        name: String,
    },
}

impl Auth {
    /// Whether this scheme needs a configured credential
    #[must_use]
    pub const fn requires_credential(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// HTTP method for a route's requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    /// Parameters in the query string
    #[default]
    Get,
    /// Parameters in the query string plus an optional fixed JSON body
    Post,
}

/// Pagination style of a route
///
/// Unrecognized styles are rejected at catalog load time, before any
/// route runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum Pagination {
    /// Exactly one page per run; every run is a full refresh
    None,
    /// Numeric offset advanced by the page size after each page
    OffsetLimit {
        /// Items requested per page
        page_size: usize,
        /// Query parameter carrying the offset
        #[serde(default = "default_offset_param")]
        offset_param: String,
        /// Query parameter carrying the page size
        #[serde(default = "default_limit_param")]
        limit_param: String,
        /// Persist the offset across runs instead of restarting at zero
        ///
        /// Off by default: most offset sources are "re-fetch the most
        /// recent N" reference data where restarting is intended.
        #[serde(default)]
        resumable: bool,
        /// Hard cap on pages fetched per run
        #[serde(default)]
        max_pages: Option<usize>,
    },
    /// Cursor drawn from a field of each item, compared against the
    /// persisted position; only strictly greater items are emitted
    CursorField {
        /// Item field compared against the persisted cursor
        field: String,
        /// Query parameter that carries the persisted cursor on the first
        /// request of a run (e.g. `start_date`)
        #[serde(default)]
        start_param: Option<String>,
        /// Response body field holding an opaque continuation token for
        /// intra-run paging (e.g. `next_token`)
        #[serde(default)]
        next_token_field: Option<String>,
        /// Query parameter the continuation token is sent back in;
        /// defaults to the token field name
        #[serde(default)]
        next_token_param: Option<String>,
        /// Hard cap on pages fetched per run
        #[serde(default)]
        max_pages: Option<usize>,
    },
}

fn default_offset_param() -> String {
    "offset".to_owned()
}

fn default_limit_param() -> String {
    "limit".to_owned()
}

/// Destination column type for coercion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Pass through as text
    String,
    /// Whole number; string values are safe-parsed
    Int,
    /// Floating point; string values are safe-parsed
    Float,
    /// Boolean
    Bool,
    /// Date/time normalized to RFC 3339 UTC
    UtcDatetime,
    /// Nested array or object serialized to canonical JSON text
    JsonText,
}

/// One source field → destination column mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Source location: a JSON pointer (`/profile/name`) or a bare field name
    pub source: String,
    /// Destination column name
    pub column: String,
    /// Destination type, drives coercion
    #[serde(rename = "type")]
    pub ty: ColumnType,
    /// Value substituted when the source field is absent or malformed
    #[serde(default)]
    pub default: Value,
}

/// Primary key derivation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum PrimaryKey {
    /// A single mapped column is the key
    Field {
        /// Key column name
        column: String,
    },
    /// Deterministic composite of several mapped columns
    Composite {
        /// Key column names, in order
        columns: Vec<String>,
    },
    /// Parent id plus the item's running index, for nested child objects
    /// the source API exposes without ids of their own
    ParentIndex {
        /// Mapped column holding the parent id
        parent_column: String,
        /// Synthesized column receiving the running index
        index_column: String,
    },
}

impl PrimaryKey {
    /// Key column names in declaration order
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        match self {
            Self::Field { column } => vec![column.as_str()],
            Self::Composite { columns } => columns.iter().map(String::as_str).collect(),
            Self::ParentIndex {
                parent_column,
                index_column,
            } => vec![parent_column.as_str(), index_column.as_str()],
        }
    }
}

/// One logical data source: endpoint, pagination, mappings, key rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// Unique route name
    pub name: String,
    /// Endpoint URL template; `{key}` placeholders are filled from `params`
    pub endpoint: String,
    /// HTTP method used for every request on this route
    #[serde(default)]
    pub method: HttpMethod,
    /// Fixed JSON body sent with every request (POST routes only)
    #[serde(default)]
    pub body: Option<Value>,
    /// Template substitutions and base query parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Pagination style
    pub pagination: Pagination,
    /// Human-readable sync frequency/time-grain, for logs only
    #[serde(default)]
    pub frequency: Option<String>,
    /// Destination table name
    pub table: String,
    /// JSON pointer to the item array within a page body; empty means the
    /// body itself is the array
    #[serde(default)]
    pub items_pointer: String,
    /// Credential placement for this route's requests
    #[serde(default)]
    pub auth: Auth,
    /// Field mappings applied to every item
    pub mapping: Vec<FieldMapping>,
    /// Primary key rule
    pub primary_key: PrimaryKey,
    /// Per-run cap on records emitted by this route
    #[serde(default)]
    pub max_records: Option<usize>,
    /// Fixed delay between this route's sequential page requests, in
    /// milliseconds; composes with retry backoff
    #[serde(default)]
    pub request_delay_ms: u64,
}

impl Route {
    /// Fixed inter-request delay for this route
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Endpoint with `{key}` placeholders substituted from `params`
    ///
    /// Parameters consumed by the template do not reappear in the query
    /// string; the remainder form the base query.
    #[must_use]
    pub fn resolved_endpoint(&self) -> String {
        let mut endpoint = self.endpoint.clone();
        for (key, value) in &self.params {
            endpoint = endpoint.replace(&format!("{{{key}}}"), value);
        }
        endpoint
    }

    /// Base query pairs: params not consumed by the endpoint template
    #[must_use]
    pub fn base_query(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .filter(|(key, _)| !self.endpoint.contains(&format!("{{{key}}}")))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn validate(&self) -> SyncResult<()> {
        if self.name.trim().is_empty() {
            return Err(SyncError::configuration("route name must not be empty"));
        }
        if self.table.trim().is_empty() {
            return Err(SyncError::configuration(format!(
                "route '{}': destination table must not be empty",
                self.name
            )));
        }
        if self.mapping.is_empty() {
            return Err(SyncError::configuration(format!(
                "route '{}': at least one field mapping is required",
                self.name
            )));
        }
        if self.body.is_some() && self.method != HttpMethod::Post {
            return Err(SyncError::configuration(format!(
                "route '{}': a request body requires method 'post'",
                self.name
            )));
        }
        if let Some(placeholder) = unresolved_placeholder(&self.resolved_endpoint()) {
            return Err(SyncError::configuration(format!(
                "route '{}': endpoint placeholder '{{{placeholder}}}' has no matching param",
                self.name
            )));
        }
        if let Pagination::OffsetLimit {
            page_size,
            offset_param,
            limit_param,
            ..
        } = &self.pagination
        {
            if *page_size == 0 {
                return Err(SyncError::configuration(format!(
                    "route '{}': page_size must be greater than zero",
                    self.name
                )));
            }
            if offset_param.is_empty() || limit_param.is_empty() {
                return Err(SyncError::configuration(format!(
                    "route '{}': offset_param and limit_param are required",
                    self.name
                )));
            }
        }
        if let Pagination::CursorField { field, .. } = &self.pagination {
            if field.trim().is_empty() {
                return Err(SyncError::configuration(format!(
                    "route '{}': cursor field must not be empty",
                    self.name
                )));
            }
        }
        self.validate_key_columns()
    }

    fn validate_key_columns(&self) -> SyncResult<()> {
        let mapped: BTreeSet<&str> = self.mapping.iter().map(|m| m.column.as_str()).collect();
        let synthesized = match &self.primary_key {
            PrimaryKey::ParentIndex { index_column, .. } => Some(index_column.as_str()),
            _ => None,
        };
        for column in self.primary_key.columns() {
            if column.trim().is_empty() {
                return Err(SyncError::configuration(format!(
                    "route '{}': primary key names an empty column",
                    self.name
                )));
            }
            if Some(column) != synthesized && !mapped.contains(column) {
                return Err(SyncError::configuration(format!(
                    "route '{}': primary key column '{column}' is not mapped",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

fn unresolved_placeholder(endpoint: &str) -> Option<&str> {
    let start = endpoint.find('{')?;
    let end = endpoint[start..].find('}')?;
    Some(&endpoint[start + 1..start + end])
}

/// Immutable, validated set of routes
#[derive(Debug, Clone)]
pub struct RouteCatalog {
    routes: Vec<Route>,
}

impl RouteCatalog {
    /// Validate and seal a set of routes
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for duplicate route names or
    /// any per-route validation failure. The whole run fails immediately
    /// rather than partially.
    pub fn new(routes: Vec<Route>) -> SyncResult<Self> {
        let mut seen = BTreeSet::new();
        for route in &routes {
            route.validate()?;
            if !seen.insert(route.name.as_str()) {
                return Err(SyncError::configuration(format!(
                    "duplicate route name '{}'",
                    route.name
                )));
            }
        }
        Ok(Self { routes })
    }

    /// Parse and validate a catalog from JSON text
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] on malformed JSON, an
    /// unrecognized pagination style or auth scheme, or any validation
    /// failure.
    pub fn from_json(text: &str) -> SyncResult<Self> {
        let routes: Vec<Route> = serde_json::from_str(text)
            .map_err(|e| SyncError::configuration(format!("invalid route catalog: {e}")))?;
        Self::new(routes)
    }

    /// Load and validate a catalog from a JSON file
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the file cannot be read or
    /// fails validation.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::configuration(format!("cannot read catalog '{}': {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    /// Routes in catalog order
    ///
    /// Order matters only for log readability; routes are independent and
    /// may be processed concurrently.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Merge parameter overrides into every route
    ///
    /// Deployment config may override time ranges or record limits without
    /// editing the catalog file.
    #[must_use]
    pub fn with_overrides(
        mut self,
        params: &BTreeMap<String, String>,
        record_limit: Option<usize>,
    ) -> Self {
        for route in &mut self.routes {
            for (key, value) in params {
                route.params.insert(key.clone(), value.clone());
            }
            if record_limit.is_some() {
                route.max_records = route.max_records.min(record_limit).or(record_limit);
            }
        }
        self
    }

    /// Built-in demonstration catalog against public, unauthenticated APIs
    ///
    /// Used by the `riptide-sync` binary when no catalog file is given.
    #[must_use]
    pub fn demo() -> Self {
        let routes = vec![
            Route {
                name: "weather".into(),
                endpoint: "https://api.weather.gov/gridpoints/ILM/58,40/forecast".into(),
                method: HttpMethod::Get,
                body: None,
                params: BTreeMap::new(),
                pagination: Pagination::None,
                frequency: Some("hourly".into()),
                table: "period".into(),
                items_pointer: "/properties/periods".into(),
                auth: Auth::None,
                mapping: vec![
                    FieldMapping {
                        source: "name".into(),
                        column: "name".into(),
                        ty: ColumnType::String,
                        default: Value::String("Unknown".into()),
                    },
                    FieldMapping {
                        source: "startTime".into(),
                        column: "start".into(),
                        ty: ColumnType::UtcDatetime,
                        default: Value::Null,
                    },
                    FieldMapping {
                        source: "endTime".into(),
                        column: "end".into(),
                        ty: ColumnType::UtcDatetime,
                        default: Value::Null,
                    },
                    FieldMapping {
                        source: "temperature".into(),
                        column: "temperature".into(),
                        ty: ColumnType::Int,
                        default: Value::from(0),
                    },
                ],
                primary_key: PrimaryKey::Field {
                    column: "start".into(),
                },
                max_records: None,
                request_delay_ms: 0,
            },
            Route {
                name: "bodies".into(),
                endpoint: "https://api.le-systeme-solaire.net/rest/bodies/".into(),
                method: HttpMethod::Get,
                body: None,
                params: BTreeMap::new(),
                pagination: Pagination::None,
                frequency: Some("daily".into()),
                table: "solar_system_object".into(),
                items_pointer: "/bodies".into(),
                auth: Auth::None,
                mapping: vec![
                    FieldMapping {
                        source: "id".into(),
                        column: "id".into(),
                        ty: ColumnType::String,
                        default: Value::Null,
                    },
                    FieldMapping {
                        source: "englishName".into(),
                        column: "name".into(),
                        ty: ColumnType::String,
                        default: Value::String("Unknown".into()),
                    },
                    FieldMapping {
                        source: "bodyType".into(),
                        column: "type".into(),
                        ty: ColumnType::String,
                        default: Value::String("Unknown".into()),
                    },
                    FieldMapping {
                        source: "sideralOrbit".into(),
                        column: "orbital_period".into(),
                        ty: ColumnType::Float,
                        default: Value::Null,
                    },
                    FieldMapping {
                        source: "semimajorAxis".into(),
                        column: "distance_from_sun".into(),
                        ty: ColumnType::Float,
                        default: Value::Null,
                    },
                ],
                primary_key: PrimaryKey::Field { column: "id".into() },
                max_records: None,
                request_delay_ms: 100,
            },
        ];
        // Safe by construction; the demo catalog is covered by tests.
        Self::new(routes).unwrap_or(Self { routes: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn minimal_route(name: &str) -> Route {
        Route {
            name: name.into(),
            endpoint: "https://example.com/v1/items".into(),
            method: HttpMethod::Get,
            body: None,
            params: BTreeMap::new(),
            pagination: Pagination::None,
            frequency: None,
            table: "items".into(),
            items_pointer: "/data".into(),
            auth: Auth::None,
            mapping: vec![FieldMapping {
                source: "id".into(),
                column: "id".into(),
                ty: ColumnType::String,
                default: Value::Null,
            }],
            primary_key: PrimaryKey::Field { column: "id".into() },
            max_records: None,
            request_delay_ms: 0,
        }
    }

    #[test]
    fn duplicate_route_names_rejected() {
        let err = RouteCatalog::new(vec![minimal_route("a"), minimal_route("a")]).unwrap_err();
        assert!(err.to_string().contains("duplicate route name"));
    }

    #[test]
    fn unmapped_key_column_rejected() {
        let mut route = minimal_route("a");
        route.primary_key = PrimaryKey::Field {
            column: "missing".into(),
        };
        let err = RouteCatalog::new(vec![route]).unwrap_err();
        assert!(err.to_string().contains("not mapped"));
    }

    #[test]
    fn unrecognized_pagination_style_rejected_at_parse() {
        let json = r#"[{
            "name": "a",
            "endpoint": "https://example.com",
            "pagination": {"style": "keyset"},
            "table": "t",
            "mapping": [{"source": "id", "column": "id", "type": "string"}],
            "primary_key": {"rule": "field", "column": "id"}
        }]"#;
        let err = RouteCatalog::from_json(json).unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
    }

    #[test]
    fn request_body_requires_post() {
        let mut route = minimal_route("a");
        route.body = Some(serde_json::json!({"frequency": "daily"}));
        let err = RouteCatalog::new(vec![route.clone()]).unwrap_err();
        assert!(err.to_string().contains("method 'post'"));

        route.method = HttpMethod::Post;
        RouteCatalog::new(vec![route]).unwrap();
    }

    #[test]
    fn endpoint_template_substitution() {
        let mut route = minimal_route("parks");
        route.endpoint = "https://api.example.com/parks/{park_code}/visits".into();
        route
            .params
            .insert("park_code".into(), "yose".into());
        route.params.insert("limit".into(), "50".into());

        assert_eq!(
            route.resolved_endpoint(),
            "https://api.example.com/parks/yose/visits"
        );
        assert_eq!(route.base_query(), vec![("limit".into(), "50".into())]);
    }

    #[test]
    fn unresolved_placeholder_rejected() {
        let mut route = minimal_route("parks");
        route.endpoint = "https://api.example.com/parks/{park_code}".into();
        let err = RouteCatalog::new(vec![route]).unwrap_err();
        assert!(err.to_string().contains("park_code"));
    }

    #[test]
    fn overrides_merge_into_params_and_caps() {
        let catalog = RouteCatalog::new(vec![minimal_route("a")]).unwrap();
        let overrides = BTreeMap::from([("start_date".to_owned(), "2024-01-01".to_owned())]);
        let merged = catalog.with_overrides(&overrides, Some(100));
        let route = &merged.routes()[0];
        assert_eq!(route.params.get("start_date").map(String::as_str), Some("2024-01-01"));
        assert_eq!(route.max_records, Some(100));
    }

    #[test]
    fn demo_catalog_is_valid() {
        let catalog = RouteCatalog::demo();
        assert_eq!(catalog.routes().len(), 2);
        assert_eq!(catalog.routes()[0].table, "period");
    }
}

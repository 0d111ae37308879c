// ABOUTME: Environment-derived engine configuration for deployment-specific settings
// ABOUTME: Credentials, retry limits, worker counts, and per-route overrides from env vars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Sync Configuration
//!
//! A static snapshot of deployment settings supplied through environment
//! variables:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `RIPTIDE_API_KEY` | credential injected per route auth scheme | none |
//! | `RIPTIDE_MAX_ATTEMPTS` | attempts per HTTP request | 4 |
//! | `RIPTIDE_BASE_DELAY_MS` | delay before first retry | 1000 |
//! | `RIPTIDE_BACKOFF_FACTOR` | backoff multiplier per retry | 2.0 |
//! | `RIPTIDE_JITTER` | randomize backoff (`true`/`false`) | true |
//! | `RIPTIDE_TIMEOUT_SECS` | per-attempt request timeout | 30 |
//! | `RIPTIDE_WORKERS` | concurrent routes | 4 |
//! | `RIPTIDE_RECORD_LIMIT` | per-route record cap | none |
//! | `RIPTIDE_PARAM_<NAME>` | route param override (`<name>` lowercased) | none |
//!
//! Malformed values are configuration errors: the run fails immediately
//! rather than silently running with the wrong limits.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use riptide_core::{SyncError, SyncResult};

use crate::catalog::RouteCatalog;
use crate::client::RetryPolicy;
use crate::orchestrator::DEFAULT_WORKERS;

const PARAM_PREFIX: &str = "RIPTIDE_PARAM_";

/// Deployment configuration for one sync run
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// API credential, attached per each route's auth scheme
    pub credential: Option<String>,
    /// Maximum attempts per HTTP request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Backoff multiplier per additional retry
    pub backoff_factor: f64,
    /// Randomize backoff delays
    pub jitter: bool,
    /// Per-attempt HTTP request timeout in seconds
    pub timeout_secs: u64,
    /// Concurrent routes
    pub workers: usize,
    /// Per-route record cap applied on top of the catalog
    pub record_limit: Option<usize>,
    /// Route parameter overrides (time ranges, location keys)
    pub param_overrides: BTreeMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            credential: None,
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            jitter: true,
            timeout_secs: crate::client::DEFAULT_TIMEOUT_SECS,
            workers: DEFAULT_WORKERS,
            record_limit: None,
            param_overrides: BTreeMap::new(),
        }
    }
}

impl SyncConfig {
    /// Build configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for any unparsable numeric or
    /// boolean value.
    pub fn from_env() -> SyncResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            credential: env::var("RIPTIDE_API_KEY").ok().filter(|v| !v.is_empty()),
            max_attempts: parse_env("RIPTIDE_MAX_ATTEMPTS", defaults.max_attempts)?,
            base_delay: Duration::from_millis(parse_env(
                "RIPTIDE_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            backoff_factor: parse_env("RIPTIDE_BACKOFF_FACTOR", defaults.backoff_factor)?,
            jitter: parse_env("RIPTIDE_JITTER", defaults.jitter)?,
            timeout_secs: parse_env("RIPTIDE_TIMEOUT_SECS", defaults.timeout_secs)?,
            workers: parse_env("RIPTIDE_WORKERS", defaults.workers)?,
            record_limit: match env::var("RIPTIDE_RECORD_LIMIT") {
                Ok(raw) => Some(parse_value("RIPTIDE_RECORD_LIMIT", &raw)?),
                Err(_) => None,
            },
            param_overrides: param_overrides(),
        })
    }

    /// Retry policy derived from this configuration
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            backoff_factor: self.backoff_factor,
            jitter: self.jitter,
        }
    }

    /// Fail fast if any catalog route needs a credential that is absent
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] naming the first route whose
    /// auth scheme requires the missing credential.
    pub fn require_credential(&self, catalog: &RouteCatalog) -> SyncResult<()> {
        if self.credential.is_some() {
            return Ok(());
        }
        if let Some(route) = catalog
            .routes()
            .iter()
            .find(|route| route.auth.requires_credential())
        {
            return Err(SyncError::configuration(format!(
                "route '{}' requires a credential; set RIPTIDE_API_KEY",
                route.name
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> SyncResult<T> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, raw: &str) -> SyncResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| SyncError::configuration(format!("invalid value for {name}: '{raw}'")))
}

fn param_overrides() -> BTreeMap<String, String> {
    env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(PARAM_PREFIX)
                .map(|name| (name.to_lowercase(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn defaults_match_retry_policy() {
        let config = SyncConfig::default();
        let policy = config.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_millis(1000));
    }

    #[test]
    fn parse_value_rejects_garbage() {
        let err = parse_value::<u32>("RIPTIDE_MAX_ATTEMPTS", "many").unwrap_err();
        assert!(matches!(err, SyncError::Configuration { .. }));
        assert!(err.to_string().contains("RIPTIDE_MAX_ATTEMPTS"));
    }

    #[test]
    fn missing_credential_fails_only_for_authenticated_routes() {
        let config = SyncConfig::default();
        // Demo catalog is entirely unauthenticated.
        config
            .require_credential(&RouteCatalog::demo())
            .unwrap();
    }
}

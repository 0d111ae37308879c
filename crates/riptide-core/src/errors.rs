// ABOUTME: Error taxonomy for the riptide sync engine
// ABOUTME: Distinguishes configuration, transient, fatal, and per-route failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Sync Error Taxonomy
//!
//! Four error classes with distinct recovery policy:
//!
//! - [`SyncError::Configuration`]: aborts the whole run before any route starts
//! - [`SyncError::Transient`]: retried automatically inside the HTTP client
//! - [`SyncError::Fatal`]: not retryable (unrecoverable 4xx, malformed body)
//! - [`SyncError::RouteSync`]: isolates a failure to one route; others proceed
//!
//! Data-validation failures are deliberately absent: missing or malformed
//! source fields degrade to declared defaults in the transformer instead of
//! erroring, because upstream data is untrusted and partial records beat a
//! failed sync.

use std::time::Duration;

use thiserror::Error;

/// Convenience result alias used across the engine
pub type SyncResult<T> = Result<T, SyncError>;

/// Unified error type for sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid or incomplete configuration; fails the run before work starts
    #[error("configuration error: {message}")]
    Configuration {
        /// What was missing or invalid
        message: String,
    },

    /// Retryable failure: network error, timeout, or a retryable HTTP status
    #[error("transient error: {message}")]
    Transient {
        /// HTTP status that triggered the failure, if any
        status: Option<u16>,
        /// Description of the failure
        message: String,
        /// Server-provided cooldown (from a `Retry-After` header), if any
        retry_after: Option<Duration>,
    },

    /// Non-retryable failure: unrecoverable 4xx or a malformed response
    #[error("fatal error: {message}")]
    Fatal {
        /// HTTP status that triggered the failure, if any
        status: Option<u16>,
        /// Description of the failure
        message: String,
    },

    /// A single route failed after retries were exhausted; other routes continue
    #[error("route '{route}' failed: {message}")]
    RouteSync {
        /// Name of the failed route
        route: String,
        /// Description of the failure
        message: String,
    },

    /// Checkpoint persistence failed; the in-memory cursor is not advanced
    #[error("checkpoint persistence failed: {message}")]
    Checkpoint {
        /// Description of the failure
        message: String,
    },
}

impl SyncError {
    /// Build a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a transient error without an HTTP status (network/timeout)
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Build a fatal error without an HTTP status (malformed response)
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            message: message.into(),
        }
    }

    /// Build a per-route error wrapping an underlying failure
    pub fn route(route: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RouteSync {
            route: route.into(),
            message: message.into(),
        }
    }

    /// Whether the error may succeed on retry
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Server-requested cooldown before the next attempt, if one was provided
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Whether an HTTP status should be treated as transient
    ///
    /// Transient: 408, 429, 500, 502, 503, 504. Every other non-success
    /// status is fatal for the current request.
    #[must_use]
    pub const fn status_is_transient(status: u16) -> bool {
        matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn transient_statuses_classified() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(SyncError::status_is_transient(status), "status {status}");
        }
        for status in [400, 401, 403, 404, 410, 422] {
            assert!(!SyncError::status_is_transient(status), "status {status}");
        }
    }

    #[test]
    fn retry_after_only_on_transient() {
        let err = SyncError::Transient {
            status: Some(429),
            message: "rate limited".into(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert!(SyncError::fatal("bad body").retry_after().is_none());
    }

    #[test]
    fn display_includes_message() {
        let err = SyncError::Fatal {
            status: Some(404),
            message: "not found".into(),
        };
        assert_eq!(err.to_string(), "fatal error: not found");
    }
}

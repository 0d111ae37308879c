// ABOUTME: Resilient HTTP client with bounded retries, backoff, and rate-limit cooldown
// ABOUTME: Classifies failures as transient or fatal and redacts credentials from logs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # HTTP Resilience Client
//!
//! Issues requests for JSON bodies with up to N attempts. The delay
//! before retry k is `base_delay * backoff_factor^(k-1)` with optional
//! jitter; an HTTP 429 with a server-provided `Retry-After` header is
//! honored over the computed backoff. Fatal errors (unrecoverable 4xx,
//! malformed bodies) are never retried.
//!
//! Credentials never reach the logs: request URLs are passed through
//! [`redacted`] before any log line is emitted.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use riptide_core::{SyncError, SyncResult};

use crate::catalog::{Auth, HttpMethod, Route};

/// Fixed token substituted for credential material in log output
pub const CREDENTIAL_MASK: &str = "***";

/// Default per-attempt request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Retry behavior for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per request, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Multiplier applied per additional retry
    pub backoff_factor: f64,
    /// Randomize each delay within ±50% to avoid thundering herds
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(1000),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Computed delay before retry `retry` (1-based)
    #[must_use]
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let base = self.base_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let millis = if self.jitter {
            base * rand::thread_rng().gen_range(0.5..1.5)
        } else {
            base
        };
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

/// Delay to apply before the next attempt after a transient failure
///
/// A server-provided `Retry-After` wins over the computed backoff.
#[must_use]
pub fn next_delay(policy: &RetryPolicy, err: &SyncError, retry: u32) -> Duration {
    err.retry_after()
        .unwrap_or_else(|| policy.backoff_delay(retry))
}

/// Parse a `Retry-After` header into a cooldown duration
///
/// Accepts delta-seconds or an HTTP-date; anything else yields `None` and
/// the caller falls back to computed backoff.
#[must_use]
pub fn retry_after_value(headers: &HeaderMap) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?;
    if let Ok(secs) = raw.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = DateTime::parse_from_rfc2822(raw.trim()).ok()?;
    (when.with_timezone(&Utc) - Utc::now()).to_std().ok()
}

/// Replace credential material in `text` with [`CREDENTIAL_MASK`]
#[must_use]
pub fn redacted(text: &str, credential: Option<&str>) -> String {
    match credential {
        Some(secret) if !secret.is_empty() => text.replace(secret, CREDENTIAL_MASK),
        _ => text.to_owned(),
    }
}

/// Run `op` with bounded retries per `policy`
///
/// Transient errors are retried after [`next_delay`]; fatal errors and the
/// final transient failure are returned to the caller.
///
/// # Errors
///
/// Returns the first fatal error, or the last transient error once
/// attempts are exhausted.
pub async fn execute_with_retries<T, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut op: F,
) -> SyncResult<T>
where
    F: FnMut(u32) -> Fut + Send,
    Fut: Future<Output = SyncResult<T>> + Send,
{
    let mut attempt: u32 = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = next_delay(policy, &err, attempt);
                warn!(
                    context = %context,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Source of raw JSON pages, injected into the pagination strategies
///
/// The engine's only seam to the network; tests substitute scripted
/// fetchers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch one decoded page body for `route` with the given query pairs
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Transient`] once retries are exhausted, or
    /// [`SyncError::Fatal`] for unrecoverable responses.
    async fn fetch_page(&self, route: &Route, query: &[(String, String)]) -> SyncResult<Value>;
}

/// Retrying HTTP client bound to one configured credential
pub struct ResilientClient {
    client: Client,
    policy: RetryPolicy,
    credential: Option<String>,
}

impl ResilientClient {
    /// Create a client with default timeouts
    ///
    /// Each instance owns its own connection pool; nothing is shared
    /// through process-global state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the underlying HTTP client
    /// cannot be built.
    pub fn new(policy: RetryPolicy, credential: Option<String>) -> SyncResult<Self> {
        Self::with_timeouts(
            policy,
            credential,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a client with explicit per-attempt and connect timeouts
    ///
    /// An attempt that exceeds `timeout` is treated as transient and
    /// retried under the policy.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the underlying HTTP client
    /// cannot be built.
    pub fn with_timeouts(
        policy: RetryPolicy,
        credential: Option<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> SyncResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SyncError::configuration(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            policy,
            credential,
        })
    }

    /// GET a JSON body with retries, backoff, and rate-limit cooldown
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] for an unusable URL or missing
    /// credential, [`SyncError::Fatal`] for unrecoverable responses, or
    /// [`SyncError::Transient`] once retries are exhausted.
    pub async fn get_json(&self, route: &Route, query: &[(String, String)]) -> SyncResult<Value> {
        let url = self.request_url(route, query)?;
        let display_url = redacted(url.as_str(), self.credential.as_deref());

        execute_with_retries(&self.policy, &route.name, |attempt| {
            let url = url.clone();
            let display_url = display_url.clone();
            async move {
                debug!(route = %route.name, attempt, url = %display_url, "issuing request");
                self.attempt(route, url).await
            }
        })
        .await
    }

    fn request_url(&self, route: &Route, query: &[(String, String)]) -> SyncResult<Url> {
        let mut url = Url::parse(&route.resolved_endpoint()).map_err(|e| {
            SyncError::configuration(format!("route '{}': invalid endpoint: {e}", route.name))
        })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
            if let Auth::Query { name } = &route.auth {
                let secret = self.require_credential(route)?;
                pairs.append_pair(name, secret);
            }
        }
        Ok(url)
    }

    fn require_credential(&self, route: &Route) -> SyncResult<&str> {
        self.credential.as_deref().ok_or_else(|| {
            SyncError::configuration(format!(
                "route '{}' requires a credential but none is configured",
                route.name
            ))
        })
    }

    fn auth_headers(&self, route: &Route) -> SyncResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        match &route.auth {
            Auth::None | Auth::Query { .. } => {}
            Auth::Bearer => {
                let secret = self.require_credential(route)?;
                let value = HeaderValue::from_str(&format!("Bearer {secret}"))
                    .map_err(|_| SyncError::configuration("credential is not header-safe"))?;
                headers.insert(AUTHORIZATION, value);
            }
            Auth::Header { name } => {
                let secret = self.require_credential(route)?;
                let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                    SyncError::configuration(format!("invalid auth header name '{name}'"))
                })?;
                let value = HeaderValue::from_str(secret)
                    .map_err(|_| SyncError::configuration("credential is not header-safe"))?;
                headers.insert(header, value);
            }
        }
        Ok(headers)
    }

    async fn attempt(&self, route: &Route, url: Url) -> SyncResult<Value> {
        let headers = self.auth_headers(route)?;
        let request = match route.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => {
                let request = self.client.post(url);
                match &route.body {
                    Some(body) => request.json(body),
                    None => request,
                }
            }
        };
        let response = request
            .headers(headers)
            .send()
            .await
            .map_err(|e| classify_request_error(&e, self.credential.as_deref()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_value(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, &body));
        }

        response.json().await.map_err(|e| {
            SyncError::fatal(format!(
                "malformed response body: {}",
                redacted(&e.to_string(), self.credential.as_deref())
            ))
        })
    }
}

#[async_trait]
impl PageFetcher for ResilientClient {
    async fn fetch_page(&self, route: &Route, query: &[(String, String)]) -> SyncResult<Value> {
        self.get_json(route, query).await
    }
}

// Timeouts, connect failures, and other request-level errors (DNS,
// protocol) may all recover on retry, so they classify as transient.
fn classify_request_error(err: &reqwest::Error, credential: Option<&str>) -> SyncError {
    SyncError::transient(redacted(&err.to_string(), credential))
}

fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> SyncError {
    let code = status.as_u16();
    let snippet: String = body.chars().take(200).collect();
    if SyncError::status_is_transient(code) {
        SyncError::Transient {
            status: Some(code),
            message: format!("request failed with status {code}: {snippet}"),
            retry_after: if code == 429 { retry_after } else { None },
        }
    } else {
        SyncError::Fatal {
            status: Some(code),
            message: format!("request failed with status {code}: {snippet}"),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn policy_without_jitter() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = policy_without_jitter();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn jitter_stays_within_half_to_one_and_a_half() {
        let policy = RetryPolicy {
            jitter: true,
            ..policy_without_jitter()
        };
        for _ in 0..50 {
            let delay = policy.backoff_delay(2);
            assert!(delay >= Duration::from_millis(100), "{delay:?}");
            assert!(delay < Duration::from_millis(300), "{delay:?}");
        }
    }

    #[test]
    fn retry_after_seconds_parsed() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(retry_after_value(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn unparsable_retry_after_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(retry_after_value(&headers), None);
    }

    #[test]
    fn server_retry_after_wins_over_backoff() {
        let policy = policy_without_jitter();
        let err = SyncError::Transient {
            status: Some(429),
            message: "rate limited".into(),
            retry_after: Some(Duration::from_secs(9)),
        };
        assert_eq!(next_delay(&policy, &err, 1), Duration::from_secs(9));

        let plain = SyncError::transient("timed out");
        assert_eq!(next_delay(&policy, &plain, 1), Duration::from_millis(100));
    }

    #[test]
    fn redaction_masks_credential_everywhere() {
        let text = "https://api.example.com/data?api_key=sekret&limit=5";
        assert_eq!(
            redacted(text, Some("sekret")),
            "https://api.example.com/data?api_key=***&limit=5"
        );
        assert_eq!(redacted(text, None), text);
    }

    #[test]
    fn unrecoverable_4xx_is_fatal() {
        let err = classify_status(StatusCode::NOT_FOUND, None, "missing");
        assert!(matches!(err, SyncError::Fatal { status: Some(404), .. }));
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = classify_status(
            StatusCode::TOO_MANY_REQUESTS,
            Some(Duration::from_secs(30)),
            "slow down",
        );
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn each_client_owns_its_own_http_stack() {
        let defaulted = ResilientClient::new(policy_without_jitter(), None);
        assert!(defaulted.is_ok());

        let tuned = ResilientClient::with_timeouts(
            policy_without_jitter(),
            Some("sekret".into()),
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        assert!(tuned.is_ok());
    }
}

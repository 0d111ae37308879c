// ABOUTME: Per-route sync reports and whole-run summaries
// ABOUTME: Aggregates route outcomes into Success, PartialSuccess, or Fatal run status
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome of one route's sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RouteOutcome {
    /// All pages consumed and the final checkpoint committed
    Completed,
    /// Retries exhausted or an unrecoverable response; cursor unchanged
    /// past the last durable checkpoint
    Failed {
        /// Description of the failure
        message: String,
    },
    /// Run was cancelled before the route finished; records already handed
    /// to the sink remain checkpointed
    Cancelled,
}

impl RouteOutcome {
    /// Whether the route delivered everything it set out to deliver
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Summary of one route's sync within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReport {
    /// Route name
    pub route: String,
    /// Destination table name
    pub table: String,
    /// Pages fetched
    pub pages: usize,
    /// Records handed to the sink
    pub records: usize,
    /// Terminal outcome
    pub outcome: RouteOutcome,
}

/// Overall run status derived from per-route outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every route completed
    Success,
    /// At least one route failed or was cancelled; the rest completed and
    /// their checkpoints were committed
    PartialSuccess,
    /// The run aborted before any route started (configuration error)
    Fatal,
}

/// Final summary emitted at the end of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSummary {
    /// Overall status
    pub status: RunStatus,
    /// Per-route reports, in catalog order
    pub routes: Vec<RouteReport>,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Total elapsed time
    pub elapsed: Duration,
}

impl SyncSummary {
    /// Derive overall status from a set of route reports
    #[must_use]
    pub fn from_reports(
        reports: Vec<RouteReport>,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let status = if reports.iter().all(|r| r.outcome.is_completed()) {
            RunStatus::Success
        } else {
            RunStatus::PartialSuccess
        };
        Self {
            status,
            routes: reports,
            started_at,
            elapsed,
        }
    }

    /// Total records delivered across all routes
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.routes.iter().map(|r| r.records).sum()
    }

    /// Names of routes that did not complete
    #[must_use]
    pub fn failed_routes(&self) -> Vec<&str> {
        self.routes
            .iter()
            .filter(|r| !r.outcome.is_completed())
            .map(|r| r.route.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(route: &str, outcome: RouteOutcome) -> RouteReport {
        RouteReport {
            route: route.into(),
            table: route.into(),
            pages: 1,
            records: 10,
            outcome,
        }
    }

    #[test]
    fn all_completed_is_success() {
        let summary = SyncSummary::from_reports(
            vec![
                report("activity", RouteOutcome::Completed),
                report("sleep", RouteOutcome::Completed),
            ],
            Utc::now(),
            Duration::from_secs(1),
        );
        assert_eq!(summary.status, RunStatus::Success);
        assert_eq!(summary.total_records(), 20);
        assert!(summary.failed_routes().is_empty());
    }

    #[test]
    fn one_failure_is_partial_success() {
        let summary = SyncSummary::from_reports(
            vec![
                report("activity", RouteOutcome::Completed),
                report(
                    "reserves",
                    RouteOutcome::Failed {
                        message: "retries exhausted".into(),
                    },
                ),
            ],
            Utc::now(),
            Duration::from_secs(1),
        );
        assert_eq!(summary.status, RunStatus::PartialSuccess);
        assert_eq!(summary.failed_routes(), vec!["reserves"]);
    }
}

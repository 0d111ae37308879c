// ABOUTME: Sync orchestrator driving all catalog routes on a bounded worker pool
// ABOUTME: Isolates per-route failures and aggregates outcomes into a run summary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Sync Orchestrator
//!
//! Routes are independent, so they run concurrently on a bounded worker
//! pool; each route's own page sequence stays strictly sequential because
//! page N's cursor input depends on page N−1. A route that exhausts its
//! retries fails alone; the other routes keep syncing and checkpointing.
//!
//! Cancellation is cooperative: once the watch flag flips, no new page is
//! processed. A route mid-page may finish its in-flight request, but its
//! cursor never advances past a page whose records were not all handed to
//! the sink.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use riptide_core::{CursorPosition, RouteOutcome, RouteReport, SyncError, SyncSummary};

use crate::catalog::{Pagination, Route, RouteCatalog};
use crate::checkpoint::CursorManager;
use crate::client::PageFetcher;
use crate::pagination::{is_new, item_cursor_value, page_items, pages};
use crate::sink::RecordSink;
use crate::transform::transform;

/// Default bounded concurrency across routes
pub const DEFAULT_WORKERS: usize = 4;

/// Drives every catalog route and produces the final run summary
pub struct Orchestrator {
    catalog: Arc<RouteCatalog>,
    fetcher: Arc<dyn PageFetcher>,
    sink: Arc<dyn RecordSink>,
    cursors: Arc<CursorManager>,
    workers: usize,
    cancel: watch::Receiver<bool>,
}

impl Orchestrator {
    /// Assemble an orchestrator over explicit collaborators
    ///
    /// Every dependency is injected; the orchestrator holds no hidden
    /// shared state of its own.
    #[must_use]
    pub fn new(
        catalog: Arc<RouteCatalog>,
        fetcher: Arc<dyn PageFetcher>,
        sink: Arc<dyn RecordSink>,
        cursors: Arc<CursorManager>,
    ) -> Self {
        let (_tx, cancel) = watch::channel(false);
        Self {
            catalog,
            fetcher,
            sink,
            cursors,
            workers: DEFAULT_WORKERS,
            cancel,
        }
    }

    /// Set the worker pool size (minimum 1)
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Attach an external cancellation signal
    #[must_use]
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every route to completion and summarize the outcome
    ///
    /// Never aborts mid-run: per-route failures are isolated and reported
    /// in the summary. Configuration problems fail earlier, at catalog and
    /// config load.
    pub async fn run(&self) -> SyncSummary {
        let started_at = Utc::now();
        let clock = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.workers));

        let mut tasks: JoinSet<(usize, RouteReport)> = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, (usize, String, String)> = HashMap::new();

        for (index, route) in self.catalog.routes().iter().cloned().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let sink = Arc::clone(&self.sink);
            let cursors = Arc::clone(&self.cursors);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let key = (index, route.name.clone(), route.table.clone());

            let handle = tasks.spawn(async move {
                // The semaphore lives for the whole run and is never closed,
                // so a failed acquire means the worker pool is gone.
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (
                        index,
                        RouteReport {
                            route: route.name.clone(),
                            table: route.table.clone(),
                            pages: 0,
                            records: 0,
                            outcome: RouteOutcome::Failed {
                                message: "worker pool closed before the route started".to_string(),
                            },
                        },
                    );
                };
                let report =
                    sync_route(&route, fetcher.as_ref(), sink.as_ref(), &cursors, &cancel).await;
                (index, report)
            });
            spawned.insert(handle.id(), key);
        }

        let mut reports: Vec<(usize, RouteReport)> = Vec::with_capacity(spawned.len());
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, pair)) => reports.push(pair),
                Err(err) => {
                    error!(error = %err, "route task aborted");
                    if let Some((index, route, table)) = spawned.get(&err.id()).cloned() {
                        reports.push((
                            index,
                            RouteReport {
                                route,
                                table,
                                pages: 0,
                                records: 0,
                                outcome: RouteOutcome::Failed {
                                    message: format!("task aborted: {err}"),
                                },
                            },
                        ));
                    }
                }
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let summary = SyncSummary::from_reports(
            reports.into_iter().map(|(_, report)| report).collect(),
            started_at,
            clock.elapsed(),
        );
        log_summary(&summary);
        summary
    }
}

fn log_summary(summary: &SyncSummary) {
    for report in &summary.routes {
        info!(
            route = %report.route,
            table = %report.table,
            pages = report.pages,
            records = report.records,
            outcome = ?report.outcome,
            "route finished"
        );
    }
    info!(
        status = ?summary.status,
        total_records = summary.total_records(),
        failed_routes = ?summary.failed_routes(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "sync run complete"
    );
}

/// Sync one route: fetch pages, transform and deliver items, checkpoint
async fn sync_route(
    route: &Route,
    fetcher: &dyn PageFetcher,
    sink: &dyn RecordSink,
    cursors: &CursorManager,
    cancel: &watch::Receiver<bool>,
) -> RouteReport {
    let start_cursor = cursors.begin(&route.name).await;
    info!(
        route = %route.name,
        table = %route.table,
        cursor = start_cursor.as_ref().map(ToString::to_string).unwrap_or_else(|| "none".into()),
        "route sync started"
    );

    let mut stream = pages(fetcher, route, start_cursor.clone());
    let mut pages_fetched = 0_usize;
    let mut records = 0_usize;
    let mut max_seen: Option<CursorPosition> = None;
    let mut consumed_offset = starting_offset(route, start_cursor.as_ref());
    let mut outcome = RouteOutcome::Completed;

    loop {
        // Checked before polling: the stream issues a request lazily when
        // polled, so a cancelled run must not reach the next page fetch.
        if *cancel.borrow() {
            info!(route = %route.name, "cancellation requested; stopping route");
            outcome = RouteOutcome::Cancelled;
            break;
        }
        let Some(next) = stream.next().await else {
            break;
        };
        let page = match next {
            Ok(page) => page,
            Err(err) => {
                let route_err = SyncError::route(&route.name, err.to_string());
                warn!(route = %route.name, error = %route_err, "route sync failed");
                outcome = RouteOutcome::Failed {
                    message: err.to_string(),
                };
                break;
            }
        };
        pages_fetched += 1;

        let items = page_items(route, &page);
        let mut delivered = 0_usize;
        let mut reached_cap = false;
        let mut delivery_error: Option<SyncError> = None;

        for item in items {
            if route.max_records.is_some_and(|cap| records >= cap) {
                reached_cap = true;
                break;
            }
            if let Some(candidate) = item_cursor_value(route, item) {
                if !is_new(start_cursor.as_ref(), &candidate) {
                    continue;
                }
                if max_seen.as_ref().is_none_or(|seen| seen.is_before(&candidate)) {
                    max_seen = Some(candidate);
                }
            }
            let record = transform(route, item, records);
            if let Err(err) = sink.upsert(&record).await {
                delivery_error = Some(err);
                break;
            }
            records += 1;
            delivered += 1;
        }

        if let Some(err) = delivery_error {
            warn!(route = %route.name, error = %err, "sink rejected record");
            outcome = RouteOutcome::Failed {
                message: format!("sink rejected record: {err}"),
            };
            break;
        }

        consumed_offset = consumed_offset.map(|offset| offset + delivered as u64);
        if let Some(position) = page_position(route, max_seen.as_ref(), consumed_offset) {
            cursors.advance(&route.name, position).await;
        }
        // Checkpoint only after every record of the page reached the sink.
        if let Err(err) = cursors.commit(&route.name, sink).await {
            warn!(route = %route.name, error = %err, "continuing without checkpoint");
        }
        info!(
            route = %route.name,
            page = page.number,
            records = delivered,
            total = records,
            "page processed"
        );

        if reached_cap {
            info!(route = %route.name, cap = ?route.max_records, "record cap reached");
            break;
        }
    }

    RouteReport {
        route: route.name.clone(),
        table: route.table.clone(),
        pages: pages_fetched,
        records,
        outcome,
    }
}

/// Starting absolute offset for resumable offset routes; `None` elsewhere
fn starting_offset(route: &Route, cursor: Option<&CursorPosition>) -> Option<u64> {
    match &route.pagination {
        Pagination::OffsetLimit { resumable: true, .. } => match cursor {
            Some(CursorPosition::Offset(offset)) => Some(*offset),
            _ => Some(0),
        },
        _ => None,
    }
}

/// Durable position reached after the current page, per pagination style
fn page_position(
    route: &Route,
    max_seen: Option<&CursorPosition>,
    consumed_offset: Option<u64>,
) -> Option<CursorPosition> {
    match &route.pagination {
        Pagination::CursorField { .. } => max_seen.cloned(),
        Pagination::OffsetLimit { resumable: true, .. } => {
            consumed_offset.map(CursorPosition::Offset)
        }
        _ => None,
    }
}

// ABOUTME: Integration tests for retry execution and durable checkpoint persistence
// ABOUTME: Covers attempt budgets, Retry-After honoring, and atomic state-file writes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use riptide::checkpoint::{
    CheckpointStore, CursorManager, FileCheckpointStore, MemoryCheckpointStore, RouteSyncState,
};
use riptide::client::{execute_with_retries, RetryPolicy};
use riptide::sink::CollectingSink;
use riptide::{CursorPosition, CursorSnapshot, SyncError};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        backoff_factor: 2.0,
        jitter: false,
    }
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let calls = AtomicU32::new(0);
    let result = execute_with_retries(&fast_policy(4), "GET /things", |_attempt| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n < 3 {
                Err(SyncError::transient("connection reset"))
            } else {
                Ok(n)
            }
        }
    })
    .await;

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fatal_errors_are_never_retried() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = execute_with_retries(&fast_policy(4), "GET /things", |_attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            Err(SyncError::Fatal {
                status: Some(404),
                message: "HTTP 404".into(),
            })
        }
    })
    .await;

    assert!(matches!(result.unwrap_err(), SyncError::Fatal { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn attempt_budget_is_exhausted_then_the_last_error_surfaces() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = execute_with_retries(&fast_policy(3), "GET /things", |_attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move { Err(SyncError::transient("HTTP 503")) }
    })
    .await;

    assert!(result.unwrap_err().is_transient());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn rate_limit_wait_honors_retry_after() {
    let wait = Duration::from_millis(50);
    let calls = AtomicU32::new(0);
    let clock = Instant::now();

    let result = execute_with_retries(&fast_policy(2), "GET /things", |_attempt| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let retry_after = wait;
        async move {
            if n == 1 {
                Err(SyncError::Transient {
                    status: Some(429),
                    message: "rate limited".into(),
                    retry_after: Some(retry_after),
                })
            } else {
                Ok(())
            }
        }
    })
    .await;

    result.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    // The server's wait beats the 1ms backoff.
    assert!(clock.elapsed() >= wait);
}

fn snapshot_with(route: &str, position: CursorPosition) -> CursorSnapshot {
    CursorSnapshot {
        positions: BTreeMap::from([(route.to_owned(), position)]),
        taken_at: None,
    }
}

#[tokio::test]
async fn file_store_round_trips_a_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("state.json"));

    let snapshot = snapshot_with("activity", CursorPosition::Text("2024-06-03".into()));
    store.persist(&snapshot).await.unwrap();

    let restored = store.load().await.unwrap().unwrap();
    assert_eq!(restored.positions, snapshot.positions);
}

#[tokio::test]
async fn missing_state_file_means_first_run() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("absent.json"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_state_file_is_a_checkpoint_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    tokio::fs::write(&path, b"not json {").await.unwrap();

    let store = FileCheckpointStore::new(path);
    let err = store.load().await.unwrap_err();
    assert!(matches!(err, SyncError::Checkpoint { .. }));
}

#[tokio::test]
async fn persist_replaces_the_file_without_leaving_a_temp_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let store = FileCheckpointStore::new(path.clone());

    store
        .persist(&snapshot_with("bodies", CursorPosition::Offset(40)))
        .await
        .unwrap();
    store
        .persist(&snapshot_with("bodies", CursorPosition::Offset(60)))
        .await
        .unwrap();

    let restored = store.load().await.unwrap().unwrap();
    assert_eq!(
        restored.positions.get("bodies"),
        Some(&CursorPosition::Offset(60))
    );

    let mut temp = path.into_os_string();
    temp.push(".tmp");
    assert!(!std::path::PathBuf::from(temp).exists());
}

#[tokio::test]
async fn commit_publishes_only_the_committing_route() {
    let cursors = CursorManager::new();
    let sink = CollectingSink::new();

    cursors
        .advance("activity", CursorPosition::Text("2024-06-03".into()))
        .await;
    cursors.advance("bodies", CursorPosition::Offset(40)).await;
    cursors.commit("activity", &sink).await.unwrap();

    // The other route's pending position stays out of the snapshot until
    // its own pages are fully delivered.
    let committed = sink.checkpoints().await;
    assert_eq!(committed.len(), 1);
    assert!(committed[0].positions.contains_key("activity"));
    assert!(!committed[0].positions.contains_key("bodies"));

    assert_eq!(
        cursors.position("activity").await,
        Some(CursorPosition::Text("2024-06-03".into()))
    );
    assert_eq!(cursors.position("bodies").await, None);
}

#[tokio::test]
async fn failed_commit_keeps_the_position_pending() {
    let cursors = CursorManager::new();
    let sink = CollectingSink::new();
    sink.fail_checkpoints(true);

    cursors
        .advance("activity", CursorPosition::Text("2024-06-03".into()))
        .await;
    assert!(cursors.commit("activity", &sink).await.is_err());
    assert_eq!(cursors.position("activity").await, None);

    // Once the sink recovers, the same pending position commits cleanly.
    sink.fail_checkpoints(false);
    cursors.commit("activity", &sink).await.unwrap();
    assert_eq!(
        cursors.position("activity").await,
        Some(CursorPosition::Text("2024-06-03".into()))
    );
}

#[tokio::test]
async fn route_lifecycle_reaches_checkpointed_only_after_a_durable_commit() {
    let cursors = CursorManager::new();
    let sink = CollectingSink::new();

    assert_eq!(cursors.state("activity").await, RouteSyncState::NotStarted);

    cursors.begin("activity").await;
    assert_eq!(cursors.state("activity").await, RouteSyncState::InProgress);

    cursors
        .advance("activity", CursorPosition::Text("2024-06-03".into()))
        .await;
    assert_eq!(cursors.state("activity").await, RouteSyncState::InProgress);

    // A persist failure must not claim the route reached a checkpoint.
    sink.fail_checkpoints(true);
    assert!(cursors.commit("activity", &sink).await.is_err());
    assert_eq!(cursors.state("activity").await, RouteSyncState::InProgress);

    sink.fail_checkpoints(false);
    cursors.commit("activity", &sink).await.unwrap();
    assert_eq!(cursors.state("activity").await, RouteSyncState::Checkpointed);

    // Other routes are untouched by this route's lifecycle.
    assert_eq!(cursors.state("bodies").await, RouteSyncState::NotStarted);
}

#[tokio::test]
async fn memory_store_round_trips_for_dry_runs() {
    let store = MemoryCheckpointStore::default();
    assert!(store.load().await.unwrap().is_none());

    let snapshot = snapshot_with("forecast", CursorPosition::Offset(3));
    store.persist(&snapshot).await.unwrap();
    assert_eq!(
        store.load().await.unwrap().unwrap().positions,
        snapshot.positions
    );
}

// ABOUTME: Cursor state machine and durable checkpoint stores
// ABOUTME: Commits advance cursors only after the sink has durably accepted a snapshot
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Cursor & Checkpoint Manager
//!
//! Each route moves through `NotStarted → InProgress → Checkpointed`.
//! Advances accumulate in a pending position; a commit hands the candidate
//! snapshot to the sink and only merges it into the durable map when the
//! sink accepts it. A failed persist leaves the durable cursor unchanged,
//! so the next run reprocesses from the last durable checkpoint:
//! at-least-once delivery into an idempotent upsert sink.
//!
//! A single mutex serializes advances and commits across routes: two
//! routes completing simultaneously can never corrupt each other's
//! persisted snapshot.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use riptide_core::{CursorPosition, CursorSnapshot, SyncError, SyncResult};

use crate::sink::RecordSink;

/// Per-route checkpoint lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteSyncState {
    /// No persisted cursor and no work started
    #[default]
    NotStarted,
    /// First page for the route has begun processing
    InProgress,
    /// Every record from the pages consumed so far has been accepted by
    /// the sink and the cursor persisted
    Checkpointed,
}

#[derive(Default)]
struct Inner {
    durable: BTreeMap<String, CursorPosition>,
    pending: BTreeMap<String, CursorPosition>,
    states: BTreeMap<String, RouteSyncState>,
}

/// Tracks each route's position and commits checkpoints through the sink
#[derive(Default)]
pub struct CursorManager {
    inner: Mutex<Inner>,
}

impl CursorManager {
    /// Manager with no persisted positions (first run)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore durable positions from a persisted snapshot
    pub async fn load(&self, snapshot: CursorSnapshot) {
        let mut inner = self.inner.lock().await;
        inner.durable = snapshot.positions;
        inner.pending.clear();
        inner.states.clear();
    }

    /// Mark a route in progress and return its durable starting position
    pub async fn begin(&self, route: &str) -> Option<CursorPosition> {
        let mut inner = self.inner.lock().await;
        inner
            .states
            .insert(route.to_owned(), RouteSyncState::InProgress);
        inner.durable.get(route).cloned()
    }

    /// Record a new pending position for a route
    ///
    /// The position becomes durable only on the next successful commit.
    pub async fn advance(&self, route: &str, position: CursorPosition) {
        let mut inner = self.inner.lock().await;
        debug!(route, position = %position, "cursor advanced (pending)");
        inner.pending.insert(route.to_owned(), position);
    }

    /// Commit a route's pending position through the sink
    ///
    /// Builds a candidate snapshot of all durable positions plus this
    /// route's pending one and hands it to the sink. Holding the manager
    /// lock across the persist call serializes concurrent commits.
    ///
    /// # Errors
    ///
    /// Returns the sink's error; the in-memory durable cursor is left
    /// unchanged so the next run resumes from the last durable checkpoint.
    pub async fn commit(&self, route: &str, sink: &dyn RecordSink) -> SyncResult<()> {
        let mut inner = self.inner.lock().await;
        let mut positions = inner.durable.clone();
        if let Some(pending) = inner.pending.get(route) {
            positions.insert(route.to_owned(), pending.clone());
        }
        let snapshot = CursorSnapshot {
            positions,
            taken_at: Some(Utc::now()),
        };

        match sink.checkpoint(&snapshot).await {
            Ok(()) => {
                if let Some(pending) = inner.pending.remove(route) {
                    inner.durable.insert(route.to_owned(), pending);
                }
                inner
                    .states
                    .insert(route.to_owned(), RouteSyncState::Checkpointed);
                Ok(())
            }
            Err(err) => {
                warn!(route, error = %err, "checkpoint persist failed; cursor not advanced");
                Err(err)
            }
        }
    }

    /// Current durable snapshot
    pub async fn snapshot(&self) -> CursorSnapshot {
        let inner = self.inner.lock().await;
        CursorSnapshot {
            positions: inner.durable.clone(),
            taken_at: Some(Utc::now()),
        }
    }

    /// A route's durable position, if any
    pub async fn position(&self, route: &str) -> Option<CursorPosition> {
        self.inner.lock().await.durable.get(route).cloned()
    }

    /// A route's lifecycle state
    pub async fn state(&self, route: &str) -> RouteSyncState {
        self.inner
            .lock()
            .await
            .states
            .get(route)
            .copied()
            .unwrap_or_default()
    }
}

/// Durable storage for cursor snapshots
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last persisted snapshot, if any
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Checkpoint`] if stored state exists but cannot
    /// be read or decoded.
    async fn load(&self) -> SyncResult<Option<CursorSnapshot>>;

    /// Persist a snapshot atomically: fully written or not at all
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Checkpoint`] if the snapshot could not be
    /// durably written.
    async fn persist(&self, snapshot: &CursorSnapshot) -> SyncResult<()>;
}

/// JSON-file checkpoint store with write-temp-then-rename atomicity
///
/// A crash mid-write leaves at worst a stale temp file; the previously
/// persisted snapshot stays readable and unchanged.
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Store backed by the given file path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> SyncResult<Option<CursorSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SyncError::Checkpoint {
                    message: format!("cannot read '{}': {err}", self.path.display()),
                })
            }
        };
        let snapshot = serde_json::from_slice(&bytes).map_err(|e| SyncError::Checkpoint {
            message: format!("corrupt checkpoint file '{}': {e}", self.path.display()),
        })?;
        Ok(Some(snapshot))
    }

    async fn persist(&self, snapshot: &CursorSnapshot) -> SyncResult<()> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|e| SyncError::Checkpoint {
            message: format!("snapshot serialization failed: {e}"),
        })?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| SyncError::Checkpoint {
                message: format!("cannot write '{}': {e}", temp.display()),
            })?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| SyncError::Checkpoint {
                message: format!("cannot rename '{}': {e}", temp.display()),
            })
    }
}

/// Volatile checkpoint store for tests and dry runs
#[derive(Default)]
pub struct MemoryCheckpointStore {
    snapshot: std::sync::Mutex<Option<CursorSnapshot>>,
}

impl MemoryCheckpointStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> SyncResult<Option<CursorSnapshot>> {
        Ok(self
            .snapshot
            .lock()
            .map_err(|_| SyncError::Checkpoint {
                message: "checkpoint store lock poisoned".into(),
            })?
            .clone())
    }

    async fn persist(&self, snapshot: &CursorSnapshot) -> SyncResult<()> {
        *self.snapshot.lock().map_err(|_| SyncError::Checkpoint {
            message: "checkpoint store lock poisoned".into(),
        })? = Some(snapshot.clone());
        Ok(())
    }
}

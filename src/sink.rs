// ABOUTME: Output sink trait mirroring the external delivery host's interface
// ABOUTME: Upserts are keyed and idempotent; checkpoints are durable by contract
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Record Sink
//!
//! The engine's only outbound interface. The collaborator behind
//! [`RecordSink`] owns storage: `upsert` is insert-or-update keyed by
//! primary key, and `checkpoint` persists a cursor snapshot durably and
//! atomically. Because upserts are idempotent, redelivering the same
//! record after a crash is a no-op, which lets the engine favor
//! at-least-once delivery.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use riptide_core::{CursorSnapshot, NormalizedRecord, SyncError, SyncResult};

use crate::checkpoint::CheckpointStore;

/// Destination for normalized records and checkpoint snapshots
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Deliver one record; idempotent by primary key
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be durably accepted; the
    /// route surfaces it as a route-level failure.
    async fn upsert(&self, record: &NormalizedRecord) -> SyncResult<()>;

    /// Persist a cursor snapshot, fully or not at all
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be persisted; the cursor
    /// manager then leaves the in-memory durable cursor unchanged.
    async fn checkpoint(&self, snapshot: &CursorSnapshot) -> SyncResult<()>;
}

/// Sink that prints records as JSON lines and persists checkpoints to a store
///
/// Used by the `riptide-sync` binary; the printed stream stands in for the
/// external delivery host during local runs.
pub struct StdoutSink<S> {
    store: S,
}

impl<S: CheckpointStore> StdoutSink<S> {
    /// Wrap a checkpoint store
    pub const fn new(store: S) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: CheckpointStore> RecordSink for StdoutSink<S> {
    async fn upsert(&self, record: &NormalizedRecord) -> SyncResult<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| SyncError::fatal(format!("record serialization failed: {e}")))?;
        println!("{line}");
        debug!(table = %record.table, key = %record.key_text(), "upsert");
        Ok(())
    }

    async fn checkpoint(&self, snapshot: &CursorSnapshot) -> SyncResult<()> {
        self.store.persist(snapshot).await?;
        info!(routes = snapshot.positions.len(), "checkpoint persisted");
        Ok(())
    }
}

/// In-memory sink for tests: records everything it is handed
///
/// `fail_checkpoints` simulates a persistence outage to verify that
/// cursors do not advance past a failed checkpoint.
#[derive(Default)]
pub struct CollectingSink {
    upserts: Mutex<Vec<NormalizedRecord>>,
    checkpoints: Mutex<Vec<CursorSnapshot>>,
    fail_checkpoints: AtomicBool,
}

impl CollectingSink {
    /// Empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `checkpoint` call fail
    pub fn fail_checkpoints(&self, fail: bool) {
        self.fail_checkpoints.store(fail, Ordering::SeqCst);
    }

    /// Records delivered so far
    pub async fn upserts(&self) -> Vec<NormalizedRecord> {
        self.upserts.lock().await.clone()
    }

    /// Snapshots checkpointed so far
    pub async fn checkpoints(&self) -> Vec<CursorSnapshot> {
        self.checkpoints.lock().await.clone()
    }

    /// Number of records delivered for one table
    pub async fn count_for(&self, table: &str) -> usize {
        self.upserts
            .lock()
            .await
            .iter()
            .filter(|r| r.table == table)
            .count()
    }
}

#[async_trait]
impl RecordSink for CollectingSink {
    async fn upsert(&self, record: &NormalizedRecord) -> SyncResult<()> {
        self.upserts.lock().await.push(record.clone());
        Ok(())
    }

    async fn checkpoint(&self, snapshot: &CursorSnapshot) -> SyncResult<()> {
        if self.fail_checkpoints.load(Ordering::SeqCst) {
            return Err(SyncError::Checkpoint {
                message: "simulated persistence outage".into(),
            });
        }
        self.checkpoints.lock().await.push(snapshot.clone());
        Ok(())
    }
}

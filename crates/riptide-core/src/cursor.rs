// ABOUTME: Cursor positions and durable checkpoint snapshots
// ABOUTME: Route-specific sync positions persisted between runs for incremental fetching
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Cursors and Checkpoints
//!
//! A [`CursorPosition`] marks how far a single route has been synced; a
//! [`CursorSnapshot`] is the durable map of every route's position taken at
//! checkpoint time. An absent position means "full sync from the route's
//! default start".

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-route sync position
///
/// The variant a route uses depends on its pagination style: timestamp and
/// text positions belong to cursor-field routes, offsets to resumable
/// offset-limit routes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CursorPosition {
    /// Point in time of the newest item processed so far
    Timestamp(DateTime<Utc>),
    /// Numeric offset into the source collection
    Offset(u64),
    /// Opaque textual position (an ISO date, a sequence id)
    ///
    /// Ordering is lexicographic, which matches chronological order for the
    /// ISO-formatted values the source APIs use.
    Text(String),
}

impl CursorPosition {
    /// Whether `candidate` lies strictly past this position
    ///
    /// Items at or before the cursor have already been emitted in a previous
    /// run; only strictly greater values may be emitted again, which keeps
    /// replays of the same page idempotent. Mismatched variants treat the
    /// candidate as new, so a corrupted or repurposed cursor can only cause
    /// re-emission, never data loss.
    #[must_use]
    pub fn is_before(&self, candidate: &Self) -> bool {
        match (self, candidate) {
            (Self::Timestamp(cur), Self::Timestamp(new)) => cur < new,
            (Self::Offset(cur), Self::Offset(new)) => cur < new,
            (Self::Text(cur), Self::Text(new)) => cur.as_str() < new.as_str(),
            _ => true,
        }
    }
}

impl Display for CursorPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Offset(offset) => write!(f, "{offset}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

/// Durable snapshot of every route's cursor, taken at checkpoint time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CursorSnapshot {
    /// Route name → last durably committed position
    pub positions: BTreeMap<String, CursorPosition>,
    /// Wall-clock time the snapshot was taken
    pub taken_at: Option<DateTime<Utc>>,
}

impl CursorSnapshot {
    /// Snapshot with no positions (first run)
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Position for a route, if one was persisted
    #[must_use]
    pub fn position(&self, route: &str) -> Option<&CursorPosition> {
        self.positions.get(route)
    }

    /// Record a route's position and refresh the snapshot timestamp
    pub fn set(&mut self, route: impl Into<String>, position: CursorPosition) {
        self.positions.insert(route.into(), position);
        self.taken_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn text_comparison_is_lexicographic() {
        let cursor = CursorPosition::Text("2024-06-01".into());
        assert!(cursor.is_before(&CursorPosition::Text("2024-06-02".into())));
        assert!(!cursor.is_before(&CursorPosition::Text("2024-06-01".into())));
        assert!(!cursor.is_before(&CursorPosition::Text("2024-05-31".into())));
    }

    #[test]
    fn mismatched_variants_treat_candidate_as_new() {
        // Re-emission is safe for an upsert sink; skipping would lose data.
        let cursor = CursorPosition::Text("2024-06-01".into());
        assert!(cursor.is_before(&CursorPosition::Offset(100)));
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let mut snapshot = CursorSnapshot::empty();
        snapshot.set("activity", CursorPosition::Text("2024-06-03".into()));
        snapshot.set("reserves", CursorPosition::Offset(500));

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: CursorSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}

// ABOUTME: Core types for the riptide incremental sync engine
// ABOUTME: Foundation crate with error taxonomy, cursors, records, and run outcomes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

#![deny(unsafe_code)]

//! # Riptide Core
//!
//! Foundation crate providing shared types for the riptide sync engine.
//! This crate is designed to change infrequently, enabling incremental
//! compilation benefits in the workspace.
//!
//! ## Modules
//!
//! - **errors**: The `SyncError` taxonomy (configuration / transient / fatal / route)
//! - **cursor**: Per-route sync positions and durable checkpoint snapshots
//! - **record**: Raw API pages and normalized output records
//! - **outcome**: Per-route reports and whole-run summaries

/// Error taxonomy shared by every engine component
pub mod errors;

/// Cursor positions and checkpoint snapshots
pub mod cursor;

/// Raw pages and normalized records
pub mod record;

/// Route reports and run summaries
pub mod outcome;

pub use cursor::{CursorPosition, CursorSnapshot};
pub use errors::{SyncError, SyncResult};
pub use outcome::{RouteOutcome, RouteReport, RunStatus, SyncSummary};
pub use record::{NormalizedRecord, RawPage};

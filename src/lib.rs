// ABOUTME: Main library entry point for the riptide sync engine
// ABOUTME: Resilient incremental synchronization from REST APIs to an upsert-based sink
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

#![deny(unsafe_code)]

//! # Riptide
//!
//! A resilient incremental sync engine for REST data sources. One engine
//! replaces the per-connector copy-paste of retry loops, pagination, and
//! ad hoc cursor handling: each logical data source is a declarative
//! [`catalog::Route`], and the orchestrator drives every route through the
//! same retrying client, pagination strategy, record transformer, and
//! checkpointed cursor manager.
//!
//! ## Architecture
//!
//! - **client**: retrying HTTP client with exponential backoff and
//!   rate-limit cooldown
//! - **catalog**: declarative routes (endpoint, pagination style, field
//!   mappings, primary-key rule)
//! - **pagination**: lazy, finite page streams per pagination style
//! - **transform**: raw items → normalized records with defaults and
//!   type coercion
//! - **checkpoint**: per-route cursors, committed atomically through the
//!   sink so interrupted runs resume correctly
//! - **orchestrator**: bounded worker pool over independent routes,
//!   per-route failure isolation, final run summary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use riptide::catalog::RouteCatalog;
//! use riptide::checkpoint::CursorManager;
//! use riptide::client::ResilientClient;
//! use riptide::config::SyncConfig;
//! use riptide::orchestrator::Orchestrator;
//! use riptide::sink::CollectingSink;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SyncConfig::from_env()?;
//!     let catalog = RouteCatalog::demo();
//!     let client = Arc::new(ResilientClient::new(
//!         config.retry_policy(),
//!         config.credential.clone(),
//!     )?);
//!     let sink = Arc::new(CollectingSink::new());
//!     let cursors = Arc::new(CursorManager::new());
//!
//!     let summary = Orchestrator::new(Arc::new(catalog), client, sink, cursors)
//!         .with_workers(config.workers)
//!         .run()
//!         .await;
//!     println!("synced {} records", summary.total_records());
//!     Ok(())
//! }
//! ```

/// Declarative route catalog: endpoints, pagination styles, field mappings
pub mod catalog;

/// Cursor state machine and durable checkpoint stores
pub mod checkpoint;

/// Retrying HTTP client with backoff, rate-limit cooldown, and redaction
pub mod client;

/// Environment-derived engine configuration
pub mod config;

/// Structured logging setup
pub mod logging;

/// Per-route lazy page streams
pub mod pagination;

/// Worker pool driving all routes and aggregating outcomes
pub mod orchestrator;

/// Output sink trait and provided implementations
pub mod sink;

/// Raw item → normalized record transformation
pub mod transform;

pub use riptide_core::{
    CursorPosition, CursorSnapshot, NormalizedRecord, RawPage, RouteOutcome, RouteReport,
    RunStatus, SyncError, SyncResult, SyncSummary,
};

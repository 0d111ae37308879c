// ABOUTME: Lazy finite page streams for each pagination style
// ABOUTME: Produces raw pages on demand and filters items against the persisted cursor
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Riptide Sync

//! # Pagination Strategies
//!
//! [`pages`] turns a route plus its persisted cursor into a lazy, finite
//! stream of raw pages. Pages are fetched only when the consumer polls,
//! keeping memory bounded for large histories.
//!
//! Three styles:
//!
//! - **none**: one page per run, a full refresh of the route
//! - **offset-limit**: offset advances by the page size; terminates on a
//!   short page. The offset restarts at zero every run unless the route is
//!   marked resumable ("re-fetch most recent N" behavior is intentional
//!   for low-cardinality reference data)
//! - **cursor-field**: intra-run paging via an opaque continuation token
//!   where the API provides one; across runs, items are filtered against
//!   the persisted cursor with a strictly-greater comparison, making
//!   replays of the same page idempotent
//!
//! A route's inter-request delay is applied between its sequential page
//! fetches; it composes with, and is distinct from, retry backoff.

use std::pin::Pin;

use async_stream::try_stream;
use futures_util::Stream;
use serde_json::Value;
use tracing::{debug, warn};

use riptide_core::{CursorPosition, RawPage, SyncResult};

use crate::catalog::{Pagination, Route};
use crate::client::PageFetcher;
use crate::transform::lookup;

/// Safety cap on pages per route per run when the catalog sets none
pub const DEFAULT_MAX_PAGES: usize = 1000;

/// Lazy stream of raw pages for one route
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = SyncResult<RawPage>> + Send + 'a>>;

/// Build the page stream for a route, starting from its persisted cursor
///
/// The stream is finite: it terminates on the API's end-of-data signal
/// (empty or short page, absent continuation token) or the configured page
/// cap. It is restartable from any previously persisted cursor.
#[must_use]
pub fn pages<'a>(
    fetcher: &'a dyn PageFetcher,
    route: &'a Route,
    cursor: Option<CursorPosition>,
) -> PageStream<'a> {
    match route.pagination.clone() {
        Pagination::None => single_page(fetcher, route),
        Pagination::OffsetLimit {
            page_size,
            offset_param,
            limit_param,
            resumable,
            max_pages,
        } => offset_pages(
            fetcher, route, cursor, page_size, offset_param, limit_param, resumable, max_pages,
        ),
        Pagination::CursorField {
            start_param,
            next_token_field,
            next_token_param,
            max_pages,
            ..
        } => cursor_pages(
            fetcher,
            route,
            cursor,
            start_param,
            next_token_field,
            next_token_param,
            max_pages,
        ),
    }
}

fn single_page<'a>(fetcher: &'a dyn PageFetcher, route: &'a Route) -> PageStream<'a> {
    Box::pin(try_stream! {
        let body = fetcher.fetch_page(route, &route.base_query()).await?;
        yield RawPage::new(1, body);
    })
}

#[allow(clippy::too_many_arguments)]
fn offset_pages<'a>(
    fetcher: &'a dyn PageFetcher,
    route: &'a Route,
    cursor: Option<CursorPosition>,
    page_size: usize,
    offset_param: String,
    limit_param: String,
    resumable: bool,
    max_pages: Option<usize>,
) -> PageStream<'a> {
    Box::pin(try_stream! {
        let mut offset: u64 = match cursor {
            Some(CursorPosition::Offset(persisted)) if resumable => persisted,
            _ => 0,
        };
        let cap = max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        let base = route.base_query();
        let mut number = 0_usize;

        while number < cap {
            if number > 0 && !route.request_delay().is_zero() {
                tokio::time::sleep(route.request_delay()).await;
            }
            let mut query = base.clone();
            query.push((offset_param.clone(), offset.to_string()));
            query.push((limit_param.clone(), page_size.to_string()));

            let body = fetcher.fetch_page(route, &query).await?;
            number += 1;
            let page = RawPage::new(number, body);
            let count = page_items(route, &page).len();
            debug!(route = %route.name, page = number, offset, items = count, "fetched page");
            yield page;

            if count < page_size {
                break;
            }
            offset += page_size as u64;
        }
    })
}

fn cursor_pages<'a>(
    fetcher: &'a dyn PageFetcher,
    route: &'a Route,
    cursor: Option<CursorPosition>,
    start_param: Option<String>,
    next_token_field: Option<String>,
    next_token_param: Option<String>,
    max_pages: Option<usize>,
) -> PageStream<'a> {
    Box::pin(try_stream! {
        let cap = max_pages.unwrap_or(DEFAULT_MAX_PAGES);
        let mut query = route.base_query();
        if let (Some(param), Some(position)) = (&start_param, &cursor) {
            query.push((param.clone(), position.to_string()));
        }
        let mut number = 0_usize;

        while number < cap {
            if number > 0 && !route.request_delay().is_zero() {
                tokio::time::sleep(route.request_delay()).await;
            }
            let body = fetcher.fetch_page(route, &query).await?;
            number += 1;

            let token = next_token_field
                .as_ref()
                .and_then(|field| body.get(field))
                .and_then(Value::as_str)
                .map(str::to_owned);

            let page = RawPage::new(number, body);
            debug!(
                route = %route.name,
                page = number,
                items = page_items(route, &page).len(),
                has_more = token.is_some(),
                "fetched page"
            );
            yield page;

            match token {
                Some(token) => {
                    let param = next_token_param
                        .clone()
                        .or_else(|| next_token_field.clone())
                        .unwrap_or_else(|| "next_token".to_owned());
                    query.retain(|(key, _)| key != &param);
                    query.push((param, token));
                }
                None => break,
            }
        }
    })
}

/// Extract the item list from a raw page via the route's items pointer
///
/// An object at the pointer counts as a single item (single-entity
/// endpoints); anything else yields no items.
#[must_use]
pub fn page_items<'p>(route: &Route, page: &'p RawPage) -> Vec<&'p Value> {
    let node = if route.items_pointer.is_empty() {
        Some(&page.body)
    } else {
        page.body.pointer(&route.items_pointer)
    };
    match node {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => {
            warn!(
                route = %route.name,
                page = page.number,
                pointer = %route.items_pointer,
                "page contains no item array"
            );
            Vec::new()
        }
    }
}

/// Read the cursor comparison value from an item of a cursor-field route
#[must_use]
pub fn item_cursor_value(route: &Route, item: &Value) -> Option<CursorPosition> {
    let Pagination::CursorField { field, .. } = &route.pagination else {
        return None;
    };
    match lookup(item, field)? {
        Value::String(text) => Some(CursorPosition::Text(text.clone())),
        Value::Number(number) => number.as_u64().map(CursorPosition::Offset),
        _ => None,
    }
}

/// Whether an item lies strictly past the persisted cursor
///
/// With no persisted cursor every item is new (full sync from the route's
/// default start).
#[must_use]
pub fn is_new(cursor: Option<&CursorPosition>, candidate: &CursorPosition) -> bool {
    cursor.is_none_or(|current| current.is_before(candidate))
}

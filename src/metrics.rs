// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for comment-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `comment_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: create, edit, delete, restore, like_toggle
//! - `status`: dispatched, confirmed, idempotent, rolled_back, rejected
//! - `outcome`: reconcile outcome label

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record a mutation lifecycle event.
pub fn record_mutation(kind: &str, status: &str) {
    counter!(
        "comment_sync_mutations_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record end-to-end mutation latency (dispatch to settle).
pub fn record_mutation_latency(kind: &str, duration: Duration) {
    histogram!(
        "comment_sync_mutation_seconds",
        "kind" => kind.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a forest fetch.
pub fn record_fetch(status: &str) {
    counter!(
        "comment_sync_fetches_total",
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_fetch_latency(duration: Duration) {
    histogram!("comment_sync_fetch_seconds").record(duration.as_secs_f64());
}

/// Record a reconciliation by outcome.
pub fn record_reconcile(outcome: &str) {
    counter!(
        "comment_sync_reconciliations_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a rollback by mutation kind.
pub fn record_rollback(kind: &str) {
    counter!(
        "comment_sync_rollbacks_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record evicted partitions.
pub fn record_partition_eviction(count: usize) {
    counter!("comment_sync_partition_evictions_total").increment(count as u64);
}

/// Set current partition count.
pub fn set_partitions(count: usize) {
    gauge!("comment_sync_partitions").set(count as f64);
}

/// Set current in-flight mutation count.
pub fn set_pending_mutations(count: usize) {
    gauge!("comment_sync_pending_mutations").set(count as f64);
}

/// Set current collapse-state entry count.
pub fn set_view_entries(count: usize) {
    gauge!("comment_sync_view_entries").set(count as f64);
}

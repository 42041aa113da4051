// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the bridge.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the embedding
//! daemon chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `cdc_bridge_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `table`: canonical source table name

use std::time::Duration;

use metrics::{counter, histogram};

/// Rows staged into the delta buffer by the stream handler.
pub fn record_staged_rows(table: &str, rows: usize) {
    counter!("cdc_bridge_staged_rows_total", "table" => table.to_string())
        .increment(rows as u64);
}

/// A successful delta-buffer flush to the sink.
pub fn record_buffer_flush(table: &str) {
    counter!("cdc_bridge_buffer_flushes_total", "table" => table.to_string()).increment(1);
}

/// Rows copied during initial sync.
pub fn record_sync_rows(table: &str, rows: u64) {
    counter!("cdc_bridge_sync_rows_total", "table" => table.to_string()).increment(rows);
}

/// Duration of one buffer-table promotion.
pub fn record_promotion(table: &str, duration: Duration) {
    counter!("cdc_bridge_promotions_total", "table" => table.to_string()).increment(1);
    histogram!("cdc_bridge_promotion_seconds", "table" => table.to_string())
        .record(duration.as_secs_f64());
}

/// A durable checkpoint advance.
pub fn record_checkpoint(table: &str) {
    counter!("cdc_bridge_checkpoints_total", "table" => table.to_string()).increment(1);
}

/// A batch dropped because its LSN predates the sync snapshot.
pub fn record_stale_batch(table: &str) {
    counter!("cdc_bridge_stale_batches_total", "table" => table.to_string()).increment(1);
}

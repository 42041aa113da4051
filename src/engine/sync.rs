// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync controller: one-shot initial snapshot copy.
//!
//! The copy streams on the current task while a spawned task drains the
//! bulk-upload pipeline into the main table; the two meet at the pipeline's
//! EOF. Live events arriving meanwhile are staged through the normal
//! stream path (the engine is in `Sync` mode, so they target the aux
//! table) and are merged into the main table once the copy lands.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::convert::copy::decode_copy_line;
use crate::error::{EngineError, Result};
use crate::lsn::Lsn;
use crate::metrics;
use crate::sink::SinkError;
use crate::source::{CopyLineSink, SnapshotSource};

use super::types::EngineMode;
use super::TableEngine;

/// Progress is reported once per this many copied rows.
const SYNC_PROGRESS_BATCH: u64 = 1_000_000;

impl TableEngine {
    /// Enter sync mode. Live events received from here on are routed to
    /// the aux table until [`sync_from`](Self::sync_from) completes.
    pub async fn start_sync(&self) {
        let mut core = self.core.lock().await;
        core.mode = EngineMode::Sync;
        info!(table = %self.cfg.source_table, "entering sync mode");
    }

    /// Run the initial snapshot copy taken at `snapshot_lsn`.
    ///
    /// On success the engine is in `Live` mode with the checkpoint at
    /// `snapshot_lsn`. Any error leaves the engine restartable: the next
    /// attempt re-truncates and re-runs the whole copy.
    #[tracing::instrument(skip(self, source), fields(table = %self.cfg.source_table))]
    pub async fn sync_from(
        &self,
        source: &mut dyn SnapshotSource,
        snapshot_lsn: Lsn,
    ) -> Result<()> {
        if let Some(aux) = &self.cfg.sync_aux_table {
            self.truncate_table(aux).await?;
        }

        {
            let mut core = self.core.lock().await;
            core.snapshot_lsn = snapshot_lsn;
        }

        match source.live_tuple_estimate(&self.cfg.source_table).await {
            Ok(Some(estimate)) => self.rows_to_sync.store(estimate, Ordering::Release),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not estimate source row count"),
        }

        info!(
            main_table = %self.cfg.main_table,
            rows_to_sync = self.rows_to_sync.load(Ordering::Acquire),
            snapshot = %snapshot_lsn,
            "snapshot copy started"
        );

        if !self.cfg.init_sync_skip_truncate {
            self.truncate_table(&self.cfg.main_table).await?;
        }
        self.synced_rows.store(0, Ordering::Release);

        self.uploader.begin().await.map_err(EngineError::from)?;

        // Single-slot error channel: the drain task's JoinHandle.
        let drain = {
            let uploader = Arc::clone(&self.uploader);
            let target = self.cfg.main_table.clone();
            let columns = self.converter.sink_columns().to_vec();
            tokio::spawn(async move { uploader.bulk_upload(&target, &columns).await })
        };

        *self.sync_batch_started.lock() = Instant::now();
        let source_columns = self.converter.source_columns();
        let mut writer = SyncWriter { engine: self };
        let reported = source
            .copy_out(&self.cfg.source_table, &source_columns, &mut writer)
            .await?;

        self.uploader.finish().await.map_err(EngineError::from)?;

        let synced = self.synced_rows.load(Ordering::Acquire);
        if reported != synced {
            return Err(EngineError::SyncCountMismatch { synced, reported });
        }
        info!(rows = synced, "snapshot copy finished");
        metrics::record_sync_rows(&self.checkpoint_key(), synced);

        match drain.await {
            Ok(upload) => upload.map_err(EngineError::from)?,
            Err(e) => {
                return Err(EngineError::Sink(SinkError::backend(format!(
                    "bulk upload task died: {e}"
                ))))
            }
        }

        // Post-sync: wait for the in-flight source transaction, then merge
        // the live delta staged in the aux table.
        debug!("starting post-sync merge");
        let mut core = self.core.lock().await;
        self.flush_buffer(&mut core).await?;

        if let Some(aux) = &self.cfg.sync_aux_table {
            self.log_delta_size(aux, snapshot_lsn).await;

            let columns = self.converter.sink_columns().join(",");
            self.loader
                .exec(&format!(
                    "INSERT INTO {main}({columns}) SELECT {columns} FROM {aux} \
                     WHERE {lsn_col} > {snapshot} ORDER BY {row_id_col}",
                    main = self.cfg.main_table,
                    aux = aux,
                    lsn_col = self.cfg.lsn_column,
                    snapshot = snapshot_lsn.wire(),
                    row_id_col = self.cfg.row_id_column,
                ))
                .await
                .map_err(EngineError::from)?;

            self.truncate_table(aux).await?;
        }

        self.persist_lsn(&mut core, snapshot_lsn).await?;
        core.mode = EngineMode::Live;
        info!(table = %self.cfg.source_table, "initial sync complete");
        Ok(())
    }

    async fn log_delta_size(&self, aux: &crate::config::SinkTableId, snapshot_lsn: Lsn) {
        let stmt = format!(
            "SELECT count() FROM {aux} WHERE {} > {}",
            self.cfg.lsn_column,
            snapshot_lsn.wire()
        );
        match self.loader.query(&stmt).await {
            Ok(rows) => {
                let delta = rows
                    .first()
                    .and_then(|row| row.first())
                    .cloned()
                    .unwrap_or_default();
                debug!(delta = %delta, "live rows staged during sync");
            }
            Err(e) => warn!(error = %e, "could not query staged delta size"),
        }
    }

    fn report_sync_progress(&self, synced: u64) {
        let elapsed = {
            let mut started = self.sync_batch_started.lock();
            let elapsed = started.elapsed();
            *started = Instant::now();
            elapsed
        };

        let speed = SYNC_PROGRESS_BATCH as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        let total = self.rows_to_sync.load(Ordering::Acquire);
        let left = total.saturating_sub(synced);
        let eta_secs = if synced < total {
            (left as f64 / speed) as u64
        } else {
            0
        };

        info!(
            table = %self.cfg.source_table,
            rows = synced,
            left,
            rows_per_sec = speed as u64,
            eta_secs,
            "snapshot copy progress"
        );
    }
}

/// Engine-side writer fed by the source COPY stream.
struct SyncWriter<'a> {
    engine: &'a TableEngine,
}

#[async_trait]
impl CopyLineSink for SyncWriter<'_> {
    async fn push_line(&mut self, line: &[u8]) -> Result<()> {
        let row = decode_copy_line(line)?;
        let mut tuple = self.engine.converter.convert(&row)?;

        // Snapshot rows are plain state rows; under the collapsing model
        // they carry the positive sign.
        if self.engine.cfg.sign_column.is_some() {
            tuple.extend_from_slice(b"\t1");
        }
        tuple.push(b'\n');

        self.engine
            .uploader
            .write(&tuple)
            .await
            .map_err(EngineError::from)?;

        let synced = self.engine.synced_rows.fetch_add(1, Ordering::AcqRel) + 1;
        if synced % SYNC_PROGRESS_BATCH == 0 {
            self.engine.report_sync_progress(synced);
        }
        Ok(())
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The per-table replication engine.
//!
//! One [`TableEngine`] owns, for a single source table, the lifecycle of
//! the initial snapshot copy, the streaming merge of decoded DML events,
//! and the promotion of buffered rows into the main sink table.
//!
//! # Lifecycle
//!
//! ```text
//! new -> init -> start_sync -> sync_from ----> Live streaming
//!                  (Sync mode, aux table)      (begin/process_tuples/commit,
//!                                               flush_to_main_table)
//! ```
//!
//! # Locking
//!
//! A coarse engine mutex guards all routing state; [`TableEngine::begin`]
//! hands out a [`Transaction`] holding it for the duration of one source
//! transaction's batches. An inner flush mutex serializes the shared
//! loader between the auto-flush path and the promotion path.

mod promote;
mod stream;
mod sync;
mod types;

pub use stream::Transaction;
pub use types::{EngineMode, EngineProgress};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::checkpoint::CheckpointStore;
use crate::config::{SinkTableId, TableConfig};
use crate::convert::RowConverter;
use crate::error::{EngineError, Result};
use crate::lsn::Lsn;
use crate::metrics;
use crate::resilience::{retry, RetryPolicy};
use crate::sink::{BulkUploadTransport, SinkLoader};
use types::EngineCore;

/// The per-table replication engine.
pub struct TableEngine {
    pub(crate) cfg: TableConfig,
    pub(crate) converter: RowConverter,

    /// The engine mutex: every routing decision reads state under it.
    core: Mutex<EngineCore>,
    /// Serializes the shared loader between auto-flush and promotion.
    flush_lock: Mutex<()>,

    pub(crate) loader: Arc<dyn SinkLoader>,
    pub(crate) uploader: Arc<dyn BulkUploadTransport>,
    checkpoint: Arc<dyn CheckpointStore>,

    retry: RetryPolicy,
    shutdown: watch::Receiver<bool>,

    // Sync progress accounting (diagnostic only).
    pub(crate) synced_rows: AtomicU64,
    pub(crate) rows_to_sync: AtomicU64,
    pub(crate) sync_batch_started: parking_lot::Mutex<Instant>,
}

impl TableEngine {
    /// Build an engine for one configured table.
    ///
    /// `generation` is the shared generation counter, owned by the
    /// orchestrator and read-only here; required when the config names a
    /// generation column. The `shutdown` receiver aborts retry loops; keep
    /// its sender alive for the engine's lifetime.
    pub fn new(
        cfg: TableConfig,
        loader: Arc<dyn SinkLoader>,
        uploader: Arc<dyn BulkUploadTransport>,
        checkpoint: Arc<dyn CheckpointStore>,
        generation: Option<Arc<AtomicU64>>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        cfg.validate()?;
        let converter = RowConverter::new(&cfg, generation)?;

        Ok(Self {
            cfg,
            converter,
            core: Mutex::new(EngineCore::new()),
            flush_lock: Mutex::new(()),
            loader,
            uploader,
            checkpoint,
            retry: RetryPolicy::sink(),
            shutdown,
            synced_rows: AtomicU64::new(0),
            rows_to_sync: AtomicU64::new(0),
            sync_batch_started: parking_lot::Mutex::new(Instant::now()),
        })
    }

    /// Replace the sink retry policy (tests shrink the budget).
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// One-time initialization: load the persisted checkpoint for the
    /// monotonic guard and clear the buffer table if one is configured.
    pub async fn init(&self) -> Result<()> {
        let last = self.checkpoint.read_lsn(&self.checkpoint_key()).await?;
        {
            let mut core = self.core.lock().await;
            core.last_saved_lsn = last;
        }
        if let Some(last) = last {
            debug!(table = %self.cfg.source_table, checkpoint = %last, "resuming from checkpoint");
        }

        if let Some(buffer) = &self.cfg.buffer_table {
            self.truncate_table(buffer).await?;
        }
        Ok(())
    }

    /// Acquire the engine mutex for one source transaction's batches.
    pub async fn begin(&self) -> Transaction<'_> {
        Transaction::new(self, self.core.lock().await)
    }

    /// Truncate the replicated table: clears the sink main and buffer
    /// tables and resets the delta-buffer counters.
    pub async fn truncate(&self, lsn: Lsn) -> Result<()> {
        let mut core = self.core.lock().await;
        self.truncate_locked(&mut core, lsn).await
    }

    /// Diagnostic snapshot.
    pub async fn progress(&self) -> EngineProgress {
        let core = self.core.lock().await;
        EngineProgress {
            mode: core.mode,
            synced_rows: self.synced_rows.load(Ordering::Acquire),
            rows_to_sync: self.rows_to_sync.load(Ordering::Acquire),
            buffer_commands: core.buffer_cmd_id,
            buffer_flushes: core.buffer_flush_cnt,
        }
    }

    /// The LSN most recently persisted for this table, if any.
    pub async fn last_checkpoint(&self) -> Result<Option<Lsn>> {
        self.checkpoint.read_lsn(&self.checkpoint_key()).await
    }

    // --- Internal helpers shared by the stream/sync/promote paths ---

    pub(crate) fn checkpoint_key(&self) -> String {
        self.cfg.source_table.canonical()
    }

    pub(crate) async fn truncate_table(&self, table: &SinkTableId) -> Result<()> {
        self.loader
            .exec(&format!("truncate table {table}"))
            .await
            .map_err(EngineError::from)
    }

    pub(crate) async fn truncate_locked(&self, core: &mut EngineCore, lsn: Lsn) -> Result<()> {
        core.buffer_cmd_id = 0;
        core.buffer_row_id = 0;
        core.buffer_flush_cnt = 0;
        debug!(table = %self.cfg.source_table, %lsn, "truncating sink tables");

        self.truncate_table(&self.cfg.main_table).await?;
        if let Some(buffer) = &self.cfg.buffer_table {
            self.truncate_table(buffer).await?;
        }
        Ok(())
    }

    /// Resolve the flush target from the current mode and configuration.
    /// Routing happens here, at flush time, not per in-flight row.
    fn flush_route(&self, mode: EngineMode) -> Result<(SinkTableId, Vec<String>)> {
        let base = self.converter.sink_columns();
        match mode {
            EngineMode::Sync => {
                let aux = self.cfg.sync_aux_table.clone().ok_or_else(|| {
                    EngineError::config("live events during sync require a sync_aux_table")
                })?;
                let mut columns = base.to_vec();
                columns.push(self.cfg.row_id_column.clone());
                columns.push(self.cfg.lsn_column.clone());
                Ok((aux, columns))
            }
            EngineMode::Live => match &self.cfg.buffer_table {
                Some(buffer) => {
                    let mut columns = base.to_vec();
                    columns.push(self.cfg.row_id_column.clone());
                    Ok((buffer.clone(), columns))
                }
                None => Ok((self.cfg.main_table.clone(), base.to_vec())),
            },
        }
    }

    /// Flush the delta buffer to its routing target under bounded retry.
    pub(crate) async fn flush_buffer(&self, core: &mut EngineCore) -> Result<()> {
        let _serialize = self.flush_lock.lock().await;
        if core.buffer_cmd_id == 0 {
            return Ok(());
        }

        let (target, columns) = self.flush_route(core.mode)?;
        let loader = &self.loader;
        let mut shutdown = self.shutdown.clone();
        retry("buffer flush", &self.retry, &mut shutdown, || {
            loader.buffer_flush(&target, &columns)
        })
        .await?;

        core.buffer_cmd_id = 0;
        core.buffer_flush_cnt += 1;
        metrics::record_buffer_flush(&self.checkpoint_key());
        Ok(())
    }

    /// Advance the durable checkpoint; never backwards.
    pub(crate) async fn persist_lsn(&self, core: &mut EngineCore, lsn: Lsn) -> Result<()> {
        if let Some(last) = core.last_saved_lsn {
            if lsn < last {
                warn!(
                    table = %self.cfg.source_table,
                    %lsn,
                    checkpoint = %last,
                    "refusing to move checkpoint backwards"
                );
                return Ok(());
            }
        }

        self.checkpoint
            .write_lsn(&self.checkpoint_key(), lsn)
            .await?;
        core.last_saved_lsn = Some(lsn);
        metrics::record_checkpoint(&self.checkpoint_key());
        Ok(())
    }
}

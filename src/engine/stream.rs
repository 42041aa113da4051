// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The streaming write path: routing decoded DML tuples into the sink.

use tokio::sync::MutexGuard;
use tracing::debug;

use crate::convert::SinkTuple;
use crate::error::{EngineError, Result};
use crate::lsn::Lsn;
use crate::metrics;

use super::types::{EngineCore, EngineMode};
use super::TableEngine;

/// The engine mutex held across one source transaction.
///
/// The logical-decoding client calls [`TableEngine::begin`](super::TableEngine::begin)
/// when a source transaction starts, feeds each decoded command through
/// [`process_tuples`](Self::process_tuples), and releases the engine with
/// [`commit`](Self::commit) (or by dropping), giving per-transaction
/// atomicity of engine-visible state changes.
pub struct Transaction<'a> {
    engine: &'a TableEngine,
    core: MutexGuard<'a, EngineCore>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(engine: &'a TableEngine, core: MutexGuard<'a, EngineCore>) -> Self {
        Self { engine, core }
    }

    /// Stage the sink tuples of one decoded DML command.
    ///
    /// Returns whether the caller should promote the buffer table into the
    /// main table ([`TableEngine::flush_to_main_table`](super::TableEngine::flush_to_main_table)).
    pub async fn process_tuples(&mut self, lsn: Lsn, tuples: &[SinkTuple]) -> Result<bool> {
        self.engine
            .process_tuples_locked(&mut self.core, lsn, tuples)
            .await
    }

    /// Truncate the replicated table within this source transaction.
    pub async fn truncate(&mut self, lsn: Lsn) -> Result<()> {
        self.engine.truncate_locked(&mut self.core, lsn).await
    }

    /// Release the engine mutex at source-transaction commit.
    pub fn commit(self) {}
}

impl TableEngine {
    pub(crate) async fn process_tuples_locked(
        &self,
        core: &mut EngineCore,
        lsn: Lsn,
        tuples: &[SinkTuple],
    ) -> Result<bool> {
        if !tuples.is_empty() {
            // Events older than the snapshot are already covered by the
            // initial copy.
            if core.mode == EngineMode::Live && lsn < core.snapshot_lsn {
                debug!(
                    table = %self.cfg.source_table,
                    %lsn,
                    snapshot = %core.snapshot_lsn,
                    "dropping stale event batch"
                );
                metrics::record_stale_batch(&self.checkpoint_key());
                return Ok(false);
            }

            for tuple in tuples {
                let mut line = Vec::with_capacity(tuple.len() + 32);
                line.extend_from_slice(tuple);
                match core.mode {
                    EngineMode::Sync => {
                        line.push(b'\t');
                        line.extend_from_slice(core.aux_row_id.to_string().as_bytes());
                        line.push(b'\t');
                        line.extend_from_slice(lsn.wire().as_bytes());
                        core.aux_row_id += 1;
                    }
                    EngineMode::Live => {
                        if self.cfg.buffer_table.is_some() {
                            line.push(b'\t');
                            line.extend_from_slice(core.buffer_row_id.to_string().as_bytes());
                        }
                    }
                }
                line.push(b'\n');

                self.loader
                    .buffer_write(&line)
                    .await
                    .map_err(EngineError::from)?;
                core.buffer_row_id += 1;
            }

            core.buffer_cmd_id += 1;
            metrics::record_staged_rows(&self.checkpoint_key(), tuples.len());
        }

        if core.buffer_cmd_id == self.cfg.max_buffer_length {
            self.flush_buffer(core).await?;
        }

        if self.cfg.buffer_table.is_none() {
            return Ok(false);
        }
        Ok(core.buffer_flush_cnt >= self.cfg.flush_threshold)
    }
}

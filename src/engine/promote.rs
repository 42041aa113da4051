// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Promotion: moving buffered rows into the main table and advancing the
//! durable checkpoint.

use std::time::Instant;

use tracing::info;

use crate::error::Result;
use crate::lsn::Lsn;
use crate::metrics;
use crate::resilience::retry;
use crate::sink::SinkError;

use super::types::EngineMode;
use super::TableEngine;

impl TableEngine {
    /// Flush the delta buffer and, when a buffer table is configured and
    /// holds flushed rows, run the promotion queries, truncate the buffer
    /// table and persist `lsn`.
    ///
    /// The checkpoint advances only after the flush, the promotion queries
    /// and the buffer-table truncation have all succeeded; this is the
    /// engine's sole durability barrier. Promotion replays idempotently
    /// after a crash because the queries order by the stable row ordinal.
    #[tracing::instrument(skip(self), fields(table = %self.cfg.source_table, %lsn))]
    pub async fn flush_to_main_table(&self, lsn: Lsn) -> Result<()> {
        let mut core = self.core.lock().await;
        self.flush_buffer(&mut core).await?;

        let Some(buffer_table) = &self.cfg.buffer_table else {
            return Ok(());
        };
        if core.buffer_flush_cnt == 0 {
            return Ok(());
        }

        let started = Instant::now();
        let rows = core.buffer_row_id;

        let loader = &self.loader;
        let queries = &self.cfg.flush_queries;
        let mut shutdown = self.shutdown.clone();
        retry("promotion", &self.retry, &mut shutdown, || async move {
            for query in queries {
                loader.exec(query).await?;
            }
            Ok::<(), SinkError>(())
        })
        .await?;

        core.buffer_flush_cnt = 0;
        core.buffer_row_id = 0;

        self.truncate_table(buffer_table).await?;

        if core.mode == EngineMode::Live {
            self.persist_lsn(&mut core, lsn).await?;
        }

        metrics::record_promotion(&self.checkpoint_key(), started.elapsed());
        info!(rows, elapsed = ?started.elapsed(), "promotion complete");
        Ok(())
    }
}

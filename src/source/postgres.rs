// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! PostgreSQL snapshot source.
//!
//! Streams `COPY (SELECT ...) TO STDOUT` inside a repeatable-read
//! transaction pinned to the exported replication snapshot, so the copied
//! rows line up exactly with the snapshot LSN the caller passes to the
//! engine.

use async_trait::async_trait;
use futures::TryStreamExt;
use tracing::error;

use crate::config::SourceTableId;
use crate::error::{EngineError, Result};
use crate::source::{CopyLineSink, LineAssembler, SnapshotSource};

/// `tokio-postgres` implementation of [`SnapshotSource`].
pub struct PostgresSnapshotSource {
    client: tokio_postgres::Client,
}

impl PostgresSnapshotSource {
    /// Connect and spawn the connection driver task.
    pub async fn connect(conn_str: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(conn_str, tokio_postgres::NoTls)
            .await
            .map_err(|e| EngineError::source(format!("source connection failed: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "source connection error");
            }
        });

        Ok(Self { client })
    }

    /// Wrap an existing client (the caller keeps driving its connection).
    pub fn from_client(client: tokio_postgres::Client) -> Self {
        Self { client }
    }

    /// Open the repeatable-read transaction the COPY will run in,
    /// optionally pinned to an exported snapshot.
    pub async fn begin_snapshot(&mut self, snapshot_id: Option<&str>) -> Result<()> {
        self.client
            .batch_execute("BEGIN ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .await
            .map_err(|e| EngineError::source(format!("could not begin snapshot tx: {e}")))?;

        if let Some(id) = snapshot_id {
            // Snapshot ids are server-generated (digits and dashes); quote
            // defensively all the same.
            let stmt = format!("SET TRANSACTION SNAPSHOT '{}'", id.replace('\'', "''"));
            self.client
                .batch_execute(&stmt)
                .await
                .map_err(|e| EngineError::source(format!("could not pin snapshot {id:?}: {e}")))?;
        }
        Ok(())
    }

    /// Close the snapshot transaction.
    pub async fn commit(&mut self) -> Result<()> {
        self.client
            .batch_execute("COMMIT")
            .await
            .map_err(|e| EngineError::source(format!("could not commit snapshot tx: {e}")))
    }

    fn copy_statement(table: &SourceTableId, columns: &[String]) -> String {
        format!(
            "COPY (SELECT {} FROM ONLY {}) TO STDOUT",
            columns.join(", "),
            table
        )
    }
}

#[async_trait]
impl SnapshotSource for PostgresSnapshotSource {
    async fn live_tuple_estimate(&mut self, table: &SourceTableId) -> Result<Option<u64>> {
        let row = self
            .client
            .query_opt(
                "SELECT n_live_tup FROM pg_stat_all_tables \
                 WHERE schemaname = $1 AND relname = $2",
                &[&table.schema, &table.table],
            )
            .await
            .map_err(|e| EngineError::source(format!("statistics query failed: {e}")))?;

        Ok(row
            .and_then(|r| r.get::<_, Option<i64>>(0))
            .map(|n| n.max(0) as u64))
    }

    async fn copy_out(
        &mut self,
        table: &SourceTableId,
        columns: &[String],
        sink: &mut (dyn CopyLineSink + Send),
    ) -> Result<u64> {
        let stmt = Self::copy_statement(table, columns);
        let stream = self
            .client
            .copy_out(stmt.as_str())
            .await
            .map_err(|e| EngineError::source(format!("could not start copy: {e}")))?;
        futures::pin_mut!(stream);

        let mut assembler = LineAssembler::new();
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| EngineError::source(format!("copy read failed: {e}")))?
        {
            for line in assembler.push(&chunk) {
                sink.push_line(&line).await?;
            }
        }
        if let Some(tail) = assembler.finish() {
            sink.push_line(&tail).await?;
        }

        // The copy stream carries no affected-row tag; count within the
        // same snapshot transaction instead.
        let count_stmt = format!("SELECT count(*) FROM ONLY {table}");
        let row = self
            .client
            .query_one(count_stmt.as_str(), &[])
            .await
            .map_err(|e| EngineError::source(format!("snapshot count failed: {e}")))?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory sink for tests and local development.
//!
//! Tables are vectors of string rows. The statement surface is the small
//! subset the engine actually issues: `TRUNCATE TABLE`, the
//! `INSERT INTO ... SELECT ... [WHERE lsn > n] [ORDER BY col]` merge and
//! promotion shape, and `SELECT count() FROM ... [WHERE lsn > n]`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::SinkTableId;
use crate::sink::{BulkUploadTransport, SinkError, SinkLoader};

/// In-memory implementation of both sink seams.
#[derive(Default)]
pub struct MemorySink {
    tables: Mutex<HashMap<String, Vec<Vec<String>>>>,
    buffer: Mutex<Vec<u8>>,
    upload_tx: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    upload_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    exec_log: Mutex<Vec<String>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows currently stored in a table (empty when the table is unknown).
    #[must_use]
    pub fn rows(&self, table: &SinkTableId) -> Vec<Vec<String>> {
        self.tables
            .lock()
            .get(&table.to_string())
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn row_count(&self, table: &SinkTableId) -> usize {
        self.rows(table).len()
    }

    /// Statements passed to [`SinkLoader::exec`], in order.
    #[must_use]
    pub fn exec_history(&self) -> Vec<String> {
        self.exec_log.lock().clone()
    }

    /// Bytes currently sitting in the loader accumulator.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    fn append_rows(
        &self,
        target: &str,
        columns: &[String],
        lines: &[u8],
    ) -> Result<(), SinkError> {
        let rows = parse_lines(lines);
        for row in &rows {
            if row.len() != columns.len() {
                return Err(SinkError::Protocol(format!(
                    "row has {} cells but {} columns were declared for {}",
                    row.len(),
                    columns.len(),
                    target
                )));
            }
        }
        self.tables
            .lock()
            .entry(target.to_string())
            .or_default()
            .extend(rows);
        Ok(())
    }

    fn run_statement(&self, stmt: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let lower = stmt.trim().to_ascii_lowercase();

        if let Some(rest) = lower.strip_prefix("truncate table ") {
            self.tables.lock().remove(rest.trim());
            return Ok(Vec::new());
        }

        if lower.starts_with("insert into ") {
            self.run_insert_select(stmt.trim(), &lower)?;
            return Ok(Vec::new());
        }

        if lower.starts_with("select count() from ") {
            let count = self.run_count(&lower)?;
            return Ok(vec![vec![count.to_string()]]);
        }

        Err(SinkError::Protocol(format!(
            "unsupported statement: {stmt}"
        )))
    }

    /// `INSERT INTO t(c1,..,ck) SELECT c1,..,ck FROM s [WHERE col > n] [ORDER BY col]`
    ///
    /// Source rows may carry extra trailing cells (row ordinal, LSN); the
    /// first `k` cells are copied. The WHERE cell is the last one, the
    /// ORDER BY cell is the first extra one (`k`), matching the layout the
    /// engine writes.
    fn run_insert_select(&self, stmt: &str, lower: &str) -> Result<(), SinkError> {
        let open = stmt
            .find('(')
            .ok_or_else(|| SinkError::Protocol(format!("malformed insert: {stmt}")))?;
        let close = stmt[open..]
            .find(')')
            .map(|i| open + i)
            .ok_or_else(|| SinkError::Protocol(format!("malformed insert: {stmt}")))?;
        let target = stmt["insert into ".len()..open].trim().to_string();
        let width = stmt[open + 1..close].split(',').count();

        let from = lower
            .find(" from ")
            .ok_or_else(|| SinkError::Protocol(format!("malformed insert: {stmt}")))?;
        let tail = &stmt[from + " from ".len()..];
        let tail_lower = &lower[from + " from ".len()..];

        let where_at = tail_lower.find(" where ");
        let order_at = tail_lower.find(" order by ");
        let source_end = where_at.or(order_at).unwrap_or(tail.len());
        let source = tail[..source_end].trim().to_string();

        let min_lsn = match where_at {
            Some(at) => {
                let clause = &tail[at + " where ".len()..order_at.unwrap_or(tail.len())];
                let bound = clause
                    .rsplit('>')
                    .next()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        SinkError::Protocol(format!("unsupported where clause: {clause}"))
                    })?;
                Some(bound)
            }
            None => None,
        };

        let mut picked: Vec<Vec<String>> = self
            .tables
            .lock()
            .get(&source)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|row| match min_lsn {
                Some(bound) => row
                    .last()
                    .and_then(|v| v.parse::<u64>().ok())
                    .is_some_and(|lsn| lsn > bound),
                None => true,
            })
            .collect();

        if order_at.is_some() {
            picked.sort_by_key(|row| {
                row.get(width)
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(u64::MAX)
            });
        }

        let mut tables = self.tables.lock();
        let dst = tables.entry(target).or_default();
        for row in picked {
            dst.push(row.into_iter().take(width).collect());
        }
        Ok(())
    }

    fn run_count(&self, lower: &str) -> Result<usize, SinkError> {
        let tail = &lower["select count() from ".len()..];
        let (source, min_lsn) = match tail.find(" where ") {
            Some(at) => {
                let bound = tail[at + " where ".len()..]
                    .rsplit('>')
                    .next()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| SinkError::Protocol(format!("unsupported count: {tail}")))?;
                (tail[..at].trim(), Some(bound))
            }
            None => (tail.trim(), None),
        };

        let count = self
            .tables
            .lock()
            .get(source)
            .map(|rows| {
                rows.iter()
                    .filter(|row| match min_lsn {
                        Some(bound) => row
                            .last()
                            .and_then(|v| v.parse::<u64>().ok())
                            .is_some_and(|lsn| lsn > bound),
                        None => true,
                    })
                    .count()
            })
            .unwrap_or(0);
        Ok(count)
    }
}

#[async_trait]
impl SinkLoader for MemorySink {
    async fn buffer_write(&self, bytes: &[u8]) -> Result<(), SinkError> {
        self.buffer.lock().extend_from_slice(bytes);
        Ok(())
    }

    async fn buffer_flush(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError> {
        let staged = std::mem::take(&mut *self.buffer.lock());
        self.append_rows(&target.to_string(), columns, &staged)
    }

    async fn exec(&self, stmt: &str) -> Result<(), SinkError> {
        self.exec_log.lock().push(stmt.to_string());
        self.run_statement(stmt).map(|_| ())
    }

    async fn query(&self, stmt: &str) -> Result<Vec<Vec<String>>, SinkError> {
        self.run_statement(stmt)
    }
}

#[async_trait]
impl BulkUploadTransport for MemorySink {
    async fn begin(&self) -> Result<(), SinkError> {
        let (tx, rx) = mpsc::channel(64);
        *self.upload_tx.lock() = Some(tx);
        *self.upload_rx.lock() = Some(rx);
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<(), SinkError> {
        let tx = self
            .upload_tx
            .lock()
            .clone()
            .ok_or_else(|| SinkError::backend("bulk upload pipeline is not open"))?;
        tx.send(bytes.to_vec())
            .await
            .map_err(|_| SinkError::backend("bulk upload pipeline closed"))
    }

    async fn finish(&self) -> Result<(), SinkError> {
        // Dropping the sender is the EOF the draining side waits for.
        self.upload_tx.lock().take();
        Ok(())
    }

    async fn bulk_upload(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError> {
        let mut rx = self
            .upload_rx
            .lock()
            .take()
            .ok_or_else(|| SinkError::backend("bulk upload pipeline is not open"))?;

        let mut staged = Vec::new();
        while let Some(chunk) = rx.recv().await {
            staged.extend_from_slice(&chunk);
        }
        self.append_rows(&target.to_string(), columns, &staged)
    }
}

fn parse_lines(bytes: &[u8]) -> Vec<Vec<String>> {
    bytes
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split(|&b| b == b'\t')
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_buffer_write_then_flush() {
        let sink = MemorySink::new();
        let table = SinkTableId::new("db", "t");

        sink.buffer_write(b"1\ta\n").await.unwrap();
        sink.buffer_write(b"2\tb\n").await.unwrap();
        assert_eq!(sink.row_count(&table), 0);

        sink.buffer_flush(&table, &cols(&["id", "name"])).await.unwrap();
        assert_eq!(
            sink.rows(&table),
            vec![vec!["1".to_string(), "a".to_string()], vec![
                "2".to_string(),
                "b".to_string()
            ]]
        );
        assert_eq!(sink.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_flush_rejects_column_mismatch() {
        let sink = MemorySink::new();
        sink.buffer_write(b"1\ta\n").await.unwrap();
        let err = sink
            .buffer_flush(&SinkTableId::new("db", "t"), &cols(&["id"]))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_truncate() {
        let sink = MemorySink::new();
        let table = SinkTableId::new("db", "t");
        sink.buffer_write(b"1\n").await.unwrap();
        sink.buffer_flush(&table, &cols(&["id"])).await.unwrap();

        sink.exec("truncate table db.t").await.unwrap();
        assert_eq!(sink.row_count(&table), 0);
    }

    #[tokio::test]
    async fn test_insert_select_filters_sorts_and_strips() {
        let sink = MemorySink::new();
        let aux = SinkTableId::new("db", "aux");
        let main = SinkTableId::new("db", "t");

        // id, name + trailing (row_id, lsn)
        sink.buffer_write(b"2\tb\t1\t300\n1\ta\t0\t200\n9\tz\t2\t50\n")
            .await
            .unwrap();
        sink.buffer_flush(&aux, &cols(&["id", "name", "row_id", "lsn"]))
            .await
            .unwrap();

        sink.exec("INSERT INTO db.t(id,name) SELECT id,name FROM db.aux WHERE lsn > 100 ORDER BY row_id")
            .await
            .unwrap();

        assert_eq!(
            sink.rows(&main),
            vec![vec!["1".to_string(), "a".to_string()], vec![
                "2".to_string(),
                "b".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn test_count_query() {
        let sink = MemorySink::new();
        let aux = SinkTableId::new("db", "aux");
        sink.buffer_write(b"1\t0\t200\n2\t1\t50\n").await.unwrap();
        sink.buffer_flush(&aux, &cols(&["id", "row_id", "lsn"]))
            .await
            .unwrap();

        let rows = sink
            .query("SELECT count() FROM db.aux WHERE lsn > 100")
            .await
            .unwrap();
        assert_eq!(rows, vec![vec!["1".to_string()]]);
    }

    #[tokio::test]
    async fn test_bulk_upload_drains_until_finish() {
        let sink = std::sync::Arc::new(MemorySink::new());
        let table = SinkTableId::new("db", "t");

        sink.begin().await.unwrap();
        let drain = {
            let sink = sink.clone();
            let table = table.clone();
            tokio::spawn(async move {
                sink.bulk_upload(&table, &cols(&["id", "name"])).await
            })
        };

        sink.write(b"1\ta\n").await.unwrap();
        sink.write(b"2\tb\n").await.unwrap();
        sink.finish().await.unwrap();

        drain.await.unwrap().unwrap();
        assert_eq!(sink.row_count(&table), 2);
    }

    #[tokio::test]
    async fn test_write_without_begin_fails() {
        let sink = MemorySink::new();
        assert!(sink.write(b"1\n").await.is_err());
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP transport for a columnar sink speaking TSV-over-HTTP.
//!
//! Statements are POSTed as the `query` parameter; row payloads travel in
//! the request body as tab-separated lines (`INSERT ... FORMAT
//! TabSeparated`). The bulk-upload side streams the body straight out of
//! the COPY pipeline instead of staging the whole snapshot in memory.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::SinkTableId;
use crate::sink::{BulkUploadTransport, SinkError, SinkLoader};

/// HTTP implementation of the sink loader and bulk-upload transport.
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
    buffer: Mutex<Vec<u8>>,
    upload_tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    upload_rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
}

impl HttpSink {
    /// Create a sink client for `base_url` (e.g. `http://localhost:8123`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| SinkError::Connection(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            buffer: Mutex::new(Vec::new()),
            upload_tx: Mutex::new(None),
            upload_rx: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffer.lock().len()
    }

    async fn post(
        &self,
        stmt: &str,
        body: reqwest::Body,
    ) -> Result<Bytes, SinkError> {
        let response = self
            .client
            .post(&self.base_url)
            .query(&[("query", stmt)])
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Backend(format!(
                "sink returned {status}: {body}"
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| SinkError::Connection(e.to_string()))
    }

    fn insert_statement(target: &SinkTableId, columns: &[String]) -> String {
        format!(
            "INSERT INTO {target}({}) FORMAT TabSeparated",
            columns.join(",")
        )
    }
}

#[async_trait]
impl SinkLoader for HttpSink {
    async fn buffer_write(&self, bytes: &[u8]) -> Result<(), SinkError> {
        self.buffer.lock().extend_from_slice(bytes);
        Ok(())
    }

    async fn buffer_flush(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError> {
        // Cleared only after a successful ship so a retried flush re-sends
        // the same accumulator.
        let staged = self.buffer.lock().clone();
        if staged.is_empty() {
            return Ok(());
        }

        let stmt = Self::insert_statement(target, columns);
        self.post(&stmt, staged.into()).await?;
        self.buffer.lock().clear();
        debug!(target = %target, "buffer shipped");
        Ok(())
    }

    async fn exec(&self, stmt: &str) -> Result<(), SinkError> {
        self.post(stmt, Vec::new().into()).await.map(|_| ())
    }

    async fn query(&self, stmt: &str) -> Result<Vec<Vec<String>>, SinkError> {
        let body = self.post(stmt, Vec::new().into()).await?;
        Ok(body
            .split(|&b| b == b'\n')
            .filter(|line| !line.is_empty())
            .map(|line| {
                line.split(|&b| b == b'\t')
                    .map(|cell| String::from_utf8_lossy(cell).into_owned())
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl BulkUploadTransport for HttpSink {
    async fn begin(&self) -> Result<(), SinkError> {
        let (tx, rx) = mpsc::channel(256);
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
        tx.send(Bytes::copy_from_slice(bytes))
            .await
            .map_err(|_| SinkError::backend("bulk upload pipeline closed"))
    }

    async fn finish(&self) -> Result<(), SinkError> {
        // Dropping the sender closes the streamed request body.
        self.upload_tx.lock().take();
        Ok(())
    }

    async fn bulk_upload(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError> {
        let rx = self
            .upload_rx
            .lock()
            .take()
            .ok_or_else(|| SinkError::backend("bulk upload pipeline is not open"))?;

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv()
                .await
                .map(|chunk| (Ok::<_, std::io::Error>(chunk), rx))
        });

        let stmt = Self::insert_statement(target, columns);
        self.post(&stmt, reqwest::Body::wrap_stream(stream)).await?;
        debug!(target = %target, "bulk upload complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_buffer_accumulates_until_flush() {
        let sink = HttpSink::new("http://localhost:0").unwrap();
        sink.buffer_write(b"1\ta\n").await.unwrap();
        sink.buffer_write(b"2\tb\n").await.unwrap();
        assert_eq!(sink.buffered_len(), 8);
    }

    #[tokio::test]
    async fn test_write_without_begin_fails() {
        let sink = HttpSink::new("http://localhost:0").unwrap();
        assert!(sink.write(b"1\n").await.is_err());
    }

    #[test]
    fn test_insert_statement_shape() {
        let stmt = HttpSink::insert_statement(
            &SinkTableId::new("analytics", "events"),
            &["id".to_string(), "name".to_string()],
        );
        assert_eq!(
            stmt,
            "INSERT INTO analytics.events(id,name) FORMAT TabSeparated"
        );
    }
}

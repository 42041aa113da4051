// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sink-side seams: the buffered loader and the bulk-upload pipeline.
//!
//! The engine never talks to the sink directly; it goes through these two
//! traits. [`SinkLoader`] is the statement-and-buffer interface used by the
//! streaming path, [`BulkUploadTransport`] is the pipe-like interface the
//! initial sync streams the snapshot through.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SinkTableId;

/// Errors from the sink transports.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("sink backend error: {0}")]
    Backend(String),
    #[error("sink connection error: {0}")]
    Connection(String),
    #[error("sink protocol error: {0}")]
    Protocol(String),
}

impl SinkError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Buffered loader for the streaming path.
///
/// `buffer_write` appends to an internal accumulator held by the
/// implementation; `buffer_flush` ships the accumulator to `target` and
/// clears it. Implementations must be callable through `&self`: the
/// auto-flush path and the promotion path share one loader.
#[async_trait]
pub trait SinkLoader: Send + Sync {
    async fn buffer_write(&self, bytes: &[u8]) -> Result<(), SinkError>;

    async fn buffer_flush(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError>;

    async fn exec(&self, stmt: &str) -> Result<(), SinkError>;

    async fn query(&self, stmt: &str) -> Result<Vec<Vec<String>>, SinkError>;
}

/// Pipe-like bulk-upload transport used by the initial sync.
///
/// `begin` opens the pipeline, `write` feeds it line bytes, `finish` closes
/// the writing side. `bulk_upload` runs on a separate task and drains the
/// pipeline into `target` until the writer closes, so close/EOF propagation
/// terminates the drain deterministically.
#[async_trait]
pub trait BulkUploadTransport: Send + Sync {
    async fn begin(&self) -> Result<(), SinkError>;

    async fn write(&self, bytes: &[u8]) -> Result<(), SinkError>;

    async fn finish(&self) -> Result<(), SinkError>;

    async fn bulk_upload(
        &self,
        target: &SinkTableId,
        columns: &[String],
    ) -> Result<(), SinkError>;
}

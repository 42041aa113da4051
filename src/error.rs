// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the replication engine.

use thiserror::Error;

use crate::sink::SinkError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors surfaced by a table engine.
///
/// All errors are per-table; the orchestrator decides whether to restart the
/// table's pipeline, quiesce it, or terminate the process.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Sink-side I/O failure that survived the bounded retry budget.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Source-side failure (COPY read, statistics query). Never retried.
    #[error("source error: {0}")]
    Source(String),

    /// A column value could not be converted to its sink representation.
    #[error("could not convert column '{column}': {reason}")]
    Conversion { column: String, reason: String },

    /// The number of rows streamed during initial sync does not match the
    /// count the source reports for the snapshot. Fatal for the table; the
    /// checkpoint must not advance.
    #[error("synced row count ({synced}) does not match source row count ({reported})")]
    SyncCountMismatch { synced: u64, reported: u64 },

    /// The engine shutdown signal fired while an operation was retrying.
    #[error("abort retrying")]
    Cancelled,

    /// Failure reading or writing the durable LSN checkpoint.
    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    /// A malformed LSN string.
    #[error("invalid LSN: {0:?}")]
    InvalidLsn(String),

    /// Rejected table configuration.
    #[error("invalid table configuration: {0}")]
    Config(String),
}

impl EngineError {
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn conversion(column: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conversion {
            column: column.into(),
            reason: reason.into(),
        }
    }
}

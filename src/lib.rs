//! # cdc-bridge
//!
//! A per-table change-data-capture bridge: replicates one source table from
//! a row-oriented MVCC store into a column-oriented analytical sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Logical decoding client                    │
//! │  • drives begin / process_tuples / commit                   │
//! │  • drives start_sync / sync_from / flush_to_main_table      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TableEngine                            │
//! │  • Sync mode: COPY snapshot → bulk upload → main table,     │
//! │    live events staged in the aux table, merged at the end   │
//! │  • Live mode: converted rows → delta buffer → buffer table  │
//! │    → promotion into the main table                          │
//! │  • at-most-once durable LSN checkpoint per table            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Columnar sink                           │
//! │  • TSV-over-HTTP loader + streaming bulk upload             │
//! │  • main / buffer / sync-aux tables                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cdc_bridge::TableEngine;
//! use cdc_bridge::config::TableConfig;
//! use cdc_bridge::checkpoint::FileCheckpointStore;
//! use cdc_bridge::sink::http::HttpSink;
//! use tokio::sync::watch;
//!
//! # async fn example(config: TableConfig) -> cdc_bridge::Result<()> {
//! let sink = Arc::new(HttpSink::new("http://localhost:8123")?);
//! let checkpoints = Arc::new(FileCheckpointStore::new("/var/lib/bridge").await?);
//! let (_stop, shutdown) = watch::channel(false);
//!
//! let engine = TableEngine::new(
//!     config,
//!     sink.clone(),
//!     sink,
//!     checkpoints,
//!     None,
//!     shutdown,
//! )?;
//! engine.init().await?;
//!
//! // Initial snapshot at the exported LSN, then live streaming.
//! // engine.start_sync().await;
//! // engine.sync_from(&mut source, "0/16B3748".parse()?).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: the per-table [`TableEngine`] state machine
//! - [`convert`]: row conversion and the COPY line decoder
//! - [`dml`]: shaping decoded DML commands into sink tuples
//! - [`sink`]: sink loader / bulk-upload seams and transports
//! - [`source`]: snapshot source seam and the PostgreSQL implementation
//! - [`checkpoint`]: durable per-table LSN checkpoints
//! - [`resilience`]: bounded retry with cancellation
//! - [`config`]: per-table configuration

pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod dml;
pub mod engine;
pub mod error;
pub mod lsn;
pub mod metrics;
pub mod resilience;
pub mod sink;
pub mod source;

pub use checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{SinkModel, SinkTableId, SourceTableId, TableConfig};
pub use convert::{RowConverter, SinkTuple, SourceRow, SourceValue};
pub use dml::DmlKind;
pub use engine::{EngineMode, EngineProgress, TableEngine, Transaction};
pub use error::{EngineError, Result};
pub use lsn::Lsn;
pub use resilience::RetryPolicy;
pub use sink::{BulkUploadTransport, SinkError, SinkLoader};
pub use source::{CopyLineSink, SnapshotSource};

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-table replication configuration.
//!
//! One [`TableConfig`] describes a single source table and its sink-side
//! counterparts. The orchestrator deserializes one per configured table and
//! hands it to [`TableEngine::new`](crate::TableEngine::new).
//!
//! # Example
//!
//! ```
//! use cdc_bridge::config::TableConfig;
//!
//! // Minimal config (uses defaults)
//! let config = TableConfig::default();
//! assert_eq!(config.max_buffer_length, 1000);
//! assert_eq!(config.lsn_column, "lsn");
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::error::EngineError;

/// Fully qualified source-side table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct SourceTableId {
    pub schema: String,
    pub table: String,
}

impl SourceTableId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Canonical `schema.table` form; also the checkpoint-store key.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

impl fmt::Display for SourceTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Fully qualified sink-side table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize)]
pub struct SinkTableId {
    pub database: String,
    pub table: String,
}

impl SinkTableId {
    pub fn new(database: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for SinkTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.table)
    }
}

/// Base type of a source column, as reported by the source relation.
///
/// Drives the per-type value conversion in [`crate::convert::column`].
/// `IntMap` marks the semi-structured integer-keyed map type that fans out
/// into several sink columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Timestamp,
    Timestamptz,
    Date,
    Uuid,
    IntMap,
}

impl ColumnType {
    /// Whether this type expands into more than one sink column.
    #[must_use]
    pub fn is_composite(self) -> bool {
        matches!(self, ColumnType::IntMap)
    }
}

impl Default for ColumnType {
    fn default() -> Self {
        ColumnType::Text
    }
}

/// One column of the source relation, in declared order.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub base_type: ColumnType,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, base_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            is_key: false,
            base_type,
        }
    }

    #[must_use]
    pub fn key(mut self) -> Self {
        self.is_key = true;
        self
    }
}

/// Sink-side description of a mapped column.
#[derive(Debug, Clone, Deserialize)]
pub struct SinkColumn {
    pub name: String,
    /// Sink-side type name, informational only (the sink owns its DDL).
    #[serde(default)]
    pub kind: String,
}

impl SinkColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: String::new(),
        }
    }
}

/// Conversion properties for a composite (integer-keyed map) column.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnProperties {
    /// Fan the map out into one sink column per key in
    /// `[flatten_min, flatten_max]` instead of a keys/values column pair.
    #[serde(default)]
    pub flatten: bool,
    #[serde(default)]
    pub flatten_min: i64,
    #[serde(default)]
    pub flatten_max: i64,
    #[serde(default = "default_keys_suffix")]
    pub keys_suffix: String,
    #[serde(default = "default_values_suffix")]
    pub values_suffix: String,
}

impl Default for ColumnProperties {
    fn default() -> Self {
        Self {
            flatten: false,
            flatten_min: 0,
            flatten_max: 0,
            keys_suffix: default_keys_suffix(),
            values_suffix: default_values_suffix(),
        }
    }
}

/// How decoded DML commands are shaped into sink rows.
///
/// Mirrors the sink-side table engine: an append-only sink takes inserts
/// only, a replacing sink takes the newest row image, a collapsing sink
/// takes sign-carrying row pairs that cancel out on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkModel {
    Append,
    Replacing,
    Collapsing,
}

impl Default for SinkModel {
    fn default() -> Self {
        SinkModel::Append
    }
}

/// Configuration for one replicated table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    /// Source table the engine replicates.
    #[serde(default)]
    pub source_table: SourceTableId,

    /// Sink main table (the analytical table readers query).
    #[serde(default)]
    pub main_table: SinkTableId,

    /// Optional sink staging table rows are flushed to before promotion.
    #[serde(default)]
    pub buffer_table: Option<SinkTableId>,

    /// Optional sink table receiving live events routed during initial sync.
    #[serde(default)]
    pub sync_aux_table: Option<SinkTableId>,

    /// Source relation columns in declared order.
    #[serde(default)]
    pub tuple_columns: Vec<SourceColumn>,

    /// Source column name -> sink column. Unmapped source columns are
    /// dropped silently.
    #[serde(default)]
    pub column_mapping: HashMap<String, SinkColumn>,

    /// Per-column conversion properties (composite columns).
    #[serde(default)]
    pub column_properties: HashMap<String, ColumnProperties>,

    /// Sink column receiving the shared generation counter, appended last.
    #[serde(default)]
    pub generation_column: Option<String>,

    /// Sink sign column for the collapsing model.
    #[serde(default)]
    pub sign_column: Option<String>,

    /// DML shaping model for this table's sink engine.
    #[serde(default)]
    pub sink_model: SinkModel,

    /// DML command count after which the delta buffer auto-flushes.
    #[serde(default = "default_max_buffer_length")]
    pub max_buffer_length: usize,

    /// Successful buffer flushes after which promotion is signalled.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,

    /// Skip the main-table truncate at the start of initial sync.
    #[serde(default)]
    pub init_sync_skip_truncate: bool,

    /// Sink column holding the event LSN in aux-table rows.
    #[serde(default = "default_lsn_column")]
    pub lsn_column: String,

    /// Sink column holding the stable row ordinal in buffer/aux rows.
    #[serde(default = "default_row_id_column")]
    pub row_id_column: String,

    /// Ordered promotion statements moving rows from the buffer table into
    /// the main table. Populated by the orchestrator; executed inside one
    /// bounded-retry envelope per promotion.
    #[serde(default)]
    pub flush_queries: Vec<String>,
}

fn default_max_buffer_length() -> usize {
    1000
}
fn default_flush_threshold() -> usize {
    10
}
fn default_lsn_column() -> String {
    "lsn".to_string()
}
fn default_row_id_column() -> String {
    "row_id".to_string()
}
fn default_keys_suffix() -> String {
    "keys".to_string()
}
fn default_values_suffix() -> String {
    "values".to_string()
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            source_table: SourceTableId::default(),
            main_table: SinkTableId::default(),
            buffer_table: None,
            sync_aux_table: None,
            tuple_columns: Vec::new(),
            column_mapping: HashMap::new(),
            column_properties: HashMap::new(),
            generation_column: None,
            sign_column: None,
            sink_model: SinkModel::default(),
            max_buffer_length: default_max_buffer_length(),
            flush_threshold: default_flush_threshold(),
            init_sync_skip_truncate: false,
            lsn_column: default_lsn_column(),
            row_id_column: default_row_id_column(),
            flush_queries: Vec::new(),
        }
    }
}

impl TableConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_buffer_length == 0 {
            return Err(EngineError::config("max_buffer_length must be at least 1"));
        }

        let mapped = self
            .tuple_columns
            .iter()
            .filter(|c| self.column_mapping.contains_key(&c.name))
            .count();
        if mapped == 0 {
            return Err(EngineError::config(format!(
                "no source column of {} is mapped to a sink column",
                self.source_table
            )));
        }

        if self.sink_model == SinkModel::Collapsing && self.sign_column.is_none() {
            return Err(EngineError::config(
                "collapsing sink model requires a sign_column",
            ));
        }

        for (name, props) in &self.column_properties {
            if props.flatten && props.flatten_min > props.flatten_max {
                return Err(EngineError::config(format!(
                    "column '{name}': flatten_min exceeds flatten_max"
                )));
            }
        }

        Ok(())
    }
}

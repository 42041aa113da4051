// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the table engine.

use crate::lsn::Lsn;

/// Routing state of a table engine.
///
/// `Sync` while the initial snapshot copy is running; `Live` afterwards.
/// Read and written only under the engine mutex, so the stream handler
/// routes by an unambiguous tag instead of a shared flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Streaming replication; events route to the buffer/main table.
    Live,
    /// Initial snapshot in progress; events route to the aux table.
    Sync,
}

impl std::fmt::Display for EngineMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "Live"),
            Self::Sync => write!(f, "Sync"),
        }
    }
}

/// Mutable engine state guarded by the engine mutex.
#[derive(Debug)]
pub(crate) struct EngineCore {
    pub(crate) mode: EngineMode,
    /// LSN of the initial copy snapshot. Immutable once the sync records it.
    pub(crate) snapshot_lsn: Lsn,
    /// Source DML commands staged in the current buffer (one update may
    /// emit two rows but counts once).
    pub(crate) buffer_cmd_id: usize,
    /// Row ordinal within the current promotion window; the sink's stable
    /// sort column.
    pub(crate) buffer_row_id: u64,
    /// Successful buffer flushes since the last promotion.
    pub(crate) buffer_flush_cnt: usize,
    /// Row ordinal for rows routed to the aux table during sync.
    pub(crate) aux_row_id: u64,
    /// Highest LSN ever persisted for this table; the checkpoint never
    /// moves backward past it.
    pub(crate) last_saved_lsn: Option<Lsn>,
}

impl EngineCore {
    pub(crate) fn new() -> Self {
        Self {
            mode: EngineMode::Live,
            snapshot_lsn: Lsn::ZERO,
            buffer_cmd_id: 0,
            buffer_row_id: 0,
            buffer_flush_cnt: 0,
            aux_row_id: 0,
            last_saved_lsn: None,
        }
    }
}

/// Diagnostic snapshot of a table engine's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProgress {
    pub mode: EngineMode,
    pub synced_rows: u64,
    pub rows_to_sync: u64,
    pub buffer_commands: usize,
    pub buffer_flushes: usize,
}

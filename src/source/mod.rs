// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source-side seams for the initial snapshot.
//!
//! The logical-decoding client that feeds live events is an external
//! collaborator; what the engine needs from the source itself is only the
//! snapshot COPY: a best-effort row estimate and a line-oriented stream of
//! the table contents at the snapshot point.

pub mod postgres;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};

use crate::config::SourceTableId;
use crate::error::Result;

/// Receiver for COPY lines; implemented by the engine's sync writer.
#[async_trait]
pub trait CopyLineSink: Send {
    async fn push_line(&mut self, line: &[u8]) -> Result<()>;
}

/// A source able to stream one consistent snapshot of a table.
#[async_trait]
pub trait SnapshotSource: Send {
    /// Approximate live-tuple count from source statistics. Best-effort:
    /// an error here only degrades progress reporting.
    async fn live_tuple_estimate(&mut self, table: &SourceTableId) -> Result<Option<u64>>;

    /// Stream the table snapshot line by line into `sink` and return the
    /// row count the source reports for the snapshot.
    async fn copy_out(
        &mut self,
        table: &SourceTableId,
        columns: &[String],
        sink: &mut (dyn CopyLineSink + Send),
    ) -> Result<u64>;
}

/// Reassembles newline-terminated lines out of arbitrary stream chunks.
///
/// COPY data arrives in transport-sized chunks that split lines anywhere;
/// the carry buffer holds the partial tail between chunks.
#[derive(Default)]
pub(crate) struct LineAssembler {
    carry: BytesMut,
}

impl LineAssembler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every line completed by it.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.carry.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(at) = self.carry.iter().position(|&b| b == b'\n') {
            let mut line = self.carry.split_to(at + 1);
            line.truncate(at);
            lines.push(line.to_vec());
        }
        lines
    }

    /// Whatever is left after the stream ends (a line missing its newline).
    pub(crate) fn finish(&mut self) -> Option<Vec<u8>> {
        if self.carry.is_empty() {
            return None;
        }
        let tail = self.carry.copy_to_bytes(self.carry.remaining());
        Some(tail.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_within_one_chunk() {
        let mut assembler = LineAssembler::new();
        let lines = assembler.push(b"1\ta\n2\tb\n");
        assert_eq!(lines, vec![b"1\ta".to_vec(), b"2\tb".to_vec()]);
        assert!(assembler.finish().is_none());
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"1\tal").is_empty());
        let lines = assembler.push(b"ice\n2\tbob");
        assert_eq!(lines, vec![b"1\talice".to_vec()]);
        assert_eq!(assembler.finish(), Some(b"2\tbob".to_vec()));
    }

    #[test]
    fn test_empty_stream() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"").is_empty());
        assert!(assembler.finish().is_none());
    }
}

// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Decoder for the source's COPY text line format.
//!
//! During initial sync the source streams the snapshot as newline-terminated
//! lines of tab-separated fields: `\N` marks null, control characters and
//! the delimiter itself arrive backslash-escaped.

use crate::convert::{SourceRow, SourceValue};
use crate::error::{EngineError, Result};

/// Decode one COPY line (with or without its trailing newline) into a
/// source row.
pub fn decode_copy_line(line: &[u8]) -> Result<SourceRow> {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    let mut row = SourceRow::new();

    // Escaped tabs arrive as the two bytes `\t`, so a raw 0x09 always
    // separates fields.
    for field in line.split(|&b| b == b'\t') {
        if field == b"\\N" {
            row.push(SourceValue::Null);
        } else {
            row.push(SourceValue::Text(unescape(field)?));
        }
    }

    Ok(row)
}

fn unescape(field: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(field.len());
    let mut iter = field.iter();

    while let Some(&b) = iter.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(b'b') => out.push(0x08),
            Some(b'f') => out.push(0x0C),
            Some(b'n') => out.push(b'\n'),
            Some(b'r') => out.push(b'\r'),
            Some(b't') => out.push(b'\t'),
            Some(b'v') => out.push(0x0B),
            Some(&other) => out.push(other),
            None => {
                return Err(EngineError::source(format!(
                    "truncated escape in copy field {:?}",
                    String::from_utf8_lossy(field)
                )))
            }
        }
    }

    Ok(out)
}

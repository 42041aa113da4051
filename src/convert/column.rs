// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-type column value conversion.
//!
//! Source values arrive as the source's textual wire form; the sink accepts
//! tab-separated lines, so every cell must be free of raw tabs, newlines
//! and backslashes. Nulls become `\N`, booleans become `0`/`1`, numeric and
//! temporal values pass through unchanged.

use std::collections::BTreeMap;

use crate::config::{ColumnProperties, ColumnType};
use crate::convert::SourceValue;

/// Sink-side null marker for tab-separated lines.
pub const NULL_MARKER: &[u8] = b"\\N";

/// Convert one simple (non-composite) value into a single sink cell.
pub fn convert_value(base_type: ColumnType, value: &SourceValue) -> Result<Vec<u8>, String> {
    let raw = match value {
        SourceValue::Null => return Ok(NULL_MARKER.to_vec()),
        SourceValue::Text(raw) => raw,
    };

    match base_type {
        ColumnType::Bool => match raw.as_slice() {
            b"t" | b"true" => Ok(b"1".to_vec()),
            b"f" | b"false" => Ok(b"0".to_vec()),
            other => Err(format!(
                "invalid boolean literal {:?}",
                String::from_utf8_lossy(other)
            )),
        },
        ColumnType::Int2 | ColumnType::Int4 | ColumnType::Int8 => {
            let text = std::str::from_utf8(raw).map_err(|_| "non-utf8 integer".to_string())?;
            text.parse::<i64>()
                .map_err(|e| format!("invalid integer literal {text:?}: {e}"))?;
            Ok(raw.clone())
        }
        ColumnType::Float4 | ColumnType::Float8 | ColumnType::Numeric => {
            let text = std::str::from_utf8(raw).map_err(|_| "non-utf8 number".to_string())?;
            text.parse::<f64>()
                .map_err(|e| format!("invalid numeric literal {text:?}: {e}"))?;
            Ok(raw.clone())
        }
        ColumnType::Text
        | ColumnType::Timestamp
        | ColumnType::Timestamptz
        | ColumnType::Date
        | ColumnType::Uuid => Ok(escape(raw)),
        ColumnType::IntMap => Err("composite column routed through convert_value".to_string()),
    }
}

/// Convert a composite integer-keyed map value into its sink cells.
///
/// With `flatten` set, one cell per key in `[flatten_min, flatten_max]`
/// (absent keys become `0`); otherwise a keys-array cell and a
/// values-array cell in ascending key order.
pub fn convert_map(
    value: &SourceValue,
    props: &ColumnProperties,
) -> Result<Vec<Vec<u8>>, String> {
    let entries = match value {
        SourceValue::Null => BTreeMap::new(),
        SourceValue::Text(raw) => parse_map(raw)?,
    };

    if props.flatten {
        let mut cells = Vec::with_capacity((props.flatten_max - props.flatten_min + 1) as usize);
        for key in props.flatten_min..=props.flatten_max {
            match entries.get(&key) {
                Some(v) => cells.push(v.clone().into_bytes()),
                None => cells.push(b"0".to_vec()),
            }
        }
        Ok(cells)
    } else {
        let keys = entries
            .keys()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let values = entries.values().cloned().collect::<Vec<_>>().join(",");
        Ok(vec![
            format!("[{keys}]").into_bytes(),
            format!("[{values}]").into_bytes(),
        ])
    }
}

/// Parse the `"k"=>"v", ...` textual map form.
fn parse_map(raw: &[u8]) -> Result<BTreeMap<i64, String>, String> {
    let text = std::str::from_utf8(raw).map_err(|_| "non-utf8 map value".to_string())?;
    let mut entries = BTreeMap::new();

    for pair in text.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair
            .split_once("=>")
            .ok_or_else(|| format!("malformed map entry {pair:?}"))?;
        let key = unquote(key.trim());
        let value = unquote(value.trim());
        let key = key
            .parse::<i64>()
            .map_err(|e| format!("invalid map key {key:?}: {e}"))?;
        entries.insert(key, value.to_string());
    }

    Ok(entries)
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(s)
}

/// Escape tab, newline, carriage return and backslash for the sink line
/// format.
fn escape(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    for &b in raw {
        match b {
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\\' => out.extend_from_slice(b"\\\\"),
            _ => out.push(b),
        }
    }
    out
}

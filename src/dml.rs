// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shaping decoded DML commands into sink tuples.
//!
//! The stream handler treats the tuples of one command as opaque; this
//! module is where the sink model decides how many rows a command becomes.
//! Under the collapsing model an insert carries sign `1`, a delete carries
//! sign `-1` on the old image, and an update becomes a cancel/state pair,
//! so that the sink's merge collapses row history down to the final state.

use crate::config::SinkModel;
use crate::convert::{RowConverter, SinkTuple, SourceRow};
use crate::error::{EngineError, Result};

const SIGN_PLUS: &[u8] = b"1";
const SIGN_MINUS: &[u8] = b"-1";

/// Kind of a decoded source DML command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

/// Turn one decoded DML command into the sink tuples it materializes as.
///
/// The returned tuples belong to a single command: the stream handler
/// writes them all and counts one buffered command.
pub fn shape(
    model: SinkModel,
    converter: &RowConverter,
    kind: DmlKind,
    old: Option<&SourceRow>,
    new: Option<&SourceRow>,
) -> Result<Vec<SinkTuple>> {
    match (model, kind) {
        (SinkModel::Append | SinkModel::Replacing, DmlKind::Insert | DmlKind::Update) => {
            let new = require(new, "new")?;
            Ok(vec![converter.convert(new)?])
        }
        // Neither an append-only nor a replacing sink can express removal.
        (SinkModel::Append | SinkModel::Replacing, DmlKind::Delete) => Ok(Vec::new()),

        (SinkModel::Collapsing, DmlKind::Insert) => {
            let new = require(new, "new")?;
            Ok(vec![signed(converter.convert(new)?, SIGN_PLUS)])
        }
        (SinkModel::Collapsing, DmlKind::Delete) => {
            let old = require(old, "old")?;
            Ok(vec![signed(converter.convert(old)?, SIGN_MINUS)])
        }
        (SinkModel::Collapsing, DmlKind::Update) => {
            let old = require(old, "old")?;
            let new = require(new, "new")?;
            if converter.compare_rows(old, new).equal {
                return Ok(Vec::new());
            }
            Ok(vec![
                signed(converter.convert(old)?, SIGN_MINUS),
                signed(converter.convert(new)?, SIGN_PLUS),
            ])
        }
    }
}

fn require<'a>(row: Option<&'a SourceRow>, which: &str) -> Result<&'a SourceRow> {
    row.ok_or_else(|| EngineError::source(format!("decoded command is missing its {which} row")))
}

fn signed(mut tuple: SinkTuple, sign: &[u8]) -> SinkTuple {
    tuple.push(b'\t');
    tuple.extend_from_slice(sign);
    tuple
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ColumnType, SinkColumn, SourceColumn, TableConfig};
    use crate::convert::SourceValue;
    use std::collections::HashMap;

    fn converter(model: SinkModel) -> RowConverter {
        let cfg = TableConfig {
            tuple_columns: vec![
                SourceColumn::new("id", ColumnType::Int8).key(),
                SourceColumn::new("name", ColumnType::Text),
            ],
            column_mapping: HashMap::from([
                ("id".to_string(), SinkColumn::new("id")),
                ("name".to_string(), SinkColumn::new("name")),
            ]),
            sign_column: (model == SinkModel::Collapsing).then(|| "sign".to_string()),
            sink_model: model,
            ..Default::default()
        };
        RowConverter::new(&cfg, None).unwrap()
    }

    fn row(id: &str, name: &str) -> SourceRow {
        vec![SourceValue::text(id), SourceValue::text(name)]
    }

    #[test]
    fn test_append_insert_single_row() {
        let conv = converter(SinkModel::Append);
        let tuples = shape(
            SinkModel::Append,
            &conv,
            DmlKind::Insert,
            None,
            Some(&row("1", "a")),
        )
        .unwrap();
        assert_eq!(tuples, vec![b"1\ta".to_vec()]);
    }

    #[test]
    fn test_append_delete_yields_nothing() {
        let conv = converter(SinkModel::Append);
        let tuples = shape(
            SinkModel::Append,
            &conv,
            DmlKind::Delete,
            Some(&row("1", "a")),
            None,
        )
        .unwrap();
        assert!(tuples.is_empty());
    }

    #[test]
    fn test_collapsing_insert_and_delete_signs() {
        let conv = converter(SinkModel::Collapsing);
        let ins = shape(
            SinkModel::Collapsing,
            &conv,
            DmlKind::Insert,
            None,
            Some(&row("1", "a")),
        )
        .unwrap();
        assert_eq!(ins, vec![b"1\ta\t1".to_vec()]);

        let del = shape(
            SinkModel::Collapsing,
            &conv,
            DmlKind::Delete,
            Some(&row("1", "a")),
            None,
        )
        .unwrap();
        assert_eq!(del, vec![b"1\ta\t-1".to_vec()]);
    }

    #[test]
    fn test_collapsing_update_emits_cancel_state_pair() {
        let conv = converter(SinkModel::Collapsing);
        let tuples = shape(
            SinkModel::Collapsing,
            &conv,
            DmlKind::Update,
            Some(&row("1", "a")),
            Some(&row("1", "b")),
        )
        .unwrap();
        assert_eq!(tuples, vec![b"1\ta\t-1".to_vec(), b"1\tb\t1".to_vec()]);
    }

    #[test]
    fn test_collapsing_noop_update_skipped() {
        let conv = converter(SinkModel::Collapsing);
        let same = row("1", "a");
        let tuples = shape(
            SinkModel::Collapsing,
            &conv,
            DmlKind::Update,
            Some(&same),
            Some(&same),
        )
        .unwrap();
        assert!(tuples.is_empty());
    }

    #[test]
    fn test_missing_image_rejected() {
        let conv = converter(SinkModel::Collapsing);
        assert!(shape(SinkModel::Collapsing, &conv, DmlKind::Insert, None, None).is_err());
        assert!(shape(SinkModel::Collapsing, &conv, DmlKind::Delete, None, None).is_err());
    }
}

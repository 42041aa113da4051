// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Row conversion: source tuples into sink-side line tuples.
//!
//! A [`RowConverter`] is built once per table from its [`TableConfig`]. It
//! precomputes which source columns participate and the expanded list of
//! sink columns (composite columns fan out into several sink columns), then
//! turns each decoded source row into a tab-delimited byte tuple in that
//! fixed column order.
//!
//! Conversion is deterministic: the same source row always produces the
//! same tuple for an unchanged generation counter.

pub mod column;
pub mod copy;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::{ColumnProperties, ColumnType, TableConfig};
use crate::error::{EngineError, Result};

/// One decoded source column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceValue {
    Null,
    Text(Vec<u8>),
}

impl SourceValue {
    pub fn text(s: impl AsRef<[u8]>) -> Self {
        SourceValue::Text(s.as_ref().to_vec())
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SourceValue::Null)
    }
}

/// A decoded source row, one value per relation column.
pub type SourceRow = Vec<SourceValue>;

/// A converted sink-side row: tab-delimited bytes, no trailing newline.
pub type SinkTuple = Vec<u8>;

const COLUMN_DELIMITER: u8 = b'\t';

/// Outcome of comparing the old and new image of an updated row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowComparison {
    pub equal: bool,
    pub key_changed: bool,
}

struct PlanColumn {
    source_index: usize,
    name: String,
    is_key: bool,
    base_type: ColumnType,
    props: ColumnProperties,
}

/// Converts decoded source rows into sink tuples for one table.
pub struct RowConverter {
    columns: Vec<PlanColumn>,
    sink_columns: Vec<String>,
    generation: Option<Arc<AtomicU64>>,
}

impl RowConverter {
    /// Build the conversion plan for a table.
    ///
    /// Source columns missing from the column mapping are dropped. When a
    /// generation counter is configured its column is appended last; the
    /// sign column (collapsing model) follows it in the sink column list
    /// but is populated by the DML shaper, not by [`convert`](Self::convert).
    pub fn new(cfg: &TableConfig, generation: Option<Arc<AtomicU64>>) -> Result<Self> {
        let mut columns = Vec::new();
        let mut sink_columns = Vec::new();

        for (idx, src) in cfg.tuple_columns.iter().enumerate() {
            let Some(sink) = cfg.column_mapping.get(&src.name) else {
                continue;
            };
            let props = cfg
                .column_properties
                .get(&src.name)
                .cloned()
                .unwrap_or_default();

            if src.base_type.is_composite() {
                if props.flatten {
                    for key in props.flatten_min..=props.flatten_max {
                        sink_columns.push(format!("{}_{}", sink.name, key));
                    }
                } else {
                    sink_columns.push(format!("{}_{}", sink.name, props.keys_suffix));
                    sink_columns.push(format!("{}_{}", sink.name, props.values_suffix));
                }
            } else {
                sink_columns.push(sink.name.clone());
            }

            columns.push(PlanColumn {
                source_index: idx,
                name: src.name.clone(),
                is_key: src.is_key,
                base_type: src.base_type,
                props,
            });
        }

        if let Some(gen_col) = &cfg.generation_column {
            if generation.is_none() {
                return Err(EngineError::config(format!(
                    "generation column '{gen_col}' configured without a generation counter"
                )));
            }
            sink_columns.push(gen_col.clone());
        }
        if let Some(sign_col) = &cfg.sign_column {
            sink_columns.push(sign_col.clone());
        }

        Ok(Self {
            columns,
            sink_columns,
            generation: cfg.generation_column.as_ref().and(generation),
        })
    }

    /// Source column names that participate, in declared order.
    #[must_use]
    pub fn source_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Expanded sink column names actually written, in output order.
    #[must_use]
    pub fn sink_columns(&self) -> &[String] {
        &self.sink_columns
    }

    /// Convert one source row into a sink tuple.
    pub fn convert(&self, row: &SourceRow) -> Result<SinkTuple> {
        let mut out: SinkTuple = Vec::new();
        let mut cells = 0usize;

        for col in &self.columns {
            let value = row.get(col.source_index).ok_or_else(|| {
                EngineError::conversion(&col.name, "source row is missing the column")
            })?;

            if col.base_type.is_composite() {
                for cell in column::convert_map(value, &col.props)
                    .map_err(|reason| EngineError::conversion(&col.name, reason))?
                {
                    push_cell(&mut out, &mut cells, &cell);
                }
            } else {
                let cell = column::convert_value(col.base_type, value)
                    .map_err(|reason| EngineError::conversion(&col.name, reason))?;
                push_cell(&mut out, &mut cells, &cell);
            }
        }

        if let Some(generation) = &self.generation {
            let gen = generation.load(Ordering::Acquire).to_string();
            push_cell(&mut out, &mut cells, gen.as_bytes());
        }

        Ok(out)
    }

    /// Compare the old (`a`) and new (`b`) image of a row over the mapped
    /// columns, reporting whether a key column changed.
    #[must_use]
    pub fn compare_rows(&self, a: &SourceRow, b: &SourceRow) -> RowComparison {
        let mut equal = true;
        let mut key_changed = false;

        for col in &self.columns {
            let av = a.get(col.source_index);
            let bv = b.get(col.source_index);

            match av {
                Some(SourceValue::Text(a_bytes)) => {
                    let b_bytes: &[u8] = match bv {
                        Some(SourceValue::Text(b_bytes)) => b_bytes,
                        _ => &[],
                    };
                    if a_bytes.as_slice() != b_bytes {
                        equal = false;
                        if col.is_key {
                            key_changed = true;
                        }
                    }
                }
                _ => {
                    // TODO: a=null vs b=non-null falls through as equal while
                    // both-null reports unequal; decide the intended null
                    // semantics before the collapsing model depends on this.
                    if matches!(bv, Some(SourceValue::Null) | None) {
                        equal = false;
                        if col.is_key {
                            key_changed = true;
                        }
                    }
                }
            }
        }

        RowComparison { equal, key_changed }
    }
}

fn push_cell(out: &mut SinkTuple, cells: &mut usize, cell: &[u8]) {
    if *cells > 0 {
        out.push(COLUMN_DELIMITER);
    }
    out.extend_from_slice(cell);
    *cells += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SinkColumn, SourceColumn};
    use std::collections::HashMap;

    fn base_config() -> TableConfig {
        TableConfig {
            tuple_columns: vec![
                SourceColumn::new("id", ColumnType::Int8).key(),
                SourceColumn::new("name", ColumnType::Text),
                SourceColumn::new("secret", ColumnType::Text),
            ],
            column_mapping: HashMap::from([
                ("id".to_string(), SinkColumn::new("id")),
                ("name".to_string(), SinkColumn::new("name")),
            ]),
            ..Default::default()
        }
    }

    fn row(values: &[Option<&str>]) -> SourceRow {
        values
            .iter()
            .map(|v| match v {
                Some(s) => SourceValue::text(s),
                None => SourceValue::Null,
            })
            .collect()
    }

    #[test]
    fn test_unmapped_column_is_dropped() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        assert_eq!(conv.sink_columns(), &["id", "name"]);

        let tuple = conv
            .convert(&row(&[Some("7"), Some("alice"), Some("classified")]))
            .unwrap();
        assert_eq!(tuple, b"7\talice".to_vec());
    }

    #[test]
    fn test_null_value_uses_null_marker() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        let tuple = conv.convert(&row(&[Some("7"), None, None])).unwrap();
        assert_eq!(tuple, b"7\t\\N".to_vec());
    }

    #[test]
    fn test_generation_column_appended_last() {
        let cfg = TableConfig {
            generation_column: Some("gen".to_string()),
            ..base_config()
        };
        let generation = Arc::new(AtomicU64::new(42));
        let conv = RowConverter::new(&cfg, Some(generation.clone())).unwrap();
        assert_eq!(conv.sink_columns(), &["id", "name", "gen"]);

        let tuple = conv
            .convert(&row(&[Some("1"), Some("a"), None]))
            .unwrap();
        assert_eq!(tuple, b"1\ta\t42".to_vec());

        generation.store(43, Ordering::Release);
        let tuple = conv
            .convert(&row(&[Some("1"), Some("a"), None]))
            .unwrap();
        assert_eq!(tuple, b"1\ta\t43".to_vec());
    }

    #[test]
    fn test_generation_column_without_counter_rejected() {
        let cfg = TableConfig {
            generation_column: Some("gen".to_string()),
            ..base_config()
        };
        assert!(RowConverter::new(&cfg, None).is_err());
    }

    #[test]
    fn test_composite_flatten_expansion() {
        let cfg = TableConfig {
            tuple_columns: vec![
                SourceColumn::new("id", ColumnType::Int8).key(),
                SourceColumn::new("counters", ColumnType::IntMap),
            ],
            column_mapping: HashMap::from([
                ("id".to_string(), SinkColumn::new("id")),
                ("counters".to_string(), SinkColumn::new("counters")),
            ]),
            column_properties: HashMap::from([(
                "counters".to_string(),
                ColumnProperties {
                    flatten: true,
                    flatten_min: 1,
                    flatten_max: 3,
                    ..Default::default()
                },
            )]),
            ..Default::default()
        };
        let conv = RowConverter::new(&cfg, None).unwrap();
        assert_eq!(
            conv.sink_columns(),
            &["id", "counters_1", "counters_2", "counters_3"]
        );

        let tuple = conv
            .convert(&row(&[Some("9"), Some(r#""1"=>"10", "3"=>"30""#)]))
            .unwrap();
        assert_eq!(tuple, b"9\t10\t0\t30".to_vec());
    }

    #[test]
    fn test_composite_pair_expansion() {
        let cfg = TableConfig {
            tuple_columns: vec![SourceColumn::new("counters", ColumnType::IntMap)],
            column_mapping: HashMap::from([(
                "counters".to_string(),
                SinkColumn::new("counters"),
            )]),
            ..Default::default()
        };
        let conv = RowConverter::new(&cfg, None).unwrap();
        assert_eq!(conv.sink_columns(), &["counters_keys", "counters_values"]);

        let tuple = conv
            .convert(&row(&[Some(r#""2"=>"20", "1"=>"10""#)]))
            .unwrap();
        assert_eq!(tuple, b"[1,2]\t[10,20]".to_vec());
    }

    #[test]
    fn test_convert_is_deterministic() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        let r = row(&[Some("7"), Some("alice"), None]);
        assert_eq!(conv.convert(&r).unwrap(), conv.convert(&r).unwrap());
    }

    #[test]
    fn test_compare_rows_detects_key_change() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        let old = row(&[Some("1"), Some("a"), None]);
        let new = row(&[Some("2"), Some("a"), None]);
        let cmp = conv.compare_rows(&old, &new);
        assert!(!cmp.equal);
        assert!(cmp.key_changed);
    }

    #[test]
    fn test_compare_rows_equal_rows() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        let a = row(&[Some("1"), Some("a"), Some("x")]);
        let b = row(&[Some("1"), Some("a"), Some("y")]);
        // the unmapped column is ignored
        let cmp = conv.compare_rows(&a, &b);
        assert!(cmp.equal);
        assert!(!cmp.key_changed);
    }

    #[test]
    fn test_compare_rows_non_null_vs_null_is_unequal() {
        let conv = RowConverter::new(&base_config(), None).unwrap();
        let a = row(&[Some("1"), Some("a"), None]);
        let b = row(&[Some("1"), None, None]);
        assert!(!conv.compare_rows(&a, &b).equal);
    }
}

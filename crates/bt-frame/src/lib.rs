#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use bt_types::Cell;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static MISSING: Cell = Cell::Null;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("row {row} has {found} fields but the header declares {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column name in header: {0}")]
    DuplicateColumn(String),
    #[error("empty column name at header position {0}")]
    EmptyColumnName(usize),
    #[error("row {row} references column {column:?} outside the table schema")]
    UnknownColumn { row: usize, column: String },
    #[error("row position {position} is out of bounds for a table of {len} rows")]
    PositionOutOfBounds { position: usize, len: usize },
}

/// One respondent: variable name to raw answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, Cell>,
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, variable: impl Into<String>, value: impl Into<Cell>) {
        self.values.insert(variable.into(), value.into());
    }

    #[must_use]
    pub fn with(mut self, variable: impl Into<String>, value: impl Into<Cell>) -> Self {
        self.insert(variable, value);
        self
    }

    #[must_use]
    pub fn get(&self, variable: &str) -> Option<&Cell> {
        self.values.get(variable)
    }

    #[must_use]
    pub fn contains(&self, variable: &str) -> bool {
        self.values.contains_key(variable)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cell)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|((lk, lv), (rk, rv))| lk == rk && lv.semantic_eq(rv))
    }
}

impl<K: Into<String>, V: Into<Cell>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (variable, value) in iter {
            record.insert(variable, value);
        }
        record
    }
}

/// Ordered respondent records plus the column schema they were read with.
///
/// The schema is what banner equations resolve variables against, so a
/// filtered subset keeps its parent's schema even when no surviving
/// record carries a given column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RespondentTable {
    columns: BTreeSet<String>,
    records: Vec<Record>,
}

impl RespondentTable {
    pub fn new(
        columns: impl IntoIterator<Item = String>,
        records: Vec<Record>,
    ) -> Result<Self, FrameError> {
        let columns = columns.into_iter().collect::<BTreeSet<_>>();
        for (row, record) in records.iter().enumerate() {
            if let Some(column) = record.variables().find(|name| !columns.contains(*name)) {
                return Err(FrameError::UnknownColumn {
                    row,
                    column: column.to_owned(),
                });
            }
        }
        Ok(Self { columns, records })
    }

    /// Build a table whose schema is the union of every record's variables.
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        let columns = records
            .iter()
            .flat_map(|record| record.variables().map(str::to_owned))
            .collect();
        Self { columns, records }
    }

    /// Build a table from a header row and positional rows, as read from CSV.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Result<Self, FrameError> {
        let mut seen = BTreeSet::new();
        for (position, name) in headers.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(FrameError::EmptyColumnName(position));
            }
            if !seen.insert(name.clone()) {
                return Err(FrameError::DuplicateColumn(name.clone()));
            }
        }

        let records = rows
            .into_iter()
            .enumerate()
            .map(|(row, cells)| {
                if cells.len() != headers.len() {
                    return Err(FrameError::RaggedRow {
                        row,
                        expected: headers.len(),
                        found: cells.len(),
                    });
                }
                Ok(headers.iter().cloned().zip(cells).collect::<Record>())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns: seen,
            records,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn record(&self, position: usize) -> Option<&Record> {
        self.records.get(position)
    }

    /// Every record's value for `name`, with absent keys read as missing.
    pub fn column_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Cell> + 'a {
        self.records
            .iter()
            .map(move |record| record.get(name).unwrap_or(&MISSING))
    }

    /// Order-preserving subset at the given row positions.
    pub fn take(&self, positions: &[usize]) -> Result<Self, FrameError> {
        let records = positions
            .iter()
            .map(|&position| {
                self.records
                    .get(position)
                    .cloned()
                    .ok_or(FrameError::PositionOutOfBounds {
                        position,
                        len: self.records.len(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            columns: self.columns.clone(),
            records,
        })
    }

    /// Order-preserving subset of the records `keep` accepts.
    #[must_use]
    pub fn filter_records(&self, mut keep: impl FnMut(&Record) -> bool) -> Self {
        Self {
            columns: self.columns.clone(),
            records: self
                .records
                .iter()
                .filter(|record| keep(record))
                .cloned()
                .collect(),
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.columns == other.columns
            && self.records.len() == other.records.len()
            && self
                .records
                .iter()
                .zip(&other.records)
                .all(|(left, right)| left.semantic_eq(right))
    }
}

impl FromIterator<Record> for RespondentTable {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self::from_records(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use bt_types::Cell;

    use super::{FrameError, Record, RespondentTable};

    fn sample() -> RespondentTable {
        RespondentTable::from_records(vec![
            Record::new().with("S1", 1_i64).with("S7", 2_i64),
            Record::new().with("S1", 2_i64),
            Record::new().with("S7", "x"),
        ])
    }

    #[test]
    fn schema_is_union_of_record_variables() {
        let table = sample();
        assert_eq!(
            table.columns().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["S1", "S7"]
        );
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn column_values_reads_absent_keys_as_missing() {
        let table = sample();
        let values = table.column_values("S7").cloned().collect::<Vec<_>>();
        assert_eq!(
            values,
            vec![Cell::Int64(2), Cell::Null, Cell::Utf8("x".to_owned())]
        );
    }

    #[test]
    fn take_preserves_order_and_schema() {
        let table = sample();
        let subset = table.take(&[2, 0]).expect("take");
        assert_eq!(subset.len(), 2);
        assert_eq!(subset.columns(), table.columns());
        assert_eq!(subset.record(0), table.record(2));

        let empty = table.take(&[]).expect("empty take");
        assert!(empty.is_empty());
        assert!(empty.has_column("S1"));
    }

    #[test]
    fn filter_records_keeps_schema_for_empty_results() {
        let table = sample();
        let none = table.filter_records(|_| false);
        assert!(none.is_empty());
        assert_eq!(none.columns(), table.columns());

        let with_s1 = table.filter_records(|record| record.contains("S1"));
        assert_eq!(with_s1.len(), 2);
    }

    #[test]
    fn take_rejects_positions_past_the_end() {
        let err = sample().take(&[3]).expect_err("must fail");
        assert_eq!(err, FrameError::PositionOutOfBounds { position: 3, len: 3 });
    }

    #[test]
    fn from_rows_rejects_ragged_rows() {
        let err = RespondentTable::from_rows(
            vec!["a".to_owned(), "b".to_owned()],
            vec![vec![Cell::Int64(1)]],
        )
        .expect_err("must fail");
        assert_eq!(
            err,
            FrameError::RaggedRow {
                row: 0,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn from_rows_rejects_duplicate_headers() {
        let err = RespondentTable::from_rows(vec!["a".to_owned(), "a".to_owned()], Vec::new())
            .expect_err("must fail");
        assert_eq!(err, FrameError::DuplicateColumn("a".to_owned()));
    }

    #[test]
    fn new_rejects_records_outside_schema() {
        let err = RespondentTable::new(
            vec!["S1".to_owned()],
            vec![Record::new().with("S2", 1_i64)],
        )
        .expect_err("must fail");
        assert!(matches!(err, FrameError::UnknownColumn { row: 0, .. }));
    }

    #[test]
    fn semantic_eq_treats_nan_cells_as_equal() {
        let left = RespondentTable::from_records(vec![Record::new().with("Q1", f64::NAN)]);
        let right = left.clone();
        assert_ne!(left, right);
        assert!(left.semantic_eq(&right));
    }
}

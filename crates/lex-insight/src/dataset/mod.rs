//! In-memory dataset snapshot.
//!
//! A [`Dataset`] is an ordered list of column names plus an ordered list of
//! rows. Every engine operation reads a dataset immutably; mutation happens
//! by building a new one.

mod frame;
mod value;

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{InsightError, Result};

pub use frame::read_csv;
pub use value::{DATE_DISPLAY_FORMAT, Value, ValueKey};

/// One dataset row, keyed by column name in column order.
pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a dataset whose columns are the union of the row keys, in
    /// first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for row in &rows {
            for name in row.keys() {
                if seen.insert(name.as_str()) {
                    columns.push(name.clone());
                }
            }
        }
        Self { columns, rows }
    }

    /// Parse a JSON array of objects.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_json_value(&value)
    }

    /// Convert a JSON array of objects; each object becomes one row.
    pub fn from_json_value(value: &serde_json::Value) -> Result<Self> {
        let items = value.as_array().ok_or_else(|| {
            InsightError::InvalidDataset("expected a JSON array of row objects".to_string())
        })?;

        let rows = items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let object = item.as_object().ok_or_else(|| {
                    InsightError::InvalidDataset(format!("row {idx} is not a JSON object"))
                })?;
                Ok(object
                    .iter()
                    .map(|(name, cell)| (name.clone(), Value::from_json(cell)))
                    .collect::<Row>())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_rows(rows))
    }

    /// Rows as a JSON array of objects.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.rows
                .iter()
                .map(|row| {
                    serde_json::Value::Object(
                        row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
                    )
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Fail with `ColumnNotFound` unless `name` is a dataset column.
    pub fn require_column(&self, name: &str) -> Result<()> {
        if self.has_column(name) {
            Ok(())
        } else {
            Err(InsightError::ColumnNotFound(name.to_string()))
        }
    }

    /// A cell, or `None` if the row lacks the column.
    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Cells of a column in row order; absent cells read as `None`.
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = Option<&'a Value>> {
        self.rows.iter().map(move |row| row.get(column))
    }

    /// Row index and numeric reading of every numeric cell in a column.
    pub fn numeric_cells(&self, column: &str) -> Vec<(usize, f64)> {
        self.column_values(column)
            .enumerate()
            .filter_map(|(idx, cell)| cell.and_then(Value::as_number).map(|n| (idx, n)))
            .collect()
    }

    /// Identity of a row over the dataset's columns; absent cells count as missing.
    pub fn row_key(&self, row: &Row) -> Vec<ValueKey> {
        self.columns
            .iter()
            .map(|c| row.get(c).map_or(ValueKey::Missing, Value::hash_key))
            .collect()
    }

    /// Number of rows identical to an earlier row.
    pub fn duplicate_row_count(&self) -> usize {
        let mut seen = HashSet::with_capacity(self.rows.len());
        self.rows
            .iter()
            .filter(|row| !seen.insert(self.row_key(row)))
            .count()
    }

    /// Number of missing cells across the whole dataset.
    pub fn missing_cell_count(&self) -> usize {
        self.columns
            .iter()
            .map(|c| {
                self.column_values(c)
                    .filter(|cell| cell.is_none_or(Value::is_missing))
                    .count()
            })
            .sum()
    }

    /// Rough in-memory size of all cell values plus column names.
    pub fn memory_estimate(&self) -> usize {
        let cells: usize = self
            .rows
            .iter()
            .flat_map(|row| row.values())
            .map(Value::estimated_size)
            .sum();
        let names: usize = self.columns.iter().map(|c| c.len() + 24).sum();
        cells + names
    }

    /// A dataset holding the first `n` rows.
    pub fn head(&self, n: usize) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_json_str(
            r#"[
                {"name": "a", "age": 20},
                {"name": "b", "age": "31"},
                {"name": "a", "age": 20},
                {"name": "", "age": null, "extra": true}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_from_json_columns_in_first_seen_order() {
        let dataset = sample();
        assert_eq!(dataset.columns, vec!["name", "age", "extra"]);
        assert_eq!(dataset.len(), 4);
    }

    #[test]
    fn test_from_json_rejects_non_arrays() {
        let err = Dataset::from_json_str(r#"{"a": 1}"#).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATASET");
        let err = Dataset::from_json_str("[1, 2]").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATASET");
    }

    #[test]
    fn test_numeric_cells() {
        let dataset = sample();
        assert_eq!(dataset.numeric_cells("age"), vec![(0, 20.0), (1, 31.0), (2, 20.0)]);
        assert!(dataset.numeric_cells("missing").is_empty());
    }

    #[test]
    fn test_duplicate_rows() {
        assert_eq!(sample().duplicate_row_count(), 1);
    }

    #[test]
    fn test_missing_cells() {
        // "" name, null age, and absent "extra" in the first three rows
        assert_eq!(sample().missing_cell_count(), 5);
    }

    #[test]
    fn test_require_column() {
        let dataset = sample();
        assert!(dataset.require_column("age").is_ok());
        assert!(dataset.require_column("salary").unwrap_err().is_input_error());
    }

    #[test]
    fn test_head() {
        let dataset = sample().head(2);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.columns.len(), 3);
    }
}

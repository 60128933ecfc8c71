//! In-memory table: ordered, equally long columns plus an index of row labels.

use crate::error::{Result, SheetError};
use crate::types::{Dtype, IndexLabel, Value};
use std::collections::HashSet;

/// A named column of values with a dtype.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub header: String,
    pub dtype: Dtype,
    pub values: Vec<Value>,
}

impl Column {
    /// Create a column, inferring its dtype from the values.
    pub fn new(header: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = Dtype::infer(&values);
        Self {
            header: header.into(),
            dtype,
            values,
        }
    }

    pub fn with_dtype(header: impl Into<String>, dtype: Dtype, values: Vec<Value>) -> Self {
        Self {
            header: header.into(),
            dtype,
            values,
        }
    }

    /// Re-infer the dtype after the values changed.
    pub fn refresh_dtype(&mut self) {
        self.dtype = Dtype::infer(&self.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// An ordered collection of columns sharing one index.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    index: Vec<IndexLabel>,
    columns: Vec<Column>,
}

/// Labels `0..n`.
pub fn range_index(n: usize) -> Vec<IndexLabel> {
    (0..n as i64).map(IndexLabel::Int).collect()
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table with a range index from `(header, values)` pairs.
    pub fn from_columns<H: Into<String>>(columns: Vec<(H, Vec<Value>)>) -> Result<Self> {
        let columns: Vec<Column> = columns
            .into_iter()
            .map(|(header, values)| Column::new(header, values))
            .collect();
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        Self::from_parts(range_index(rows), columns)
    }

    /// Build a table from an explicit index and columns, validating shape and headers.
    pub fn from_parts(index: Vec<IndexLabel>, columns: Vec<Column>) -> Result<Self> {
        let mut seen = HashSet::new();
        for column in &columns {
            if column.len() != index.len() {
                return Err(SheetError::invalid_arg(format!(
                    "column {} has {} values but the index has {}",
                    column.header,
                    column.len(),
                    index.len()
                )));
            }
            if !seen.insert(column.header.as_str()) {
                return Err(SheetError::DuplicatedColumn {
                    table: String::new(),
                    header: column.header.clone(),
                });
            }
        }
        Ok(Self { index, columns })
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn index(&self) -> &[IndexLabel] {
        &self.index
    }

    pub fn set_index(&mut self, index: Vec<IndexLabel>) -> Result<()> {
        if index.len() != self.num_rows() && !self.columns.is_empty() {
            return Err(SheetError::invalid_arg(format!(
                "index of length {} does not match {} rows",
                index.len(),
                self.num_rows()
            )));
        }
        self.index = index;
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    pub fn column(&self, header: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.header == header)
    }

    pub fn column_mut(&mut self, header: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.header == header)
    }

    pub fn column_position(&self, header: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.header == header)
    }

    pub fn column_at(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    pub fn has_column(&self, header: &str) -> bool {
        self.column_position(header).is_some()
    }

    /// Values of a column, or a `no-column` error naming the table.
    pub fn values(&self, table_name: &str, header: &str) -> Result<&[Value]> {
        self.column(header)
            .map(|c| c.values.as_slice())
            .ok_or_else(|| SheetError::no_column(table_name, header))
    }

    /// Insert a column at `position` (clamped to the end).
    pub fn insert_column(&mut self, position: usize, column: Column) -> Result<()> {
        if self.has_column(&column.header) {
            return Err(SheetError::DuplicatedColumn {
                table: String::new(),
                header: column.header,
            });
        }
        if self.columns.is_empty() && self.index.is_empty() {
            self.index = range_index(column.len());
        } else if column.len() != self.num_rows() {
            return Err(SheetError::invalid_arg(format!(
                "column {} has {} values but the table has {} rows",
                column.header,
                column.len(),
                self.num_rows()
            )));
        }
        let position = position.min(self.columns.len());
        self.columns.insert(position, column);
        Ok(())
    }

    pub fn push_column(&mut self, column: Column) -> Result<()> {
        let end = self.columns.len();
        self.insert_column(end, column)
    }

    pub fn remove_column(&mut self, header: &str) -> Option<Column> {
        let position = self.column_position(header)?;
        Some(self.columns.remove(position))
    }

    pub fn rename_column(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.has_column(new) {
            return Err(SheetError::DuplicatedColumn {
                table: String::new(),
                header: new.to_string(),
            });
        }
        let column = self
            .column_mut(old)
            .ok_or_else(|| SheetError::no_column("", old))?;
        column.header = new.to_string();
        Ok(())
    }

    /// Move a column to a new position (clamped to the valid range).
    pub fn move_column(&mut self, header: &str, new_position: usize) -> Result<()> {
        let position = self
            .column_position(header)
            .ok_or_else(|| SheetError::no_column("", header))?;
        let column = self.columns.remove(position);
        let new_position = new_position.min(self.columns.len());
        self.columns.insert(new_position, column);
        Ok(())
    }

    /// Replace all values of a column, keeping its position.
    pub fn replace_values(&mut self, header: &str, values: Vec<Value>) -> Result<()> {
        if values.len() != self.num_rows() {
            return Err(SheetError::invalid_arg(format!(
                "{} values given for a table of {} rows",
                values.len(),
                self.num_rows()
            )));
        }
        let column = self
            .column_mut(header)
            .ok_or_else(|| SheetError::no_column("", header))?;
        column.values = values;
        column.refresh_dtype();
        Ok(())
    }

    /// Keep only the rows at the given positions, in the given order.
    pub fn take_rows(&self, positions: &[usize]) -> Table {
        let index = positions.iter().map(|&p| self.index[p].clone()).collect();
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                header: c.header.clone(),
                dtype: c.dtype,
                values: positions.iter().map(|&p| c.values[p].clone()).collect(),
            })
            .collect();
        Table { index, columns }
    }

    /// Keep only the named columns, in the given order.
    pub fn select_columns(&self, headers: &[String]) -> Result<Table> {
        let mut columns = Vec::with_capacity(headers.len());
        for header in headers {
            let column = self
                .column(header)
                .ok_or_else(|| SheetError::no_column("", header.as_str()))?;
            columns.push(column.clone());
        }
        Table::from_parts(self.index.clone(), columns)
    }

    /// Values of one row, in column order.
    pub fn row(&self, position: usize) -> Vec<&Value> {
        self.columns.iter().map(|c| &c.values[position]).collect()
    }

    /// First position holding the label.
    pub fn position_of_label(&self, label: &IndexLabel) -> Option<usize> {
        self.index.iter().position(|l| l == label)
    }

    /// Replace the index with `0..n`, optionally keeping the old labels as a column.
    pub fn reset_index(&mut self, drop: bool) -> Result<()> {
        if !drop {
            let mut header = "index".to_string();
            let mut n = 0;
            while self.has_column(&header) {
                n += 1;
                header = format!("level_{}", n);
            }
            let values = self.index.iter().map(IndexLabel::to_value).collect();
            self.insert_column(0, Column::new(header, values))?;
        }
        self.index = range_index(self.num_rows());
        Ok(())
    }

    /// Set a single cell.
    pub fn set_value(&mut self, position: usize, header: &str, value: Value) -> Result<()> {
        let rows = self.num_rows();
        let column = self
            .column_mut(header)
            .ok_or_else(|| SheetError::no_column("", header))?;
        if position >= rows {
            return Err(SheetError::invalid_arg(format!(
                "row {} is out of range for {} rows",
                position, rows
            )));
        }
        column.values[position] = value;
        column.refresh_dtype();
        Ok(())
    }

    /// Rows appended one after the other; columns are unioned in first-seen order.
    pub fn concat(tables: &[&Table], ignore_index: bool, inner: bool) -> Result<Table> {
        let mut headers: Vec<String> = Vec::new();
        if inner {
            if let Some(first) = tables.first() {
                headers = first
                    .headers()
                    .into_iter()
                    .filter(|h| tables.iter().all(|t| t.has_column(h)))
                    .map(str::to_string)
                    .collect();
            }
        } else {
            for table in tables {
                for header in table.headers() {
                    if !headers.iter().any(|h| h == header) {
                        headers.push(header.to_string());
                    }
                }
            }
        }

        let mut index = Vec::new();
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
        for table in tables {
            index.extend(table.index().iter().cloned());
            for (i, header) in headers.iter().enumerate() {
                match table.column(header) {
                    Some(column) => values[i].extend(column.values.iter().cloned()),
                    None => values[i].extend(std::iter::repeat(Value::Missing).take(table.num_rows())),
                }
            }
        }
        if ignore_index {
            index = range_index(index.len());
        }
        let columns = headers
            .into_iter()
            .zip(values)
            .map(|(header, values)| Column::new(header, values))
            .collect();
        Table::from_parts(index, columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            ("A", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ("B", vec![Value::str("x"), Value::str("y"), Value::str("z")]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_rejects_duplicate_headers() {
        let result = Table::from_columns(vec![("A", vec![Value::Int(1)]), ("A", vec![Value::Int(2)])]);
        assert!(matches!(result, Err(SheetError::DuplicatedColumn { .. })));
    }

    #[test]
    fn test_take_rows_keeps_labels() {
        let table = sample().take_rows(&[0, 2]);
        assert_eq!(table.index(), &[IndexLabel::Int(0), IndexLabel::Int(2)]);
        assert_eq!(table.column("A").unwrap().values, vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_move_and_rename() {
        let mut table = sample();
        table.move_column("B", 0).unwrap();
        assert_eq!(table.headers(), vec!["B", "A"]);
        table.rename_column("A", "C").unwrap();
        assert_eq!(table.headers(), vec!["B", "C"]);
        assert!(table.rename_column("B", "C").is_err());
    }

    #[test]
    fn test_reset_index_keeps_labels_as_column() {
        let mut table = sample().take_rows(&[2, 1]);
        table.reset_index(false).unwrap();
        assert_eq!(table.headers(), vec!["index", "A", "B"]);
        assert_eq!(table.column("index").unwrap().values, vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(table.index(), &[IndexLabel::Int(0), IndexLabel::Int(1)]);
    }

    #[test]
    fn test_concat_outer_fills_missing() {
        let a = sample();
        let b = Table::from_columns(vec![("A", vec![Value::Int(4)]), ("C", vec![Value::Bool(true)])]).unwrap();
        let c = Table::concat(&[&a, &b], true, false).unwrap();
        assert_eq!(c.headers(), vec!["A", "B", "C"]);
        assert_eq!(c.num_rows(), 4);
        assert_eq!(c.column("B").unwrap().values[3], Value::Missing);
        let inner = Table::concat(&[&a, &b], true, true).unwrap();
        assert_eq!(inner.headers(), vec!["A"]);
    }
}

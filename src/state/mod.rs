//! The complete snapshot of all tables plus metadata at one step boundary.
//!
//! A `State` is cloned for every step. Tables sit behind `Arc`, so a clone
//! shares every table and a step deep-copies only the tables it mutates
//! (through [`State::table_mut`]).

pub mod filters;
pub mod formats;
mod invariants;

pub use filters::{ColumnFilters, Filter, FilterCondition, FilterItem, FilterOperator};
pub use formats::{ColumnFormat, TableFormat};
pub use invariants::check_invariants;

use crate::column_ids::{ColumnIdMap, SheetColumnIds};
use crate::error::{Result, SheetError};
use crate::extensions::Extensions;
use crate::formula::ColumnFormula;
use crate::table::{Column, Table};
use crate::types::{ColumnId, PublicInterfaceVersion, TableSource, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct State {
    pub tables: Vec<Arc<Table>>,
    pub table_names: Vec<String>,
    pub table_sources: Vec<TableSource>,
    pub column_formulas: Vec<BTreeMap<ColumnId, ColumnFormula>>,
    pub column_filters: Vec<BTreeMap<ColumnId, ColumnFilters>>,
    pub column_ids: ColumnIdMap,
    pub table_formats: Vec<TableFormat>,
    pub extensions: Arc<Extensions>,
    pub public_interface_version: PublicInterfaceVersion,
}

impl Default for State {
    fn default() -> Self {
        Self::new(Arc::new(Extensions::default()), PublicInterfaceVersion::CURRENT)
    }
}

impl State {
    pub fn new(extensions: Arc<Extensions>, public_interface_version: PublicInterfaceVersion) -> Self {
        Self {
            tables: Vec::new(),
            table_names: Vec::new(),
            table_sources: Vec::new(),
            column_formulas: Vec::new(),
            column_filters: Vec::new(),
            column_ids: ColumnIdMap::new(),
            table_formats: Vec::new(),
            extensions,
            public_interface_version,
        }
    }

    pub fn num_tables(&self) -> usize {
        self.tables.len()
    }

    pub fn check_table(&self, sheet: usize) -> Result<()> {
        if sheet < self.tables.len() {
            Ok(())
        } else {
            Err(SheetError::NoTable(format!("at index {}", sheet)))
        }
    }

    pub fn table(&self, sheet: usize) -> Result<&Table> {
        self.check_table(sheet)?;
        Ok(&self.tables[sheet])
    }

    /// Mutable access; copies the table first if another state shares it.
    pub fn table_mut(&mut self, sheet: usize) -> Result<&mut Table> {
        self.check_table(sheet)?;
        Ok(Arc::make_mut(&mut self.tables[sheet]))
    }

    pub fn table_name(&self, sheet: usize) -> Result<&str> {
        self.check_table(sheet)?;
        Ok(&self.table_names[sheet])
    }

    pub fn table_index_by_name(&self, name: &str) -> Option<usize> {
        self.table_names.iter().position(|n| n == name)
    }

    pub fn sheet_ids(&self, sheet: usize) -> Result<&SheetColumnIds> {
        self.column_ids.sheet(sheet)
    }

    /// ColumnId → current header for one table.
    pub fn header_map(&self, sheet: usize) -> HashMap<ColumnId, String> {
        self.column_ids.header_map(sheet)
    }

    /// A valid, unused table name derived from `name`.
    pub fn valid_table_name(&self, name: &str) -> String {
        valid_table_name(name, &self.table_names)
    }

    /// Append a table, deduplicating its name. Returns its index.
    pub fn add_table(&mut self, table: Table, name: &str, source: TableSource) -> Result<usize> {
        let name = self.valid_table_name(name);
        let headers: Vec<String> = table.headers().into_iter().map(str::to_string).collect();
        self.column_ids.add_sheet(&headers)?;
        self.tables.push(Arc::new(table));
        self.table_names.push(name);
        self.table_sources.push(source);
        self.column_formulas.push(BTreeMap::new());
        self.column_filters.push(BTreeMap::new());
        self.table_formats.push(TableFormat::default());
        Ok(self.tables.len() - 1)
    }

    pub fn remove_table(&mut self, sheet: usize) -> Result<()> {
        self.check_table(sheet)?;
        self.column_ids.remove_sheet(sheet)?;
        self.tables.remove(sheet);
        self.table_names.remove(sheet);
        self.table_sources.remove(sheet);
        self.column_formulas.remove(sheet);
        self.column_filters.remove(sheet);
        self.table_formats.remove(sheet);
        Ok(())
    }

    /// Replace a table wholesale. Headers that survive keep their ids; formulas
    /// and filters are cleared since they described the old contents.
    pub fn replace_table(&mut self, sheet: usize, table: Table) -> Result<()> {
        self.check_table(sheet)?;
        let headers: Vec<String> = table.headers().into_iter().map(str::to_string).collect();
        self.column_ids.reset_sheet(sheet, &headers)?;
        self.tables[sheet] = Arc::new(table);
        self.column_formulas[sheet].clear();
        self.column_filters[sheet].clear();
        let ids = self.column_ids.sheet(sheet)?.clone();
        self.table_formats[sheet].retain_columns(|id| ids.contains(id));
        Ok(())
    }

    pub fn column_id(&self, sheet: usize, header: &str) -> Result<ColumnId> {
        self.column_ids
            .get_id(sheet, header)
            .cloned()
            .ok_or_else(|| SheetError::no_column(self.table_name(sheet).unwrap_or_default(), header))
    }

    pub fn column_header(&self, sheet: usize, id: &ColumnId) -> Result<String> {
        self.column_ids
            .get_header(sheet, id)
            .map(str::to_string)
            .ok_or_else(|| SheetError::no_column(self.table_name(sheet).unwrap_or_default(), id.as_str()))
    }

    /// Headers of several ids, in the order given.
    pub fn column_headers(&self, sheet: usize, ids: &[ColumnId]) -> Result<Vec<String>> {
        ids.iter().map(|id| self.column_header(sheet, id)).collect()
    }

    /// Values of a column by id.
    pub fn column_values(&self, sheet: usize, id: &ColumnId) -> Result<&[Value]> {
        let header = self.column_header(sheet, id)?;
        let name = self.table_name(sheet)?;
        self.tables[sheet].values(name, &header)
    }

    fn duplicated(&self, sheet: usize, header: &str) -> SheetError {
        SheetError::DuplicatedColumn {
            table: self.table_names.get(sheet).cloned().unwrap_or_default(),
            header: header.to_string(),
        }
    }

    /// Insert a column at `position` and give it an id.
    pub fn add_column(&mut self, sheet: usize, header: &str, values: Vec<Value>, position: usize) -> Result<ColumnId> {
        self.check_table(sheet)?;
        if self.tables[sheet].has_column(header) {
            return Err(self.duplicated(sheet, header));
        }
        self.table_mut(sheet)?
            .insert_column(position, Column::new(header, values))?;
        self.column_ids.insert(sheet, position, header)
    }

    /// Remove a column together with its formula, filters and format.
    pub fn delete_column(&mut self, sheet: usize, id: &ColumnId) -> Result<()> {
        let header = self.column_header(sheet, id)?;
        self.table_mut(sheet)?.remove_column(&header);
        self.column_ids.remove(sheet, id)?;
        self.column_formulas[sheet].remove(id);
        self.column_filters[sheet].remove(id);
        self.table_formats[sheet].retain_columns(|other| other != id);
        Ok(())
    }

    pub fn rename_column(&mut self, sheet: usize, id: &ColumnId, new_header: &str) -> Result<()> {
        let old = self.column_header(sheet, id)?;
        if old == new_header {
            return Ok(());
        }
        if self.tables[sheet].has_column(new_header) {
            return Err(self.duplicated(sheet, new_header));
        }
        self.table_mut(sheet)?.rename_column(&old, new_header)?;
        self.column_ids.rename(sheet, id, new_header)
    }

    /// Replace the values of a column by id.
    pub fn set_column_values(&mut self, sheet: usize, id: &ColumnId, values: Vec<Value>) -> Result<()> {
        let header = self.column_header(sheet, id)?;
        self.table_mut(sheet)?.replace_values(&header, values)
    }

    /// Columns whose formulas read `id` directly.
    pub fn formula_dependents(&self, sheet: usize, id: &ColumnId) -> Vec<ColumnId> {
        self.column_formulas
            .get(sheet)
            .map(|formulas| {
                formulas
                    .iter()
                    .filter(|(target, formula)| *target != id && formula.dependencies.contains(id))
                    .map(|(target, _)| target.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Copy a table and all its metadata to a new index.
    pub fn duplicate_table(&mut self, sheet: usize, name: &str) -> Result<usize> {
        self.check_table(sheet)?;
        let name = self.valid_table_name(name);
        self.column_ids.duplicate_sheet(sheet)?;
        self.tables.push(self.tables[sheet].clone());
        self.table_names.push(name);
        self.table_sources.push(TableSource::Duplicated);
        self.column_formulas.push(self.column_formulas[sheet].clone());
        self.column_filters.push(self.column_filters[sheet].clone());
        self.table_formats.push(self.table_formats[sheet].clone());
        Ok(self.tables.len() - 1)
    }
}

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// A Python identifier derived from `name` that is not in `existing`.
pub fn valid_table_name(name: &str, existing: &[String]) -> String {
    let mut base: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if base.is_empty() {
        base = "df".to_string();
    }
    if base.starts_with(|c: char| c.is_ascii_digit()) {
        base = format!("df_{}", base);
    }
    if PYTHON_KEYWORDS.contains(&base.as_str()) {
        base = format!("{}_df", base);
    }
    if !existing.iter().any(|n| *n == base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}_{}", base, n))
        .find(|candidate| !existing.iter().any(|n| n == candidate))
        .unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(columns: Vec<(&str, Vec<Value>)>) -> State {
        let mut state = State::default();
        state
            .add_table(Table::from_columns(columns).unwrap(), "df", TableSource::Imported)
            .unwrap();
        state
    }

    #[test]
    fn test_valid_table_name() {
        let existing = vec!["df".to_string(), "df_1".to_string()];
        assert_eq!(valid_table_name("df", &existing), "df_2");
        assert_eq!(valid_table_name("2020 sales.csv", &[]), "df_2020_sales_csv");
        assert_eq!(valid_table_name("class", &[]), "class_df");
    }

    #[test]
    fn test_clone_shares_untouched_tables() {
        let state = state_with(vec![("A", vec![Value::Int(1)])]);
        let mut next = state.clone();
        assert!(Arc::ptr_eq(&state.tables[0], &next.tables[0]));
        let id = next.column_id(0, "A").unwrap();
        next.rename_column(0, &id, "B").unwrap();
        assert!(!Arc::ptr_eq(&state.tables[0], &next.tables[0]));
        assert_eq!(state.table(0).unwrap().headers(), vec!["A"]);
    }

    #[test]
    fn test_add_duplicate_column_names_table() {
        let mut state = state_with(vec![("A", vec![Value::Int(1)])]);
        let err = state.add_column(0, "A", vec![Value::Int(0)], 1).unwrap_err();
        match err {
            SheetError::DuplicatedColumn { table, header } => {
                assert_eq!(table, "df");
                assert_eq!(header, "A");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_remove_table_keeps_lists_parallel() {
        let mut state = state_with(vec![("A", vec![Value::Int(1)])]);
        state.duplicate_table(0, "df").unwrap();
        assert_eq!(state.table_names, vec!["df", "df_1"]);
        state.remove_table(0).unwrap();
        assert_eq!(state.table_names, vec!["df_1"]);
        check_invariants(&state).unwrap();
    }
}

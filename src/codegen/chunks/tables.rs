//! Chunks for whole-table edits the optimizer reasons about.

use crate::codegen::chunk::{downcast, renamed, Code, CodeChunk, Renames, TableSet};
use crate::error::Result;
use crate::state::ColumnFilters;
use crate::types::{python_string, IndexLabel};
use std::collections::BTreeSet;

/// `del name`.
#[derive(Clone, Debug)]
pub struct DeleteTableChunk {
    pub table: usize,
    pub table_name: String,
}

impl CodeChunk for DeleteTableChunk {
    fn display_name(&self) -> &'static str {
        "Deleted dataframe"
    }

    fn description_comment(&self) -> String {
        format!("Deleted {}", self.table_name)
    }

    fn code(&self) -> Result<Code> {
        Ok((vec![format!("del {}", self.table_name)], Vec::new()))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::none()
    }

    fn deleted_table_indexes(&self) -> BTreeSet<usize> {
        BTreeSet::from([self.table])
    }

    fn combine_left(&self, prev: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        if let Some(rename) = downcast::<RenameTableChunk>(prev) {
            if rename.table != self.table {
                return None;
            }
            return Some(vec![Box::new(DeleteTableChunk {
                table: self.table,
                table_name: rename.old_name.clone(),
            })]);
        }
        if !prev.deleted_table_indexes().is_empty() || !prev.modified_table_indexes().is_only(self.table) {
            return None;
        }
        let created = prev.created_table_indexes();
        if created.is_empty() {
            // Edits to a table about to be deleted are dead.
            return Some(vec![self.box_clone()]);
        }
        if created.len() == 1 && created.contains(&self.table) {
            return Some(Vec::new());
        }
        None
    }

    chunk_boilerplate!();
}

/// `new = old` then `del old`.
#[derive(Clone, Debug)]
pub struct RenameTableChunk {
    pub table: usize,
    pub old_name: String,
    pub new_name: String,
}

impl CodeChunk for RenameTableChunk {
    fn display_name(&self) -> &'static str {
        "Renamed dataframe"
    }

    fn description_comment(&self) -> String {
        format!("Renamed {} to {}", self.old_name, self.new_name)
    }

    fn code(&self) -> Result<Code> {
        Ok((
            vec![
                format!("{} = {}", self.new_name, self.old_name),
                format!("del {}", self.old_name),
            ],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let next = downcast::<RenameTableChunk>(next)?;
        if next.table != self.table {
            return None;
        }
        if next.new_name == self.old_name {
            return Some(Vec::new());
        }
        Some(vec![Box::new(RenameTableChunk {
            new_name: next.new_name.clone(),
            ..self.clone()
        })])
    }

    chunk_boilerplate!();
}

/// `df.drop(labels=[...], inplace=True)`.
#[derive(Clone, Debug)]
pub struct DeleteRowsChunk {
    pub table: usize,
    pub table_name: String,
    pub labels: Vec<IndexLabel>,
}

impl CodeChunk for DeleteRowsChunk {
    fn display_name(&self) -> &'static str {
        "Deleted rows"
    }

    fn description_comment(&self) -> String {
        format!("Deleted {} rows from {}", self.labels.len(), self.table_name)
    }

    fn code(&self) -> Result<Code> {
        let labels: Vec<String> = self.labels.iter().map(IndexLabel::to_code).collect();
        Ok((
            vec![format!("{}.drop(labels=[{}], inplace=True)", self.table_name, labels.join(", "))],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn combine_right(&self, next: &dyn CodeChunk) -> Option<Vec<Box<dyn CodeChunk>>> {
        let next = downcast::<DeleteRowsChunk>(next)?;
        if next.table != self.table {
            return None;
        }
        let mut labels = self.labels.clone();
        labels.extend(next.labels.iter().filter(|l| !self.labels.contains(l)).cloned());
        Some(vec![Box::new(DeleteRowsChunk {
            labels,
            ..self.clone()
        })])
    }

    fn with_renamed_columns(&self, table: usize, _renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| self.box_clone())
    }

    chunk_boilerplate!();
}

/// A stable sort on one column, missing values first.
#[derive(Clone, Debug)]
pub struct SortChunk {
    pub table: usize,
    pub table_name: String,
    pub header: String,
    pub ascending: bool,
}

impl CodeChunk for SortChunk {
    fn display_name(&self) -> &'static str {
        "Sorted"
    }

    fn description_comment(&self) -> String {
        format!("Sorted {} in {}", self.header, self.table_name)
    }

    fn code(&self) -> Result<Code> {
        Ok((
            vec![format!(
                "{n} = {n}.sort_values(by={h}, ascending={a}, na_position='first', kind='mergesort')",
                n = self.table_name,
                h = python_string(&self.header),
                a = if self.ascending { "True" } else { "False" }
            )],
            Vec::new(),
        ))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(SortChunk {
                header: renamed(&self.header, renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

/// Keeps the rows of a table whose value in one column passes its filters.
#[derive(Clone, Debug)]
pub struct FilterChunk {
    pub table: usize,
    pub table_name: String,
    pub header: String,
    pub filters: ColumnFilters,
}

impl CodeChunk for FilterChunk {
    fn display_name(&self) -> &'static str {
        "Filtered"
    }

    fn description_comment(&self) -> String {
        format!("Filtered {} in {}", self.header, self.table_name)
    }

    fn code(&self) -> Result<Code> {
        let lines = match self.filters.to_code(&self.table_name, &self.header)? {
            Some(condition) => vec![format!("{n} = {n}[{c}]", n = self.table_name, c = condition)],
            None => Vec::new(),
        };
        let imports = crate::codegen::imports_for(&lines);
        Ok((lines, imports))
    }

    fn modified_table_indexes(&self) -> TableSet {
        TableSet::one(self.table)
    }

    fn with_renamed_columns(&self, table: usize, renames: &Renames) -> Option<Box<dyn CodeChunk>> {
        (table == self.table).then(|| {
            Box::new(FilterChunk {
                header: renamed(&self.header, renames),
                ..self.clone()
            }) as Box<dyn CodeChunk>
        })
    }

    chunk_boilerplate!();
}

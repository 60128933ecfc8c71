//! Row steps.

use super::columns::rename_all;
use super::{ExecutionData, TranspileContext, TypedStepPerformer};
use crate::codegen::chunks::{DeleteRowsChunk, StatementChunk};
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::state::State;
use crate::types::{python_string, IndexLabel, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn missing_label(state: &State, sheet: usize, label: &IndexLabel) -> SheetError {
    SheetError::invalid_arg(format!(
        "{} has no row labelled {}",
        state.table_name(sheet).unwrap_or_default(),
        label
    ))
}

// --- delete_row ---

pub struct DeleteRow;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteRowParams {
    pub sheet_index: usize,
    pub labels: Vec<IndexLabel>,
}

impl TypedStepPerformer for DeleteRow {
    type Params = DeleteRowParams;

    const STEP_TYPE: &'static str = "delete_row";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Deleted Rows";

    fn execute(&self, prev: &State, params: &DeleteRowParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let table = prev.table(sheet)?;
        for label in &params.labels {
            if table.position_of_label(label).is_none() {
                return Err(missing_label(prev, sheet, label));
            }
        }
        let keep: Vec<usize> = table
            .index()
            .iter()
            .enumerate()
            .filter(|(_, label)| !params.labels.contains(label))
            .map(|(position, _)| position)
            .collect();
        let remaining = table.take_rows(&keep);
        let mut post = prev.clone();
        *post.table_mut(sheet)? = remaining;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &DeleteRowParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        if params.labels.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(DeleteRowsChunk {
            table: params.sheet_index,
            table_name: ctx.post.table_name(params.sheet_index)?.to_string(),
            labels: params.labels.clone(),
        })])
    }

    fn modified_table_indexes(&self, params: &DeleteRowParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &DeleteRowParams) -> String {
        format!("Deleted {} rows", params.labels.len())
    }
}

// --- promote_row_to_header ---

pub struct PromoteRowToHeader;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromoteRowToHeaderParams {
    pub sheet_index: usize,
    pub index: IndexLabel,
}

/// Headers read from a row, made unique and non-empty.
fn headers_from_row(row: &[&Value]) -> Vec<String> {
    let mut seen = HashSet::new();
    row.iter()
        .enumerate()
        .map(|(i, value)| {
            let base = match value {
                Value::Missing => format!("Unnamed: {}", i),
                other if other.to_string().trim().is_empty() => format!("Unnamed: {}", i),
                other => other.to_string(),
            };
            let mut header = base.clone();
            let mut n = 0;
            while !seen.insert(header.clone()) {
                n += 1;
                header = format!("{}_{}", base, n);
            }
            header
        })
        .collect()
}

impl TypedStepPerformer for PromoteRowToHeader {
    type Params = PromoteRowToHeaderParams;

    const STEP_TYPE: &'static str = "promote_row_to_header";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Promoted Row to Header";

    fn execute(&self, prev: &State, params: &PromoteRowToHeaderParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let table = prev.table(sheet)?;
        let position = table
            .position_of_label(&params.index)
            .ok_or_else(|| missing_label(prev, sheet, &params.index))?;
        let headers = headers_from_row(&table.row(position));
        let keep: Vec<usize> = (0..table.num_rows()).filter(|&p| p != position).collect();
        let remaining = table.take_rows(&keep);

        let mut post = prev.clone();
        *post.table_mut(sheet)? = remaining;
        let renames: Vec<_> = prev.column_ids.ids(sheet).into_iter().zip(headers).collect();
        rename_all(&mut post, sheet, &renames)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &PromoteRowToHeaderParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = ctx.post.table_name(sheet)?;
        let headers: Vec<String> = ctx
            .post
            .column_ids
            .headers(sheet)
            .iter()
            .map(|h| python_string(h))
            .collect();
        Ok(vec![Box::new(StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Promoted row {} to header in {}", params.index, name),
            sheet,
            vec![
                format!("{}.columns = [{}]", name, headers.join(", ")),
                format!("{}.drop(labels=[{}], inplace=True)", name, params.index.to_code()),
            ],
        ))])
    }

    fn modified_table_indexes(&self, params: &PromoteRowToHeaderParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &PromoteRowToHeaderParams) -> String {
        format!("Promoted row {} to header", params.index)
    }
}

// --- reset_index ---

pub struct ResetIndex;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResetIndexParams {
    pub sheet_index: usize,
    /// Discard the old labels instead of keeping them as a column.
    #[serde(default)]
    pub drop: bool,
}

impl TypedStepPerformer for ResetIndex {
    type Params = ResetIndexParams;

    const STEP_TYPE: &'static str = "reset_index";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Reset Index";

    fn execute(&self, prev: &State, params: &ResetIndexParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let mut post = prev.clone();
        let table = post.table_mut(sheet)?;
        table.reset_index(params.drop)?;
        if !params.drop {
            let header = table
                .column_at(0)
                .map(|c| c.header.clone())
                .unwrap_or_else(|| "index".to_string());
            post.column_ids.insert(sheet, 0, &header)?;
        }
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ResetIndexParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = ctx.post.table_name(sheet)?;
        let drop = if params.drop { "True" } else { "False" };
        Ok(vec![Box::new(StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Reset the index of {}", name),
            sheet,
            vec![format!("{}.reset_index(drop={}, inplace=True)", name, drop)],
        ))])
    }

    fn modified_table_indexes(&self, params: &ResetIndexParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ResetIndexParams) -> String {
        if params.drop {
            "Reset the index".to_string()
        } else {
            "Moved the index into a column".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::check_invariants;
    use crate::table::Table;
    use crate::types::TableSource;

    fn state() -> State {
        let mut state = State::default();
        let table = Table::from_columns(vec![
            ("A", vec![Value::str("name"), Value::str("x"), Value::str("y")]),
            ("B", vec![Value::str("name"), Value::Int(1), Value::Int(2)]),
        ])
        .unwrap();
        state.add_table(table, "t", TableSource::Imported).unwrap();
        state
    }

    #[test]
    fn test_delete_rows_keeps_labels() {
        let params = DeleteRowParams {
            sheet_index: 0,
            labels: vec![IndexLabel::Int(1)],
        };
        let (post, _) = DeleteRow.execute(&state(), &params).unwrap();
        assert_eq!(post.table(0).unwrap().index(), &[IndexLabel::Int(0), IndexLabel::Int(2)]);
    }

    #[test]
    fn test_delete_unknown_row_fails() {
        let params = DeleteRowParams {
            sheet_index: 0,
            labels: vec![IndexLabel::Int(9)],
        };
        assert!(DeleteRow.execute(&state(), &params).is_err());
    }

    #[test]
    fn test_promote_row_dedupes_headers_and_keeps_ids() {
        let params = PromoteRowToHeaderParams {
            sheet_index: 0,
            index: IndexLabel::Int(0),
        };
        let (post, _) = PromoteRowToHeader.execute(&state(), &params).unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(table.headers(), vec!["name", "name_1"]);
        assert_eq!(table.num_rows(), 2);
        assert_eq!(post.column_id(0, "name_1").unwrap().as_str(), "B");
        check_invariants(&post).unwrap();
    }

    #[test]
    fn test_reset_index_keeps_labels_as_column() {
        let rows = DeleteRowParams {
            sheet_index: 0,
            labels: vec![IndexLabel::Int(0)],
        };
        let (s, _) = DeleteRow.execute(&state(), &rows).unwrap();
        let (post, _) = ResetIndex
            .execute(&s, &ResetIndexParams { sheet_index: 0, drop: false })
            .unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(table.headers(), vec!["index", "A", "B"]);
        assert_eq!(table.column("index").unwrap().values, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(table.index(), &[IndexLabel::Int(0), IndexLabel::Int(1)]);
        check_invariants(&post).unwrap();
    }
}

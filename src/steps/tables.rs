//! Whole-table steps and in-place table edits.

use super::{
    check_column, formula_lines, headers_of, record, recorded, ExecutionData, TranspileContext, TypedStepPerformer,
    REFRESHED_COLUMNS,
};
use crate::codegen::chunks::{
    DeleteTableChunk, FilterChunk, RenameTableChunk, SetCellValueChunk, SortChunk, StatementChunk,
};
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::formula;
use crate::state::{self, ColumnFilters, FilterItem, FilterOperator, State, TableFormat};
use crate::table::{convert, range_index, Column, Table};
use crate::types::{python_string, ColumnId, Dtype, IndexLabel, TableSource, Value};
use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const NEW_TABLE: &str = "new_sheet_index";

fn name_of(state: &State, sheet: usize) -> Result<String> {
    state.table_name(sheet).map(str::to_string)
}

fn header_list(headers: &[String]) -> String {
    let quoted: Vec<String> = headers.iter().map(|h| python_string(h)).collect();
    format!("[{}]", quoted.join(", "))
}

/// Unique, non-empty headers from arbitrary text.
pub(crate) fn dedupe_headers(raw: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(i, base)| {
            let base = if base.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                base
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

/// Index of the table a creating step appended, from its execution data.
fn created_index(ctx: &TranspileContext<'_>) -> usize {
    recorded::<Option<usize>>(ctx.execution_data, NEW_TABLE).unwrap_or_else(|| ctx.post.num_tables().saturating_sub(1))
}

fn add_created(prev: &State, table: Table, name: &str, source: TableSource) -> Result<(State, ExecutionData)> {
    let mut post = prev.clone();
    let index = post.add_table(table, name, source)?;
    let mut data = ExecutionData::new();
    record(&mut data, NEW_TABLE, index)?;
    Ok((post, data))
}

// --- dataframe_duplicate ---

pub struct DataframeDuplicate;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SheetParams {
    pub sheet_index: usize,
}

impl TypedStepPerformer for DataframeDuplicate {
    type Params = SheetParams;

    const STEP_TYPE: &'static str = "dataframe_duplicate";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Duplicated a Dataframe";

    fn execute(&self, prev: &State, params: &SheetParams) -> Result<(State, ExecutionData)> {
        let mut post = prev.clone();
        let name = format!("{}_copy", name_of(prev, params.sheet_index)?);
        let index = post.duplicate_table(params.sheet_index, &name)?;
        let mut data = ExecutionData::new();
        record(&mut data, NEW_TABLE, index)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &SheetParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let old = name_of(ctx.prev, params.sheet_index)?;
        let index = created_index(ctx);
        let new = name_of(ctx.post, index)?;
        Ok(vec![Box::new(StatementChunk::creating(
            Self::DISPLAY_NAME,
            format!("Duplicated {}", old),
            index,
            vec![format!("{} = {}.copy(deep=True)", new, old)],
        ))])
    }

    fn modified_table_indexes(&self, _: &SheetParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &SheetParams) -> String {
        format!("Duplicated table {}", params.sheet_index)
    }
}

// --- dataframe_delete ---

pub struct DataframeDelete;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataframeDeleteParams {
    pub sheet_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_dataframe_name: Option<String>,
}

impl TypedStepPerformer for DataframeDelete {
    type Params = DataframeDeleteParams;

    const STEP_TYPE: &'static str = "dataframe_delete";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Deleted a Dataframe";

    fn saturate(&self, prev: &State, mut params: DataframeDeleteParams) -> Result<DataframeDeleteParams> {
        params.old_dataframe_name = Some(name_of(prev, params.sheet_index)?);
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &DataframeDeleteParams) -> Result<(State, ExecutionData)> {
        let mut post = prev.clone();
        post.remove_table(params.sheet_index)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &DataframeDeleteParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        Ok(vec![Box::new(DeleteTableChunk {
            table: params.sheet_index,
            table_name: name_of(ctx.prev, params.sheet_index)?,
        })])
    }

    fn modified_table_indexes(&self, params: &DataframeDeleteParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &DataframeDeleteParams) -> String {
        match &params.old_dataframe_name {
            Some(name) => format!("Deleted {}", name),
            None => format!("Deleted table {}", params.sheet_index),
        }
    }
}

// --- dataframe_rename ---

pub struct DataframeRename;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataframeRenameParams {
    pub sheet_index: usize,
    pub new_dataframe_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_dataframe_name: Option<String>,
}

impl TypedStepPerformer for DataframeRename {
    type Params = DataframeRenameParams;

    const STEP_TYPE: &'static str = "dataframe_rename";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Renamed a Dataframe";

    fn saturate(&self, prev: &State, mut params: DataframeRenameParams) -> Result<DataframeRenameParams> {
        params.old_dataframe_name = Some(name_of(prev, params.sheet_index)?);
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &DataframeRenameParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        prev.check_table(sheet)?;
        let others: Vec<String> = prev
            .table_names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != sheet)
            .map(|(_, n)| n.clone())
            .collect();
        let mut post = prev.clone();
        post.table_names[sheet] = state::valid_table_name(&params.new_dataframe_name, &others);
        Ok((post, ExecutionData::new()))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &DataframeRenameParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let old_name = name_of(ctx.prev, params.sheet_index)?;
        let new_name = name_of(ctx.post, params.sheet_index)?;
        if old_name == new_name {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(RenameTableChunk {
            table: params.sheet_index,
            old_name,
            new_name,
        })])
    }

    fn modified_table_indexes(&self, params: &DataframeRenameParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &DataframeRenameParams) -> String {
        format!("Renamed a table to {}", params.new_dataframe_name)
    }
}

// --- transpose ---

pub struct Transpose;

impl TypedStepPerformer for Transpose {
    type Params = SheetParams;

    const STEP_TYPE: &'static str = "transpose";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Transposed a Dataframe";

    fn execute(&self, prev: &State, params: &SheetParams) -> Result<(State, ExecutionData)> {
        let table = prev.table(params.sheet_index)?;
        let headers = dedupe_headers(table.index().iter().map(|l| l.to_string()));
        let columns = headers
            .into_iter()
            .enumerate()
            .map(|(row, header)| {
                let values = table.columns().iter().map(|c| c.values[row].clone()).collect();
                Column::new(header, values)
            })
            .collect();
        let index = table.headers().into_iter().map(|h| IndexLabel::Str(h.to_string())).collect();
        let transposed = Table::from_parts(index, columns)?;
        let name = format!("{}_transpose", name_of(prev, params.sheet_index)?);
        add_created(prev, transposed, &name, TableSource::Transposed)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &SheetParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let old = name_of(ctx.prev, params.sheet_index)?;
        let index = created_index(ctx);
        Ok(vec![Box::new(StatementChunk::creating(
            Self::DISPLAY_NAME,
            format!("Transposed {}", old),
            index,
            vec![format!("{} = {}.T", name_of(ctx.post, index)?, old)],
        ))])
    }

    fn modified_table_indexes(&self, _: &SheetParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &SheetParams) -> String {
        format!("Transposed table {}", params.sheet_index)
    }
}

// --- melt ---

pub struct Melt;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeltParams {
    pub sheet_index: usize,
    pub id_var_column_ids: Vec<ColumnId>,
    pub value_var_column_ids: Vec<ColumnId>,
}

impl TypedStepPerformer for Melt {
    type Params = MeltParams;

    const STEP_TYPE: &'static str = "melt";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Unpivoted a Dataframe";

    fn execute(&self, prev: &State, params: &MeltParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let table = prev.table(sheet)?;
        let id_headers = prev.column_headers(sheet, &params.id_var_column_ids)?;
        let value_headers = prev.column_headers(sheet, &params.value_var_column_ids)?;
        let id_columns = params
            .id_var_column_ids
            .iter()
            .map(|id| prev.column_values(sheet, id))
            .collect::<Result<Vec<_>>>()?;
        let rows = table.num_rows();

        let mut id_values: Vec<Vec<Value>> = vec![Vec::new(); id_headers.len()];
        let mut variables = Vec::with_capacity(rows * value_headers.len());
        let mut values = Vec::with_capacity(rows * value_headers.len());
        for (id, header) in params.value_var_column_ids.iter().zip(&value_headers) {
            for (row, value) in prev.column_values(sheet, id)?.iter().enumerate() {
                for (i, column) in id_columns.iter().enumerate() {
                    id_values[i].push(column[row].clone());
                }
                variables.push(Value::str(header.as_str()));
                values.push(value.clone());
            }
        }

        let mut columns: Vec<Column> = id_headers
            .iter()
            .cloned()
            .zip(id_values)
            .map(|(h, v)| Column::new(h, v))
            .collect();
        let variable = if id_headers.iter().any(|h| h == "variable") { "variable_1" } else { "variable" };
        let value = if id_headers.iter().any(|h| h == "value") { "value_1" } else { "value" };
        columns.push(Column::new(variable, variables));
        columns.push(Column::new(value, values));
        let count = columns.first().map(Column::len).unwrap_or(0);
        let melted = Table::from_parts(range_index(count), columns)?;
        let name = format!("{}_unpivoted", name_of(prev, sheet)?);
        add_created(prev, melted, &name, TableSource::Melted)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &MeltParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let old = name_of(ctx.prev, sheet)?;
        let index = created_index(ctx);
        let id_vars = ctx.prev.column_headers(sheet, &params.id_var_column_ids)?;
        let value_vars = ctx.prev.column_headers(sheet, &params.value_var_column_ids)?;
        Ok(vec![Box::new(StatementChunk::creating(
            Self::DISPLAY_NAME,
            format!("Unpivoted {}", old),
            index,
            vec![format!(
                "{} = {}.melt(id_vars={}, value_vars={})",
                name_of(ctx.post, index)?,
                old,
                header_list(&id_vars),
                header_list(&value_vars)
            )],
        ))])
    }

    fn modified_table_indexes(&self, _: &MeltParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &MeltParams) -> String {
        format!("Unpivoted {} columns", params.value_var_column_ids.len())
    }
}

// --- concat ---

pub struct Concat;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatJoin {
    Inner,
    #[default]
    Outer,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConcatParams {
    #[serde(default)]
    pub join: ConcatJoin,
    #[serde(default)]
    pub ignore_index: bool,
    pub sheet_indexes: Vec<usize>,
}

impl TypedStepPerformer for Concat {
    type Params = ConcatParams;

    const STEP_TYPE: &'static str = "concat";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Concatenated";

    fn execute(&self, prev: &State, params: &ConcatParams) -> Result<(State, ExecutionData)> {
        let tables = params
            .sheet_indexes
            .iter()
            .map(|&i| prev.table(i))
            .collect::<Result<Vec<_>>>()?;
        let joined = Table::concat(&tables, params.ignore_index, params.join == ConcatJoin::Inner)?;
        add_created(prev, joined, "df_concat", TableSource::Concatenated)
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ConcatParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let index = created_index(ctx);
        let new = name_of(ctx.post, index)?;
        let names = params
            .sheet_indexes
            .iter()
            .map(|&i| name_of(ctx.prev, i))
            .collect::<Result<Vec<_>>>()?;
        let line = if names.is_empty() {
            format!("{} = pd.DataFrame()", new)
        } else {
            let join = match params.join {
                ConcatJoin::Inner => "inner",
                ConcatJoin::Outer => "outer",
            };
            let ignore = if params.ignore_index { "True" } else { "False" };
            format!(
                "{} = pd.concat([{}], join='{}', ignore_index={})",
                new,
                names.join(", "),
                join,
                ignore
            )
        };
        Ok(vec![Box::new(StatementChunk::creating(
            Self::DISPLAY_NAME,
            format!("Concatenated {} into {}", names.join(", "), new),
            index,
            vec![line],
        ))])
    }

    fn modified_table_indexes(&self, _: &ConcatParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &ConcatParams) -> String {
        format!("Concatenated {} tables", params.sheet_indexes.len())
    }
}

// --- drop_duplicates ---

pub struct DropDuplicates;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Keep {
    #[default]
    First,
    Last,
    /// Drop every row that has a duplicate.
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DropDuplicatesParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
    #[serde(default)]
    pub keep: Keep,
}

/// Positions that survive dropping duplicates of `keys`.
fn deduplicated_positions(keys: &[Vec<Value>], keep: Keep) -> Vec<usize> {
    let mut counts: HashMap<&[Value], usize> = HashMap::new();
    for key in keys {
        *counts.entry(key.as_slice()).or_default() += 1;
    }
    let mut seen: HashSet<&[Value]> = HashSet::new();
    match keep {
        Keep::First => (0..keys.len()).filter(|&i| seen.insert(keys[i].as_slice())).collect(),
        Keep::Last => {
            let mut kept: Vec<usize> = (0..keys.len())
                .rev()
                .filter(|&i| seen.insert(keys[i].as_slice()))
                .collect();
            kept.reverse();
            kept
        }
        Keep::None => (0..keys.len()).filter(|&i| counts[keys[i].as_slice()] == 1).collect(),
    }
}

impl TypedStepPerformer for DropDuplicates {
    type Params = DropDuplicatesParams;

    const STEP_TYPE: &'static str = "drop_duplicates";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Dropped Duplicates";

    fn execute(&self, prev: &State, params: &DropDuplicatesParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let table = prev.table(sheet)?;
        let ids = if params.column_ids.is_empty() {
            prev.column_ids.ids(sheet)
        } else {
            params.column_ids.clone()
        };
        let columns = ids
            .iter()
            .map(|id| prev.column_values(sheet, id))
            .collect::<Result<Vec<_>>>()?;
        let keys: Vec<Vec<Value>> = (0..table.num_rows())
            .map(|row| columns.iter().map(|c| c[row].clone()).collect())
            .collect();
        let kept = deduplicated_positions(&keys, params.keep);
        let removed = table.num_rows() - kept.len();
        let remaining = table.take_rows(&kept);

        let mut post = prev.clone();
        *post.table_mut(sheet)? = remaining;
        let mut data = ExecutionData::new();
        record(&mut data, "removed_rows", removed)?;
        Ok((post, data))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &DropDuplicatesParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = name_of(ctx.post, sheet)?;
        let keep = match params.keep {
            Keep::First => "'first'",
            Keep::Last => "'last'",
            Keep::None => "False",
        };
        let subset = ctx.prev.column_headers(sheet, &params.column_ids)?;
        let line = if subset.is_empty() {
            format!("{n} = {n}.drop_duplicates(keep={k})", n = name, k = keep)
        } else {
            format!(
                "{n} = {n}.drop_duplicates(subset={s}, keep={k})",
                n = name,
                s = header_list(&subset),
                k = keep
            )
        };
        Ok(vec![Box::new(
            StatementChunk::editing(Self::DISPLAY_NAME, format!("Dropped duplicates in {}", name), sheet, vec![line])
                .reading(subset),
        )])
    }

    fn modified_table_indexes(&self, params: &DropDuplicatesParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &DropDuplicatesParams) -> String {
        format!("Dropped duplicates on {} columns", params.column_ids.len())
    }
}

// --- sort ---

pub struct Sort;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
    None,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SortParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub sort_direction: SortDirection,
}

/// Stable sort order of `values`; missing values come first.
fn sort_positions(column: &str, values: &[Value], direction: SortDirection) -> Result<Vec<usize>> {
    let first = values.iter().find(|v| !v.is_missing());
    if let Some(first) = first {
        if let Some(other) = values.iter().find(|v| !v.is_missing() && v.compare(first).is_none()) {
            return Err(SheetError::InvalidSort {
                column: column.to_string(),
                message: format!("{} and {} values cannot be compared", first.type_name(), other.type_name()),
            });
        }
    }
    let mut positions: Vec<usize> = (0..values.len()).collect();
    positions.sort_by(|&a, &b| match (values[a].is_missing(), values[b].is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => {
            let order = values[a].compare(&values[b]).unwrap_or(Ordering::Equal);
            if direction == SortDirection::Descending {
                order.reverse()
            } else {
                order
            }
        }
    });
    Ok(positions)
}

impl TypedStepPerformer for Sort {
    type Params = SortParams;

    const STEP_TYPE: &'static str = "sort";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Sorted a Column";

    fn execute(&self, prev: &State, params: &SortParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        if params.sort_direction == SortDirection::None {
            return Ok((prev.clone(), ExecutionData::new()));
        }
        let positions = sort_positions(&header, prev.column_values(sheet, &params.column_id)?, params.sort_direction)?;
        let sorted = prev.table(sheet)?.take_rows(&positions);
        let mut post = prev.clone();
        *post.table_mut(sheet)? = sorted;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &SortParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        if params.sort_direction == SortDirection::None {
            return Ok(Vec::new());
        }
        let sheet = params.sheet_index;
        Ok(vec![Box::new(SortChunk {
            table: sheet,
            table_name: name_of(ctx.post, sheet)?,
            header: ctx.post.column_header(sheet, &params.column_id)?,
            ascending: params.sort_direction == SortDirection::Ascending,
        })])
    }

    fn modified_table_indexes(&self, params: &SortParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &SortParams) -> String {
        let direction = match params.sort_direction {
            SortDirection::Ascending => "ascending",
            SortDirection::Descending => "descending",
            SortDirection::None => "unsorted",
        };
        format!("Sorted {} {}", params.column_id, direction)
    }
}

// --- filter_column ---

pub struct FilterColumn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    #[serde(default)]
    pub operator: FilterOperator,
    pub filters: Vec<FilterItem>,
}

impl FilterColumnParams {
    fn column_filters(&self) -> ColumnFilters {
        ColumnFilters {
            operator: self.operator,
            filters: self.filters.clone(),
        }
    }
}

impl TypedStepPerformer for FilterColumn {
    type Params = FilterColumnParams;

    const STEP_TYPE: &'static str = "filter_column";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Filtered a Column";

    fn execute(&self, prev: &State, params: &FilterColumnParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        let filters = params.column_filters();
        let mut post = prev.clone();
        if filters.is_empty() {
            post.column_filters[sheet].remove(&params.column_id);
            return Ok((post, ExecutionData::new()));
        }
        let mask = filters.mask(prev.column_values(sheet, &params.column_id)?)?;
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, pass)| **pass)
            .map(|(position, _)| position)
            .collect();
        let filtered = prev.table(sheet)?.take_rows(&keep);
        debug!(sheet, column = %header, kept = keep.len(), "filtered column");
        *post.table_mut(sheet)? = filtered;
        post.column_filters[sheet].insert(params.column_id.clone(), filters);
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &FilterColumnParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let filters = params.column_filters();
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(FilterChunk {
            table: sheet,
            table_name: name_of(ctx.post, sheet)?,
            header: ctx.post.column_header(sheet, &params.column_id)?,
            filters,
        })])
    }

    fn modified_table_indexes(&self, params: &FilterColumnParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &FilterColumnParams) -> String {
        format!("Filtered {}", params.column_id)
    }
}

// --- set_cell_value ---

pub struct SetCellValue;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetCellValueParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub row_index: IndexLabel,
    /// The text the user typed; parsed according to the column dtype.
    pub new_value: String,
}

/// Read typed text as a value of `dtype`.
fn parse_cell(text: &str, dtype: Dtype) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Missing);
    }
    let invalid = || SheetError::invalid_arg(format!("{} is not a valid {} value", text, dtype));
    match dtype {
        Dtype::Int | Dtype::Float => {
            let n = convert::parse_number(text).ok_or_else(invalid)?;
            if dtype == Dtype::Int && n.fract() == 0.0 {
                Ok(Value::Int(n as i64))
            } else {
                Ok(Value::float(n))
            }
        }
        Dtype::Bool => convert::parse_bool(text).map(Value::Bool).ok_or_else(invalid),
        Dtype::Datetime => convert::parse_datetime(text).map(Value::Timestamp).ok_or_else(invalid),
        Dtype::Timedelta => convert::parse_timedelta(text).map(Value::Duration).ok_or_else(invalid),
        Dtype::String | Dtype::Object => Ok(Value::str(text)),
    }
}

impl TypedStepPerformer for SetCellValue {
    type Params = SetCellValueParams;

    const STEP_TYPE: &'static str = "set_cell_value";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Set a Cell Value";

    fn execute(&self, prev: &State, params: &SetCellValueParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        if prev.column_formulas[sheet].contains_key(&params.column_id) {
            return Err(SheetError::invalid_arg(format!(
                "{} is computed by a formula; edit the formula instead",
                header
            )));
        }
        let table = prev.table(sheet)?;
        let position = table.position_of_label(&params.row_index).ok_or_else(|| {
            SheetError::invalid_arg(format!("there is no row labelled {}", params.row_index))
        })?;
        let dtype = table.column(&header).map(|c| c.dtype).unwrap_or(Dtype::Object);
        let value = parse_cell(&params.new_value, dtype)?;

        let mut post = prev.clone();
        post.table_mut(sheet)?.set_value(position, &header, value)?;
        let refreshed = formula::refresh_dependents(&mut post, sheet, std::slice::from_ref(&params.column_id))?;
        let mut data = ExecutionData::new();
        record(&mut data, REFRESHED_COLUMNS, &refreshed)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &SetCellValueParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let header = ctx.post.column_header(sheet, &params.column_id)?;
        let table = ctx.post.table(sheet)?;
        let value = table
            .position_of_label(&params.row_index)
            .and_then(|p| table.column(&header).map(|c| c.values[p].clone()))
            .unwrap_or(Value::Missing);
        let refreshed: Vec<ColumnId> = recorded(ctx.execution_data, REFRESHED_COLUMNS);
        Ok(vec![Box::new(SetCellValueChunk {
            table: sheet,
            table_name: name_of(ctx.post, sheet)?,
            id: params.column_id.clone(),
            label: params.row_index.clone(),
            value,
            refresh: formula_lines(ctx.post, sheet, &refreshed),
            headers: headers_of(ctx.post, sheet),
            public_import: ctx.post.public_interface_version.import_line(),
        })])
    }

    fn modified_table_indexes(&self, params: &SetCellValueParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &SetCellValueParams) -> String {
        format!("Set {} at {} to {}", params.column_id, params.row_index, params.new_value)
    }
}

// --- set_dataframe_format ---

pub struct SetDataframeFormat;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetDataframeFormatParams {
    pub sheet_index: usize,
    pub df_format: TableFormat,
}

impl TypedStepPerformer for SetDataframeFormat {
    type Params = SetDataframeFormatParams;

    const STEP_TYPE: &'static str = "set_dataframe_format";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Set Dataframe Format";

    fn execute(&self, prev: &State, params: &SetDataframeFormatParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        prev.check_table(sheet)?;
        let mut format = params.df_format.clone();
        let ids = prev.sheet_ids(sheet)?;
        format.retain_columns(|id| ids.contains(id));
        let mut post = prev.clone();
        post.table_formats[sheet] = format;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &SetDataframeFormatParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = name_of(ctx.post, sheet)?;
        let lines = ctx.post.table_formats[sheet].to_code(&name, &ctx.post.header_map(sheet));
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Formatted {}", name),
            sheet,
            lines,
        ))])
    }

    fn modified_table_indexes(&self, params: &SetDataframeFormatParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &SetDataframeFormatParams) -> String {
        format!("Formatted table {}", params.sheet_index)
    }
}

// --- replace ---

pub struct Replace;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplaceParams {
    pub sheet_index: usize,
    /// `None` searches every column.
    #[serde(default)]
    pub column_ids: Option<Vec<ColumnId>>,
    pub search_value: String,
    pub replace_value: String,
}

impl ReplaceParams {
    fn ids(&self, state: &State) -> Vec<ColumnId> {
        self.column_ids
            .clone()
            .unwrap_or_else(|| state.column_ids.ids(self.sheet_index))
    }

    fn matcher(&self) -> Result<Regex> {
        if self.search_value.is_empty() {
            return Err(SheetError::invalid_arg("the search value cannot be empty"));
        }
        Regex::new(&format!("(?i){}", regex::escape(&self.search_value)))
            .map_err(|e| SheetError::invalid_arg(e.to_string()))
    }
}

impl TypedStepPerformer for Replace {
    type Params = ReplaceParams;

    const STEP_TYPE: &'static str = "replace";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Replaced Values";

    fn execute(&self, prev: &State, params: &ReplaceParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        prev.check_table(sheet)?;
        let matcher = params.matcher()?;
        let mut post = prev.clone();
        let mut changed = Vec::new();
        for id in params.ids(prev) {
            let header = check_column(prev, sheet, &id)?;
            if prev.column_formulas[sheet].contains_key(&id) {
                continue;
            }
            let dtype = prev.table(sheet)?.column(&header).map(|c| c.dtype).unwrap_or(Dtype::Object);
            let values = prev.column_values(sheet, &id)?;
            let replaced: Vec<Value> = values
                .iter()
                .map(|value| match value {
                    Value::Str(s) => Value::Str(matcher.replace_all(s, NoExpand(&params.replace_value)).into_owned()),
                    Value::Missing => Value::Missing,
                    other if other.to_string().eq_ignore_ascii_case(&params.search_value) => {
                        parse_cell(&params.replace_value, dtype).unwrap_or_else(|_| Value::str(params.replace_value.as_str()))
                    }
                    other => other.clone(),
                })
                .collect();
            if replaced.as_slice() != values {
                post.set_column_values(sheet, &id, replaced)?;
                changed.push(id);
            }
        }
        let refreshed = formula::refresh_dependents(&mut post, sheet, &changed)?;
        let mut data = ExecutionData::new();
        record(&mut data, REFRESHED_COLUMNS, &refreshed)?;
        record(&mut data, "changed_column_ids", &changed)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ReplaceParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = name_of(ctx.post, sheet)?;
        let changed: Vec<ColumnId> = recorded(ctx.execution_data, "changed_column_ids");
        if changed.is_empty() {
            return Ok(Vec::new());
        }
        let pattern = python_string(&format!("(?i){}", regex::escape(&params.search_value)));
        let replacement = python_string(&params.replace_value);
        let mut lines = Vec::new();
        for id in &changed {
            let header = python_string(&ctx.post.column_header(sheet, id)?);
            let dtype = ctx.prev.table(sheet)?.column(&ctx.prev.column_header(sheet, id)?).map(|c| c.dtype);
            if dtype == Some(Dtype::String) || dtype == Some(Dtype::Object) {
                lines.push(format!(
                    "{n}[{h}] = {n}[{h}].str.replace({p}, {r}, regex=True)",
                    n = name,
                    h = header,
                    p = pattern,
                    r = replacement
                ));
            } else {
                lines.push(format!(
                    "{n}[{h}] = {n}[{h}].astype(str).replace({s}, {r})",
                    n = name,
                    h = header,
                    s = python_string(&params.search_value),
                    r = replacement
                ));
            }
        }
        let refreshed: Vec<ColumnId> = recorded(ctx.execution_data, REFRESHED_COLUMNS);
        let headers = ctx.post.header_map(sheet);
        for line in formula_lines(ctx.post, sheet, &refreshed) {
            let target = python_string(headers.get(&line.target).map(String::as_str).unwrap_or_default());
            lines.push(format!("{}[{}] = {}", name, target, line.expr.to_code(&name, &headers)?));
        }
        let mut chunk = StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Replaced {} with {} in {}", params.search_value, params.replace_value, name),
            sheet,
            lines,
        );
        if !refreshed.is_empty() {
            chunk = chunk.with_imports(vec![ctx.post.public_interface_version.import_line()]);
        }
        Ok(vec![Box::new(chunk)])
    }

    fn modified_table_indexes(&self, params: &ReplaceParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ReplaceParams) -> String {
        format!("Replaced {} with {}", params.search_value, params.replace_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Filter, FilterCondition};

    fn state_with(columns: Vec<(&str, Vec<Value>)>) -> State {
        let mut state = State::default();
        state
            .add_table(Table::from_columns(columns).unwrap(), "t", TableSource::Imported)
            .unwrap();
        state
    }

    #[test]
    fn test_filter_not_empty_keeps_labels() {
        let s = state_with(vec![("A", vec![Value::Int(1), Value::Missing, Value::Int(3)])]);
        let params = FilterColumnParams {
            sheet_index: 0,
            column_id: ColumnId::new("A"),
            operator: FilterOperator::And,
            filters: vec![FilterItem::Filter(Filter {
                condition: FilterCondition::NotEmpty,
                value: serde_json::Value::Null,
            })],
        };
        let (post, _) = FilterColumn.execute(&s, &params).unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(table.index(), &[IndexLabel::Int(0), IndexLabel::Int(2)]);
        assert_eq!(post.column_filters[0].len(), 1);
    }

    #[test]
    fn test_sort_puts_missing_first_and_is_stable() {
        let values = vec![Value::Int(2), Value::Missing, Value::Int(1), Value::Int(2)];
        assert_eq!(sort_positions("A", &values, SortDirection::Ascending).unwrap(), vec![1, 2, 0, 3]);
        assert_eq!(sort_positions("A", &values, SortDirection::Descending).unwrap(), vec![1, 0, 3, 2]);
    }

    #[test]
    fn test_sort_mixed_types_fails() {
        let values = vec![Value::Int(2), Value::str("a")];
        let err = sort_positions("A", &values, SortDirection::Ascending).unwrap_err();
        assert_eq!(err.kind().as_str(), "invalid-sort");
    }

    #[test]
    fn test_drop_duplicates_keep_modes() {
        let keys: Vec<Vec<Value>> = [1, 2, 1, 3].iter().map(|&i| vec![Value::Int(i)]).collect();
        assert_eq!(deduplicated_positions(&keys, Keep::First), vec![0, 1, 3]);
        assert_eq!(deduplicated_positions(&keys, Keep::Last), vec![1, 2, 3]);
        assert_eq!(deduplicated_positions(&keys, Keep::None), vec![1, 3]);
    }

    #[test]
    fn test_set_cell_value_parses_by_dtype() {
        let s = state_with(vec![("A", vec![Value::Int(1), Value::Int(2)])]);
        let params = SetCellValueParams {
            sheet_index: 0,
            column_id: ColumnId::new("A"),
            row_index: IndexLabel::Int(1),
            new_value: "7".into(),
        };
        let (post, _) = SetCellValue.execute(&s, &params).unwrap();
        assert_eq!(post.table(0).unwrap().column("A").unwrap().values[1], Value::Int(7));

        let bad = SetCellValueParams {
            new_value: "seven".into(),
            ..params
        };
        assert!(SetCellValue.execute(&s, &bad).is_err());
    }

    #[test]
    fn test_replace_is_case_insensitive_in_text() {
        let s = state_with(vec![("A", vec![Value::str("Apple pie"), Value::str("apple")])]);
        let params = ReplaceParams {
            sheet_index: 0,
            column_ids: None,
            search_value: "APPLE".into(),
            replace_value: "pear".into(),
        };
        let (post, _) = Replace.execute(&s, &params).unwrap();
        assert_eq!(
            post.table(0).unwrap().column("A").unwrap().values,
            vec![Value::str("pear pie"), Value::str("pear")]
        );
    }

    #[test]
    fn test_transpose_and_melt_create_tables() {
        let s = state_with(vec![
            ("K", vec![Value::str("a"), Value::str("b")]),
            ("V", vec![Value::Int(1), Value::Int(2)]),
        ]);
        let (post, _) = Transpose.execute(&s, &SheetParams { sheet_index: 0 }).unwrap();
        assert_eq!(post.table_names, vec!["t", "t_transpose"]);
        assert_eq!(post.table(1).unwrap().headers(), vec!["0", "1"]);

        let params = MeltParams {
            sheet_index: 0,
            id_var_column_ids: vec![ColumnId::new("K")],
            value_var_column_ids: vec![ColumnId::new("V")],
        };
        let (post, _) = Melt.execute(&s, &params).unwrap();
        let melted = post.table(1).unwrap();
        assert_eq!(melted.headers(), vec!["K", "variable", "value"]);
        assert_eq!(melted.column("value").unwrap().values, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_rename_dedupes_against_other_tables() {
        let mut s = state_with(vec![("A", vec![Value::Int(1)])]);
        s.duplicate_table(0, "u").unwrap();
        let params = DataframeRenameParams {
            sheet_index: 0,
            new_dataframe_name: "u".into(),
            old_dataframe_name: None,
        };
        let (post, _) = DataframeRename.execute(&s, &params).unwrap();
        assert_eq!(post.table_names, vec!["u_1", "u"]);
    }
}

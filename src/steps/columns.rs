//! Column steps.

use super::{
    check_column, formula_lines, headers_of, now_string, parse_time, record, recorded, ExecutionData,
    TranspileContext, TypedStepPerformer, REFRESHED_COLUMNS,
};
use crate::codegen::chunks::{
    AddColumnChunk, ChangeDtypeChunk, DeleteColumnsChunk, FillNaChunk, FillNaMethod, RenameColumnsChunk,
    ReorderColumnChunk, SetFormulaChunk, StatementChunk,
};
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::formula::{self, dependencies, AppliedTo};
use crate::state::{ColumnFormat, State};
use crate::table::convert;
use crate::types::{python_string, unique_token, ColumnId, Dtype, IndexLabel, Value};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

const NEW_COLUMNS: &str = "new_column_ids";

fn table_name(state: &State, sheet: usize) -> Result<String> {
    state.table_name(sheet).map(str::to_string)
}

// --- add_column ---

pub struct AddColumn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AddColumnParams {
    pub sheet_index: usize,
    pub column_header: String,
    /// Position of the new column; negative appends.
    #[serde(default = "append_position")]
    pub column_header_index: i64,
}

fn append_position() -> i64 {
    -1
}

impl AddColumnParams {
    fn position(&self, state: &State) -> Result<usize> {
        let columns = state.table(self.sheet_index)?.num_columns();
        Ok(if self.column_header_index < 0 {
            columns
        } else {
            (self.column_header_index as usize).min(columns)
        })
    }
}

impl TypedStepPerformer for AddColumn {
    type Params = AddColumnParams;

    const STEP_TYPE: &'static str = "add_column";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Added a Column";

    fn saturate(&self, prev: &State, mut params: AddColumnParams) -> Result<AddColumnParams> {
        params.column_header_index = params.position(prev)? as i64;
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &AddColumnParams) -> Result<(State, ExecutionData)> {
        if params.column_header.trim().is_empty() {
            return Err(SheetError::invalid_arg("column headers cannot be empty"));
        }
        let mut post = prev.clone();
        let rows = post.table(params.sheet_index)?.num_rows();
        let position = params.position(&post)?;
        post.add_column(params.sheet_index, &params.column_header, vec![Value::Int(0); rows], position)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &AddColumnParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        Ok(vec![Box::new(AddColumnChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            id: ctx.post.column_id(sheet, &params.column_header)?,
            position: params.position(ctx.prev)?,
            headers: headers_of(ctx.post, sheet),
            formula: None,
            public_import: ctx.post.public_interface_version.import_line(),
        })])
    }

    fn modified_table_indexes(&self, params: &AddColumnParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &AddColumnParams) -> String {
        format!("Added column {}", params.column_header)
    }
}

// --- delete_column ---

pub struct DeleteColumn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeleteColumnParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
}

impl TypedStepPerformer for DeleteColumn {
    type Params = DeleteColumnParams;

    const STEP_TYPE: &'static str = "delete_column";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Deleted a Column";

    fn execute(&self, prev: &State, params: &DeleteColumnParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        for id in &params.column_ids {
            let header = check_column(prev, sheet, id)?;
            let outside: Vec<ColumnId> = prev
                .formula_dependents(sheet, id)
                .into_iter()
                .filter(|dependent| !params.column_ids.contains(dependent))
                .collect();
            if !outside.is_empty() {
                return Err(SheetError::ColumnInUse {
                    column: header,
                    dependents: prev.column_headers(sheet, &outside)?,
                });
            }
        }
        let mut post = prev.clone();
        for id in &params.column_ids {
            post.delete_column(sheet, id)?;
        }
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &DeleteColumnParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        if params.column_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sheet = params.sheet_index;
        Ok(vec![Box::new(DeleteColumnsChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            headers: ctx.prev.column_headers(sheet, &params.column_ids)?,
        })])
    }

    fn modified_table_indexes(&self, params: &DeleteColumnParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &DeleteColumnParams) -> String {
        let ids: Vec<&str> = params.column_ids.iter().map(ColumnId::as_str).collect();
        format!("Deleted columns {}", ids.join(", "))
    }
}

// --- rename_column ---

pub struct RenameColumn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RenameColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub new_column_header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_column_header: Option<String>,
}

impl TypedStepPerformer for RenameColumn {
    type Params = RenameColumnParams;

    const STEP_TYPE: &'static str = "rename_column";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Renamed a Column";

    fn saturate(&self, prev: &State, mut params: RenameColumnParams) -> Result<RenameColumnParams> {
        params.old_column_header = Some(check_column(prev, params.sheet_index, &params.column_id)?);
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &RenameColumnParams) -> Result<(State, ExecutionData)> {
        if params.new_column_header.trim().is_empty() {
            return Err(SheetError::invalid_arg("column headers cannot be empty"));
        }
        let mut post = prev.clone();
        post.rename_column(params.sheet_index, &params.column_id, &params.new_column_header)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &RenameColumnParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let old = ctx.prev.column_header(sheet, &params.column_id)?;
        let new = ctx.post.column_header(sheet, &params.column_id)?;
        if old == new {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(RenameColumnsChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            renames: vec![(old, new)],
        })])
    }

    fn modified_table_indexes(&self, params: &RenameColumnParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &RenameColumnParams) -> String {
        match &params.old_column_header {
            Some(old) => format!("Renamed {} to {}", old, params.new_column_header),
            None => format!("Renamed a column to {}", params.new_column_header),
        }
    }
}

// --- reorder_column ---

pub struct ReorderColumn;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReorderColumnParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub new_column_index: usize,
}

impl TypedStepPerformer for ReorderColumn {
    type Params = ReorderColumnParams;

    const STEP_TYPE: &'static str = "reorder_column";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Reordered a Column";

    fn execute(&self, prev: &State, params: &ReorderColumnParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        let mut post = prev.clone();
        post.table_mut(sheet)?.move_column(&header, params.new_column_index)?;
        post.column_ids.reorder(sheet, &params.column_id, params.new_column_index)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ReorderColumnParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let header = ctx.post.column_header(sheet, &params.column_id)?;
        let before = ctx.prev.table(sheet)?.column_position(&header);
        let after = ctx.post.table(sheet)?.column_position(&header);
        let position = match (before, after) {
            (Some(before), Some(after)) if before != after => after,
            _ => return Ok(Vec::new()),
        };
        Ok(vec![Box::new(ReorderColumnChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            id: params.column_id.clone(),
            position,
            headers: headers_of(ctx.post, sheet),
        })])
    }

    fn modified_table_indexes(&self, params: &ReorderColumnParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ReorderColumnParams) -> String {
        format!("Moved column {} to index {}", params.column_id, params.new_column_index)
    }
}

// --- set_column_formula ---

pub struct SetColumnFormula;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetColumnFormulaParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub new_formula: String,
    /// Row the formula was written at; the first row of the table when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula_label: Option<IndexLabel>,
    #[serde(default)]
    pub index_labels_formula_is_applied_to: AppliedTo,
    /// Pinned value of `NOW()`, filled in when the step is first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_formula: Option<String>,
}

/// Label of the first row of `sheet`, or 0 for an empty table.
fn first_row(state: &State, sheet: usize) -> Result<IndexLabel> {
    Ok(state
        .table(sheet)?
        .index()
        .first()
        .cloned()
        .unwrap_or(IndexLabel::Int(0)))
}

impl TypedStepPerformer for SetColumnFormula {
    type Params = SetColumnFormulaParams;

    const STEP_TYPE: &'static str = "set_column_formula";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Set Column Formula";

    fn saturate(&self, prev: &State, mut params: SetColumnFormulaParams) -> Result<SetColumnFormulaParams> {
        let sheet = params.sheet_index;
        check_column(prev, sheet, &params.column_id)?;
        if params.evaluation_time.is_none() {
            params.evaluation_time = Some(now_string());
        }
        if params.formula_label.is_none() {
            params.formula_label = Some(first_row(prev, sheet)?);
        }
        let headers = prev.header_map(sheet);
        params.old_formula = prev.column_formulas[sheet]
            .get(&params.column_id)
            .map(|formula| formula.display(&headers));
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &SetColumnFormulaParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let id = &params.column_id;
        let header = check_column(prev, sheet, id)?;
        let now = match &params.evaluation_time {
            Some(time) => parse_time(time)?,
            None => chrono::Local::now().naive_local(),
        };
        let formula_label = match &params.formula_label {
            Some(label) => label.clone(),
            None => first_row(prev, sheet)?,
        };
        let formula = formula::build_formula(
            prev,
            sheet,
            &params.new_formula,
            &formula_label,
            params.index_labels_formula_is_applied_to.clone(),
            now,
        )?;
        if dependencies::creates_cycle(&prev.column_formulas[sheet], id, &formula.dependencies) {
            return Err(SheetError::CyclicFormula { column: header });
        }

        let mut post = prev.clone();
        let values = formula::evaluate_formula(&post, sheet, id, &formula)?;
        post.set_column_values(sheet, id, values)?;
        post.column_formulas[sheet].insert(id.clone(), formula);
        let refreshed = formula::refresh_dependents(&mut post, sheet, std::slice::from_ref(id))?;
        debug!(sheet, column = %header, refreshed = refreshed.len(), "set column formula");

        let mut data = ExecutionData::new();
        record(&mut data, REFRESHED_COLUMNS, &refreshed)?;
        Ok((post, data))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &SetColumnFormulaParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let mut ids = vec![params.column_id.clone()];
        ids.extend(recorded::<Vec<ColumnId>>(ctx.execution_data, REFRESHED_COLUMNS));
        Ok(vec![Box::new(SetFormulaChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            lines: formula_lines(ctx.post, sheet, &ids),
            headers: headers_of(ctx.post, sheet),
            public_import: ctx.post.public_interface_version.import_line(),
        })])
    }

    fn modified_table_indexes(&self, params: &SetColumnFormulaParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &SetColumnFormulaParams) -> String {
        format!("Set formula of {} to {}", params.column_id, params.new_formula)
    }
}

// --- change_column_dtype ---

pub struct ChangeColumnDtype;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeColumnDtypeParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
    pub new_dtype: Dtype,
}

const DATETIME_FORMATS: &str = "datetime_formats";

impl TypedStepPerformer for ChangeColumnDtype {
    type Params = ChangeColumnDtypeParams;

    const STEP_TYPE: &'static str = "change_column_dtype";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Changed a Column Dtype";

    fn execute(&self, prev: &State, params: &ChangeColumnDtypeParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let mut post = prev.clone();
        let mut changed = Vec::new();
        let mut formats: BTreeMap<ColumnId, String> = BTreeMap::new();
        for id in &params.column_ids {
            let header = check_column(prev, sheet, id)?;
            let name = table_name(prev, sheet)?;
            let column = prev
                .table(sheet)?
                .column(&header)
                .ok_or_else(|| SheetError::no_column(&name, &header))?;
            if column.dtype == params.new_dtype {
                continue;
            }
            let conversion = convert::convert_values(&column.values, params.new_dtype, None)?;
            if let Some(format) = conversion.detected_format {
                formats.insert(id.clone(), format);
            }
            let target = post
                .table_mut(sheet)?
                .column_mut(&header)
                .ok_or_else(|| SheetError::no_column(&name, &header))?;
            target.values = conversion.values;
            target.dtype = params.new_dtype;
            changed.push(id.clone());
        }
        let refreshed = formula::refresh_dependents(&mut post, sheet, &changed)?;

        let mut data = ExecutionData::new();
        record(&mut data, DATETIME_FORMATS, &formats)?;
        record(&mut data, REFRESHED_COLUMNS, &refreshed)?;
        Ok((post, data))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &ChangeColumnDtypeParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = table_name(ctx.post, sheet)?;
        let formats: BTreeMap<ColumnId, String> = recorded(ctx.execution_data, DATETIME_FORMATS);
        let refreshed: Vec<ColumnId> = recorded(ctx.execution_data, REFRESHED_COLUMNS);
        let mut chunks: Vec<ChangeDtypeChunk> = Vec::new();
        for id in &params.column_ids {
            let header = ctx.prev.column_header(sheet, id)?;
            let old_dtype = ctx
                .prev
                .table(sheet)?
                .column(&header)
                .map(|c| c.dtype)
                .unwrap_or(Dtype::Object);
            if old_dtype == params.new_dtype {
                continue;
            }
            chunks.push(ChangeDtypeChunk {
                table: sheet,
                table_name: name.clone(),
                id: id.clone(),
                old_dtype,
                new_dtype: params.new_dtype,
                format: formats.get(id).cloned(),
                refresh: Vec::new(),
                headers: headers_of(ctx.post, sheet),
                public_import: ctx.post.public_interface_version.import_line(),
            });
        }
        if let Some(last) = chunks.last_mut() {
            last.refresh = formula_lines(ctx.post, sheet, &refreshed);
        }
        Ok(chunks
            .into_iter()
            .map(|c| Box::new(c) as Box<dyn CodeChunk>)
            .collect())
    }

    fn modified_table_indexes(&self, params: &ChangeColumnDtypeParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ChangeColumnDtypeParams) -> String {
        format!("Changed {} columns to {}", params.column_ids.len(), params.new_dtype)
    }
}

// --- change_column_format ---

/// Per-column number format, kept for analyses saved before table formats.
pub struct ChangeColumnFormat;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeColumnFormatParams {
    pub sheet_index: usize,
    pub column_ids: Vec<ColumnId>,
    pub format: ColumnFormat,
}

impl TypedStepPerformer for ChangeColumnFormat {
    type Params = ChangeColumnFormatParams;

    const STEP_TYPE: &'static str = "change_column_format";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Changed Column Format";

    fn execute(&self, prev: &State, params: &ChangeColumnFormatParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let mut post = prev.clone();
        for id in &params.column_ids {
            check_column(prev, sheet, id)?;
            post.table_formats[sheet]
                .columns
                .insert(id.clone(), params.format.clone());
        }
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, _: &TranspileContext<'_>, _: &ChangeColumnFormatParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        Ok(Vec::new())
    }

    fn modified_table_indexes(&self, params: &ChangeColumnFormatParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ChangeColumnFormatParams) -> String {
        format!("Changed the format of {} columns", params.column_ids.len())
    }
}

// --- split_text_to_columns ---

pub struct SplitTextToColumns;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SplitTextToColumnsParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
    pub delimiters: Vec<String>,
    /// Keeps new headers unique; generated when the step is first run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_header_suffix: Option<String>,
}

impl SplitTextToColumnsParams {
    fn pattern(&self) -> String {
        self.delimiters
            .iter()
            .map(|d| regex::escape(d))
            .collect::<Vec<_>>()
            .join("|")
    }

    fn new_header(&self, header: &str, i: usize) -> String {
        format!(
            "{}-split-{}-{}",
            header,
            i,
            self.new_column_header_suffix.as_deref().unwrap_or("")
        )
    }
}

impl TypedStepPerformer for SplitTextToColumns {
    type Params = SplitTextToColumnsParams;

    const STEP_TYPE: &'static str = "split_text_to_columns";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Split Text to Columns";

    fn saturate(&self, _: &State, mut params: SplitTextToColumnsParams) -> Result<SplitTextToColumnsParams> {
        if params.new_column_header_suffix.is_none() {
            params.new_column_header_suffix = Some(unique_token(4));
        }
        Ok(params)
    }

    fn execute(&self, prev: &State, params: &SplitTextToColumnsParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        if params.delimiters.iter().all(String::is_empty) {
            return Err(SheetError::invalid_arg("at least one delimiter is needed"));
        }
        let splitter = Regex::new(&params.pattern())
            .map_err(|e| SheetError::invalid_arg(format!("bad delimiters: {}", e)))?;
        let pieces: Vec<Option<Vec<String>>> = prev
            .column_values(sheet, &params.column_id)?
            .iter()
            .map(|value| match value {
                Value::Missing => None,
                other => Some(splitter.split(&other.to_string()).map(str::to_string).collect()),
            })
            .collect();
        let parts = pieces.iter().flatten().map(Vec::len).max().unwrap_or(1);

        let mut post = prev.clone();
        let position = prev
            .table(sheet)?
            .column_position(&header)
            .map(|p| p + 1)
            .unwrap_or(0);
        let mut new_ids = Vec::with_capacity(parts);
        for i in 0..parts {
            let values = pieces
                .iter()
                .map(|row| match row.as_ref().and_then(|p| p.get(i)) {
                    Some(s) => Value::str(s.as_str()),
                    None => Value::Missing,
                })
                .collect();
            new_ids.push(post.add_column(sheet, &params.new_header(&header, i), values, position + i)?);
        }

        let mut data = ExecutionData::new();
        record(&mut data, NEW_COLUMNS, &new_ids)?;
        Ok((post, data))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &SplitTextToColumnsParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = table_name(ctx.post, sheet)?;
        let header = ctx.prev.column_header(sheet, &params.column_id)?;
        let new_ids: Vec<ColumnId> = recorded(ctx.execution_data, NEW_COLUMNS);
        let mut lines = vec![format!(
            "split_columns = {}[{}].astype('string').str.split({}, expand=True, regex=True)",
            name,
            python_string(&header),
            python_string(&params.pattern())
        )];
        for (i, id) in new_ids.iter().enumerate() {
            let new_header = ctx.post.column_header(sheet, id)?;
            let position = ctx
                .post
                .table(sheet)?
                .column_position(&new_header)
                .unwrap_or(i);
            lines.push(format!(
                "{}.insert({}, {}, split_columns[{}])",
                name,
                position,
                python_string(&new_header),
                i
            ));
        }
        lines.push("del split_columns".to_string());
        Ok(vec![Box::new(StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Split {} in {} on {}", header, name, params.delimiters.join(", ")),
            sheet,
            lines,
        ))])
    }

    fn modified_table_indexes(&self, params: &SplitTextToColumnsParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &SplitTextToColumnsParams) -> String {
        format!("Split {} on {}", params.column_id, params.delimiters.join(", "))
    }
}

// --- fill_na ---

pub struct FillNa;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FillNaParams {
    pub sheet_index: usize,
    /// `None` fills every column.
    #[serde(default)]
    pub column_ids: Option<Vec<ColumnId>>,
    pub fill_method: FillNaMethod,
}

fn fill_values(values: &[Value], dtype: Dtype, method: &FillNaMethod) -> Vec<Value> {
    match method {
        FillNaMethod::Value { value } => {
            let fill = Value::from_json(value);
            values
                .iter()
                .map(|v| if v.is_missing() { fill.clone() } else { v.clone() })
                .collect()
        }
        FillNaMethod::Ffill => {
            let mut last = Value::Missing;
            values
                .iter()
                .map(|v| {
                    if !v.is_missing() {
                        last = v.clone();
                    }
                    last.clone()
                })
                .collect()
        }
        FillNaMethod::Bfill => {
            let mut next = Value::Missing;
            let mut filled: Vec<Value> = values
                .iter()
                .rev()
                .map(|v| {
                    if !v.is_missing() {
                        next = v.clone();
                    }
                    next.clone()
                })
                .collect();
            filled.reverse();
            filled
        }
        FillNaMethod::Mean | FillNaMethod::Median => {
            if !dtype.is_numeric() {
                return values.to_vec();
            }
            let mut present: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
            if present.is_empty() {
                return values.to_vec();
            }
            let fill = if matches!(method, FillNaMethod::Mean) {
                present.iter().sum::<f64>() / present.len() as f64
            } else {
                present.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                let mid = present.len() / 2;
                if present.len() % 2 == 0 {
                    (present[mid - 1] + present[mid]) / 2.0
                } else {
                    present[mid]
                }
            };
            values
                .iter()
                .map(|v| if v.is_missing() { Value::float(fill) } else { v.clone() })
                .collect()
        }
    }
}

impl TypedStepPerformer for FillNa {
    type Params = FillNaParams;

    const STEP_TYPE: &'static str = "fill_na";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Filled NaN Values";

    fn execute(&self, prev: &State, params: &FillNaParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        prev.check_table(sheet)?;
        let ids = match &params.column_ids {
            Some(ids) => ids.clone(),
            None => prev.column_ids.ids(sheet),
        };
        let mut post = prev.clone();
        let mut changed = Vec::new();
        for id in &ids {
            let header = check_column(prev, sheet, id)?;
            let dtype = prev
                .table(sheet)?
                .column(&header)
                .map(|c| c.dtype)
                .unwrap_or(Dtype::Object);
            let values = prev.column_values(sheet, id)?;
            let filled = fill_values(values, dtype, &params.fill_method);
            if filled.as_slice() != values {
                post.set_column_values(sheet, id, filled)?;
                changed.push(id.clone());
            }
        }
        let refreshed = formula::refresh_dependents(&mut post, sheet, &changed)?;
        let mut data = ExecutionData::new();
        record(&mut data, REFRESHED_COLUMNS, &refreshed)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &FillNaParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let refreshed: Vec<ColumnId> = recorded(ctx.execution_data, REFRESHED_COLUMNS);
        Ok(vec![Box::new(FillNaChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            ids: params.column_ids.clone(),
            method: params.fill_method.clone(),
            refresh: formula_lines(ctx.post, sheet, &refreshed),
            headers: headers_of(ctx.post, sheet),
            public_import: ctx.post.public_interface_version.import_line(),
        })])
    }

    fn modified_table_indexes(&self, params: &FillNaParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &FillNaParams) -> String {
        match &params.column_ids {
            Some(ids) => format!("Filled NaN values in {} columns", ids.len()),
            None => "Filled NaN values in all columns".to_string(),
        }
    }
}

// --- one_hot_encoding ---

pub struct OneHotEncoding;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OneHotEncodingParams {
    pub sheet_index: usize,
    pub column_id: ColumnId,
}

/// Distinct present values in sorted order.
fn categories(values: &[Value]) -> Vec<Value> {
    let mut unique: Vec<Value> = Vec::new();
    for value in values {
        if !value.is_missing() && !unique.contains(value) {
            unique.push(value.clone());
        }
    }
    unique.sort_by(|a, b| {
        a.compare(b)
            .unwrap_or_else(|| a.to_string().cmp(&b.to_string()))
    });
    unique
}

impl TypedStepPerformer for OneHotEncoding {
    type Params = OneHotEncodingParams;

    const STEP_TYPE: &'static str = "one_hot_encoding";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "One Hot Encoding";

    fn execute(&self, prev: &State, params: &OneHotEncodingParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        let header = check_column(prev, sheet, &params.column_id)?;
        let values = prev.column_values(sheet, &params.column_id)?;
        let mut post = prev.clone();
        let mut new_ids = Vec::new();
        for category in categories(values) {
            let flags = values.iter().map(|v| Value::Bool(*v == category)).collect();
            let end = post.table(sheet)?.num_columns();
            new_ids.push(post.add_column(sheet, &format!("{}_{}", header, category), flags, end)?);
        }
        let mut data = ExecutionData::new();
        record(&mut data, NEW_COLUMNS, &new_ids)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &OneHotEncodingParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let name = table_name(ctx.post, sheet)?;
        let header = python_string(&ctx.prev.column_header(sheet, &params.column_id)?);
        Ok(vec![Box::new(StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("One hot encoded {} in {}", header, name),
            sheet,
            vec![
                format!("dummies = pd.get_dummies({}[{}], prefix={}, dtype=bool)", name, header, header),
                format!("{n} = pd.concat([{n}, dummies], axis=1)", n = name),
            ],
        ))])
    }

    fn modified_table_indexes(&self, params: &OneHotEncodingParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &OneHotEncodingParams) -> String {
        format!("One hot encoded {}", params.column_id)
    }
}

// --- column_headers_transform ---

pub struct ColumnHeadersTransform;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HeaderTransformation {
    Uppercase,
    Lowercase,
    Replace { old: String, new: String },
}

impl HeaderTransformation {
    fn apply(&self, header: &str) -> String {
        match self {
            HeaderTransformation::Uppercase => header.to_uppercase(),
            HeaderTransformation::Lowercase => header.to_lowercase(),
            HeaderTransformation::Replace { old, new } if !old.is_empty() => header.replace(old, new),
            HeaderTransformation::Replace { .. } => header.to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnHeadersTransformParams {
    pub sheet_index: usize,
    pub transformation: HeaderTransformation,
}

/// Rename several columns at once, tolerating swaps between them.
pub(crate) fn rename_all(state: &mut State, sheet: usize, renames: &[(ColumnId, String)]) -> Result<()> {
    let token = unique_token(6);
    for (i, (id, _)) in renames.iter().enumerate() {
        state.rename_column(sheet, id, &format!("__{}_{}", token, i))?;
    }
    for (id, header) in renames {
        state.rename_column(sheet, id, header)?;
    }
    Ok(())
}

impl TypedStepPerformer for ColumnHeadersTransform {
    type Params = ColumnHeadersTransformParams;

    const STEP_TYPE: &'static str = "column_headers_transform";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Transformed Column Headers";

    fn execute(&self, prev: &State, params: &ColumnHeadersTransformParams) -> Result<(State, ExecutionData)> {
        let sheet = params.sheet_index;
        prev.check_table(sheet)?;
        let name = table_name(prev, sheet)?;
        let mut seen = std::collections::HashSet::new();
        let mut renames = Vec::new();
        for id in prev.column_ids.ids(sheet) {
            let old = prev.column_header(sheet, &id)?;
            let new = params.transformation.apply(&old);
            if new.trim().is_empty() {
                return Err(SheetError::invalid_arg(format!("{} would get an empty header", old)));
            }
            if !seen.insert(new.clone()) {
                return Err(SheetError::DuplicatedColumn { table: name, header: new });
            }
            if new != old {
                renames.push((id, new));
            }
        }
        let mut post = prev.clone();
        rename_all(&mut post, sheet, &renames)?;
        Ok((post, ExecutionData::new()))
    }

    fn transpile(
        &self,
        ctx: &TranspileContext<'_>,
        params: &ColumnHeadersTransformParams,
    ) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let mut renames = Vec::new();
        for id in ctx.prev.column_ids.ids(sheet) {
            let old = ctx.prev.column_header(sheet, &id)?;
            let new = ctx.post.column_header(sheet, &id)?;
            if old != new {
                renames.push((old, new));
            }
        }
        if renames.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Box::new(RenameColumnsChunk {
            table: sheet,
            table_name: table_name(ctx.post, sheet)?,
            renames,
        })])
    }

    fn modified_table_indexes(&self, params: &ColumnHeadersTransformParams) -> TableSet {
        TableSet::one(params.sheet_index)
    }

    fn describe(&self, params: &ColumnHeadersTransformParams) -> String {
        match &params.transformation {
            HeaderTransformation::Uppercase => "Uppercased column headers".to_string(),
            HeaderTransformation::Lowercase => "Lowercased column headers".to_string(),
            HeaderTransformation::Replace { old, new } => {
                format!("Replaced {} with {} in column headers", old, new)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{Params, StepPerformer};
    use crate::table::Table;
    use crate::types::TableSource;
    use serde_json::json;

    fn state() -> State {
        let mut state = State::default();
        let table = Table::from_columns(vec![("A", vec![Value::Int(1), Value::Int(2), Value::Int(3)])]).unwrap();
        state.add_table(table, "t", TableSource::Imported).unwrap();
        state
    }

    fn params(value: serde_json::Value) -> Params {
        match value {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn run(performer: &dyn StepPerformer, state: &State, value: serde_json::Value) -> Result<State> {
        let params = performer.saturate(state, params(value))?;
        performer.execute(state, &params).map(|(post, _)| post)
    }

    #[test]
    fn test_add_column_fills_zero() {
        let post = run(&AddColumn, &state(), json!({"sheet_index": 0, "column_header": "B"})).unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(table.headers(), vec!["A", "B"]);
        assert_eq!(table.column("B").unwrap().values, vec![Value::Int(0); 3]);
    }

    #[test]
    fn test_add_duplicate_column_fails() {
        let err = run(&AddColumn, &state(), json!({"sheet_index": 0, "column_header": "A"})).unwrap_err();
        assert_eq!(err.kind().as_str(), "duplicated-column");
    }

    #[test]
    fn test_formula_refreshes_dependents() {
        let s = run(&AddColumn, &state(), json!({"sheet_index": 0, "column_header": "B"})).unwrap();
        let s = run(&AddColumn, &s, json!({"sheet_index": 0, "column_header": "C"})).unwrap();
        let s = run(
            &SetColumnFormula,
            &s,
            json!({"sheet_index": 0, "column_id": "C", "new_formula": "=B*10"}),
        )
        .unwrap();
        let s = run(
            &SetColumnFormula,
            &s,
            json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
        )
        .unwrap();
        let table = s.table(0).unwrap();
        assert_eq!(
            table.column("C").unwrap().values,
            vec![Value::Int(20), Value::Int(30), Value::Int(40)]
        );
    }

    #[test]
    fn test_range_formula_defaults_to_first_row_label() {
        let mut state = state();
        state
            .table_mut(0)
            .unwrap()
            .set_index(vec![IndexLabel::Int(10), IndexLabel::Int(11), IndexLabel::Int(12)])
            .unwrap();
        let s = run(&AddColumn, &state, json!({"sheet_index": 0, "column_header": "B"})).unwrap();
        let typed: SetColumnFormulaParams =
            serde_json::from_value(json!({"sheet_index": 0, "column_id": "B", "new_formula": "=SUM(A10:A11)"}))
                .unwrap();
        assert_eq!(typed.formula_label, None);
        let saturated = TypedStepPerformer::saturate(&SetColumnFormula, &s, typed).unwrap();
        assert_eq!(saturated.formula_label, Some(IndexLabel::Int(10)));

        let (post, _) = TypedStepPerformer::execute(&SetColumnFormula, &s, &saturated).unwrap();
        let values = &post.table(0).unwrap().column("B").unwrap().values;
        assert_eq!(values[..2], [Value::Int(3), Value::Int(5)]);
    }

    #[test]
    fn test_cyclic_formula_rejected() {
        let s = run(&AddColumn, &state(), json!({"sheet_index": 0, "column_header": "B"})).unwrap();
        let s = run(
            &SetColumnFormula,
            &s,
            json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
        )
        .unwrap();
        let err = run(
            &SetColumnFormula,
            &s,
            json!({"sheet_index": 0, "column_id": "A", "new_formula": "=B+1"}),
        )
        .unwrap_err();
        assert_eq!(err.kind().as_str(), "cyclic-formula");
    }

    #[test]
    fn test_delete_referenced_column_fails() {
        let s = run(&AddColumn, &state(), json!({"sheet_index": 0, "column_header": "B"})).unwrap();
        let s = run(
            &SetColumnFormula,
            &s,
            json!({"sheet_index": 0, "column_id": "B", "new_formula": "=A+1"}),
        )
        .unwrap();
        let err = run(&DeleteColumn, &s, json!({"sheet_index": 0, "column_ids": ["A"]})).unwrap_err();
        assert_eq!(err.kind().as_str(), "column-in-use");
        let post = run(&DeleteColumn, &s, json!({"sheet_index": 0, "column_ids": ["A", "B"]})).unwrap();
        assert_eq!(post.table(0).unwrap().num_columns(), 0);
    }

    #[test]
    fn test_split_text_inserts_after_source() {
        let mut s = State::default();
        let table = Table::from_columns(vec![
            ("name", vec![Value::str("a-b"), Value::str("c/d/e"), Value::Missing]),
            ("z", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        ])
        .unwrap();
        s.add_table(table, "t", TableSource::Imported).unwrap();
        let post = run(
            &SplitTextToColumns,
            &s,
            json!({"sheet_index": 0, "column_id": "name", "delimiters": ["-", "/"], "new_column_header_suffix": "x"}),
        )
        .unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(
            table.headers(),
            vec!["name", "name-split-0-x", "name-split-1-x", "name-split-2-x", "z"]
        );
        assert_eq!(
            table.column("name-split-2-x").unwrap().values,
            vec![Value::Missing, Value::str("e"), Value::Missing]
        );
    }

    #[test]
    fn test_fill_na_methods() {
        let values = vec![Value::Missing, Value::Int(1), Value::Missing, Value::Int(3)];
        assert_eq!(
            fill_values(&values, Dtype::Float, &FillNaMethod::Ffill),
            vec![Value::Missing, Value::Int(1), Value::Int(1), Value::Int(3)]
        );
        assert_eq!(
            fill_values(&values, Dtype::Float, &FillNaMethod::Bfill),
            vec![Value::Int(1), Value::Int(1), Value::Int(3), Value::Int(3)]
        );
        assert_eq!(
            fill_values(&values, Dtype::Float, &FillNaMethod::Mean)[0],
            Value::Float(2.0)
        );
        let text = vec![Value::Missing, Value::str("a")];
        assert_eq!(fill_values(&text, Dtype::String, &FillNaMethod::Median), text);
    }

    #[test]
    fn test_header_transform_detects_collisions() {
        let mut s = State::default();
        let table = Table::from_columns(vec![("a", vec![Value::Int(1)]), ("A", vec![Value::Int(2)])]).unwrap();
        s.add_table(table, "t", TableSource::Imported).unwrap();
        let err = run(
            &ColumnHeadersTransform,
            &s,
            json!({"sheet_index": 0, "transformation": {"type": "lowercase"}}),
        )
        .unwrap_err();
        assert_eq!(err.kind().as_str(), "duplicated-column");

        let post = run(
            &ColumnHeadersTransform,
            &s,
            json!({"sheet_index": 0, "transformation": {"type": "replace", "old": "a", "new": "b"}}),
        )
        .unwrap();
        assert_eq!(post.table(0).unwrap().headers(), vec!["b", "A"]);
        assert_eq!(post.column_id(0, "b").unwrap().as_str(), "a");
    }

    #[test]
    fn test_one_hot_encoding_sorted_categories() {
        let mut s = State::default();
        let table = Table::from_columns(vec![(
            "c",
            vec![Value::str("y"), Value::str("x"), Value::Missing],
        )])
        .unwrap();
        s.add_table(table, "t", TableSource::Imported).unwrap();
        let post = run(&OneHotEncoding, &s, json!({"sheet_index": 0, "column_id": "c"})).unwrap();
        let table = post.table(0).unwrap();
        assert_eq!(table.headers(), vec!["c", "c_x", "c_y"]);
        assert_eq!(
            table.column("c_x").unwrap().values,
            vec![Value::Bool(false), Value::Bool(true), Value::Bool(false)]
        );
    }
}

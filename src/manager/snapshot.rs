//! What the host renders: the sheet data of every table and the shared state.

use super::StepsManager;
use crate::config::CodeOptions;
use crate::error::Result;
use crate::state::{ColumnFilters, ColumnFormat, State, TableFormat};
use crate::steps::StepSummary;
use crate::types::{ColumnId, Dtype, IndexLabel, TableSource};
use serde::Serialize;

#[derive(Clone, Debug, Serialize)]
pub struct ColumnData {
    pub column_id: ColumnId,
    pub header: String,
    pub dtype: Dtype,
    /// Formula as the user would type it, with current headers.
    pub formula: Option<String>,
    pub filters: ColumnFilters,
    pub format: Option<ColumnFormat>,
    pub values: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SheetData {
    pub table_name: String,
    pub table_source: TableSource,
    pub num_rows: usize,
    pub num_columns: usize,
    /// Row labels of the preview rows.
    pub index: Vec<IndexLabel>,
    pub columns: Vec<ColumnData>,
    pub format: TableFormat,
}

#[derive(Clone, Debug, Serialize)]
pub struct SharedState {
    pub analysis_name: String,
    pub curr_step_idx: usize,
    pub step_summaries: Vec<StepSummary>,
    pub sheet_data: Vec<SheetData>,
    pub code: Vec<String>,
    pub code_options: CodeOptions,
    pub public_interface_version: u32,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Sheet data of every table in `state`, limited to `preview_rows` rows.
pub fn sheet_data(state: &State, preview_rows: usize) -> Result<Vec<SheetData>> {
    let mut sheets = Vec::with_capacity(state.num_tables());
    for sheet in 0..state.num_tables() {
        let table = state.table(sheet)?;
        let headers = state.header_map(sheet);
        let rows = table.num_rows().min(preview_rows);
        let formulas = &state.column_formulas[sheet];
        let filters = &state.column_filters[sheet];
        let format = &state.table_formats[sheet];

        let mut columns = Vec::with_capacity(table.num_columns());
        for id in state.sheet_ids(sheet)?.ids() {
            let header = state.column_header(sheet, id)?;
            let Some(column) = table.column(&header) else {
                continue;
            };
            columns.push(ColumnData {
                column_id: id.clone(),
                header,
                dtype: column.dtype,
                formula: formulas.get(id).map(|f| f.display(&headers)),
                filters: filters.get(id).cloned().unwrap_or_default(),
                format: format.columns.get(id).cloned(),
                values: column.values[..rows].iter().map(|v| v.to_json()).collect(),
            });
        }

        sheets.push(SheetData {
            table_name: state.table_name(sheet)?.to_string(),
            table_source: state.table_sources[sheet],
            num_rows: table.num_rows(),
            num_columns: table.num_columns(),
            index: table.index()[..rows].to_vec(),
            columns,
            format: format.clone(),
        });
    }
    Ok(sheets)
}

impl StepsManager {
    /// Sheet data at the cursor.
    pub fn sheet_data(&self) -> Result<Vec<SheetData>> {
        sheet_data(self.curr_state(), self.config.preview_rows)
    }

    pub fn shared_state(&self) -> Result<SharedState> {
        let code = self.generate_code()?;
        Ok(SharedState {
            analysis_name: self.analysis_name.clone(),
            curr_step_idx: self.curr_step_idx,
            step_summaries: self.step_summaries(),
            sheet_data: self.sheet_data()?,
            code: code.lines(),
            code_options: self.config.code_options.clone(),
            public_interface_version: self.config.public_interface_version.as_u32(),
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::Extensions;
    use crate::table::Table;
    use crate::types::{PublicInterfaceVersion, Value};
    use std::sync::Arc;

    fn state_with_rows(n: i64) -> State {
        let mut state = State::new(Arc::new(Extensions::default()), PublicInterfaceVersion::CURRENT);
        let table = Table::from_columns(vec![("A", (0..n).map(Value::Int).collect())]).unwrap();
        state.add_table(table, "df1", TableSource::Imported).unwrap();
        state
    }

    #[test]
    fn test_preview_is_limited() {
        let state = state_with_rows(10);
        let sheets = sheet_data(&state, 3).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].num_rows, 10);
        assert_eq!(sheets[0].index.len(), 3);
        assert_eq!(sheets[0].columns[0].values, vec![serde_json::json!(0), serde_json::json!(1), serde_json::json!(2)]);
        assert_eq!(sheets[0].columns[0].dtype, Dtype::Int);
    }

    #[test]
    fn test_sheet_data_serializes() {
        let state = state_with_rows(2);
        let json = serde_json::to_value(sheet_data(&state, 1500).unwrap()).unwrap();
        assert_eq!(json[0]["table_name"], "df1");
        assert_eq!(json[0]["table_source"], "imported");
        assert_eq!(json[0]["columns"][0]["header"], "A");
        assert!(json[0]["columns"][0]["formula"].is_null());
    }
}

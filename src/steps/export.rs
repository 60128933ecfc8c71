//! The export step. It leaves the state alone and only contributes code.

use super::{headers_of, ExecutionData, TranspileContext, TypedStepPerformer};
use crate::codegen::chunks::StatementChunk;
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::state::State;
use crate::types::python_string;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Csv,
    Excel,
}

pub struct ExportToFile;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportToFileParams {
    #[serde(rename = "type")]
    pub kind: ExportKind,
    pub file_name: String,
    pub sheet_indexes: Vec<usize>,
    #[serde(default)]
    pub export_formatting: bool,
}

/// `data.csv` for one table, `data_0.csv`, `data_1.csv` ... for several.
fn csv_file_name(file_name: &str, position: usize, total: usize) -> String {
    if total <= 1 {
        return file_name.to_string();
    }
    let path = Path::new(file_name);
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let numbered = format!("{}_{}{}", stem, position, ext);
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => parent.join(numbered).to_string_lossy().into_owned(),
        None => numbered,
    }
}

fn export_lines(post: &State, params: &ExportToFileParams) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    match params.kind {
        ExportKind::Csv => {
            for (position, &sheet) in params.sheet_indexes.iter().enumerate() {
                let name = post.table_name(sheet)?;
                let file = csv_file_name(&params.file_name, position, params.sheet_indexes.len());
                lines.push(format!("{}.to_csv({}, index=False)", name, python_string(&file)));
            }
        }
        ExportKind::Excel => {
            let mut writes = Vec::new();
            for &sheet in &params.sheet_indexes {
                let name = post.table_name(sheet)?;
                let format = &post.table_formats[sheet];
                let source = if params.export_formatting && !format.is_empty() {
                    lines.extend(format.to_code(name, &headers_of(post, sheet).0));
                    format!("{}_styler", name)
                } else {
                    name.to_string()
                };
                writes.push(format!(
                    "    {}.to_excel(writer, sheet_name={}, index=False)",
                    source,
                    python_string(name)
                ));
            }
            lines.push(format!(
                "with pd.ExcelWriter({}, engine=\"openpyxl\") as writer:",
                python_string(&params.file_name)
            ));
            lines.extend(writes);
        }
    }
    Ok(lines)
}

impl TypedStepPerformer for ExportToFile {
    type Params = ExportToFileParams;

    const STEP_TYPE: &'static str = "export_to_file";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Exported";

    fn execute(&self, prev: &State, params: &ExportToFileParams) -> Result<(State, ExecutionData)> {
        if params.sheet_indexes.is_empty() {
            return Err(SheetError::invalid_arg("nothing to export"));
        }
        for &sheet in &params.sheet_indexes {
            prev.check_table(sheet)?;
        }
        Ok((prev.clone(), ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &ExportToFileParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let mut chunk = StatementChunk::editing(
            Self::DISPLAY_NAME,
            format!("Exported to {}", params.file_name),
            0,
            export_lines(ctx.post, params)?,
        );
        chunk.modified = TableSet::All;
        Ok(vec![Box::new(chunk)])
    }

    // Exports read every table they name at a fixed point in the script, so
    // nothing may be moved across them.
    fn modified_table_indexes(&self, _params: &ExportToFileParams) -> TableSet {
        TableSet::All
    }

    fn describe(&self, params: &ExportToFileParams) -> String {
        format!("Exported {} tables to {}", params.sheet_indexes.len(), params.file_name)
    }
}

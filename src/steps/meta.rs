//! Steps with no spreadsheet edit of their own: the initial step of every
//! analysis and the header cleanup older analyses ran after imports.

use super::columns::rename_all;
use super::{ExecutionData, TranspileContext, TypedStepPerformer};
use crate::codegen::chunks::RenameColumnsChunk;
use crate::codegen::{CodeChunk, TableSet};
use crate::error::Result;
use crate::state::State;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// --- initialize ---

pub struct Initialize;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InitializeParams {}

impl TypedStepPerformer for Initialize {
    type Params = InitializeParams;

    const STEP_TYPE: &'static str = "initialize";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Created a Sheet";

    fn execute(&self, prev: &State, _params: &InitializeParams) -> Result<(State, ExecutionData)> {
        Ok((prev.clone(), ExecutionData::new()))
    }

    fn transpile(&self, _ctx: &TranspileContext<'_>, _params: &InitializeParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        Ok(Vec::new())
    }

    fn modified_table_indexes(&self, _params: &InitializeParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, _params: &InitializeParams) -> String {
        "Created a new sheet".to_string()
    }
}

// --- bulk_old_rename ---

pub struct BulkOldRename;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BulkOldRenameParams {}

/// Header with everything but letters, digits and underscores replaced.
pub fn cleaned_header(header: &str) -> String {
    header
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// New headers for one table, unique among themselves.
fn cleaned_headers(headers: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .map(|header| {
            let base = cleaned_header(header);
            let mut candidate = base.clone();
            let mut n = 0;
            while !seen.insert(candidate.clone()) {
                n += 1;
                candidate = format!("{}_{}", base, n);
            }
            candidate
        })
        .collect()
}

impl TypedStepPerformer for BulkOldRename {
    type Params = BulkOldRenameParams;

    const STEP_TYPE: &'static str = "bulk_old_rename";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Cleaned Column Headers";

    fn execute(&self, prev: &State, _params: &BulkOldRenameParams) -> Result<(State, ExecutionData)> {
        let mut post = prev.clone();
        for sheet in 0..prev.num_tables() {
            let ids = prev.column_ids.ids(sheet);
            let cleaned = cleaned_headers(&prev.column_ids.headers(sheet));
            let renames: Vec<_> = ids.into_iter().zip(cleaned).collect();
            rename_all(&mut post, sheet, &renames)?;
        }
        Ok((post, ExecutionData::new()))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, _params: &BulkOldRenameParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let mut chunks: Vec<Box<dyn CodeChunk>> = Vec::new();
        for sheet in 0..ctx.post.num_tables() {
            let renames: Vec<(String, String)> = ctx
                .prev
                .column_ids
                .headers(sheet)
                .into_iter()
                .zip(ctx.post.column_ids.headers(sheet))
                .filter(|(old, new)| old != new)
                .collect();
            if renames.is_empty() {
                continue;
            }
            chunks.push(Box::new(RenameColumnsChunk {
                table: sheet,
                table_name: ctx.post.table_name(sheet)?.to_string(),
                renames,
            }));
        }
        Ok(chunks)
    }

    fn modified_table_indexes(&self, _params: &BulkOldRenameParams) -> TableSet {
        TableSet::All
    }

    fn describe(&self, _params: &BulkOldRenameParams) -> String {
        "Replaced unsupported characters in column headers".to_string()
    }
}

//! Structural checks run at step boundaries.

use super::State;
use crate::error::{Result, SheetError};
use crate::formula::dependencies::find_cycle;
use std::collections::HashSet;

fn violated(message: String) -> SheetError {
    SheetError::InvalidArg(format!("state invariant violated: {}", message))
}

/// Verify parallel lengths, id/header coverage, acyclic formulas and unique names.
pub fn check_invariants(state: &State) -> Result<()> {
    let n = state.tables.len();
    let lengths = [
        state.table_names.len(),
        state.table_sources.len(),
        state.column_formulas.len(),
        state.column_filters.len(),
        state.table_formats.len(),
        state.column_ids.num_sheets(),
    ];
    if lengths.iter().any(|&len| len != n) {
        return Err(violated(format!(
            "{} tables but metadata lengths {:?}",
            n, lengths
        )));
    }

    let mut names = HashSet::new();
    for name in &state.table_names {
        if !names.insert(name.as_str()) {
            return Err(violated(format!("table name {} is used twice", name)));
        }
    }

    for (sheet, table) in state.tables.iter().enumerate() {
        let name = &state.table_names[sheet];
        let headers = table.headers();
        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(*header) {
                return Err(violated(format!("{} has header {} twice", name, header)));
            }
        }

        let ids = state.column_ids.sheet(sheet)?;
        if ids.headers() != headers {
            return Err(violated(format!(
                "{} has headers {:?} but column ids map to {:?}",
                name,
                headers,
                ids.headers()
            )));
        }

        for (target, formula) in &state.column_formulas[sheet] {
            if !ids.contains(target) {
                return Err(violated(format!("{} has a formula for a missing column {}", name, target)));
            }
            if let Some(dep) = formula.dependencies.iter().find(|d| !ids.contains(d)) {
                return Err(violated(format!("formula of {} reads a missing column {}", target, dep)));
            }
        }
        if let Some(column) = find_cycle(&state.column_formulas[sheet]) {
            return Err(SheetError::CyclicFormula {
                column: ids.get_header(&column).unwrap_or(column.as_str()).to_string(),
            });
        }
        for id in state.column_filters[sheet].keys() {
            if !ids.contains(id) {
                return Err(violated(format!("{} has filters on a missing column {}", name, id)));
            }
        }
    }
    Ok(())
}

//! Spreadsheet formulas: parsing, evaluation and dependency tracking.
//!
//! A formula is parsed once into an [`Expr`] over column ids. Evaluation goes
//! through [`Evaluator`]; functions come from a [`FunctionRegistry`] pinned to
//! the state's public interface version.

pub mod args;
mod ast;
pub mod cast;
pub mod dependencies;
mod evaluator;
pub mod functions;
mod parser;
mod tokenizer;

pub use args::{FormulaArg, RollingRange};
pub use ast::{AppliedTo, BinaryOp, ColumnFormula, Expr, UnaryOp};
pub use evaluator::Evaluator;
pub use functions::{FunctionRegistry, Resolved};
pub use parser::{parse_formula, ParseContext};
pub use tokenizer::{tokenize, Token, TokenType};

use crate::error::{Result, SheetError};
use crate::state::State;
use crate::types::{ColumnId, IndexLabel, Value};
use chrono::NaiveDateTime;
use tracing::debug;

/// Reject calls the registry cannot resolve and ranges it does not support.
pub fn check_expression(formula: &str, expr: &Expr, registry: &FunctionRegistry<'_>) -> Result<()> {
    for name in expr.functions() {
        if registry.get(&name).is_none() {
            return Err(SheetError::UnsupportedFunction(name));
        }
    }
    if expr.has_rolling_range() && !registry.supports_rolling_ranges() {
        return Err(SheetError::InvalidFormula {
            formula: formula.to_string(),
            message: format!(
                "Ranges of rows need sheet functions v3 or later; this analysis uses v{}.",
                registry.version().as_u32()
            ),
        });
    }
    Ok(())
}

/// Parse `text` written at `formula_label` of `sheet` into a checked formula.
pub fn build_formula(
    state: &State,
    sheet: usize,
    text: &str,
    formula_label: &IndexLabel,
    applied_to: AppliedTo,
    evaluation_time: NaiveDateTime,
) -> Result<ColumnFormula> {
    let table = state.table(sheet)?;
    let ctx = ParseContext {
        column_ids: state.sheet_ids(sheet)?,
        index: table.index(),
        formula_label,
    };
    let expr = parse_formula(text, &ctx).map_err(|e| match e {
        SheetError::NoColumn { column, .. } => {
            SheetError::no_column(state.table_name(sheet).unwrap_or_default(), column)
        }
        other => other,
    })?;
    let registry = FunctionRegistry::new(state.public_interface_version, &state.extensions);
    check_expression(text, &expr, &registry)?;
    Ok(ColumnFormula {
        formula: text.to_string(),
        dependencies: expr.dependencies(),
        expr,
        applied_to,
        formula_label: formula_label.clone(),
        evaluation_time,
    })
}

/// Values `target` takes under `formula`. Rows outside the formula's labels
/// keep their current values.
pub fn evaluate_formula(
    state: &State,
    sheet: usize,
    target: &ColumnId,
    formula: &ColumnFormula,
) -> Result<Vec<Value>> {
    let table = state.table(sheet)?;
    let registry = FunctionRegistry::new(state.public_interface_version, &state.extensions);
    let evaluator = Evaluator {
        table,
        table_name: state.table_name(sheet)?,
        column_ids: state.sheet_ids(sheet)?,
        registry: &registry,
        now: formula.evaluation_time,
    };
    match &formula.applied_to {
        AppliedTo::EntireColumn => {
            let rows: Vec<usize> = (0..table.num_rows()).collect();
            evaluator.evaluate_column(&formula.expr, &rows)
        }
        AppliedTo::SpecificIndexLabels { index_labels } => {
            let rows: Vec<usize> = index_labels
                .iter()
                .filter_map(|label| table.position_of_label(label))
                .collect();
            let computed = evaluator.evaluate_column(&formula.expr, &rows)?;
            let mut values = state.column_values(sheet, target)?.to_vec();
            for (row, value) in rows.into_iter().zip(computed) {
                values[row] = value;
            }
            Ok(values)
        }
    }
}

/// Re-evaluate every formula that transitively reads `changed`.
pub fn refresh_dependents(state: &mut State, sheet: usize, changed: &[ColumnId]) -> Result<Vec<ColumnId>> {
    let order = {
        let ids = state.sheet_ids(sheet)?;
        dependencies::dependents_in_order(&state.column_formulas[sheet], changed, ids.ids())
    };
    for id in &order {
        let formula = state.column_formulas[sheet][id].clone();
        let values = evaluate_formula(state, sheet, id, &formula)?;
        state.set_column_values(sheet, id, values)?;
    }
    if !order.is_empty() {
        debug!(sheet, refreshed = order.len(), "refreshed dependent formulas");
    }
    Ok(order)
}

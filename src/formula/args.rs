//! The uniform argument type passed to sheet functions, and broadcasting helpers.

use crate::error::{Result, SheetError};
use crate::types::Value;
use std::sync::Arc;

/// A window of rows that slides with the row being evaluated.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingRange {
    /// Full columns the window reads from.
    pub columns: Arc<Vec<Vec<Value>>>,
    pub size: usize,
    pub offset: i64,
    /// Table position of each evaluated row.
    pub anchors: Vec<usize>,
}

impl RollingRange {
    /// Values in the window for the `i`th evaluated row, padded with missing
    /// values where the window leaves the table.
    pub fn window(&self, i: usize) -> Vec<Value> {
        let anchor = self.anchors[i] as i64;
        let end = anchor + self.offset;
        let start = end - self.size as i64 + 1;
        let mut values = Vec::with_capacity(self.size * self.columns.len());
        for column in self.columns.iter() {
            for pos in start..=end {
                let value = if pos >= 0 && (pos as usize) < column.len() {
                    column[pos as usize].clone()
                } else {
                    Value::Missing
                };
                values.push(value);
            }
        }
        values
    }
}

/// An evaluated formula argument.
#[derive(Clone, Debug, PartialEq)]
pub enum FormulaArg {
    Scalar(Value),
    /// One value per evaluated row.
    Column(Vec<Value>),
    Rolling(RollingRange),
    /// Entire columns, the same for every row.
    Range(Arc<Vec<Vec<Value>>>),
}

impl FormulaArg {
    /// Name of the argument's shape, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FormulaArg::Scalar(v) => v.type_name(),
            FormulaArg::Column(_) => "column",
            FormulaArg::Rolling(_) => "rolling range",
            FormulaArg::Range(_) => "range",
        }
    }

    /// Number of rows when the argument varies per row.
    pub fn rows(&self) -> Option<usize> {
        match self {
            FormulaArg::Column(values) => Some(values.len()),
            FormulaArg::Rolling(range) => Some(range.anchors.len()),
            _ => None,
        }
    }

    /// Value for row `i`, for arguments that hold one value per row.
    pub fn value_at(&self, i: usize) -> Option<&Value> {
        match self {
            FormulaArg::Scalar(v) => Some(v),
            FormulaArg::Column(values) => values.get(i),
            _ => None,
        }
    }

    /// Every value the argument contributes to row `i`, flattened.
    pub fn values_at(&self, i: usize) -> Vec<Value> {
        match self {
            FormulaArg::Scalar(v) => vec![v.clone()],
            FormulaArg::Column(values) => values.get(i).cloned().into_iter().collect(),
            FormulaArg::Rolling(range) => range.window(i),
            FormulaArg::Range(columns) => columns.iter().flatten().cloned().collect(),
        }
    }

    /// Expand to one value per row.
    pub fn into_column(self, rows: usize, function: &str) -> Result<Vec<Value>> {
        match self {
            FormulaArg::Scalar(v) => Ok(vec![v; rows]),
            FormulaArg::Column(values) => Ok(values),
            other => Err(SheetError::function(
                function,
                format!("A {} cannot be used where a single value is expected.", other.kind_name()),
            )),
        }
    }
}

/// Row count shared by a set of arguments; `None` when they are all constant.
pub fn common_rows(args: &[FormulaArg]) -> Option<usize> {
    args.iter().filter_map(FormulaArg::rows).max()
}

/// Apply `f` to each row of the arguments, broadcasting scalars.
///
/// Range arguments are rejected; use [`reduce_rows`] for functions that take them.
pub fn map_rows<F>(function: &str, args: &[FormulaArg], mut f: F) -> Result<FormulaArg>
where
    F: FnMut(&[&Value]) -> Result<Value>,
{
    for arg in args {
        if matches!(arg, FormulaArg::Rolling(_) | FormulaArg::Range(_)) {
            return Err(SheetError::function(
                function,
                format!("{} does not accept a {}.", function, arg.kind_name()),
            ));
        }
    }
    match common_rows(args) {
        None => {
            let row: Vec<&Value> = args.iter().filter_map(|a| a.value_at(0)).collect();
            f(&row).map(FormulaArg::Scalar)
        }
        Some(rows) => {
            let mut out = Vec::with_capacity(rows);
            let missing = Value::Missing;
            for i in 0..rows {
                let row: Vec<&Value> = args
                    .iter()
                    .map(|a| a.value_at(i).unwrap_or(&missing))
                    .collect();
                out.push(f(&row)?);
            }
            Ok(FormulaArg::Column(out))
        }
    }
}

/// Apply `f` to the flattened values each row contributes, across all arguments.
pub fn reduce_rows<F>(args: &[FormulaArg], mut f: F) -> Result<FormulaArg>
where
    F: FnMut(Vec<Value>) -> Result<Value>,
{
    let collect = |i: usize| -> Vec<Value> { args.iter().flat_map(|a| a.values_at(i)).collect() };
    match common_rows(args) {
        None => f(collect(0)).map(FormulaArg::Scalar),
        Some(rows) => {
            let mut out = Vec::with_capacity(rows);
            for i in 0..rows {
                out.push(f(collect(i))?);
            }
            Ok(FormulaArg::Column(out))
        }
    }
}

/// Check the number of arguments a function received.
pub fn check_arity(function: &str, args: &[FormulaArg], min: usize, max: Option<usize>) -> Result<()> {
    let n = args.len();
    let too_many = max.map(|max| n > max).unwrap_or(false);
    if n < min || too_many {
        let expected = match max {
            Some(max) if max == min => format!("{}", min),
            Some(max) => format!("between {} and {}", min, max),
            None => format!("at least {}", min),
        };
        return Err(SheetError::function(
            function,
            format!("{} expects {} arguments but received {}.", function, expected, n),
        ));
    }
    Ok(())
}

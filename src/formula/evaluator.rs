//! Evaluates parsed formulas against a table.
//!
//! Evaluation works on a set of row positions rather than the whole table so
//! `IF` and `IFS` can evaluate each branch only on the rows that select it.

use super::args::{check_arity, map_rows, FormulaArg, RollingRange};
use super::ast::{BinaryOp, Expr, UnaryOp};
use super::cast;
use super::functions::{FunctionContext, FunctionKind, FunctionRegistry, Resolved};
use crate::column_ids::SheetColumnIds;
use crate::error::{Result, SheetError};
use crate::table::Table;
use crate::types::{ColumnId, Value};
use chrono::{Duration, NaiveDateTime};
use std::cmp::Ordering;
use std::sync::Arc;

pub struct Evaluator<'a> {
    pub table: &'a Table,
    pub table_name: &'a str,
    pub column_ids: &'a SheetColumnIds,
    pub registry: &'a FunctionRegistry<'a>,
    /// Value of `NOW()`.
    pub now: NaiveDateTime,
}

impl<'a> Evaluator<'a> {
    /// Evaluate `expr` into one value per row position in `rows`.
    pub fn evaluate_column(&self, expr: &Expr, rows: &[usize]) -> Result<Vec<Value>> {
        self.evaluate(expr, rows)?.into_column(rows.len(), "formula")
    }

    pub fn evaluate(&self, expr: &Expr, rows: &[usize]) -> Result<FormulaArg> {
        match expr {
            Expr::Literal(value) => Ok(FormulaArg::Scalar(value.clone())),
            Expr::Column(id) => {
                let values = self.values(id)?;
                Ok(FormulaArg::Column(
                    rows.iter().map(|&p| values[p].clone()).collect(),
                ))
            }
            Expr::Cell { column, label } => {
                let values = self.values(column)?;
                Ok(FormulaArg::Scalar(
                    self.table
                        .position_of_label(label)
                        .map(|p| values[p].clone())
                        .unwrap_or(Value::Missing),
                ))
            }
            Expr::Rolling {
                columns,
                size,
                offset,
                ..
            } => {
                if !self.registry.supports_rolling_ranges() {
                    return Err(SheetError::InvalidFormula {
                        formula: String::new(),
                        message: format!(
                            "Ranges of rows need sheet functions v3 or later; this analysis uses v{}.",
                            self.registry.version().as_u32()
                        ),
                    });
                }
                Ok(FormulaArg::Rolling(RollingRange {
                    columns: Arc::new(self.full_columns(columns)?),
                    size: *size,
                    offset: *offset,
                    anchors: rows.to_vec(),
                }))
            }
            Expr::Columns(columns) => Ok(FormulaArg::Range(Arc::new(self.full_columns(columns)?))),
            Expr::Unary { op: UnaryOp::Neg, expr } => {
                let arg = self.evaluate(expr, rows)?;
                reject_range("-", &arg)?;
                map_rows("-", &[arg], |row| negate(row[0]))
            }
            Expr::Binary { op, left, right } => {
                let l = self.evaluate(left, rows)?;
                let r = self.evaluate(right, rows)?;
                reject_range(op.symbol(), &l)?;
                reject_range(op.symbol(), &r)?;
                map_rows(op.symbol(), &[l, r], |row| binary(*op, row[0], row[1]))
            }
            Expr::Call { name, args } => self.call(name, args, rows),
        }
    }

    fn values(&self, id: &ColumnId) -> Result<&'a [Value]> {
        let header = self
            .column_ids
            .get_header(id)
            .ok_or_else(|| SheetError::no_column(self.table_name, id.as_str()))?;
        self.table.values(self.table_name, header)
    }

    fn full_columns(&self, ids: &[ColumnId]) -> Result<Vec<Vec<Value>>> {
        ids.iter().map(|id| self.values(id).map(<[Value]>::to_vec)).collect()
    }

    fn call(&self, name: &str, args: &[Expr], rows: &[usize]) -> Result<FormulaArg> {
        let resolved = self
            .registry
            .get(name)
            .ok_or_else(|| SheetError::UnsupportedFunction(name.to_string()))?;
        match resolved {
            Resolved::Builtin(spec) => {
                let fname = spec.name;
                match spec.kind {
                    FunctionKind::Conditional if fname == "IF" => {
                        if args.len() < 2 || args.len() > 3 {
                            return Err(arity_error(fname, args.len(), "2 or 3"));
                        }
                        self.conditional(fname, &[(&args[0], &args[1])], args.get(2), rows)
                    }
                    FunctionKind::Conditional => {
                        if args.len() < 2 || args.len() % 2 != 0 {
                            return Err(SheetError::function(
                                fname,
                                "IFS expects pairs of conditions and values.",
                            ));
                        }
                        let pairs: Vec<(&Expr, &Expr)> =
                            args.chunks(2).map(|pair| (&pair[0], &pair[1])).collect();
                        self.conditional(fname, &pairs, None, rows)
                    }
                    FunctionKind::Builtin(f) => {
                        let values = self.evaluate_args(args, rows)?;
                        check_arity(fname, &values, spec.min_args, spec.max_args)?;
                        if !spec.accepts_ranges {
                            for arg in &values {
                                if matches!(arg, FormulaArg::Rolling(_) | FormulaArg::Range(_)) {
                                    return Err(SheetError::function(
                                        fname,
                                        format!("{} does not accept a {}.", fname, arg.kind_name()),
                                    ));
                                }
                            }
                        }
                        let ctx = FunctionContext {
                            now: self.now,
                            rows: rows.len(),
                        };
                        f(&values, &ctx)
                    }
                }
            }
            Resolved::User(function) => {
                let values = self.evaluate_args(args, rows)?;
                map_rows(function.name(), &values, |row| {
                    let owned: Vec<Value> = row.iter().map(|v| (*v).clone()).collect();
                    function.call(&owned)
                })
            }
        }
    }

    fn evaluate_args(&self, args: &[Expr], rows: &[usize]) -> Result<Vec<FormulaArg>> {
        args.iter().map(|arg| self.evaluate(arg, rows)).collect()
    }

    /// Shared body of IF and IFS: each pair's value is evaluated only on the
    /// rows whose condition selected it. Rows no condition selects take
    /// `otherwise`, or missing.
    fn conditional(
        &self,
        name: &str,
        pairs: &[(&Expr, &Expr)],
        otherwise: Option<&Expr>,
        rows: &[usize],
    ) -> Result<FormulaArg> {
        let first = self.evaluate(pairs[0].0, rows)?;
        // A constant condition picks one branch for every row.
        if let (FormulaArg::Scalar(cond), true) = (&first, pairs.len() == 1) {
            return if truthy(cond)? {
                self.evaluate(pairs[0].1, rows)
            } else {
                match otherwise {
                    Some(expr) => self.evaluate(expr, rows),
                    None => Ok(FormulaArg::Scalar(Value::Missing)),
                }
            };
        }

        let mut out = vec![Value::Missing; rows.len()];
        // Local positions (into `rows`) still waiting for a branch.
        let mut pending: Vec<usize> = (0..rows.len()).collect();
        for (i, (cond, value)) in pairs.iter().enumerate() {
            if pending.is_empty() {
                break;
            }
            let subset: Vec<usize> = pending.iter().map(|&l| rows[l]).collect();
            let mask = if i == 0 && pending.len() == rows.len() {
                mask(name, first.clone(), subset.len())?
            } else {
                mask(name, self.evaluate(cond, &subset)?, subset.len())?
            };
            let mut selected = Vec::new();
            let mut rest = Vec::new();
            for (&local, &hit) in pending.iter().zip(&mask) {
                if hit {
                    selected.push(local);
                } else {
                    rest.push(local);
                }
            }
            if !selected.is_empty() {
                let positions: Vec<usize> = selected.iter().map(|&l| rows[l]).collect();
                let values = self.evaluate(value, &positions)?.into_column(positions.len(), name)?;
                for (local, value) in selected.into_iter().zip(values) {
                    out[local] = value;
                }
            }
            pending = rest;
        }
        if let (Some(expr), false) = (otherwise, pending.is_empty()) {
            let positions: Vec<usize> = pending.iter().map(|&l| rows[l]).collect();
            let values = self.evaluate(expr, &positions)?.into_column(positions.len(), name)?;
            for (local, value) in pending.into_iter().zip(values) {
                out[local] = value;
            }
        }
        Ok(FormulaArg::Column(out))
    }
}

fn arity_error(function: &str, got: usize, expected: &str) -> SheetError {
    SheetError::function(
        function,
        format!("{} expects {} arguments but received {}.", function, expected, got),
    )
}

fn truthy(value: &Value) -> Result<bool> {
    Ok(cast::to_bool(value)?.unwrap_or(false))
}

fn mask(function: &str, cond: FormulaArg, rows: usize) -> Result<Vec<bool>> {
    cond.into_column(rows, function)?
        .iter()
        .map(truthy)
        .collect()
}

fn reject_range(operator: &str, arg: &FormulaArg) -> Result<()> {
    match arg {
        FormulaArg::Rolling(_) | FormulaArg::Range(_) => {
            Err(SheetError::operator_type(operator, arg.kind_name(), arg.kind_name()))
        }
        _ => Ok(()),
    }
}

/// Integer view for integer arithmetic; booleans count as 0 and 1.
fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn negate(value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Missing => Value::Missing,
        Value::Int(i) => i.checked_neg().map(Value::Int).unwrap_or(Value::float(-(*i as f64))),
        Value::Bool(b) => Value::Int(-(*b as i64)),
        Value::Float(f) => Value::Float(-f),
        Value::Duration(d) => Value::Duration(-*d),
        other => return Err(SheetError::operator_type("-", "int", other.type_name())),
    })
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    if op == BinaryOp::Concat {
        let l = cast::to_text(a)?.unwrap_or_default();
        let r = cast::to_text(b)?.unwrap_or_default();
        return Ok(Value::Str(l + &r));
    }
    if op.is_comparison() {
        return compare(op, a, b);
    }
    if a.is_missing() || b.is_missing() {
        return Ok(Value::Missing);
    }
    let mismatch = || SheetError::operator_type(op.symbol(), a.type_name(), b.type_name());

    if let (Some(x), Some(y)) = (as_int(a), as_int(b)) {
        return Ok(match op {
            BinaryOp::Add => x.checked_add(y).map(Value::Int).unwrap_or(Value::float(x as f64 + y as f64)),
            BinaryOp::Sub => x.checked_sub(y).map(Value::Int).unwrap_or(Value::float(x as f64 - y as f64)),
            BinaryOp::Mul => x.checked_mul(y).map(Value::Int).unwrap_or(Value::float(x as f64 * y as f64)),
            BinaryOp::Div => Value::float(x as f64 / y as f64),
            BinaryOp::Pow => u32::try_from(y)
                .ok()
                .and_then(|e| x.checked_pow(e))
                .map(Value::Int)
                .unwrap_or(Value::float((x as f64).powf(y as f64))),
            _ => return Err(mismatch()),
        });
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return Ok(Value::float(match op {
            BinaryOp::Add => x + y,
            BinaryOp::Sub => x - y,
            BinaryOp::Mul => x * y,
            BinaryOp::Div => x / y,
            BinaryOp::Pow => x.powf(y),
            _ => return Err(mismatch()),
        }));
    }
    match (a, b, op) {
        (Value::Str(x), Value::Str(y), BinaryOp::Add) => Ok(Value::Str(format!("{}{}", x, y))),
        (Value::Timestamp(x), Value::Timestamp(y), BinaryOp::Sub) => Ok(Value::Duration(*x - *y)),
        (Value::Timestamp(x), Value::Duration(d), BinaryOp::Add)
        | (Value::Duration(d), Value::Timestamp(x), BinaryOp::Add) => Ok(Value::Timestamp(*x + *d)),
        (Value::Timestamp(x), Value::Duration(d), BinaryOp::Sub) => Ok(Value::Timestamp(*x - *d)),
        (Value::Duration(x), Value::Duration(y), BinaryOp::Add) => Ok(Value::Duration(*x + *y)),
        (Value::Duration(x), Value::Duration(y), BinaryOp::Sub) => Ok(Value::Duration(*x - *y)),
        (Value::Duration(x), Value::Duration(y), BinaryOp::Div) => {
            Ok(Value::float(x.num_milliseconds() as f64 / y.num_milliseconds() as f64))
        }
        (Value::Duration(d), n, BinaryOp::Mul) | (n, Value::Duration(d), BinaryOp::Mul) => {
            let factor = n.as_f64().ok_or_else(mismatch)?;
            Ok(scale(*d, factor))
        }
        (Value::Duration(d), n, BinaryOp::Div) => {
            let factor = n.as_f64().ok_or_else(mismatch)?;
            if factor == 0.0 {
                Ok(Value::Missing)
            } else {
                Ok(scale(*d, 1.0 / factor))
            }
        }
        _ => Err(mismatch()),
    }
}

fn scale(d: Duration, factor: f64) -> Value {
    let ms = d.num_milliseconds() as f64 * factor;
    if ms.is_finite() {
        Value::Duration(Duration::milliseconds(ms.round() as i64))
    } else {
        Value::Missing
    }
}

/// Comparisons never produce missing values: a missing side compares false,
/// except for `<>` which is true.
fn compare(op: BinaryOp, a: &Value, b: &Value) -> Result<Value> {
    if a.is_missing() || b.is_missing() {
        return Ok(Value::Bool(op == BinaryOp::Ne));
    }
    let ordering = a.compare(b);
    let result = match (op, ordering) {
        (BinaryOp::Eq, ord) => ord == Some(Ordering::Equal),
        (BinaryOp::Ne, ord) => ord != Some(Ordering::Equal),
        (_, None) => {
            return Err(SheetError::operator_type(op.symbol(), a.type_name(), b.type_name()))
        }
        (BinaryOp::Gt, Some(ord)) => ord == Ordering::Greater,
        (BinaryOp::Lt, Some(ord)) => ord == Ordering::Less,
        (BinaryOp::Ge, Some(ord)) => ord != Ordering::Less,
        (BinaryOp::Le, Some(ord)) => ord != Ordering::Greater,
        _ => false,
    };
    Ok(Value::Bool(result))
}

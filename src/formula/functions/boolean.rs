use super::FunctionContext;
use crate::error::Result;
use crate::formula::args::{map_rows, reduce_rows, FormulaArg};
use crate::formula::cast;
use crate::types::Value;

fn fold(args: &[FormulaArg], want_all: bool) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let mut acc = want_all;
        for value in &values {
            let b = cast::to_bool(value)?.unwrap_or(false);
            if want_all {
                acc &= b;
            } else {
                acc |= b;
            }
        }
        Ok(Value::Bool(acc))
    })
}

/// True when every value is truthy. Missing values count as false.
pub fn and(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    fold(args, true)
}

pub fn or(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    fold(args, false)
}

pub fn not(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("NOT", args, |row| {
        Ok(cast::to_bool(row[0])?
            .map(|b| Value::Bool(!b))
            .unwrap_or(Value::Missing))
    })
}

pub fn to_bool(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("BOOL", args, |row| {
        Ok(cast::to_bool(row[0])?.map(Value::Bool).unwrap_or(Value::Missing))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FunctionContext {
        FunctionContext {
            now: chrono::NaiveDateTime::default(),
            rows: 2,
        }
    }

    #[test]
    fn test_and_or_over_columns() {
        let args = vec![
            FormulaArg::Column(vec![Value::Bool(true), Value::Bool(false)]),
            FormulaArg::Scalar(Value::Bool(true)),
        ];
        assert_eq!(
            and(&args, &ctx()).unwrap(),
            FormulaArg::Column(vec![Value::Bool(true), Value::Bool(false)])
        );
        assert_eq!(
            or(&args, &ctx()).unwrap(),
            FormulaArg::Column(vec![Value::Bool(true), Value::Bool(true)])
        );
    }

    #[test]
    fn test_bool_reads_strings() {
        let out = to_bool(&[FormulaArg::Scalar(Value::str("true"))], &ctx()).unwrap();
        assert_eq!(out, FormulaArg::Scalar(Value::Bool(true)));
        let out = not(&[FormulaArg::Scalar(Value::Int(0))], &ctx()).unwrap();
        assert_eq!(out, FormulaArg::Scalar(Value::Bool(true)));
    }
}

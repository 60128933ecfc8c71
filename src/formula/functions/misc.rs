use super::FunctionContext;
use crate::error::Result;
use crate::formula::args::{map_rows, FormulaArg};
use crate::types::Value;

/// Replace missing values with the second argument.
pub fn fillnan(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("FILLNAN", args, |row| {
        Ok(if row[0].is_missing() {
            row[1].clone()
        } else {
            row[0].clone()
        })
    })
}

pub fn type_of(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("TYPE", args, |row| {
        let name = match row[0] {
            Value::Missing => "NaN",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "datetime",
            Value::Duration(_) => "timedelta",
        };
        Ok(Value::str(name))
    })
}

pub fn isna(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("ISNA", args, |row| Ok(Value::Bool(row[0].is_missing())))
}

//! Permissive coercion between value types.
//!
//! Every function reads its arguments through [`cast`], so the rules for
//! reading a string as a number (or a number as a date) live in one table.

use crate::error::{Result, SheetError};
use crate::table::convert;
use crate::types::{format_float, Value};
use chrono::NaiveDateTime;

/// Type a function asks an argument to be read as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastTarget {
    Number,
    Text,
    Bool,
    Datetime,
    Timedelta,
}

impl CastTarget {
    pub fn name(&self) -> &'static str {
        match self {
            CastTarget::Number => "number",
            CastTarget::Text => "str",
            CastTarget::Bool => "bool",
            CastTarget::Datetime => "datetime",
            CastTarget::Timedelta => "timedelta",
        }
    }
}

/// Read `value` as `target`.
///
/// `Ok(None)` means the value is missing or cannot be read as the target
/// (functions propagate it as missing). An error means the coercion itself is
/// not defined between the two types.
pub fn cast(value: &Value, target: CastTarget) -> Result<Option<Value>> {
    if value.is_missing() {
        return Ok(None);
    }
    let cast = match (value, target) {
        (Value::Int(_) | Value::Float(_), CastTarget::Number) => Some(value.clone()),
        (Value::Bool(b), CastTarget::Number) => Some(Value::Int(*b as i64)),
        (Value::Str(s), CastTarget::Number) => convert::parse_number(s).map(number_value),
        (Value::Timestamp(_) | Value::Duration(_), CastTarget::Number) => {
            return Err(undefined(value, target))
        }

        (Value::Str(_), CastTarget::Text) => Some(value.clone()),
        (Value::Float(f), CastTarget::Text) => Some(Value::Str(format_float(*f))),
        (_, CastTarget::Text) => Some(Value::Str(value.to_string())),

        (Value::Bool(_), CastTarget::Bool) => Some(value.clone()),
        (Value::Int(_) | Value::Float(_), CastTarget::Bool) => Some(Value::Bool(value.is_truthy())),
        (Value::Str(s), CastTarget::Bool) => convert::parse_bool(s).map(Value::Bool),
        (Value::Timestamp(_) | Value::Duration(_), CastTarget::Bool) => {
            return Err(undefined(value, target))
        }

        (Value::Timestamp(_), CastTarget::Datetime) => Some(value.clone()),
        (Value::Str(s), CastTarget::Datetime) => convert::parse_datetime(s).map(Value::Timestamp),
        (_, CastTarget::Datetime) => return Err(undefined(value, target)),

        (Value::Duration(_), CastTarget::Timedelta) => Some(value.clone()),
        (Value::Str(s), CastTarget::Timedelta) => convert::parse_timedelta(s).map(Value::Duration),
        (_, CastTarget::Timedelta) => return Err(undefined(value, target)),

        (Value::Missing, _) => None,
    };
    Ok(cast)
}

fn undefined(value: &Value, target: CastTarget) -> SheetError {
    SheetError::function(
        "cast",
        format!("A {} cannot be read as a {}.", value.type_name(), target.name()),
    )
}

fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Int(f as i64)
    } else {
        Value::float(f)
    }
}

/// Read as a float; `None` for missing or unreadable values.
pub fn to_f64(value: &Value) -> Result<Option<f64>> {
    Ok(cast(value, CastTarget::Number)?.and_then(|v| v.as_f64()))
}

/// Read as text; `None` for missing values.
pub fn to_text(value: &Value) -> Result<Option<String>> {
    Ok(cast(value, CastTarget::Text)?.and_then(|v| match v {
        Value::Str(s) => Some(s),
        _ => None,
    }))
}

/// Read as a boolean; `None` for missing or unreadable values.
pub fn to_bool(value: &Value) -> Result<Option<bool>> {
    Ok(cast(value, CastTarget::Bool)?.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        _ => None,
    }))
}

/// Read as a timestamp; `None` for missing or unreadable values.
pub fn to_datetime(value: &Value) -> Result<Option<NaiveDateTime>> {
    Ok(cast(value, CastTarget::Datetime)?.and_then(|v| match v {
        Value::Timestamp(ts) => Some(ts),
        _ => None,
    }))
}

/// Read as a whole number, truncating.
pub fn to_i64(value: &Value) -> Result<Option<i64>> {
    Ok(to_f64(value)?.filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_number() {
        assert_eq!(to_f64(&Value::str("$1,234.50")).unwrap(), Some(1234.5));
        assert_eq!(cast(&Value::str("12"), CastTarget::Number).unwrap(), Some(Value::Int(12)));
        assert_eq!(to_f64(&Value::str("abc")).unwrap(), None);
    }

    #[test]
    fn test_bool_to_number() {
        assert_eq!(to_f64(&Value::Bool(true)).unwrap(), Some(1.0));
        assert_eq!(to_f64(&Value::Bool(false)).unwrap(), Some(0.0));
    }

    #[test]
    fn test_missing_propagates() {
        assert_eq!(cast(&Value::Missing, CastTarget::Text).unwrap(), None);
    }

    #[test]
    fn test_undefined_cast_names_both_types() {
        let ts = convert::parse_datetime("2020-01-01").unwrap();
        let err = cast(&Value::Timestamp(ts), CastTarget::Number).unwrap_err();
        let hint = err.to_fix();
        assert!(hint.contains("datetime"));
        assert!(hint.contains("number"));
    }
}

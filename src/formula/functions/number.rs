use super::FunctionContext;
use crate::error::{Result, SheetError};
use crate::formula::args::{map_rows, reduce_rows, FormulaArg};
use crate::formula::cast::{to_f64, to_i64};
use crate::types::Value;

/// Numbers among `values`, skipping missing and unreadable ones.
/// The flag is true when every number was an integer.
fn numbers(values: &[Value]) -> Result<(Vec<f64>, bool)> {
    let mut out = Vec::with_capacity(values.len());
    let mut all_int = true;
    for value in values {
        if let Some(f) = to_f64(value)? {
            if !matches!(value, Value::Int(_) | Value::Bool(_)) && f.fract() != 0.0 {
                all_int = false;
            }
            if matches!(value, Value::Float(_)) {
                all_int = false;
            }
            out.push(f);
        }
    }
    Ok((out, all_int))
}

fn number(f: f64, as_int: bool) -> Value {
    if as_int && f.is_finite() && f.abs() < 9.0e15 {
        Value::Int(f as i64)
    } else {
        Value::float(f)
    }
}

fn unary<F>(name: &str, args: &[FormulaArg], f: F) -> Result<FormulaArg>
where
    F: Fn(f64) -> Option<f64>,
{
    map_rows(name, args, |row| {
        Ok(match to_f64(row[0])? {
            Some(x) => f(x).map(Value::float).unwrap_or(Value::Missing),
            None => Value::Missing,
        })
    })
}

// --- Aggregations ---

pub fn sum(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let (nums, all_int) = numbers(&values)?;
        Ok(number(nums.iter().sum(), all_int))
    })
}

pub fn avg(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let (nums, _) = numbers(&values)?;
        if nums.is_empty() {
            return Ok(Value::Missing);
        }
        Ok(Value::float(nums.iter().sum::<f64>() / nums.len() as f64))
    })
}

fn extreme(args: &[FormulaArg], want_max: bool) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let present: Vec<&Value> = values.iter().filter(|v| !v.is_missing()).collect();
        if !present.is_empty() && present.iter().all(|v| matches!(v, Value::Timestamp(_))) {
            let best = present.into_iter().reduce(|a, b| {
                let a_wins = match a.compare(b) {
                    Some(std::cmp::Ordering::Greater) => want_max,
                    Some(std::cmp::Ordering::Less) => !want_max,
                    _ => true,
                };
                if a_wins {
                    a
                } else {
                    b
                }
            });
            return Ok(best.cloned().unwrap_or(Value::Missing));
        }
        let (nums, all_int) = numbers(&values)?;
        let best = if want_max {
            nums.into_iter().reduce(f64::max)
        } else {
            nums.into_iter().reduce(f64::min)
        };
        Ok(best.map(|f| number(f, all_int)).unwrap_or(Value::Missing))
    })
}

pub fn max(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    extreme(args, true)
}

pub fn min(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    extreme(args, false)
}

pub fn multiply(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let (nums, all_int) = numbers(&values)?;
        if nums.is_empty() {
            return Ok(Value::Missing);
        }
        Ok(number(nums.iter().product(), all_int))
    })
}

pub fn count(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        Ok(Value::Int(values.iter().filter(|v| !v.is_missing()).count() as i64))
    })
}

fn variance(nums: &[f64]) -> Option<f64> {
    if nums.len() < 2 {
        return None;
    }
    let mean = nums.iter().sum::<f64>() / nums.len() as f64;
    let sq: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
    Some(sq / (nums.len() - 1) as f64)
}

pub fn var(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let (nums, _) = numbers(&values)?;
        Ok(variance(&nums).map(Value::float).unwrap_or(Value::Missing))
    })
}

pub fn stdev(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let (nums, _) = numbers(&values)?;
        Ok(variance(&nums)
            .map(|v| Value::float(v.sqrt()))
            .unwrap_or(Value::Missing))
    })
}

// --- Rounding ---

fn round_with<F>(name: &str, args: &[FormulaArg], f: F) -> Result<FormulaArg>
where
    F: Fn(f64) -> f64,
{
    map_rows(name, args, |row| {
        let digits = match row.get(1) {
            Some(v) => match to_i64(v)? {
                Some(d) => d,
                None => return Ok(Value::Missing),
            },
            None => 0,
        };
        Ok(match to_f64(row[0])? {
            Some(x) => {
                let factor = 10f64.powi(digits as i32);
                Value::float(f(x * factor) / factor)
            }
            None => Value::Missing,
        })
    })
}

pub fn round(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    round_with("ROUND", args, f64::round)
}

pub fn roundup(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    round_with("ROUNDUP", args, |x| if x >= 0.0 { x.ceil() } else { x.floor() })
}

pub fn rounddown(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    round_with("ROUNDDOWN", args, f64::trunc)
}

// --- Scalar math ---

pub fn power(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("POWER", args, |row| {
        let (base, exp) = match (to_f64(row[0])?, to_f64(row[1])?) {
            (Some(b), Some(e)) => (b, e),
            _ => return Ok(Value::Missing),
        };
        if let (Value::Int(b), Value::Int(e)) = (row[0], row[1]) {
            if *e >= 0 {
                if let Some(p) = u32::try_from(*e).ok().and_then(|e| b.checked_pow(e)) {
                    return Ok(Value::Int(p));
                }
            }
        }
        Ok(Value::float(base.powf(exp)))
    })
}

pub fn abs(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("ABS", args, |row| {
        Ok(match row[0] {
            Value::Int(i) => Value::Int(i.abs()),
            other => to_f64(other)?.map(|f| Value::float(f.abs())).unwrap_or(Value::Missing),
        })
    })
}

pub fn exp(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    unary("EXP", args, |x| Some(x.exp()))
}

pub fn int(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("INT", args, |row| {
        Ok(to_f64(row[0])?
            .filter(|f| f.is_finite())
            .map(|f| Value::Int(f.floor() as i64))
            .unwrap_or(Value::Missing))
    })
}

pub fn ln(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    unary("LN", args, |x| (x > 0.0).then(|| x.ln()))
}

pub fn log(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("LOG", args, |row| {
        let base = match row.get(1) {
            Some(v) => match to_f64(v)? {
                Some(b) => b,
                None => return Ok(Value::Missing),
            },
            None => 10.0,
        };
        Ok(match to_f64(row[0])? {
            Some(x) if x > 0.0 && base > 0.0 && base != 1.0 => Value::float(x.log(base)),
            _ => Value::Missing,
        })
    })
}

pub fn sqrt(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    unary("SQRT", args, |x| (x >= 0.0).then(|| x.sqrt()))
}

pub fn value(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("VALUE", args, |row| match row[0] {
        Value::Timestamp(_) | Value::Duration(_) => Err(SheetError::function(
            "VALUE",
            format!("VALUE cannot read a {} as a number.", row[0].type_name()),
        )),
        other => Ok(to_f64(other)?
            .map(|f| number(f, f.fract() == 0.0))
            .unwrap_or(Value::Missing)),
    })
}

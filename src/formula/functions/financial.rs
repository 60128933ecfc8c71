use super::FunctionContext;
use crate::error::Result;
use crate::formula::args::{reduce_rows, FormulaArg};
use crate::formula::cast::to_f64;
use crate::types::Value;

/// `NPV(rate, value1, ...)`: the sum of `v_k / (1 + rate)^k` for k from 1.
pub fn npv(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let mut iter = values.iter();
        let rate = match iter.next().map(to_f64).transpose()?.flatten() {
            Some(rate) => rate,
            None => return Ok(Value::Missing),
        };
        let mut total = 0.0;
        let mut period = 0;
        for value in iter {
            period += 1;
            if let Some(v) = to_f64(value)? {
                total += v / (1.0 + rate).powi(period);
            }
        }
        Ok(Value::float(total))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npv() {
        let ctx = FunctionContext {
            now: chrono::NaiveDateTime::default(),
            rows: 1,
        };
        let args = vec![
            FormulaArg::Scalar(Value::Float(0.1)),
            FormulaArg::Scalar(Value::Int(110)),
            FormulaArg::Scalar(Value::Int(121)),
        ];
        match npv(&args, &ctx).unwrap() {
            FormulaArg::Scalar(Value::Float(f)) => assert!((f - 200.0).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
    }
}

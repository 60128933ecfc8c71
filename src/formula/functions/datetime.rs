use super::FunctionContext;
use crate::error::Result;
use crate::formula::args::{map_rows, FormulaArg};
use crate::formula::cast::to_datetime;
use crate::types::Value;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

fn part<F>(name: &str, args: &[FormulaArg], f: F) -> Result<FormulaArg>
where
    F: Fn(&NaiveDateTime) -> i64,
{
    map_rows(name, args, |row| {
        Ok(to_datetime(row[0])?
            .map(|ts| Value::Int(f(&ts)))
            .unwrap_or(Value::Missing))
    })
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

pub fn year(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("YEAR", args, |ts| ts.year() as i64)
}

pub fn month(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("MONTH", args, |ts| ts.month() as i64)
}

pub fn day(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("DAY", args, |ts| ts.day() as i64)
}

pub fn hour(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("HOUR", args, |ts| ts.hour() as i64)
}

pub fn minute(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("MINUTE", args, |ts| ts.minute() as i64)
}

pub fn second(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("SECOND", args, |ts| ts.second() as i64)
}

/// Day of the week, Monday is 1.
pub fn weekday(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("WEEKDAY", args, |ts| ts.weekday().number_from_monday() as i64)
}

pub fn quarter(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    part("QUARTER", args, |ts| (ts.month0() / 3 + 1) as i64)
}

/// The evaluation time pinned when the formula was set.
pub fn now(_: &[FormulaArg], ctx: &FunctionContext) -> Result<FormulaArg> {
    Ok(FormulaArg::Scalar(Value::Timestamp(ctx.now)))
}

/// The date part of a datetime, at midnight.
pub fn datevalue(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("DATEVALUE", args, |row| {
        Ok(to_datetime(row[0])?
            .map(|ts| Value::Timestamp(midnight(ts.date())))
            .unwrap_or(Value::Missing))
    })
}

pub fn strtodate(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("STRTODATE", args, |row| {
        Ok(to_datetime(row[0])?.map(Value::Timestamp).unwrap_or(Value::Missing))
    })
}

/// Last day of the month, at midnight.
pub fn endofmonth(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("ENDOFMONTH", args, |row| {
        let ts = match to_datetime(row[0])? {
            Some(ts) => ts,
            None => return Ok(Value::Missing),
        };
        let (y, m) = if ts.month() == 12 {
            (ts.year() + 1, 1)
        } else {
            (ts.year(), ts.month() + 1)
        };
        Ok(NaiveDate::from_ymd_opt(y, m, 1)
            .map(|first| Value::Timestamp(midnight(first - Duration::days(1))))
            .unwrap_or(Value::Missing))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FunctionContext {
        FunctionContext {
            now: NaiveDate::from_ymd_opt(2024, 3, 5)
                .and_then(|d| d.and_hms_opt(12, 0, 0))
                .unwrap(),
            rows: 1,
        }
    }

    fn date(s: &str) -> FormulaArg {
        FormulaArg::Scalar(Value::str(s))
    }

    #[test]
    fn test_parts_from_strings() {
        assert_eq!(year(&[date("2023-07-14")], &ctx()).unwrap(), FormulaArg::Scalar(Value::Int(2023)));
        assert_eq!(quarter(&[date("2023-07-14")], &ctx()).unwrap(), FormulaArg::Scalar(Value::Int(3)));
        // 2023-07-14 was a Friday.
        assert_eq!(weekday(&[date("2023-07-14")], &ctx()).unwrap(), FormulaArg::Scalar(Value::Int(5)));
    }

    #[test]
    fn test_endofmonth_handles_leap_years() {
        let out = endofmonth(&[date("2024-02-10")], &ctx()).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap().and_time(NaiveTime::MIN);
        assert_eq!(out, FormulaArg::Scalar(Value::Timestamp(expected)));
    }

    #[test]
    fn test_now_is_pinned() {
        assert_eq!(now(&[], &ctx()).unwrap(), FormulaArg::Scalar(Value::Timestamp(ctx().now)));
    }
}

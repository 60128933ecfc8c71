//! Value parsing and dtype conversion.
//!
//! These helpers back both the change-dtype step and the permissive casting
//! used by formula functions, so a string like `"$1,234.50"` reads the same
//! way everywhere.

use crate::error::{Result, SheetError};
use crate::types::{Dtype, Value};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Datetime formats tried, in order, when detecting the format of a string column.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%m-%d-%Y",
    "%d-%m-%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
    "%Y%m%d",
];

/// Number of values sampled when detecting a datetime format.
const DATETIME_SAMPLE_SIZE: usize = 30;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid number regex")
});

static TIMEDELTA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(-?\d+)\s+days?,?\s*)?(?:(-?\d{1,2}):(\d{2}):(\d{2})(?:\.\d+)?)?$")
        .expect("valid timedelta regex")
});

/// Parse a number the way a spreadsheet user would write it.
///
/// Accepts currency symbols, thousands separators, surrounding whitespace,
/// trailing percent signs and accounting-style parentheses.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let (negative, body) = if trimmed.starts_with('(') && trimmed.ends_with(')') {
        (true, &trimmed[1..trimmed.len() - 1])
    } else {
        (false, trimmed)
    };
    let (percent, body) = match body.strip_suffix('%') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let cleaned: String = body
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | ' '))
        .collect();
    if !NUMBER_RE.is_match(&cleaned) {
        return None;
    }
    let mut number: f64 = cleaned.parse().ok()?;
    if percent {
        number /= 100.0;
    }
    if negative {
        number = -number;
    }
    Some(number)
}

/// Parse a boolean from common spreadsheet spellings.
pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

/// Parse a datetime with a known format. Date-only formats yield midnight.
pub fn parse_datetime_with_format(s: &str, format: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, format)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parse a datetime trying every known format.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| parse_datetime_with_format(s, format))
}

/// Detect the datetime format of a string column by sampling its first values.
///
/// Returns the first format that parses every sampled value.
pub fn detect_datetime_format(values: &[Value]) -> Option<&'static str> {
    let sample: Vec<&str> = values
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .take(DATETIME_SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return None;
    }
    DATETIME_FORMATS.iter().copied().find(|format| {
        sample
            .iter()
            .all(|s| parse_datetime_with_format(s, format).is_some())
    })
}

/// Parse a pandas-style timedelta string such as `1 days 02:03:04` or `00:10:00`.
pub fn parse_timedelta(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let caps = TIMEDELTA_RE.captures(s)?;
    if caps.get(1).is_none() && caps.get(2).is_none() {
        return None;
    }
    let days: i64 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let hours: i64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let minutes: i64 = caps.get(3).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    let seconds: i64 = caps.get(4).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
    Some(
        Duration::days(days)
            + Duration::hours(hours)
            + Duration::minutes(minutes)
            + Duration::seconds(seconds),
    )
}

// --- Single-value conversions ---

/// Convert one value to a float, `Missing` when it cannot be read as a number.
pub fn to_float(value: &Value) -> Value {
    match value {
        Value::Str(s) => parse_number(s).map(Value::float).unwrap_or(Value::Missing),
        Value::Timestamp(ts) => Value::Float(ts.and_utc().timestamp() as f64),
        Value::Duration(d) => Value::Float(d.num_seconds() as f64),
        other => other.as_f64().map(Value::float).unwrap_or(Value::Missing),
    }
}

/// Convert one value to an integer. Unreadable and missing values become 0.
pub fn to_int(value: &Value) -> Value {
    match to_float(value) {
        Value::Float(f) if f.is_finite() => Value::Int(f.trunc() as i64),
        _ => Value::Int(0),
    }
}

/// Convert one value to a boolean. Missing and unreadable values become `false`.
pub fn to_bool(value: &Value) -> Value {
    match value {
        Value::Str(s) => Value::Bool(parse_bool(s).unwrap_or(false)),
        Value::Missing => Value::Bool(false),
        other => Value::Bool(other.is_truthy()),
    }
}

/// Convert one value to a string. Missing stays missing.
pub fn to_string(value: &Value) -> Value {
    match value {
        Value::Missing => Value::Missing,
        Value::Str(_) => value.clone(),
        other => Value::Str(other.to_string()),
    }
}

/// Convert one value to a timestamp; numbers are read as seconds since the epoch.
pub fn to_datetime(value: &Value, format: Option<&str>) -> Value {
    match value {
        Value::Timestamp(_) => value.clone(),
        Value::Str(s) => match format {
            Some(format) => parse_datetime_with_format(s, format),
            None => parse_datetime(s),
        }
        .map(Value::Timestamp)
        .unwrap_or(Value::Missing),
        Value::Int(_) | Value::Float(_) => value
            .as_f64()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Missing),
        _ => Value::Missing,
    }
}

/// Convert one value to a duration; numbers are read as seconds.
pub fn to_timedelta(value: &Value) -> Value {
    match value {
        Value::Duration(_) => value.clone(),
        Value::Str(s) => parse_timedelta(s)
            .map(Value::Duration)
            .unwrap_or(Value::Missing),
        Value::Int(i) => Value::Duration(Duration::seconds(*i)),
        Value::Float(f) if f.is_finite() => Value::Duration(Duration::milliseconds((f * 1000.0) as i64)),
        _ => Value::Missing,
    }
}

/// Result of converting a column to a new dtype.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub values: Vec<Value>,
    /// Datetime format detected from the strings, when one was needed.
    pub detected_format: Option<String>,
}

/// Convert a column of values to `target`.
///
/// `datetime_format` pins the format for string → datetime conversions;
/// when absent it is detected by sampling and returned in the result.
pub fn convert_values(
    values: &[Value],
    target: Dtype,
    datetime_format: Option<&str>,
) -> Result<Conversion> {
    let mut detected_format = None;
    let converted = match target {
        Dtype::Bool => values.iter().map(to_bool).collect(),
        Dtype::Int => values.iter().map(to_int).collect(),
        Dtype::Float => values.iter().map(to_float).collect(),
        Dtype::String => values.iter().map(to_string).collect(),
        Dtype::Timedelta => values.iter().map(to_timedelta).collect(),
        Dtype::Datetime => {
            let format = match datetime_format {
                Some(format) => Some(format.to_string()),
                None => detect_datetime_format(values).map(str::to_string),
            };
            if format.is_some() && datetime_format.is_none() {
                detected_format = format.clone();
            }
            values
                .iter()
                .map(|v| to_datetime(v, format.as_deref()))
                .collect()
        }
        Dtype::Object => {
            return Err(SheetError::invalid_arg(
                "columns cannot be converted to the object dtype",
            ))
        }
    };
    Ok(Conversion {
        values: converted,
        detected_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_permissive() {
        assert_eq!(parse_number("$1,234.50"), Some(1234.5));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("(12)"), Some(-12.0));
        assert_eq!(parse_number("50%"), Some(0.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_detect_datetime_format() {
        let values = vec![Value::str("12/31/2020"), Value::str("01/02/2021"), Value::Missing];
        assert_eq!(detect_datetime_format(&values), Some("%m/%d/%Y"));
        let values = vec![Value::str("2020-12-31")];
        assert_eq!(detect_datetime_format(&values), Some("%Y-%m-%d"));
        assert_eq!(detect_datetime_format(&[Value::str("nope")]), None);
    }

    #[test]
    fn test_convert_to_int_fills_missing_with_zero() {
        let values = vec![Value::Float(1.7), Value::Missing, Value::str("3")];
        let converted = convert_values(&values, Dtype::Int, None).unwrap();
        assert_eq!(converted.values, vec![Value::Int(1), Value::Int(0), Value::Int(3)]);
    }

    #[test]
    fn test_convert_to_datetime_records_format() {
        let values = vec![Value::str("2021-03-04"), Value::str("bad")];
        let converted = convert_values(&values[..1], Dtype::Datetime, None).unwrap();
        assert_eq!(converted.detected_format.as_deref(), Some("%Y-%m-%d"));
        let converted = convert_values(&values, Dtype::Datetime, Some("%Y-%m-%d")).unwrap();
        assert!(converted.detected_format.is_none());
        assert!(matches!(converted.values[0], Value::Timestamp(_)));
        assert_eq!(converted.values[1], Value::Missing);
    }

    #[test]
    fn test_parse_timedelta() {
        assert_eq!(parse_timedelta("1 days 01:00:00"), Some(Duration::hours(25)));
        assert_eq!(parse_timedelta("00:10:00"), Some(Duration::minutes(10)));
        assert_eq!(parse_timedelta("3 days"), Some(Duration::days(3)));
        assert_eq!(parse_timedelta("soon"), None);
    }
}

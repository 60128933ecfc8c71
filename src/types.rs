//! Core types for the spreadsheet engine.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Format used when printing timestamps and parsing them back.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stable surrogate key for a column, decoupled from its header.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(pub String);

impl ColumnId {
    pub fn new(id: impl Into<String>) -> Self {
        ColumnId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColumnId({})", self.0)
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ColumnId {
    fn from(s: &str) -> Self {
        ColumnId(s.to_string())
    }
}

/// Stable identifier of a step in the history.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

static STEP_COUNTER: AtomicU64 = AtomicU64::new(0);

impl StepId {
    /// Generate a fresh id. Replays keep ids only when they are supplied explicitly.
    pub fn generate() -> Self {
        StepId(format!("id-{}", unique_token(10)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepId({})", self.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A short hex token derived from the clock and a process-wide counter.
pub fn unique_token(len: usize) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let count = STEP_COUNTER.fetch_add(1, AtomicOrdering::SeqCst);

    let mut hasher = Sha256::new();
    hasher.update(nanos.to_le_bytes());
    hasher.update(count.to_le_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..len.min(digest.len())].to_string()
}

/// Row label of a table index.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexLabel {
    Int(i64),
    Str(String),
}

impl IndexLabel {
    /// Python literal for the label.
    pub fn to_code(&self) -> String {
        match self {
            IndexLabel::Int(i) => i.to_string(),
            IndexLabel::Str(s) => python_string(s),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            IndexLabel::Int(i) => Value::Int(*i),
            IndexLabel::Str(s) => Value::Str(s.clone()),
        }
    }

    /// Convert a cell value into a label (used when setting a column as index).
    pub fn from_value(value: &Value) -> IndexLabel {
        match value {
            Value::Int(i) => IndexLabel::Int(*i),
            Value::Bool(b) => IndexLabel::Int(*b as i64),
            Value::Float(f) if f.fract() == 0.0 => IndexLabel::Int(*f as i64),
            other => IndexLabel::Str(other.to_string()),
        }
    }
}

impl fmt::Debug for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexLabel::Int(i) => write!(f, "{}", i),
            IndexLabel::Str(s) => write!(f, "{:?}", s),
        }
    }
}

impl fmt::Display for IndexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexLabel::Int(i) => write!(f, "{}", i),
            IndexLabel::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for IndexLabel {
    fn from(i: i64) -> Self {
        IndexLabel::Int(i)
    }
}

/// Where a table came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    Imported,
    Duplicated,
    Merged,
    Pivoted,
    Concatenated,
    Transposed,
    Melted,
}

/// Version of the sheet-function module that formulas and generated code target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum PublicInterfaceVersion {
    V1,
    V3,
}

impl PublicInterfaceVersion {
    pub const CURRENT: PublicInterfaceVersion = PublicInterfaceVersion::V3;

    pub fn as_u32(&self) -> u32 {
        match self {
            PublicInterfaceVersion::V1 => 1,
            PublicInterfaceVersion::V3 => 3,
        }
    }

    /// The import line generated code uses for sheet functions.
    pub fn import_line(&self) -> String {
        format!("from sheetstate.public.v{} import *", self.as_u32())
    }
}

impl Default for PublicInterfaceVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl TryFrom<u32> for PublicInterfaceVersion {
    type Error = String;

    fn try_from(v: u32) -> std::result::Result<Self, Self::Error> {
        match v {
            1 => Ok(PublicInterfaceVersion::V1),
            3 => Ok(PublicInterfaceVersion::V3),
            other => Err(format!("unknown public interface version {}", other)),
        }
    }
}

impl From<PublicInterfaceVersion> for u32 {
    fn from(v: PublicInterfaceVersion) -> u32 {
        v.as_u32()
    }
}

/// Dtype of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dtype {
    Bool,
    Int,
    Float,
    String,
    Datetime,
    Timedelta,
    /// Mixed values.
    Object,
}

impl Dtype {
    /// Pandas spelling of the dtype.
    pub fn pandas_name(&self) -> &'static str {
        match self {
            Dtype::Bool => "bool",
            Dtype::Int => "int64",
            Dtype::Float => "float64",
            Dtype::String => "str",
            Dtype::Datetime => "datetime64[ns]",
            Dtype::Timedelta => "timedelta64[ns]",
            Dtype::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Dtype::Int | Dtype::Float | Dtype::Bool)
    }

    /// Infer the dtype that best describes a list of values.
    pub fn infer(values: &[Value]) -> Dtype {
        let mut dtype: Option<Dtype> = None;
        let mut saw_missing = false;
        for value in values {
            let this = match value {
                Value::Missing => {
                    saw_missing = true;
                    continue;
                }
                Value::Bool(_) => Dtype::Bool,
                Value::Int(_) => Dtype::Int,
                Value::Float(_) => Dtype::Float,
                Value::Str(_) => Dtype::String,
                Value::Timestamp(_) => Dtype::Datetime,
                Value::Duration(_) => Dtype::Timedelta,
            };
            dtype = Some(match dtype {
                None => this,
                Some(prev) if prev == this => prev,
                Some(Dtype::Int) if this == Dtype::Float => Dtype::Float,
                Some(Dtype::Float) if this == Dtype::Int => Dtype::Float,
                Some(_) => Dtype::Object,
            });
        }
        match dtype {
            // Integer columns holding missing values widen to float, like pandas.
            Some(Dtype::Int) if saw_missing => Dtype::Float,
            Some(Dtype::Bool) if saw_missing => Dtype::Object,
            Some(dtype) => dtype,
            None if saw_missing => Dtype::Float,
            None => Dtype::Object,
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pandas_name())
    }
}

/// A single cell value.
#[derive(Clone, Debug)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
    Duration(Duration),
}

impl Value {
    /// Build a float, normalising NaN to missing.
    pub fn float(f: f64) -> Value {
        if f.is_nan() {
            Value::Missing
        } else {
            Value::Float(f)
        }
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    /// Name of the value's type, as reported in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "NaN",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Timestamp(_) => "datetime",
            Value::Duration(_) => "timedelta",
        }
    }

    /// Numeric view of the value, without string parsing.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by filters and boolean functions.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Timestamp(_) => true,
            Value::Duration(d) => !d.is_zero(),
        }
    }

    /// Ordering used by sorts and comparisons. `None` when the values are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Missing, Value::Missing) => Some(Ordering::Equal),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// Convert to a JSON value for the host.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Missing => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(_) | Value::Duration(_) => serde_json::Value::String(self.to_string()),
        }
    }

    /// Read a JSON value sent by the host.
    pub fn from_json(value: &serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Missing,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    /// Python literal for the value.
    pub fn to_code(&self) -> String {
        match self {
            Value::Missing => "None".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) if f.is_infinite() && *f > 0.0 => "float('inf')".to_string(),
            Value::Float(f) if f.is_infinite() => "float('-inf')".to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => python_string(s),
            Value::Timestamp(ts) => format!("pd.to_datetime('{}')", ts.format(TIMESTAMP_FORMAT)),
            Value::Duration(d) => format!("pd.to_timedelta('{}')", format_duration(d)),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Missing, Value::Missing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            _ => false,
        }
    }
}

// NaN never reaches a Value (see `Value::float`), so equality is total.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Missing => state.write_u8(0),
            Value::Bool(b) => {
                state.write_u8(1);
                b.hash(state);
            }
            Value::Int(i) => {
                state.write_u8(2);
                (*i as f64).to_bits().hash(state);
            }
            Value::Float(f) => {
                state.write_u8(2);
                let f = if *f == 0.0 { 0.0 } else { *f };
                f.to_bits().hash(state);
            }
            Value::Str(s) => {
                state.write_u8(3);
                s.hash(state);
            }
            Value::Timestamp(ts) => {
                state.write_u8(4);
                ts.hash(state);
            }
            Value::Duration(d) => {
                state.write_u8(5);
                d.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => write!(f, "NaN"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", format_float(*x)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            Value::Duration(d) => write!(f, "{}", format_duration(d)),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

/// Float formatting that always keeps a decimal point, like Python's repr.
pub fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Pandas-style timedelta string, e.g. `1 days 02:03:04`.
pub fn format_duration(d: &Duration) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    let days = total / 86_400;
    let rem = total % 86_400;
    format!(
        "{}{} days {:02}:{:02}:{:02}",
        sign,
        days,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Python string literal with single quotes.
pub fn python_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_step_ids_are_unique() {
        let a = StepId::generate();
        let b = StepId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("id-"));
    }

    #[test]
    fn test_value_int_float_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(Value::Int(1));
        assert!(set.contains(&Value::Float(1.0)));
        assert_eq!(Value::float(f64::NAN), Value::Missing);
    }

    #[test]
    fn test_infer_dtype() {
        assert_eq!(Dtype::infer(&[Value::Int(1), Value::Int(2)]), Dtype::Int);
        assert_eq!(Dtype::infer(&[Value::Int(1), Value::Missing]), Dtype::Float);
        assert_eq!(Dtype::infer(&[Value::Int(1), Value::Float(2.5)]), Dtype::Float);
        assert_eq!(Dtype::infer(&[Value::str("a"), Value::Int(1)]), Dtype::Object);
    }

    #[test]
    fn test_python_literals() {
        assert_eq!(Value::str("it's").to_code(), "'it\\'s'");
        assert_eq!(Value::Float(2.0).to_code(), "2.0");
        assert_eq!(Value::Missing.to_code(), "None");
        assert_eq!(IndexLabel::Str("a".into()).to_code(), "'a'");
    }

    #[test]
    fn test_compare_mixed_types() {
        assert_eq!(Value::Int(1).compare(&Value::Float(2.0)), Some(Ordering::Less));
        assert_eq!(Value::str("a").compare(&Value::Int(1)), None);
    }

    #[test]
    fn test_format_duration() {
        let d = Duration::seconds(86_400 + 3661);
        assert_eq!(format_duration(&d), "1 days 01:01:01");
    }
}

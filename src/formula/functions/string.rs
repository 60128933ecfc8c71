use super::FunctionContext;
use crate::error::Result;
use crate::formula::args::{map_rows, reduce_rows, FormulaArg};
use crate::formula::cast::{to_i64, to_text};
use crate::types::Value;

fn text_fn<F>(name: &str, args: &[FormulaArg], f: F) -> Result<FormulaArg>
where
    F: Fn(&str) -> Value,
{
    map_rows(name, args, |row| {
        Ok(match to_text(row[0])? {
            Some(s) => f(&s),
            None => Value::Missing,
        })
    })
}

/// Optional count argument, defaulting to 1.
fn count_arg(row: &[&Value]) -> Result<Option<usize>> {
    match row.get(1) {
        Some(v) => Ok(to_i64(v)?.map(|n| n.max(0) as usize)),
        None => Ok(Some(1)),
    }
}

pub fn left(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("LEFT", args, |row| {
        let (s, n) = match (to_text(row[0])?, count_arg(row)?) {
            (Some(s), Some(n)) => (s, n),
            _ => return Ok(Value::Missing),
        };
        Ok(Value::Str(s.chars().take(n).collect()))
    })
}

pub fn right(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("RIGHT", args, |row| {
        let (s, n) = match (to_text(row[0])?, count_arg(row)?) {
            (Some(s), Some(n)) => (s, n),
            _ => return Ok(Value::Missing),
        };
        let len = s.chars().count();
        Ok(Value::Str(s.chars().skip(len.saturating_sub(n)).collect()))
    })
}

/// `MID(text, start, length)` with a 1-based start.
pub fn mid(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("MID", args, |row| {
        let (s, start, len) = match (to_text(row[0])?, to_i64(row[1])?, to_i64(row[2])?) {
            (Some(s), Some(start), Some(len)) => (s, start, len),
            _ => return Ok(Value::Missing),
        };
        let skip = (start.max(1) - 1) as usize;
        Ok(Value::Str(s.chars().skip(skip).take(len.max(0) as usize).collect()))
    })
}

pub fn len(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("LEN", args, |s| Value::Int(s.chars().count() as i64))
}

pub fn lower(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("LOWER", args, |s| Value::Str(s.to_lowercase()))
}

pub fn upper(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("UPPER", args, |s| Value::Str(s.to_uppercase()))
}

/// Capitalize the first letter of each word, lowercase the rest.
pub fn proper(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("PROPER", args, |s| {
        let mut out = String::with_capacity(s.len());
        let mut start_of_word = true;
        for c in s.chars() {
            if c.is_alphabetic() {
                if start_of_word {
                    out.extend(c.to_uppercase());
                } else {
                    out.extend(c.to_lowercase());
                }
                start_of_word = false;
            } else {
                out.push(c);
                start_of_word = true;
            }
        }
        Value::Str(out)
    })
}

pub fn trim(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("TRIM", args, |s| Value::Str(s.trim().to_string()))
}

/// Strip non-printable characters.
pub fn clean(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    text_fn("CLEAN", args, |s| Value::Str(s.chars().filter(|c| !c.is_control()).collect()))
}

/// Join every value as text; missing values contribute nothing.
pub fn concat(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    reduce_rows(args, |values| {
        let mut out = String::new();
        for value in &values {
            if let Some(s) = to_text(value)? {
                out.push_str(&s);
            }
        }
        Ok(Value::Str(out))
    })
}

/// 1-based position of the substring, or 0 when absent.
pub fn find(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("FIND", args, |row| {
        let (s, needle) = match (to_text(row[0])?, to_text(row[1])?) {
            (Some(s), Some(n)) => (s, n),
            _ => return Ok(Value::Missing),
        };
        Ok(Value::Int(match s.find(&needle) {
            Some(byte) => s[..byte].chars().count() as i64 + 1,
            None => 0,
        }))
    })
}

/// `SUBSTITUTE(text, old, new, [count])`; every occurrence when count is absent.
pub fn substitute(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("SUBSTITUTE", args, |row| {
        let (s, old, new) = match (to_text(row[0])?, to_text(row[1])?, to_text(row[2])?) {
            (Some(s), Some(old), Some(new)) => (s, old, new),
            _ => return Ok(Value::Missing),
        };
        if old.is_empty() {
            return Ok(Value::Str(s));
        }
        Ok(Value::Str(match row.get(3) {
            Some(count) => match to_i64(count)? {
                Some(n) => s.replacen(&old, &new, n.max(0) as usize),
                None => return Ok(Value::Missing),
            },
            None => s.replace(&old, &new),
        }))
    })
}

pub fn text(args: &[FormulaArg], _: &FunctionContext) -> Result<FormulaArg> {
    map_rows("TEXT", args, |row| {
        Ok(to_text(row[0])?.map(Value::Str).unwrap_or(Value::Missing))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FunctionContext {
        FunctionContext {
            now: chrono::NaiveDateTime::default(),
            rows: 1,
        }
    }

    fn s(v: &str) -> FormulaArg {
        FormulaArg::Scalar(Value::str(v))
    }

    fn n(v: i64) -> FormulaArg {
        FormulaArg::Scalar(Value::Int(v))
    }

    #[test]
    fn test_left_right_mid() {
        assert_eq!(left(&[s("hello"), n(2)], &ctx()).unwrap(), s("he"));
        assert_eq!(left(&[s("hello")], &ctx()).unwrap(), s("h"));
        assert_eq!(right(&[s("hello"), n(3)], &ctx()).unwrap(), s("llo"));
        assert_eq!(mid(&[s("hello"), n(2), n(3)], &ctx()).unwrap(), s("ell"));
    }

    #[test]
    fn test_proper_and_clean() {
        assert_eq!(proper(&[s("hELLO wORLD")], &ctx()).unwrap(), s("Hello World"));
        assert_eq!(clean(&[s("a\u{7}b")], &ctx()).unwrap(), s("ab"));
    }

    #[test]
    fn test_find_is_one_based() {
        assert_eq!(find(&[s("banana"), s("nan")], &ctx()).unwrap(), FormulaArg::Scalar(Value::Int(3)));
        assert_eq!(find(&[s("banana"), s("x")], &ctx()).unwrap(), FormulaArg::Scalar(Value::Int(0)));
    }

    #[test]
    fn test_concat_skips_missing() {
        let args = vec![
            FormulaArg::Column(vec![Value::str("a"), Value::Missing]),
            FormulaArg::Scalar(Value::Int(1)),
        ];
        assert_eq!(
            concat(&args, &ctx()).unwrap(),
            FormulaArg::Column(vec![Value::str("a1"), Value::str("1")])
        );
    }

    #[test]
    fn test_substitute_with_count() {
        assert_eq!(substitute(&[s("aaa"), s("a"), s("b"), n(2)], &ctx()).unwrap(), s("bba"));
        assert_eq!(substitute(&[s("aaa"), s("a"), s("b")], &ctx()).unwrap(), s("bbb"));
    }
}

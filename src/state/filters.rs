//! Column filters: predicate lists joined by and/or.

use crate::error::{Result, SheetError};
use crate::table::convert;
use crate::types::{python_string, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    #[default]
    And,
    Or,
}

impl FilterOperator {
    fn python(&self) -> &'static str {
        match self {
            FilterOperator::And => "&",
            FilterOperator::Or => "|",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterCondition {
    // String
    Contains,
    StringDoesNotContain,
    StringExactly,
    StringNotExactly,
    StringStartsWith,
    StringEndsWith,
    // Number
    Greater,
    GreaterThanOrEqual,
    Less,
    LessThanOrEqual,
    NumberExactly,
    NumberNotExactly,
    // Boolean
    BooleanIsTrue,
    BooleanIsFalse,
    // Datetime
    DatetimeExactly,
    DatetimeNotExactly,
    DatetimeGreater,
    DatetimeGreaterThanOrEqual,
    DatetimeLess,
    DatetimeLessThanOrEqual,
    // Any column
    Empty,
    NotEmpty,
    // Whole column
    MostFrequent,
    LeastFrequent,
    NumberHighest,
    NumberLowest,
}

impl FilterCondition {
    /// Whether the predicate depends on every row of the column, so it cannot
    /// be evaluated on a truncated preview.
    pub fn requires_full_table(&self) -> bool {
        matches!(
            self,
            FilterCondition::MostFrequent
                | FilterCondition::LeastFrequent
                | FilterCondition::NumberHighest
                | FilterCondition::NumberLowest
        )
    }
}

/// One predicate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub condition: FilterCondition,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A filter or a one-level group of filters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterItem {
    Group {
        operator: FilterOperator,
        filters: Vec<Filter>,
    },
    Filter(Filter),
}

/// Filters set on one column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilters {
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub filters: Vec<FilterItem>,
}

impl ColumnFilters {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    fn all_filters(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter().flat_map(|item| match item {
            FilterItem::Filter(f) => std::slice::from_ref(f).iter(),
            FilterItem::Group { filters, .. } => filters.iter(),
        })
    }

    pub fn requires_full_table(&self) -> bool {
        self.all_filters().any(|f| f.condition.requires_full_table())
    }

    /// Which values pass the filters.
    pub fn mask(&self, values: &[Value]) -> Result<Vec<bool>> {
        if self.filters.is_empty() {
            return Ok(vec![true; values.len()]);
        }
        let mut items = Vec::with_capacity(self.filters.len());
        for item in &self.filters {
            items.push(match item {
                FilterItem::Filter(filter) => filter.mask(values)?,
                FilterItem::Group { operator, filters } => {
                    let masks = filters
                        .iter()
                        .map(|f| f.mask(values))
                        .collect::<Result<Vec<_>>>()?;
                    combine(*operator, masks, values.len())
                }
            });
        }
        Ok(combine(self.operator, items, values.len()))
    }

    /// Pandas boolean expression selecting the rows that pass, or `None` when
    /// there is nothing to filter.
    pub fn to_code(&self, table: &str, header: &str) -> Result<Option<String>> {
        let column = format!("{}[{}]", table, python_string(header));
        let mut parts = Vec::new();
        for item in &self.filters {
            match item {
                FilterItem::Filter(filter) => parts.push(filter.to_code(&column)?),
                FilterItem::Group { operator, filters } => {
                    if filters.is_empty() {
                        continue;
                    }
                    let inner = filters
                        .iter()
                        .map(|f| f.to_code(&column).map(|c| format!("({})", c)))
                        .collect::<Result<Vec<_>>>()?;
                    parts.push(inner.join(&format!(" {} ", operator.python())));
                }
            }
        }
        Ok(match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => Some(
                parts
                    .iter()
                    .map(|p| format!("({})", p))
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", self.operator.python())),
            ),
        })
    }
}

fn combine(operator: FilterOperator, masks: Vec<Vec<bool>>, len: usize) -> Vec<bool> {
    if masks.is_empty() {
        return vec![true; len];
    }
    (0..len)
        .map(|i| match operator {
            FilterOperator::And => masks.iter().all(|m| m[i]),
            FilterOperator::Or => masks.iter().any(|m| m[i]),
        })
        .collect()
}

impl Filter {
    fn invalid(&self, expected: &str) -> SheetError {
        SheetError::invalid_arg(format!(
            "The {:?} filter needs {} but got {}.",
            self.condition, expected, self.value
        ))
    }

    fn number(&self) -> Result<f64> {
        match &self.value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => convert::parse_number(s),
            _ => None,
        }
        .ok_or_else(|| self.invalid("a number"))
    }

    fn text(&self) -> Result<String> {
        match &self.value {
            serde_json::Value::String(s) => Ok(s.clone()),
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::Bool(b) => Ok(b.to_string()),
            _ => Err(self.invalid("text")),
        }
    }

    fn count(&self) -> Result<usize> {
        let n = self.number()?;
        if n < 0.0 {
            return Err(self.invalid("a positive count"));
        }
        Ok(n as usize)
    }

    fn datetime(&self) -> Result<chrono::NaiveDateTime> {
        self.text()
            .ok()
            .and_then(|s| convert::parse_datetime(&s))
            .ok_or_else(|| self.invalid("a date"))
    }

    pub fn mask(&self, values: &[Value]) -> Result<Vec<bool>> {
        use FilterCondition::*;
        let per_value = |f: &dyn Fn(&Value) -> bool| values.iter().map(f).collect::<Vec<bool>>();
        Ok(match self.condition {
            Contains | StringDoesNotContain => {
                let needle = self.text()?.to_lowercase();
                let negate = self.condition == StringDoesNotContain;
                per_value(&|v| {
                    let hit = v.as_str().map(|s| s.to_lowercase().contains(&needle)).unwrap_or(false);
                    hit != negate
                })
            }
            StringExactly | StringNotExactly => {
                let target = self.text()?;
                let negate = self.condition == StringNotExactly;
                per_value(&|v| (v.as_str() == Some(target.as_str())) != negate)
            }
            StringStartsWith => {
                let prefix = self.text()?;
                per_value(&|v| v.as_str().map(|s| s.starts_with(&prefix)).unwrap_or(false))
            }
            StringEndsWith => {
                let suffix = self.text()?;
                per_value(&|v| v.as_str().map(|s| s.ends_with(&suffix)).unwrap_or(false))
            }
            Greater | GreaterThanOrEqual | Less | LessThanOrEqual | NumberExactly => {
                let target = self.number()?;
                let condition = self.condition;
                per_value(&|v| match numeric(v) {
                    Some(x) => match condition {
                        Greater => x > target,
                        GreaterThanOrEqual => x >= target,
                        Less => x < target,
                        LessThanOrEqual => x <= target,
                        _ => x == target,
                    },
                    None => false,
                })
            }
            NumberNotExactly => {
                let target = self.number()?;
                per_value(&|v| numeric(v) != Some(target))
            }
            BooleanIsTrue => per_value(&|v| matches!(v, Value::Bool(true))),
            BooleanIsFalse => per_value(&|v| matches!(v, Value::Bool(false))),
            DatetimeExactly | DatetimeNotExactly | DatetimeGreater | DatetimeGreaterThanOrEqual
            | DatetimeLess | DatetimeLessThanOrEqual => {
                let target = self.datetime()?;
                let condition = self.condition;
                per_value(&|v| match v {
                    Value::Timestamp(ts) => match condition {
                        DatetimeExactly => *ts == target,
                        DatetimeNotExactly => *ts != target,
                        DatetimeGreater => *ts > target,
                        DatetimeGreaterThanOrEqual => *ts >= target,
                        DatetimeLess => *ts < target,
                        _ => *ts <= target,
                    },
                    _ => condition == DatetimeNotExactly,
                })
            }
            Empty => per_value(&|v| v.is_missing()),
            NotEmpty => per_value(&|v| !v.is_missing()),
            MostFrequent | LeastFrequent => {
                let keep = frequent_values(values, self.count()?, self.condition == MostFrequent);
                per_value(&|v| keep.contains(v))
            }
            NumberHighest | NumberLowest => {
                let n = self.count()?;
                let mut numbers: Vec<f64> = values.iter().filter_map(numeric).collect();
                numbers.sort_by(|a, b| a.total_cmp(b));
                if self.condition == NumberHighest {
                    numbers.reverse();
                }
                numbers.truncate(n);
                per_value(&|v| numeric(v).map(|x| numbers.contains(&x)).unwrap_or(false))
            }
        })
    }

    fn to_code(&self, column: &str) -> Result<String> {
        use FilterCondition::*;
        Ok(match self.condition {
            Contains => format!(
                "{}.str.contains({}, na=False, case=False, regex=False)",
                column,
                python_string(&self.text()?)
            ),
            StringDoesNotContain => format!(
                "~{}.str.contains({}, na=False, case=False, regex=False)",
                column,
                python_string(&self.text()?)
            ),
            StringExactly => format!("{} == {}", column, python_string(&self.text()?)),
            StringNotExactly => format!("{} != {}", column, python_string(&self.text()?)),
            StringStartsWith => format!(
                "{}.str.startswith({}, na=False)",
                column,
                python_string(&self.text()?)
            ),
            StringEndsWith => format!(
                "{}.str.endswith({}, na=False)",
                column,
                python_string(&self.text()?)
            ),
            Greater => format!("{} > {}", column, Value::float(self.number()?).to_code()),
            GreaterThanOrEqual => format!("{} >= {}", column, Value::float(self.number()?).to_code()),
            Less => format!("{} < {}", column, Value::float(self.number()?).to_code()),
            LessThanOrEqual => format!("{} <= {}", column, Value::float(self.number()?).to_code()),
            NumberExactly => format!("{} == {}", column, Value::float(self.number()?).to_code()),
            NumberNotExactly => format!("{} != {}", column, Value::float(self.number()?).to_code()),
            BooleanIsTrue => format!("{} == True", column),
            BooleanIsFalse => format!("{} == False", column),
            DatetimeExactly | DatetimeNotExactly | DatetimeGreater | DatetimeGreaterThanOrEqual
            | DatetimeLess | DatetimeLessThanOrEqual => {
                let op = match self.condition {
                    DatetimeExactly => "==",
                    DatetimeNotExactly => "!=",
                    DatetimeGreater => ">",
                    DatetimeGreaterThanOrEqual => ">=",
                    DatetimeLess => "<",
                    _ => "<=",
                };
                format!("{} {} {}", column, op, Value::Timestamp(self.datetime()?).to_code())
            }
            Empty => format!("{}.isna()", column),
            NotEmpty => format!("{}.notnull()", column),
            MostFrequent => format!(
                "{}.isin({}.value_counts().index.tolist()[:{}])",
                column,
                column,
                self.count()?
            ),
            LeastFrequent => format!(
                "{}.isin({}.value_counts(ascending=True).index.tolist()[:{}])",
                column,
                column,
                self.count()?
            ),
            NumberHighest => format!("{}.isin({}.nlargest({}))", column, column, self.count()?),
            NumberLowest => format!("{}.isin({}.nsmallest({}))", column, column, self.count()?),
        })
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) => value.as_f64(),
        _ => None,
    }
}

/// The `n` most (or least) frequent present values; ties keep first appearance.
fn frequent_values(values: &[Value], n: usize, most: bool) -> Vec<Value> {
    let mut counts: HashMap<&Value, (usize, usize)> = HashMap::new();
    for (i, value) in values.iter().enumerate() {
        if value.is_missing() {
            continue;
        }
        counts.entry(value).or_insert((0, i)).0 += 1;
    }
    let mut ranked: Vec<(&Value, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| {
        let by_count = if most { b.1 .0.cmp(&a.1 .0) } else { a.1 .0.cmp(&b.1 .0) };
        by_count.then(a.1 .1.cmp(&b.1 .1))
    });
    ranked.into_iter().take(n).map(|(v, _)| v.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filters(value: serde_json::Value) -> ColumnFilters {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_not_empty_mask_and_code() {
        let f = filters(json!({"operator": "and", "filters": [{"condition": "not_empty", "value": null}]}));
        let values = vec![Value::Int(1), Value::Missing, Value::Int(3)];
        assert_eq!(f.mask(&values).unwrap(), vec![true, false, true]);
        assert_eq!(f.to_code("df", "A").unwrap().unwrap(), "df['A'].notnull()");
    }

    #[test]
    fn test_or_group_inside_and() {
        let f = filters(json!({
            "operator": "and",
            "filters": [
                {"condition": "greater", "value": 0},
                {"operator": "or", "filters": [
                    {"condition": "less", "value": 2},
                    {"condition": "greater", "value": 9}
                ]}
            ]
        }));
        let values = vec![Value::Int(1), Value::Int(5), Value::Int(10), Value::Int(-1)];
        assert_eq!(f.mask(&values).unwrap(), vec![true, false, true, false]);
        assert_eq!(
            f.to_code("df", "A").unwrap().unwrap(),
            "(df['A'] > 0.0) & ((df['A'] < 2.0) | (df['A'] > 9.0))"
        );
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let f = filters(json!({"filters": [{"condition": "contains", "value": "AB"}]}));
        let values = vec![Value::str("xabx"), Value::str("nope"), Value::Int(1)];
        assert_eq!(f.mask(&values).unwrap(), vec![true, false, false]);
    }

    #[test]
    fn test_most_frequent_requires_full_table() {
        let f = filters(json!({"filters": [{"condition": "most_frequent", "value": 1}]}));
        assert!(f.requires_full_table());
        let values = vec![Value::str("a"), Value::str("b"), Value::str("b")];
        assert_eq!(f.mask(&values).unwrap(), vec![false, true, true]);
    }

    #[test]
    fn test_bad_value_is_invalid_arg() {
        let f = filters(json!({"filters": [{"condition": "greater", "value": "abc"}]}));
        let err = f.mask(&[Value::Int(1)]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArg);
    }
}

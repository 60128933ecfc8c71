//! Grouping a table into a new pivot table.

use super::{check_column, record, recorded, ExecutionData, TranspileContext, TypedStepPerformer};
use crate::codegen::chunks::StatementChunk;
use crate::codegen::{CodeChunk, TableSet};
use crate::error::{Result, SheetError};
use crate::state::State;
use crate::table::{range_index, Column, Table};
use crate::types::{python_string, ColumnId, TableSource, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const DESTINATION: &str = "destination_sheet_index";

pub struct Pivot;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    #[serde(rename = "count unique", alias = "nunique")]
    CountUnique,
    Std,
    First,
    Last,
}

impl Aggregation {
    pub fn pandas_name(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Median => "median",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
            Aggregation::CountUnique => "nunique",
            Aggregation::Std => "std",
            Aggregation::First => "first",
            Aggregation::Last => "last",
        }
    }

    /// Aggregate the present values of one group.
    fn apply(&self, values: &[&Value]) -> Value {
        let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_missing()).collect();
        let numbers = || present.iter().filter_map(|v| v.as_f64()).collect::<Vec<f64>>();
        match self {
            Aggregation::Sum => match int_sum(&present) {
                Some(total) => Value::Int(total),
                None => Value::float(numbers().iter().sum()),
            },
            Aggregation::Mean => {
                let n = numbers();
                if n.is_empty() {
                    Value::Missing
                } else {
                    Value::float(n.iter().sum::<f64>() / n.len() as f64)
                }
            }
            Aggregation::Median => {
                let mut n = numbers();
                if n.is_empty() {
                    return Value::Missing;
                }
                n.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                let mid = n.len() / 2;
                Value::float(if n.len() % 2 == 0 { (n[mid - 1] + n[mid]) / 2.0 } else { n[mid] })
            }
            Aggregation::Min | Aggregation::Max => {
                let pick = if *self == Aggregation::Min { Ordering::Less } else { Ordering::Greater };
                present
                    .iter()
                    .copied()
                    .fold(None::<&Value>, |best, v| match best {
                        Some(b) if v.compare(b) != Some(pick) => Some(b),
                        _ => Some(v),
                    })
                    .cloned()
                    .unwrap_or(Value::Missing)
            }
            Aggregation::Count => Value::Int(present.len() as i64),
            Aggregation::CountUnique => {
                let unique: HashSet<&Value> = present.iter().copied().collect();
                Value::Int(unique.len() as i64)
            }
            Aggregation::Std => {
                let n = numbers();
                if n.len() < 2 {
                    return Value::Missing;
                }
                let mean = n.iter().sum::<f64>() / n.len() as f64;
                let var = n.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n.len() - 1) as f64;
                Value::float(var.sqrt())
            }
            Aggregation::First => present.first().map(|v| (*v).clone()).unwrap_or(Value::Missing),
            Aggregation::Last => present.last().map(|v| (*v).clone()).unwrap_or(Value::Missing),
        }
    }
}

/// Exact sum of integer and boolean values; `None` when a value is of
/// another type or the sum overflows.
fn int_sum(values: &[&Value]) -> Option<i64> {
    values.iter().try_fold(0i64, |total, value| match value {
        Value::Int(i) => total.checked_add(*i),
        Value::Bool(b) => total.checked_add(i64::from(*b)),
        _ => None,
    })
}

/// Value columns and their aggregations, in the order the host sent them.
mod ordered_values {
    use super::Aggregation;
    use crate::types::ColumnId;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[(ColumnId, Vec<Aggregation>)], s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(values.iter().map(|(id, aggs)| (id, aggs)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(ColumnId, Vec<Aggregation>)>, D::Error> {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(d)?;
        map.into_iter()
            .map(|(id, aggs)| {
                let aggs: Vec<Aggregation> = serde_json::from_value(aggs).map_err(D::Error::custom)?;
                Ok((ColumnId::new(id), aggs))
            })
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PivotParams {
    pub sheet_index: usize,
    pub pivot_rows_column_ids: Vec<ColumnId>,
    #[serde(default)]
    pub pivot_columns_column_ids: Vec<ColumnId>,
    #[serde(with = "ordered_values")]
    pub values_column_ids_map: Vec<(ColumnId, Vec<Aggregation>)>,
    #[serde(default = "flatten_default")]
    pub flatten_column_headers: bool,
    /// Rewrite an earlier pivot table in place instead of adding a new one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_sheet_index: Option<usize>,
}

fn flatten_default() -> bool {
    true
}

fn order_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let order = x.compare(y).unwrap_or_else(|| x.to_string().cmp(&y.to_string()));
        if order != Ordering::Equal {
            return order;
        }
    }
    Ordering::Equal
}

/// Distinct keys of the given columns in sorted order, skipping keys with missing parts.
fn group_keys(columns: &[&[Value]], rows: usize) -> (Vec<Vec<Value>>, Vec<Option<Vec<Value>>>) {
    let per_row: Vec<Option<Vec<Value>>> = (0..rows)
        .map(|row| {
            let key: Vec<Value> = columns.iter().map(|c| c[row].clone()).collect();
            if key.iter().any(Value::is_missing) {
                None
            } else {
                Some(key)
            }
        })
        .collect();
    let mut unique: Vec<Vec<Value>> = per_row.iter().flatten().cloned().collect::<HashSet<_>>().into_iter().collect();
    unique.sort_by(|a, b| order_keys(a, b));
    (unique, per_row)
}

fn column_header(value: &str, agg: Aggregation, column_key: &[Value], flatten: bool) -> String {
    let mut parts = vec![value.to_string(), agg.pandas_name().to_string()];
    parts.extend(column_key.iter().map(|v| v.to_string()));
    if flatten {
        parts.join(" ")
    } else {
        let quoted: Vec<String> = parts.iter().map(|p| python_string(p)).collect();
        format!("({})", quoted.join(", "))
    }
}

fn pivot_table(state: &State, params: &PivotParams) -> Result<Table> {
    let sheet = params.sheet_index;
    let table = state.table(sheet)?;
    if params.values_column_ids_map.is_empty() && params.pivot_rows_column_ids.is_empty() {
        return Err(SheetError::invalid_arg("a pivot needs rows or values"));
    }
    let rows = table.num_rows();
    let row_columns = params
        .pivot_rows_column_ids
        .iter()
        .map(|id| state.column_values(sheet, id))
        .collect::<Result<Vec<_>>>()?;
    let col_columns = params
        .pivot_columns_column_ids
        .iter()
        .map(|id| state.column_values(sheet, id))
        .collect::<Result<Vec<_>>>()?;
    let (row_keys, row_of) = group_keys(&row_columns, rows);
    let (col_keys, col_of) = if col_columns.is_empty() {
        (vec![Vec::new()], vec![Some(Vec::new()); rows])
    } else {
        group_keys(&col_columns, rows)
    };

    // Each row key, or the single empty key when no rows are grouped.
    let row_keys = if row_columns.is_empty() { vec![Vec::new()] } else { row_keys };
    let row_position: HashMap<&Vec<Value>, usize> = row_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let col_position: HashMap<&Vec<Value>, usize> = col_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();
    let empty = Vec::new();
    let cell_of: Vec<Option<(usize, usize)>> = (0..rows)
        .map(|row| {
            let r = if row_columns.is_empty() { Some(&empty) } else { row_of[row].as_ref() };
            let c = col_of[row].as_ref();
            match (r, c) {
                (Some(r), Some(c)) => Some((row_position[r], col_position[c])),
                _ => None,
            }
        })
        .collect();

    let mut columns = Vec::new();
    for (i, header) in state.column_headers(sheet, &params.pivot_rows_column_ids)?.into_iter().enumerate() {
        columns.push(Column::new(header, row_keys.iter().map(|k| k[i].clone()).collect()));
    }
    for (id, aggregations) in &params.values_column_ids_map {
        let header = check_column(state, sheet, id)?;
        let values = state.column_values(sheet, id)?;
        let mut cells: Vec<Vec<Vec<&Value>>> = vec![vec![Vec::new(); col_keys.len()]; row_keys.len()];
        for (row, cell) in cell_of.iter().enumerate() {
            if let Some((r, c)) = cell {
                cells[*r][*c].push(&values[row]);
            }
        }
        for aggregation in aggregations {
            for (c, col_key) in col_keys.iter().enumerate() {
                let out: Vec<Value> = cells.iter().map(|group| aggregation.apply(&group[c])).collect();
                columns.push(Column::new(
                    column_header(&header, *aggregation, col_key, params.flatten_column_headers),
                    out,
                ));
            }
        }
    }
    let count = row_keys.len();
    Table::from_parts(range_index(count), columns)
}

impl TypedStepPerformer for Pivot {
    type Params = PivotParams;

    const STEP_TYPE: &'static str = "pivot";
    const STEP_VERSION: u32 = 1;
    const DISPLAY_NAME: &'static str = "Pivoted a Dataframe";

    fn execute(&self, prev: &State, params: &PivotParams) -> Result<(State, ExecutionData)> {
        let table = pivot_table(prev, params)?;
        debug!(sheet = params.sheet_index, rows = table.num_rows(), "pivoted table");
        let mut post = prev.clone();
        let destination = match params.destination_sheet_index {
            Some(index) if index < prev.num_tables() && index != params.sheet_index => {
                post.replace_table(index, table)?;
                index
            }
            _ => {
                let name = format!("{}_pivot", prev.table_name(params.sheet_index)?);
                post.add_table(table, &name, TableSource::Pivoted)?
            }
        };
        let mut data = ExecutionData::new();
        record(&mut data, DESTINATION, destination)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &PivotParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let sheet = params.sheet_index;
        let source = ctx.prev.table_name(sheet)?.to_string();
        let destination = recorded::<Option<usize>>(ctx.execution_data, DESTINATION)
            .unwrap_or_else(|| ctx.post.num_tables().saturating_sub(1));
        let new = ctx.post.table_name(destination)?.to_string();
        let rows = ctx.prev.column_headers(sheet, &params.pivot_rows_column_ids)?;
        let cols = ctx.prev.column_headers(sheet, &params.pivot_columns_column_ids)?;
        let mut used = rows.clone();
        used.extend(cols.iter().cloned());
        let mut aggfunc = Vec::new();
        for (id, aggregations) in &params.values_column_ids_map {
            let header = ctx.prev.column_header(sheet, id)?;
            if !used.contains(&header) {
                used.push(header.clone());
            }
            let names: Vec<String> = aggregations.iter().map(|a| python_string(a.pandas_name())).collect();
            aggfunc.push(format!("{}: [{}]", python_string(&header), names.join(", ")));
        }
        let quote = |items: &[String]| {
            let quoted: Vec<String> = items.iter().map(|h| python_string(h)).collect();
            format!("[{}]", quoted.join(", "))
        };

        let mut lines = vec![
            format!("tmp_df = {}[{}]", source, quote(&used)),
            format!(
                "pivot_table = tmp_df.pivot_table(\n    index={},\n    columns={},\n    aggfunc={{{}}}\n)",
                quote(&rows),
                quote(&cols),
                aggfunc.join(", ")
            ),
        ];
        if params.flatten_column_headers {
            lines.push(
                "pivot_table.columns = [' '.join([str(c) for c in col]).strip() for col in pivot_table.columns.values]"
                    .to_string(),
            );
        }
        lines.push(format!("{} = pivot_table.reset_index()", new));
        lines.push("del tmp_df, pivot_table".to_string());

        let description = format!("Pivoted {} into {}", source, new);
        let chunk = if params.destination_sheet_index == Some(destination) {
            StatementChunk::editing(Self::DISPLAY_NAME, description, destination, lines)
        } else {
            StatementChunk::creating(Self::DISPLAY_NAME, description, destination, lines)
        };
        Ok(vec![Box::new(chunk)])
    }

    fn modified_table_indexes(&self, params: &PivotParams) -> TableSet {
        match params.destination_sheet_index {
            Some(index) => TableSet::one(index),
            None => TableSet::none(),
        }
    }

    fn describe(&self, params: &PivotParams) -> String {
        format!(
            "Pivoted table {} on {} rows and {} values",
            params.sheet_index,
            params.pivot_rows_column_ids.len(),
            params.values_column_ids_map.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::Params;
    use serde_json::json;

    fn state() -> State {
        let mut state = State::default();
        let table = Table::from_columns(vec![
            ("A", vec![Value::Int(1), Value::Int(1), Value::Int(2)]),
            ("B", vec![Value::Int(10), Value::Int(20), Value::Int(30)]),
            ("C", vec![Value::str("x"), Value::str("y"), Value::str("x")]),
        ])
        .unwrap();
        state.add_table(table, "t", TableSource::Imported).unwrap();
        state
    }

    fn params(value: serde_json::Value) -> PivotParams {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_pivot_sums_by_row_key() {
        let p = params(json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "values_column_ids_map": {"B": ["sum"]}
        }));
        let (post, _) = Pivot.execute(&state(), &p).unwrap();
        let table = post.table(1).unwrap();
        assert_eq!(post.table_names[1], "t_pivot");
        assert_eq!(table.headers(), vec!["A", "B sum"]);
        assert_eq!(table.column("A").unwrap().values, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(table.column("B sum").unwrap().values, vec![Value::Int(30), Value::Int(30)]);
    }

    #[test]
    fn test_pivot_sum_keeps_large_integers_exact() {
        let big = 9_007_199_254_740_993;
        assert_eq!(
            Aggregation::Sum.apply(&[&Value::Int(big), &Value::Int(0), &Value::Bool(true)]),
            Value::Int(big + 1)
        );

        let overflowing = Aggregation::Sum.apply(&[&Value::Int(i64::MAX), &Value::Int(1)]);
        assert!(matches!(overflowing, Value::Float(f) if f > i64::MAX as f64 / 2.0));

        let mut state = State::default();
        let table = Table::from_columns(vec![
            ("A", vec![Value::Int(1), Value::Int(1)]),
            ("B", vec![Value::Int(big), Value::Int(0)]),
        ])
        .unwrap();
        state.add_table(table, "t", TableSource::Imported).unwrap();
        let p = params(json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "values_column_ids_map": {"B": ["sum"]}
        }));
        let (post, _) = Pivot.execute(&state, &p).unwrap();
        assert_eq!(post.table(1).unwrap().column("B sum").unwrap().values, vec![Value::Int(big)]);
    }

    #[test]
    fn test_pivot_column_axis_and_tuple_headers() {
        let p = params(json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "pivot_columns_column_ids": ["C"],
            "values_column_ids_map": {"B": ["count"]},
            "flatten_column_headers": false
        }));
        let (post, _) = Pivot.execute(&state(), &p).unwrap();
        let table = post.table(1).unwrap();
        assert_eq!(table.headers(), vec!["A", "('B', 'count', 'x')", "('B', 'count', 'y')"]);
        assert_eq!(
            table.column("('B', 'count', 'y')").unwrap().values,
            vec![Value::Int(1), Value::Int(0)]
        );
    }

    #[test]
    fn test_values_keep_host_order() {
        let raw: Params = match json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "values_column_ids_map": {"C": ["first"], "B": ["max", "mean"]}
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let (post, _) = crate::steps::StepPerformer::execute(&Pivot, &state(), &raw).unwrap();
        assert_eq!(
            post.table(1).unwrap().headers(),
            vec!["A", "C first", "B max", "B mean"]
        );
    }

    #[test]
    fn test_destination_replaces_existing_pivot() {
        let p = params(json!({
            "sheet_index": 0,
            "pivot_rows_column_ids": ["A"],
            "values_column_ids_map": {"B": ["sum"]}
        }));
        let (s, _) = Pivot.execute(&state(), &p).unwrap();
        let again = PivotParams {
            destination_sheet_index: Some(1),
            values_column_ids_map: vec![(ColumnId::new("B"), vec![Aggregation::Std])],
            ..p
        };
        let (post, _) = Pivot.execute(&s, &again).unwrap();
        assert_eq!(post.num_tables(), 2);
        assert_eq!(post.table(1).unwrap().headers(), vec!["A", "B std"]);
    }
}

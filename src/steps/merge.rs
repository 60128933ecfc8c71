//! Joining two tables on key columns into a new table.

use super::{record, recorded, ExecutionData, TranspileContext, TypedStepPerformer};
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

const NEW_TABLE: &str = "new_sheet_index";

pub struct Merge;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeHow {
    /// Left join against the first match of each key on the right.
    Lookup,
    Inner,
    Outer,
    Left,
    Right,
    #[serde(alias = "unique in left")]
    UniqueInLeft,
    #[serde(alias = "unique in right")]
    UniqueInRight,
}

impl MergeHow {
    fn pandas(&self) -> &'static str {
        match self {
            MergeHow::Lookup | MergeHow::Left => "left",
            MergeHow::Inner => "inner",
            MergeHow::Outer => "outer",
            MergeHow::Right => "right",
            MergeHow::UniqueInLeft | MergeHow::UniqueInRight => "",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeParams {
    pub how: MergeHow,
    pub sheet_index_one: usize,
    pub sheet_index_two: usize,
    /// Pairs of (left key, right key).
    pub merge_key_column_ids: Vec<(ColumnId, ColumnId)>,
    pub selected_column_ids_one: Vec<ColumnId>,
    pub selected_column_ids_two: Vec<ColumnId>,
}

/// One side of a merge after projection and renaming.
struct Side {
    name: String,
    /// Headers as they appear in the source table.
    source_headers: Vec<String>,
    /// Headers as they appear in the result.
    headers: Vec<String>,
    key_positions: Vec<usize>,
    columns: Vec<Vec<Value>>,
    rows: usize,
}

impl Side {
    fn key(&self, row: usize) -> Vec<Value> {
        self.key_positions.iter().map(|&c| self.columns[c][row].clone()).collect()
    }

    fn non_key_positions(&self) -> Vec<usize> {
        (0..self.headers.len()).filter(|c| !self.key_positions.contains(c)).collect()
    }
}

/// Project a table onto its keys and selected columns, keeping table order.
fn project(state: &State, sheet: usize, keys: &[ColumnId], selected: &[ColumnId]) -> Result<Side> {
    let table = state.table(sheet)?;
    let key_headers = state.column_headers(sheet, keys)?;
    let selected_headers = state.column_headers(sheet, selected)?;
    let mut source_headers = Vec::new();
    for header in table.headers() {
        if key_headers.iter().any(|h| h == header) || selected_headers.iter().any(|h| h == header) {
            source_headers.push(header.to_string());
        }
    }
    let name = state.table_name(sheet)?.to_string();
    let mut columns = Vec::with_capacity(source_headers.len());
    for header in &source_headers {
        columns.push(table.values(&name, header)?.to_vec());
    }
    let key_positions = key_headers
        .iter()
        .map(|k| source_headers.iter().position(|h| h == k).unwrap_or(0))
        .collect();
    Ok(Side {
        name,
        headers: source_headers.clone(),
        source_headers,
        key_positions,
        columns,
        rows: table.num_rows(),
    })
}

/// Rename right keys to the left key headers and suffix clashing non-key headers.
fn align_headers(left: &mut Side, right: &mut Side) {
    for (l, r) in left.key_positions.iter().zip(&right.key_positions) {
        right.headers[*r] = left.headers[*l].clone();
    }
    let left_non_keys: HashSet<String> = left.non_key_positions().iter().map(|&c| left.headers[c].clone()).collect();
    let right_non_keys: HashSet<String> = right.non_key_positions().iter().map(|&c| right.headers[c].clone()).collect();
    let keys: HashSet<String> = left.key_positions.iter().map(|&c| left.headers[c].clone()).collect();
    for c in left.non_key_positions() {
        if right_non_keys.contains(&left.headers[c]) {
            left.headers[c] = format!("{}_{}", left.headers[c], left.name);
        }
    }
    for c in right.non_key_positions() {
        if left_non_keys.contains(&right.headers[c]) || keys.contains(&right.headers[c]) {
            right.headers[c] = format!("{}_{}", right.headers[c], right.name);
        }
    }
}

/// Row pairs of the join; `None` marks a side with no matching row.
fn join_rows(left: &Side, right: &Side, how: MergeHow) -> Vec<(Option<usize>, Option<usize>)> {
    let mut right_rows: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
    for row in 0..right.rows {
        right_rows.entry(right.key(row)).or_default().push(row);
    }
    let mut left_keys: HashSet<Vec<Value>> = HashSet::new();
    for row in 0..left.rows {
        left_keys.insert(left.key(row));
    }

    let left_join = |first_only: bool| {
        let mut pairs = Vec::new();
        for row in 0..left.rows {
            match right_rows.get(&left.key(row)) {
                Some(matches) if first_only => pairs.push((Some(row), Some(matches[0]))),
                Some(matches) => pairs.extend(matches.iter().map(|&m| (Some(row), Some(m)))),
                None => pairs.push((Some(row), None)),
            }
        }
        pairs
    };

    match how {
        MergeHow::Lookup => left_join(true),
        MergeHow::Left => left_join(false),
        MergeHow::Inner => left_join(false).into_iter().filter(|(_, r)| r.is_some()).collect(),
        MergeHow::Right => {
            let mut left_rows: HashMap<Vec<Value>, Vec<usize>> = HashMap::new();
            for row in 0..left.rows {
                left_rows.entry(left.key(row)).or_default().push(row);
            }
            let mut pairs = Vec::new();
            for row in 0..right.rows {
                match left_rows.get(&right.key(row)) {
                    Some(matches) => pairs.extend(matches.iter().map(|&m| (Some(m), Some(row)))),
                    None => pairs.push((None, Some(row))),
                }
            }
            pairs
        }
        MergeHow::Outer => {
            let mut pairs = left_join(false);
            pairs.extend(
                (0..right.rows)
                    .filter(|&row| !left_keys.contains(&right.key(row)))
                    .map(|row| (None, Some(row))),
            );
            let key_of = |pair: &(Option<usize>, Option<usize>)| match pair {
                (Some(l), _) => left.key(*l),
                (None, Some(r)) => right.key(*r),
                (None, None) => Vec::new(),
            };
            pairs.sort_by(|a, b| compare_keys(&key_of(a), &key_of(b)));
            pairs
        }
        MergeHow::UniqueInLeft => (0..left.rows)
            .filter(|&row| !right_rows.contains_key(&left.key(row)))
            .map(|row| (Some(row), None))
            .collect(),
        MergeHow::UniqueInRight => (0..right.rows)
            .filter(|&row| !left_keys.contains(&right.key(row)))
            .map(|row| (None, Some(row)))
            .collect(),
    }
}

/// Lexicographic key order with missing values last.
fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let order = match (x.is_missing(), y.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => x.compare(y).unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        };
        if order != Ordering::Equal {
            return order;
        }
    }
    Ordering::Equal
}

fn merged_table(left: &Side, right: &Side, how: MergeHow) -> Result<Table> {
    let pairs = join_rows(left, right, how);
    let mut columns = Vec::new();
    let take = |side: &Side, c: usize, pick: &dyn Fn(&(Option<usize>, Option<usize>)) -> Option<usize>| -> Vec<Value> {
        pairs
            .iter()
            .map(|pair| pick(pair).map(|row| side.columns[c][row].clone()).unwrap_or(Value::Missing))
            .collect()
    };

    match how {
        MergeHow::UniqueInLeft => {
            for c in 0..left.headers.len() {
                columns.push(Column::new(left.source_headers[c].clone(), take(left, c, &|p| p.0)));
            }
        }
        MergeHow::UniqueInRight => {
            for c in 0..right.headers.len() {
                columns.push(Column::new(right.source_headers[c].clone(), take(right, c, &|p| p.1)));
            }
        }
        _ => {
            for c in 0..left.headers.len() {
                let values = match left.key_positions.iter().position(|&k| k == c) {
                    // Key columns fall back to the right side's key on unmatched right rows.
                    Some(k) => {
                        let r = right.key_positions[k];
                        pairs
                            .iter()
                            .map(|pair| match pair {
                                (Some(row), _) => left.columns[c][*row].clone(),
                                (None, Some(row)) => right.columns[r][*row].clone(),
                                (None, None) => Value::Missing,
                            })
                            .collect()
                    }
                    None => take(left, c, &|p| p.0),
                };
                columns.push(Column::new(left.headers[c].clone(), values));
            }
            for c in right.non_key_positions() {
                columns.push(Column::new(right.headers[c].clone(), take(right, c, &|p| p.1)));
            }
        }
    }
    Table::from_parts(range_index(pairs.len()), columns)
}

fn sides(state: &State, params: &MergeParams) -> Result<(Side, Side)> {
    if params.merge_key_column_ids.is_empty() && !matches!(params.how, MergeHow::UniqueInLeft | MergeHow::UniqueInRight)
    {
        return Err(SheetError::invalid_arg("a merge needs at least one pair of key columns"));
    }
    let (left_keys, right_keys): (Vec<ColumnId>, Vec<ColumnId>) = params.merge_key_column_ids.iter().cloned().unzip();
    let mut left = project(state, params.sheet_index_one, &left_keys, &params.selected_column_ids_one)?;
    let mut right = project(state, params.sheet_index_two, &right_keys, &params.selected_column_ids_two)?;
    if params.sheet_index_one == params.sheet_index_two {
        right.name = format!("{}_2", right.name);
    }
    align_headers(&mut left, &mut right);
    Ok((left, right))
}

fn list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|h| python_string(h)).collect();
    format!("[{}]", quoted.join(", "))
}

impl TypedStepPerformer for Merge {
    type Params = MergeParams;

    const STEP_TYPE: &'static str = "merge";
    const STEP_VERSION: u32 = 2;
    const DISPLAY_NAME: &'static str = "Merged Dataframes";

    fn execute(&self, prev: &State, params: &MergeParams) -> Result<(State, ExecutionData)> {
        let (left, right) = sides(prev, params)?;
        let table = merged_table(&left, &right, params.how)?;
        debug!(how = ?params.how, rows = table.num_rows(), "merged tables");
        let mut post = prev.clone();
        let index = post.add_table(table, "df_merge", TableSource::Merged)?;
        let mut data = ExecutionData::new();
        record(&mut data, NEW_TABLE, index)?;
        Ok((post, data))
    }

    fn transpile(&self, ctx: &TranspileContext<'_>, params: &MergeParams) -> Result<Vec<Box<dyn CodeChunk>>> {
        let (left, right) = sides(ctx.prev, params)?;
        let index = recorded::<Option<usize>>(ctx.execution_data, NEW_TABLE)
            .unwrap_or_else(|| ctx.post.num_tables().saturating_sub(1));
        let new = ctx.post.table_name(index)?.to_string();
        let left_name = ctx.prev.table_name(params.sheet_index_one)?.to_string();
        let right_name = ctx.prev.table_name(params.sheet_index_two)?.to_string();
        let left_tmp = format!("{}_tmp", left_name);
        let right_tmp = format!("{}_tmp", right_name);

        let mut lines = vec![format!("{} = {}[{}]", left_tmp, left_name, list(&left.source_headers))];
        let key_renames: Vec<String> = right
            .key_positions
            .iter()
            .filter(|&&c| right.source_headers[c] != right.headers[c])
            .map(|&c| format!("{}: {}", python_string(&right.source_headers[c]), python_string(&right.headers[c])))
            .collect();
        let mut right_line = format!("{} = {}[{}]", right_tmp, right_name, list(&right.source_headers));
        if !key_renames.is_empty() {
            right_line.push_str(&format!(".rename(columns={{{}}})", key_renames.join(", ")));
        }
        lines.push(right_line);

        let keys: Vec<String> = left.key_positions.iter().map(|&c| left.headers[c].clone()).collect();
        if params.how == MergeHow::Lookup {
            lines.push(format!(
                "{r} = {r}.drop_duplicates(subset={k})",
                r = right_tmp,
                k = list(&keys)
            ));
        }
        match params.how {
            MergeHow::UniqueInLeft | MergeHow::UniqueInRight => {
                let (keep, other) = if params.how == MergeHow::UniqueInLeft {
                    (&left_tmp, &right_tmp)
                } else {
                    (&right_tmp, &left_tmp)
                };
                lines.push(format!(
                    "{new} = {keep}[~{keep}.set_index({k}).index.isin({other}.set_index({k}).index)].reset_index(drop=True)",
                    new = new,
                    keep = keep,
                    other = other,
                    k = list(&keys)
                ));
            }
            how => lines.push(format!(
                "{} = {}.merge({}, on={}, how='{}', suffixes=[{}, {}])",
                new,
                left_tmp,
                right_tmp,
                list(&keys),
                how.pandas(),
                python_string(&format!("_{}", left.name)),
                python_string(&format!("_{}", right.name))
            )),
        }
        lines.push(format!("del {}, {}", left_tmp, right_tmp));

        Ok(vec![Box::new(StatementChunk::creating(
            Self::DISPLAY_NAME,
            format!("Merged {} and {} into {}", left_name, right_name, new),
            index,
            lines,
        ))])
    }

    fn modified_table_indexes(&self, _: &MergeParams) -> TableSet {
        TableSet::none()
    }

    fn describe(&self, params: &MergeParams) -> String {
        format!(
            "Merged tables {} and {} on {} keys",
            params.sheet_index_one,
            params.sheet_index_two,
            params.merge_key_column_ids.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        let mut state = State::default();
        let left = Table::from_columns(vec![
            ("K", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ("V", vec![Value::str("a"), Value::str("b"), Value::str("c")]),
        ])
        .unwrap();
        let right = Table::from_columns(vec![
            ("K", vec![Value::Int(2), Value::Int(3), Value::Int(4)]),
            ("W", vec![Value::str("x"), Value::str("y"), Value::str("z")]),
        ])
        .unwrap();
        state.add_table(left, "L", TableSource::Imported).unwrap();
        state.add_table(right, "R", TableSource::Imported).unwrap();
        state
    }

    fn params(how: MergeHow) -> MergeParams {
        MergeParams {
            how,
            sheet_index_one: 0,
            sheet_index_two: 1,
            merge_key_column_ids: vec![(ColumnId::new("K"), ColumnId::new("K"))],
            selected_column_ids_one: vec![ColumnId::new("V")],
            selected_column_ids_two: vec![ColumnId::new("W")],
        }
    }

    fn merged(how: MergeHow) -> Table {
        let (post, _) = Merge.execute(&state(), &params(how)).unwrap();
        post.table(2).unwrap().clone()
    }

    #[test]
    fn test_lookup_keeps_every_left_row() {
        let table = merged(MergeHow::Lookup);
        assert_eq!(table.headers(), vec!["K", "V", "W"]);
        assert_eq!(
            table.column("W").unwrap().values,
            vec![Value::Missing, Value::str("x"), Value::str("y")]
        );
    }

    #[test]
    fn test_inner_keeps_matches_only() {
        let table = merged(MergeHow::Inner);
        assert_eq!(table.column("K").unwrap().values, vec![Value::Int(2), Value::Int(3)]);
        assert_eq!(table.column("V").unwrap().values, vec![Value::str("b"), Value::str("c")]);
    }

    #[test]
    fn test_outer_fills_keys_from_right() {
        let table = merged(MergeHow::Outer);
        assert_eq!(
            table.column("K").unwrap().values,
            vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]
        );
        assert_eq!(table.column("V").unwrap().values[3], Value::Missing);
    }

    #[test]
    fn test_unique_in_left_and_right() {
        assert_eq!(merged(MergeHow::UniqueInLeft).column("K").unwrap().values, vec![Value::Int(1)]);
        assert_eq!(merged(MergeHow::UniqueInRight).column("K").unwrap().values, vec![Value::Int(4)]);
    }

    #[test]
    fn test_clashing_headers_get_table_suffixes() {
        let mut s = state();
        let id = s.column_id(1, "W").unwrap();
        s.rename_column(1, &id, "V").unwrap();
        let mut p = params(MergeHow::Left);
        p.selected_column_ids_two = vec![id];
        let (post, _) = Merge.execute(&s, &p).unwrap();
        assert_eq!(post.table(2).unwrap().headers(), vec!["K", "V_L", "V_R"]);
        assert_eq!(post.table_names[2], "df_merge");
    }

    #[test]
    fn test_missing_keys_rejected() {
        let mut p = params(MergeHow::Inner);
        p.merge_key_column_ids.clear();
        assert!(Merge.execute(&state(), &p).is_err());
    }
}

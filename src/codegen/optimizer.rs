//! Fuses adjacent chunks until no rewrite applies.

use super::chunk::{downcast, CodeChunk};
use super::chunks::RenameColumnsChunk;
use tracing::{debug, warn};

/// Passes before the optimizer gives up on reaching a fixpoint.
const MAX_PASSES: usize = 64;

/// Rewrites allowed within one pass.
const MAX_REWRITES_PER_PASS: usize = 100_000;

/// Alternate right-fusion and left-fusion passes until neither changes the list.
pub fn optimize(mut chunks: Vec<Box<dyn CodeChunk>>) -> Vec<Box<dyn CodeChunk>> {
    let before = chunks.len();
    for pass in 0..MAX_PASSES {
        let right = right_pass(&mut chunks);
        let left = left_pass(&mut chunks);
        if !right && !left {
            debug!(pass, before, after = chunks.len(), "optimized code chunks");
            return chunks;
        }
    }
    warn!(before, after = chunks.len(), "optimizer stopped before reaching a fixpoint");
    chunks
}

/// Move every column rename as far left as the chunks before it can be
/// rewritten under the new headers, so formulas and other column references
/// read with the headers a table ends up with. Runs whether or not the
/// script is optimized.
pub fn hoist_renames(mut chunks: Vec<Box<dyn CodeChunk>>) -> Vec<Box<dyn CodeChunk>> {
    let mut budget = MAX_REWRITES_PER_PASS;
    let mut i = 1;
    while i < chunks.len() && budget > 0 {
        let hoisted = if downcast::<RenameColumnsChunk>(chunks[i].as_ref()).is_some() {
            chunks[i].combine_left(chunks[i - 1].as_ref())
        } else {
            None
        };
        match hoisted {
            Some(replacement) => {
                chunks.splice(i - 1..i + 1, replacement);
                budget -= 1;
                i = (i - 1).max(1);
            }
            None => i += 1,
        }
    }
    chunks
}

fn right_pass(chunks: &mut Vec<Box<dyn CodeChunk>>) -> bool {
    let mut changed = false;
    let mut budget = MAX_REWRITES_PER_PASS;
    let mut i = 0;
    while i + 1 < chunks.len() && budget > 0 {
        match chunks[i].combine_right(chunks[i + 1].as_ref()) {
            Some(replacement) => {
                chunks.splice(i..i + 2, replacement);
                changed = true;
                budget -= 1;
                // The fused chunk may now combine with its left neighbour.
                i = i.saturating_sub(1);
            }
            None => i += 1,
        }
    }
    changed
}

fn left_pass(chunks: &mut Vec<Box<dyn CodeChunk>>) -> bool {
    let mut changed = false;
    let mut budget = MAX_REWRITES_PER_PASS;
    let mut i = 1;
    while i < chunks.len() && budget > 0 {
        match chunks[i].combine_left(chunks[i - 1].as_ref()) {
            Some(replacement) => {
                chunks.splice(i - 1..i + 1, replacement);
                changed = true;
                budget -= 1;
                // A hoisted chunk sits at i - 1 and may keep moving left.
                i = (i - 1).max(1);
            }
            None => i += 1,
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::chunks::{
        AddColumnChunk, ColumnHeaders, DeleteColumnsChunk, FilterChunk, FormulaLine, SetFormulaChunk, SortChunk,
        StatementChunk,
    };
    use crate::formula::{AppliedTo, BinaryOp, Expr};
    use crate::state::{ColumnFilters, Filter, FilterCondition, FilterItem};
    use crate::types::{ColumnId, Value};
    use proptest::prelude::*;
    use std::collections::HashMap;

    /// Headers each chunk reads, looked up through its own header map.
    fn reads(chunk: &dyn CodeChunk) -> Vec<String> {
        let deps = |expr: &Expr, headers: &ColumnHeaders| -> Vec<String> {
            expr.dependencies()
                .iter()
                .filter_map(|id| headers.0.get(id).cloned())
                .collect()
        };
        if let Some(set) = downcast::<SetFormulaChunk>(chunk) {
            let mut read = Vec::new();
            for line in &set.lines {
                read.extend(set.headers.0.get(&line.target).cloned());
                read.extend(deps(&line.expr, &set.headers));
            }
            read
        } else if let Some(add) = downcast::<AddColumnChunk>(chunk) {
            add.formula.as_ref().map(|e| deps(e, &add.headers)).unwrap_or_default()
        } else if let Some(sort) = downcast::<SortChunk>(chunk) {
            vec![sort.header.clone()]
        } else if let Some(filter) = downcast::<FilterChunk>(chunk) {
            vec![filter.header.clone()]
        } else if let Some(delete) = downcast::<DeleteColumnsChunk>(chunk) {
            delete.headers.clone()
        } else if let Some(rename) = downcast::<RenameColumnsChunk>(chunk) {
            rename.renames.iter().map(|(old, _)| old.clone()).collect()
        } else {
            Vec::new()
        }
    }

    /// Run the header effect of the chunks, failing when a chunk reads a
    /// header that does not exist at its position.
    fn final_headers(start: &[String], chunks: &[Box<dyn CodeChunk>]) -> std::result::Result<Vec<String>, String> {
        let mut headers = start.to_vec();
        for chunk in chunks {
            if let Some(missing) = reads(chunk.as_ref()).into_iter().find(|h| !headers.contains(h)) {
                return Err(format!("{} reads missing column {}", chunk.description_comment(), missing));
            }
            if let Some(add) = downcast::<AddColumnChunk>(chunk.as_ref()) {
                let header = add.headers.0[&add.id].clone();
                headers.insert(add.position.min(headers.len()), header);
            } else if let Some(delete) = downcast::<DeleteColumnsChunk>(chunk.as_ref()) {
                headers.retain(|h| !delete.headers.contains(h));
            } else if let Some(rename) = downcast::<RenameColumnsChunk>(chunk.as_ref()) {
                for h in headers.iter_mut() {
                    *h = crate::codegen::renamed(h, &rename.renames);
                }
            }
        }
        Ok(headers)
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize),
        Delete(usize),
        Rename(usize),
        Formula(usize, usize),
        Sort(usize),
        Filter(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..6).prop_map(Op::Add),
            (0usize..6).prop_map(Op::Delete),
            (0usize..6).prop_map(Op::Rename),
            ((0usize..6), (0usize..6)).prop_map(|(t, s)| Op::Formula(t, s)),
            (0usize..6).prop_map(Op::Sort),
            (0usize..6).prop_map(Op::Filter),
        ]
    }

    fn header_map(columns: &[(ColumnId, String)]) -> ColumnHeaders {
        ColumnHeaders(columns.iter().cloned().collect())
    }

    fn plus_one(source: &ColumnId) -> Expr {
        Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Column(source.clone())),
            right: Box::new(Expr::Literal(Value::Int(1))),
        }
    }

    fn not_empty() -> ColumnFilters {
        ColumnFilters {
            filters: vec![FilterItem::Filter(Filter {
                condition: FilterCondition::NotEmpty,
                value: serde_json::Value::Null,
            })],
            ..Default::default()
        }
    }

    /// A session of edits on table `df`: the starting headers, the chunks the
    /// edits produce, and the headers each column ends with.
    struct Session {
        start: Vec<String>,
        chunks: Vec<Box<dyn CodeChunk>>,
        last_headers: HashMap<ColumnId, String>,
    }

    fn chunks_for(ops: &[Op]) -> Session {
        let start: Vec<String> = vec!["A".into(), "B".into()];
        let mut columns: Vec<(ColumnId, String)> =
            start.iter().map(|h| (ColumnId::new(h.as_str()), h.clone())).collect();
        let mut chunks: Vec<Box<dyn CodeChunk>> = Vec::new();
        for (n, op) in ops.iter().enumerate() {
            if columns.is_empty() && !matches!(op, Op::Add(_)) {
                continue;
            }
            let len = columns.len().max(1);
            let pick = |i: &usize| i % len;
            match op {
                Op::Add(position) => {
                    let id = ColumnId::new(format!("new{}", n));
                    let position = position % (columns.len() + 1);
                    columns.insert(position, (id.clone(), format!("new{}", n)));
                    chunks.push(Box::new(AddColumnChunk {
                        table: 0,
                        table_name: "df".into(),
                        id,
                        position,
                        headers: header_map(&columns),
                        formula: None,
                        public_import: String::new(),
                    }));
                }
                Op::Delete(i) => {
                    let (_, header) = columns.remove(pick(i));
                    chunks.push(Box::new(DeleteColumnsChunk {
                        table: 0,
                        table_name: "df".into(),
                        headers: vec![header],
                    }));
                }
                Op::Rename(i) => {
                    let i = pick(i);
                    let new = format!("renamed{}", n);
                    let old = std::mem::replace(&mut columns[i].1, new.clone());
                    chunks.push(Box::new(RenameColumnsChunk {
                        table: 0,
                        table_name: "df".into(),
                        renames: vec![(old, new)],
                    }));
                }
                Op::Formula(target, source) => {
                    let target = columns[pick(target)].0.clone();
                    let source = columns[pick(source)].0.clone();
                    if target == source {
                        continue;
                    }
                    chunks.push(Box::new(SetFormulaChunk {
                        table: 0,
                        table_name: "df".into(),
                        lines: vec![FormulaLine {
                            target,
                            expr: plus_one(&source),
                            applied_to: AppliedTo::EntireColumn,
                        }],
                        headers: header_map(&columns),
                        public_import: String::new(),
                    }));
                }
                Op::Sort(i) => chunks.push(Box::new(SortChunk {
                    table: 0,
                    table_name: "df".into(),
                    header: columns[pick(i)].1.clone(),
                    ascending: true,
                })),
                Op::Filter(i) => chunks.push(Box::new(FilterChunk {
                    table: 0,
                    table_name: "df".into(),
                    header: columns[pick(i)].1.clone(),
                    filters: not_empty(),
                })),
            }
        }
        Session {
            start,
            chunks,
            last_headers: columns.into_iter().collect(),
        }
    }

    /// Every formula reading a surviving column uses that column's last header.
    fn formulas_use_last_headers(chunks: &[Box<dyn CodeChunk>], last: &HashMap<ColumnId, String>) -> bool {
        let uses_last = |expr: &Expr, headers: &ColumnHeaders| {
            expr.dependencies()
                .iter()
                .all(|id| last.get(id).map_or(true, |h| headers.0.get(id) == Some(h)))
        };
        chunks.iter().all(|chunk| {
            if let Some(set) = downcast::<SetFormulaChunk>(chunk.as_ref()) {
                set.lines.iter().all(|line| uses_last(&line.expr, &set.headers))
            } else if let Some(add) = downcast::<AddColumnChunk>(chunk.as_ref()) {
                add.formula.as_ref().map_or(true, |e| uses_last(e, &add.headers))
            } else {
                true
            }
        })
    }

    fn rename(old: &str, new: &str) -> Box<dyn CodeChunk> {
        Box::new(RenameColumnsChunk {
            table: 0,
            table_name: "df".into(),
            renames: vec![(old.into(), new.into())],
        })
    }

    fn formula_b_from_a() -> Box<dyn CodeChunk> {
        let columns = vec![(ColumnId::new("A"), "A".to_string()), (ColumnId::new("B"), "B".to_string())];
        Box::new(SetFormulaChunk {
            table: 0,
            table_name: "df".into(),
            lines: vec![FormulaLine {
                target: ColumnId::new("B"),
                expr: plus_one(&ColumnId::new("A")),
                applied_to: AppliedTo::EntireColumn,
            }],
            headers: header_map(&columns),
            public_import: String::new(),
        })
    }

    #[test]
    fn test_add_then_delete_leaves_nothing() {
        let session = chunks_for(&[Op::Add(2), Op::Delete(2)]);
        assert!(optimize(session.chunks).is_empty());
    }

    #[test]
    fn test_unrelated_chunks_are_kept() {
        let chunks: Vec<Box<dyn CodeChunk>> = vec![
            Box::new(StatementChunk::editing("Sorted", "Sorted df", 0, vec!["df = df.sort_values('A')".into()])),
            Box::new(DeleteColumnsChunk {
                table: 0,
                table_name: "df".into(),
                headers: vec!["A".into()],
            }),
        ];
        assert_eq!(optimize(chunks).len(), 2);
    }

    #[test]
    fn test_rename_moves_in_front_of_formula() {
        let hoisted = hoist_renames(vec![formula_b_from_a(), rename("A", "X")]);
        assert_eq!(hoisted.len(), 2);
        assert!(downcast::<RenameColumnsChunk>(hoisted[0].as_ref()).is_some());
        assert_eq!(hoisted[1].code().unwrap().0, vec!["df['B'] = df['X'] + 1"]);
    }

    #[test]
    fn test_rename_moves_past_sort_and_filter() {
        let chunks: Vec<Box<dyn CodeChunk>> = vec![
            formula_b_from_a(),
            Box::new(SortChunk {
                table: 0,
                table_name: "df".into(),
                header: "A".into(),
                ascending: false,
            }),
            Box::new(FilterChunk {
                table: 0,
                table_name: "df".into(),
                header: "B".into(),
                filters: not_empty(),
            }),
            rename("A", "X"),
        ];
        let hoisted = hoist_renames(chunks);
        assert!(downcast::<RenameColumnsChunk>(hoisted[0].as_ref()).is_some());
        assert_eq!(hoisted[1].code().unwrap().0, vec!["df['B'] = df['X'] + 1"]);
        assert!(hoisted[2].code().unwrap().0[0].contains("by='X'"));
    }

    #[test]
    fn test_rename_stops_at_opaque_statement() {
        let chunks: Vec<Box<dyn CodeChunk>> = vec![
            formula_b_from_a(),
            Box::new(StatementChunk::editing("Split", "Split A", 0, vec!["df['A_0'] = df['A']".into()])),
            rename("A", "X"),
        ];
        let hoisted = hoist_renames(chunks);
        assert!(downcast::<RenameColumnsChunk>(hoisted[2].as_ref()).is_some());
    }

    #[test]
    fn test_rename_passes_statement_reading_other_columns() {
        let dedupe = StatementChunk::editing(
            "Dropped duplicates",
            "Dropped duplicates in df",
            0,
            vec!["df = df.drop_duplicates(subset=['B'], keep='first')".into()],
        )
        .reading(["B"]);
        let hoisted = hoist_renames(vec![formula_b_from_a(), Box::new(dedupe.clone()), rename("A", "X")]);
        assert!(downcast::<RenameColumnsChunk>(hoisted[0].as_ref()).is_some());

        let blocked = hoist_renames(vec![formula_b_from_a(), Box::new(dedupe), rename("B", "Y")]);
        assert!(downcast::<RenameColumnsChunk>(blocked[2].as_ref()).is_some());
    }

    #[test]
    fn test_rename_never_moves_before_delete_of_its_target() {
        let chunks: Vec<Box<dyn CodeChunk>> = vec![
            Box::new(DeleteColumnsChunk {
                table: 0,
                table_name: "df".into(),
                headers: vec!["X".into()],
            }),
            rename("A", "X"),
        ];
        let hoisted = hoist_renames(chunks);
        assert!(downcast::<DeleteColumnsChunk>(hoisted[0].as_ref()).is_some());
    }

    proptest! {
        #[test]
        fn prop_optimized_chunks_reach_same_headers(ops in proptest::collection::vec(arb_op(), 0..30)) {
            let session = chunks_for(&ops);
            let expected = final_headers(&session.start, &session.chunks);
            prop_assert!(expected.is_ok(), "{:?}", expected);
            let optimized = optimize(session.chunks.clone());
            prop_assert!(optimized.len() <= session.chunks.len());
            prop_assert_eq!(final_headers(&session.start, &optimized), expected);
        }

        #[test]
        fn prop_hoisted_formulas_use_last_headers(ops in proptest::collection::vec(arb_op(), 0..30)) {
            let session = chunks_for(&ops);
            let expected = final_headers(&session.start, &session.chunks);

            let hoisted = hoist_renames(session.chunks.clone());
            prop_assert_eq!(final_headers(&session.start, &hoisted), expected.clone());
            prop_assert!(formulas_use_last_headers(&hoisted, &session.last_headers));

            let optimized = optimize(hoist_renames(session.chunks));
            prop_assert_eq!(final_headers(&session.start, &optimized), expected);
            prop_assert!(formulas_use_last_headers(&optimized, &session.last_headers));
        }
    }
}

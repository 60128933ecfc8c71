//! The per-table formula dependency graph.
//!
//! Edges are read straight from each formula's dependency set; nothing else is
//! stored, so there is no reverse index to keep consistent.

use super::ast::ColumnFormula;
use crate::types::ColumnId;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

/// Whether giving `target` the dependencies `deps` would close a cycle.
pub fn creates_cycle(
    formulas: &BTreeMap<ColumnId, ColumnFormula>,
    target: &ColumnId,
    deps: &BTreeSet<ColumnId>,
) -> bool {
    let mut stack: Vec<&ColumnId> = deps.iter().collect();
    let mut seen: BTreeSet<&ColumnId> = BTreeSet::new();
    while let Some(id) = stack.pop() {
        if id == target {
            return true;
        }
        if !seen.insert(id) {
            continue;
        }
        if let Some(formula) = formulas.get(id) {
            stack.extend(formula.dependencies.iter());
        }
    }
    false
}

/// A column on a dependency cycle, if there is one.
pub fn find_cycle(formulas: &BTreeMap<ColumnId, ColumnFormula>) -> Option<ColumnId> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a ColumnId,
        formulas: &'a BTreeMap<ColumnId, ColumnFormula>,
        marks: &mut HashMap<&'a ColumnId, Mark>,
    ) -> Option<ColumnId> {
        match marks.get(id) {
            Some(Mark::Visiting) => return Some(id.clone()),
            Some(Mark::Done) => return None,
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(formula) = formulas.get(id) {
            for dep in &formula.dependencies {
                if let Some(found) = visit(dep, formulas, marks) {
                    return Some(found);
                }
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    formulas.keys().find_map(|id| visit(id, formulas, &mut marks))
}

/// Formula columns that transitively read any of `changed`, in an order where
/// every column comes after the columns it reads. Ties go to the column that
/// sits further left in `column_order`.
pub fn dependents_in_order(
    formulas: &BTreeMap<ColumnId, ColumnFormula>,
    changed: &[ColumnId],
    column_order: &[ColumnId],
) -> Vec<ColumnId> {
    let changed_set: BTreeSet<&ColumnId> = changed.iter().collect();
    let mut affected: BTreeSet<&ColumnId> = BTreeSet::new();
    let mut queue: VecDeque<&ColumnId> = changed.iter().collect();
    while let Some(id) = queue.pop_front() {
        for (target, formula) in formulas {
            if formula.dependencies.contains(id)
                && !changed_set.contains(target)
                && affected.insert(target)
            {
                queue.push_back(target);
            }
        }
    }

    let position = |id: &ColumnId| column_order.iter().position(|c| c == id).unwrap_or(usize::MAX);
    let mut indegree: BTreeMap<&ColumnId, usize> = affected
        .iter()
        .map(|id| {
            let n = formulas[*id]
                .dependencies
                .iter()
                .filter(|d| affected.contains(d))
                .count();
            (*id, n)
        })
        .collect();

    let mut order = Vec::with_capacity(affected.len());
    loop {
        let next = indegree
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(id, _)| *id)
            .min_by_key(|id| position(id));
        let Some(next) = next else { break };
        indegree.remove(next);
        for (id, n) in indegree.iter_mut() {
            if formulas[*id].dependencies.contains(next) {
                *n -= 1;
            }
        }
        order.push(next.clone());
    }
    order
}

//! Parsed formulas.
//!
//! Expressions reference columns by [`ColumnId`], never by header, so a stored
//! formula survives renames. Headers are substituted back in only when the
//! formula is rendered, either as spreadsheet text or as generated code.

use crate::error::{Result, SheetError};
use crate::types::{python_string, ColumnId, IndexLabel, Value};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<BinaryOp> {
        Some(match symbol {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "&" => BinaryOp::Concat,
            "=" | "==" => BinaryOp::Eq,
            "<>" | "!=" => BinaryOp::Ne,
            ">" => BinaryOp::Gt,
            "<" => BinaryOp::Lt,
            ">=" => BinaryOp::Ge,
            "<=" => BinaryOp::Le,
            _ => return None,
        })
    }

    /// Spreadsheet spelling.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Gt => ">",
            BinaryOp::Lt => "<",
            BinaryOp::Ge => ">=",
            BinaryOp::Le => "<=",
        }
    }

    /// Binding power; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Ge | BinaryOp::Le => 1,
            BinaryOp::Concat => 2,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul | BinaryOp::Div => 4,
            BinaryOp::Pow => 5,
        }
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 1
    }
}

/// Precedence of unary minus; binds tighter than `^`, so `-2^2` is 4.
pub const UNARY_PRECEDENCE: u8 = 6;

/// A formula expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// The referenced column at the current row.
    Column(ColumnId),
    /// One cell pinned to an index label.
    Cell { column: ColumnId, label: IndexLabel },
    /// A window of `size` rows ending `offset` rows after the current row.
    Rolling {
        columns: Vec<ColumnId>,
        size: usize,
        offset: i64,
        /// Labels the range was written with, kept for display.
        labels: (IndexLabel, IndexLabel),
    },
    /// Entire columns, e.g. `A:B`.
    Columns(Vec<ColumnId>),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Columns this expression reads.
    pub fn dependencies(&self) -> BTreeSet<ColumnId> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies(&self, deps: &mut BTreeSet<ColumnId>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Column(id) | Expr::Cell { column: id, .. } => {
                deps.insert(id.clone());
            }
            Expr::Rolling { columns, .. } | Expr::Columns(columns) => {
                deps.extend(columns.iter().cloned());
            }
            Expr::Unary { expr, .. } => expr.collect_dependencies(deps),
            Expr::Binary { left, right, .. } => {
                left.collect_dependencies(deps);
                right.collect_dependencies(deps);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(deps);
                }
            }
        }
    }

    /// Names of every function called.
    pub fn functions(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Expr::Call { name, .. } = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    pub fn has_rolling_range(&self) -> bool {
        let mut found = false;
        self.visit(&mut |expr| {
            if matches!(expr, Expr::Rolling { .. }) {
                found = true;
            }
        });
        found
    }

    /// Whether the generated code for this expression calls into the
    /// public function module.
    pub fn needs_function_module(&self) -> bool {
        let mut found = false;
        self.visit(&mut |expr| match expr {
            Expr::Call { .. } | Expr::Rolling { .. } => found = true,
            Expr::Binary {
                op: BinaryOp::Concat, ..
            } => found = true,
            _ => {}
        });
        found
    }

    fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        match self {
            Expr::Unary { expr, .. } => expr.visit(f),
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.visit(f);
                }
            }
            _ => {}
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Unary { .. } => UNARY_PRECEDENCE,
            _ => u8::MAX,
        }
    }

    // --- Rendering ---

    /// Spreadsheet text for the expression (without the leading `=`).
    pub fn to_formula(&self, headers: &HashMap<ColumnId, String>) -> Result<String> {
        let header = |id: &ColumnId| {
            headers
                .get(id)
                .cloned()
                .ok_or_else(|| SheetError::no_column("", id.as_str()))
        };
        Ok(match self {
            Expr::Literal(Value::Str(s)) => format!("\"{}\"", s.replace('"', "\"\"")),
            Expr::Literal(Value::Bool(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Expr::Literal(Value::Missing) => "None".to_string(),
            Expr::Literal(value) => value.to_string(),
            Expr::Column(id) => header(id)?,
            Expr::Cell { column, label } => format!("{}{}", header(column)?, label),
            Expr::Rolling { columns, labels, .. } => {
                let first = columns.first().map(header).transpose()?.unwrap_or_default();
                let last = columns.last().map(header).transpose()?.unwrap_or_default();
                format!("{}{}:{}{}", first, labels.0, last, labels.1)
            }
            Expr::Columns(columns) => {
                let first = columns.first().map(header).transpose()?.unwrap_or_default();
                let last = columns.last().map(header).transpose()?.unwrap_or_default();
                format!("{}:{}", first, last)
            }
            Expr::Unary { expr, .. } => {
                let inner = expr.to_formula(headers)?;
                if expr.precedence() < UNARY_PRECEDENCE {
                    format!("-({})", inner)
                } else {
                    format!("-{}", inner)
                }
            }
            Expr::Binary { op, left, right } => {
                let l = wrap(left.to_formula(headers)?, left.precedence() < op.precedence());
                let r = wrap(right.to_formula(headers)?, right.precedence() <= op.precedence());
                format!("{}{}{}", l, op.symbol(), r)
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| a.to_formula(headers))
                    .collect::<Result<Vec<_>>>()?;
                format!("{}({})", name, args.join(", "))
            }
        })
    }

    /// Python expression for the formula, reading columns from `table`.
    pub fn to_code(&self, table: &str, headers: &HashMap<ColumnId, String>) -> Result<String> {
        let header = |id: &ColumnId| {
            headers
                .get(id)
                .map(|h| python_string(h))
                .ok_or_else(|| SheetError::no_column(table, id.as_str()))
        };
        Ok(match self {
            Expr::Literal(value) => value.to_code(),
            Expr::Column(id) => format!("{}[{}]", table, header(id)?),
            Expr::Cell { column, label } => {
                format!("{}.loc[{}, {}]", table, label.to_code(), header(column)?)
            }
            Expr::Rolling {
                columns,
                size,
                offset,
                ..
            } => {
                let cols = columns.iter().map(header).collect::<Result<Vec<_>>>()?;
                format!(
                    "RollingRange({}[[{}]], {}, {})",
                    table,
                    cols.join(", "),
                    size,
                    offset
                )
            }
            Expr::Columns(columns) => {
                let cols = columns.iter().map(header).collect::<Result<Vec<_>>>()?;
                format!("{}[[{}]]", table, cols.join(", "))
            }
            Expr::Unary { expr, .. } => {
                let inner = expr.to_code(table, headers)?;
                if matches!(**expr, Expr::Literal(_) | Expr::Column(_) | Expr::Call { .. }) {
                    format!("-{}", inner)
                } else {
                    format!("-({})", inner)
                }
            }
            Expr::Binary { op, left, right } => {
                let l = left.to_code(table, headers)?;
                let r = right.to_code(table, headers)?;
                match op {
                    BinaryOp::Concat => format!("CONCAT({}, {})", l, r),
                    _ => {
                        // Comparisons chain in Python, so they are always wrapped.
                        let l = wrap(l, code_needs_parens(left, *op, false));
                        let r = wrap(r, code_needs_parens(right, *op, true));
                        format!("{} {} {}", l, python_operator(*op), r)
                    }
                }
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|a| a.to_code(table, headers))
                    .collect::<Result<Vec<_>>>()?;
                format!("{}({})", name, args.join(", "))
            }
        })
    }
}

fn wrap(s: String, parens: bool) -> String {
    if parens {
        format!("({})", s)
    } else {
        s
    }
}

fn python_operator(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Pow => "**",
        BinaryOp::Concat => "+",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Gt => ">",
        BinaryOp::Lt => "<",
        BinaryOp::Ge => ">=",
        BinaryOp::Le => "<=",
    }
}

fn code_needs_parens(child: &Expr, parent: BinaryOp, is_right: bool) -> bool {
    match child {
        Expr::Binary { op, .. } => {
            op.is_comparison()
                || parent.is_comparison()
                || op.precedence() < parent.precedence()
                || (is_right && op.precedence() == parent.precedence())
                || parent == BinaryOp::Pow
        }
        Expr::Unary { .. } => parent == BinaryOp::Pow,
        _ => false,
    }
}

/// Which rows a formula writes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppliedTo {
    #[default]
    EntireColumn,
    SpecificIndexLabels { index_labels: Vec<IndexLabel> },
}

/// A formula attached to a column.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnFormula {
    /// The text as the user entered it.
    pub formula: String,
    pub expr: Expr,
    pub applied_to: AppliedTo,
    /// Row the formula was written at; rolling ranges are relative to it.
    pub formula_label: IndexLabel,
    pub dependencies: BTreeSet<ColumnId>,
    /// Pinned value of `NOW()`.
    pub evaluation_time: NaiveDateTime,
}

impl ColumnFormula {
    /// Spreadsheet text against the given headers.
    pub fn display(&self, headers: &HashMap<ColumnId, String>) -> String {
        self.expr
            .to_formula(headers)
            .map(|text| format!("={}", text))
            .unwrap_or_else(|_| self.formula.clone())
    }
}

//! Precedence-climbing parser from tokens to [`Expr`].

use super::ast::{BinaryOp, Expr, UnaryOp};
use super::tokenizer::{tokenize, Token, TokenType};
use crate::column_ids::SheetColumnIds;
use crate::error::{Result, SheetError};
use crate::types::{ColumnId, IndexLabel, Value};

/// What the parser needs to know about the table a formula is written in.
pub struct ParseContext<'a> {
    pub column_ids: &'a SheetColumnIds,
    pub index: &'a [IndexLabel],
    /// Row the formula is written at.
    pub formula_label: &'a IndexLabel,
}

struct Parser<'a> {
    formula: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a ParseContext<'a>,
}

/// Parse `formula` into an expression over column ids.
pub fn parse_formula(formula: &str, ctx: &ParseContext<'_>) -> Result<Expr> {
    let headers: Vec<String> = ctx
        .column_ids
        .headers()
        .into_iter()
        .map(str::to_string)
        .collect();
    let tokens = tokenize(formula, &headers, ctx.index)?;
    let mut parser = Parser {
        formula,
        tokens,
        pos: 0,
        ctx,
    };
    let expr = parser.expression(0)?;
    if let Some(token) = parser.peek() {
        return Err(parser.invalid(format!("Unexpected '{}'.", token.value)));
    }
    Ok(expr)
}

impl<'a> Parser<'a> {
    fn invalid(&self, message: impl Into<String>) -> SheetError {
        SheetError::InvalidFormula {
            formula: self.formula.to_string(),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, token_type: TokenType, what: &str) -> Result<()> {
        match self.next() {
            Some(token) if token.token_type == token_type => Ok(()),
            Some(token) => Err(self.invalid(format!("Expected {} but found '{}'.", what, token.value))),
            None => Err(self.invalid(format!("Expected {} at the end of the formula.", what))),
        }
    }

    fn peek_binary_op(&self) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token {
                token_type: TokenType::Operator,
                value,
                ..
            }) => BinaryOp::from_symbol(value),
            _ => None,
        }
    }

    /// All binary operators are left associative.
    fn expression(&mut self, min_precedence: u8) -> Result<Expr> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_binary_op() {
            if op.precedence() < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.expression(op.precedence() + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if let Some(token) = self.peek() {
            if token.token_type == TokenType::Operator && (token.value == "-" || token.value == "+") {
                let negate = token.value == "-";
                self.pos += 1;
                // Unary minus binds tighter than every binary operator.
                let operand = self.unary()?;
                return Ok(if negate {
                    match operand {
                        Expr::Literal(Value::Int(i)) => Expr::Literal(Value::Int(-i)),
                        Expr::Literal(Value::Float(f)) => Expr::Literal(Value::Float(-f)),
                        other => Expr::Unary {
                            op: UnaryOp::Neg,
                            expr: Box::new(other),
                        },
                    }
                } else {
                    operand
                });
            }
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self
            .next()
            .ok_or_else(|| self.invalid("The formula ends unexpectedly."))?;
        match token.token_type {
            TokenType::Number => parse_number_literal(&token.value)
                .map(Expr::Literal)
                .ok_or_else(|| self.invalid(format!("Invalid number {}.", token.value))),
            TokenType::Text => Ok(Expr::Literal(Value::Str(token.value))),
            TokenType::Logical => Ok(Expr::Literal(Value::Bool(token.value == "TRUE"))),
            TokenType::NoneLiteral => Ok(Expr::Literal(Value::Missing)),
            TokenType::OpenParen => {
                let inner = self.expression(0)?;
                self.expect(TokenType::CloseParen, "')'")?;
                Ok(inner)
            }
            TokenType::Func => self.call(token.value),
            TokenType::Reference { header, label } => self.reference(header, label),
            _ => Err(self.invalid(format!("Unexpected '{}'.", token.value))),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(t) if t.token_type == TokenType::CloseParen) {
            self.pos += 1;
            return Ok(Expr::Call { name, args });
        }
        loop {
            args.push(self.expression(0)?);
            match self.next() {
                Some(t) if t.token_type == TokenType::Comma => continue,
                Some(t) if t.token_type == TokenType::CloseParen => break,
                Some(t) => return Err(self.invalid(format!("Expected ',' or ')' but found '{}'.", t.value))),
                None => return Err(self.invalid(format!("{} is missing a closing parenthesis.", name))),
            }
        }
        Ok(Expr::Call { name, args })
    }

    fn column_id(&self, header: &str) -> Result<ColumnId> {
        self.ctx
            .column_ids
            .get_id(header)
            .cloned()
            .ok_or_else(|| SheetError::no_column("", header))
    }

    fn reference(&mut self, header: String, label: Option<IndexLabel>) -> Result<Expr> {
        let start = self.column_id(&header)?;
        let is_range = matches!(self.peek(), Some(t) if t.token_type == TokenType::Colon);
        if !is_range {
            return Ok(match label {
                Some(label) => Expr::Cell { column: start, label },
                None => Expr::Column(start),
            });
        }
        self.pos += 1;
        let (end_header, end_label) = match self.next() {
            Some(Token {
                token_type: TokenType::Reference { header, label },
                ..
            }) => (header, label),
            _ => return Err(self.invalid("A range must end with a column reference.")),
        };
        let end = self.column_id(&end_header)?;
        let columns = self.columns_between(&start, &end);

        match (label, end_label) {
            (None, None) => Ok(Expr::Columns(columns)),
            (Some(start_label), Some(end_label)) => {
                let position = |label: &IndexLabel| {
                    self.ctx
                        .index
                        .iter()
                        .position(|l| l == label)
                        .ok_or_else(|| self.invalid(format!("No row {} in the index.", label)))
                };
                let start_pos = position(&start_label)?;
                let end_pos = position(&end_label)?;
                let current = position(self.ctx.formula_label)?;
                let (start_pos, end_pos) = (start_pos.min(end_pos), start_pos.max(end_pos));
                let (start_label, end_label) = (
                    self.ctx.index[start_pos].clone(),
                    self.ctx.index[end_pos].clone(),
                );
                Ok(Expr::Rolling {
                    columns,
                    size: end_pos - start_pos + 1,
                    offset: end_pos as i64 - current as i64,
                    labels: (start_label, end_label),
                })
            }
            _ => Err(self.invalid("Both ends of a range need a row, or neither.")),
        }
    }

    /// Columns from `start` to `end` inclusive, in table order.
    fn columns_between(&self, start: &ColumnId, end: &ColumnId) -> Vec<ColumnId> {
        let ids = self.ctx.column_ids.ids();
        let a = ids.iter().position(|id| id == start).unwrap_or(0);
        let b = ids.iter().position(|id| id == end).unwrap_or(a);
        let (a, b) = (a.min(b), a.max(b));
        ids[a..=b].to_vec()
    }
}

fn parse_number_literal(text: &str) -> Option<Value> {
    if text.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Int(i));
        }
    }
    text.parse::<f64>().ok().map(Value::float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column_ids::ColumnIdMap;

    fn parse(formula: &str, headers: &[&str], rows: i64, at: i64) -> Result<Expr> {
        let mut map = ColumnIdMap::new();
        map.add_sheet(headers).unwrap();
        let index: Vec<IndexLabel> = (0..rows).map(IndexLabel::Int).collect();
        let label = IndexLabel::Int(at);
        let ctx = ParseContext {
            column_ids: map.sheet(0).unwrap(),
            index: &index,
            formula_label: &label,
        };
        parse_formula(formula, &ctx)
    }

    #[test]
    fn test_precedence() {
        let expr = parse("=A+B*2", &["A", "B"], 1, 0).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Add, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = parse("=1-2-3", &[], 1, 0).unwrap();
        match expr {
            Expr::Binary { op: BinaryOp::Sub, left, right } => {
                assert!(matches!(*left, Expr::Binary { op: BinaryOp::Sub, .. }));
                assert_eq!(*right, Expr::Literal(Value::Int(3)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal_and_pow() {
        let expr = parse("=-2^2", &[], 1, 0).unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(Expr::Literal(Value::Int(-2))),
                right: Box::new(Expr::Literal(Value::Int(2))),
            }
        );
    }

    #[test]
    fn test_rolling_range_is_relative() {
        let expr = parse("=SUM(A0:A2)", &["A"], 5, 1).unwrap();
        match expr {
            Expr::Call { name, args } => {
                assert_eq!(name, "SUM");
                match &args[0] {
                    Expr::Rolling { size, offset, .. } => {
                        assert_eq!(*size, 3);
                        assert_eq!(*offset, 1);
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_multi_column_range() {
        let expr = parse("=SUM(A:C)", &["A", "B", "C"], 1, 0).unwrap();
        match expr {
            Expr::Call { args, .. } => match &args[0] {
                Expr::Columns(cols) => assert_eq!(cols.len(), 3),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("=A+", &["A"], 1, 0).is_err());
        assert!(parse("=SUM(A", &["A"], 1, 0).is_err());
        assert!(parse("=(A", &["A"], 1, 0).is_err());
        assert!(parse("=A A", &["A"], 1, 0).is_err());
    }
}

//! Formula tokenizer.
//!
//! Headers may contain spaces and punctuation, so references are found by
//! matching the longest known header at the current position rather than by
//! scanning identifiers.

use crate::error::{Result, SheetError};
use crate::types::IndexLabel;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("valid number regex"));

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*").expect("valid identifier regex"));

#[derive(Clone, Debug, PartialEq)]
pub enum TokenType {
    Number,
    Text,
    Logical,
    NoneLiteral,
    /// A header, optionally followed by a row label.
    Reference { header: String, label: Option<IndexLabel> },
    /// Function name; the opening parenthesis is consumed with it.
    Func,
    Operator,
    OpenParen,
    CloseParen,
    Comma,
    Colon,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub token_type: TokenType,
    /// Literal text, normalised: unquoted for strings, uppercased for functions.
    pub value: String,
    /// Byte offset in the formula.
    pub start: usize,
}

/// Splits a formula into tokens given the headers and index labels of its table.
pub struct Tokenizer<'a> {
    formula: &'a str,
    headers: Vec<&'a str>,
    labels: Vec<(String, IndexLabel)>,
    pos: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

impl<'a> Tokenizer<'a> {
    pub fn new(formula: &'a str, headers: &'a [String], labels: &[IndexLabel]) -> Self {
        let formula = formula.trim();
        let formula = formula.strip_prefix('=').unwrap_or(formula);
        let mut headers: Vec<&str> = headers
            .iter()
            .map(String::as_str)
            .filter(|h| !h.is_empty())
            .collect();
        // Longest first, so the first hit is the longest match.
        headers.sort_by_key(|h| std::cmp::Reverse(h.len()));
        let mut labels: Vec<(String, IndexLabel)> =
            labels.iter().map(|l| (l.to_string(), l.clone())).collect();
        labels.sort_by_key(|(text, _)| std::cmp::Reverse(text.len()));
        labels.dedup_by(|a, b| a.0 == b.0);
        Self {
            formula,
            headers,
            labels,
            pos: 0,
        }
    }

    fn invalid(&self, message: impl Into<String>) -> SheetError {
        SheetError::InvalidFormula {
            formula: format!("={}", self.formula),
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.formula[self.pos..]
    }

    fn prev_char(&self) -> Option<char> {
        self.formula[..self.pos].chars().next_back()
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let skipped = self.rest().len() - self.rest().trim_start().len();
            self.pos += skipped;
            if self.rest().is_empty() {
                break;
            }
            let token = self.next_token()?;
            tokens.push(token);
        }
        if tokens.is_empty() {
            return Err(self.invalid("The formula is empty."));
        }
        Ok(tokens)
    }

    fn push(&mut self, token_type: TokenType, value: String, len: usize) -> Token {
        let token = Token {
            token_type,
            value,
            start: self.pos,
        };
        self.pos += len;
        token
    }

    fn next_token(&mut self) -> Result<Token> {
        let rest = self.rest();
        let first = rest.chars().next().unwrap_or(' ');

        if first == '"' || first == '\'' {
            return self.string_literal(first);
        }

        // A header as long as the number it spells is a reference, so numeric
        // headers such as years stay usable.
        let number_len = NUMBER_RE.find(rest).map(|m| m.end()).unwrap_or(0);
        if let Some((header, label, len)) = self.reference_at() {
            if len >= number_len {
                return Ok(self.push(TokenType::Reference { header: header.clone(), label }, header, len));
            }
        }
        if number_len > 0 {
            let text = rest[..number_len].to_string();
            return Ok(self.push(TokenType::Number, text, number_len));
        }

        if let Some(m) = IDENTIFIER_RE.find(rest) {
            let word = m.as_str();
            let after = &rest[m.end()..];
            let trimmed = after.trim_start();
            if trimmed.starts_with('(') {
                let len = m.end() + (after.len() - trimmed.len()) + 1;
                return Ok(self.push(TokenType::Func, word.to_ascii_uppercase(), len));
            }
            match word.to_ascii_uppercase().as_str() {
                "TRUE" | "FALSE" => {
                    return Ok(self.push(TokenType::Logical, word.to_ascii_uppercase(), m.end()))
                }
                "NONE" => return Ok(self.push(TokenType::NoneLiteral, "None".into(), m.end())),
                _ => {
                    return Err(SheetError::no_column("", word));
                }
            }
        }

        for op in ["<=", ">=", "<>", "!=", "=="] {
            if rest.starts_with(op) {
                return Ok(self.push(TokenType::Operator, op.to_string(), 2));
            }
        }
        let token_type = match first {
            '+' | '-' | '*' | '/' | '^' | '&' | '=' | '<' | '>' => TokenType::Operator,
            '(' => TokenType::OpenParen,
            ')' => TokenType::CloseParen,
            ',' => TokenType::Comma,
            ':' => TokenType::Colon,
            other => return Err(self.invalid(format!("Unexpected character '{}'.", other))),
        };
        Ok(self.push(token_type, first.to_string(), first.len_utf8()))
    }

    fn string_literal(&mut self, quote: char) -> Result<Token> {
        let rest = self.rest();
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1).peekable();
        while let Some((i, c)) = chars.next() {
            if c == quote {
                // A doubled quote is an escaped quote.
                if let Some(&(_, next)) = chars.peek() {
                    if next == quote {
                        value.push(quote);
                        chars.next();
                        continue;
                    }
                }
                let len = i + c.len_utf8();
                return Ok(self.push(TokenType::Text, value, len));
            }
            value.push(c);
        }
        Err(self.invalid("A string is missing its closing quote."))
    }

    /// Longest header (plus optional row label) starting at the current position.
    fn reference_at(&self) -> Option<(String, Option<IndexLabel>, usize)> {
        let rest = self.rest();
        if self.prev_char().map(is_word_char).unwrap_or(false) {
            return None;
        }
        for header in &self.headers {
            if !rest.starts_with(header) {
                continue;
            }
            let after = &rest[header.len()..];
            let next = after.chars().next();
            let header_ends_word = !header.chars().next_back().map(is_word_char).unwrap_or(false);
            if next.is_none() || header_ends_word || !next.map(is_word_char).unwrap_or(false) {
                // A header that is also a function name, followed by '(', is a call.
                if after.trim_start().starts_with('(') && IDENTIFIER_RE.is_match(header) {
                    continue;
                }
                return Some((header.to_string(), None, header.len()));
            }
            for (text, label) in &self.labels {
                if !after.starts_with(text.as_str()) {
                    continue;
                }
                let boundary = after[text.len()..].chars().next();
                if !boundary.map(is_word_char).unwrap_or(false) {
                    return Some((header.to_string(), Some(label.clone()), header.len() + text.len()));
                }
            }
        }
        None
    }
}

/// Tokenize a formula against the given headers and index labels.
pub fn tokenize(formula: &str, headers: &[String], labels: &[IndexLabel]) -> Result<Vec<Token>> {
    Tokenizer::new(formula, headers, labels).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn labels(n: i64) -> Vec<IndexLabel> {
        (0..n).map(IndexLabel::Int).collect()
    }

    #[test]
    fn test_longest_header_wins() {
        let tokens = tokenize("=first name + first", &headers(&["first", "first name"]), &[]).unwrap();
        assert_eq!(
            tokens[0].token_type,
            TokenType::Reference {
                header: "first name".into(),
                label: None
            }
        );
        assert_eq!(tokens[1].value, "+");
        assert_eq!(tokens[2].value, "first");
    }

    #[test]
    fn test_function_and_literals() {
        let tokens = tokenize("=sum(A, 1.5, \"x\"\"y\", TRUE)", &headers(&["A"]), &[]).unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Func);
        assert_eq!(tokens[0].value, "SUM");
        assert_eq!(tokens[3].token_type, TokenType::Number);
        assert_eq!(tokens[5].token_type, TokenType::Text);
        assert_eq!(tokens[5].value, "x\"y");
        assert_eq!(tokens[7].token_type, TokenType::Logical);
    }

    #[test]
    fn test_cell_reference_with_label() {
        let tokens = tokenize("=A1:A2", &headers(&["A"]), &labels(3)).unwrap();
        assert_eq!(
            tokens[0].token_type,
            TokenType::Reference {
                header: "A".into(),
                label: Some(IndexLabel::Int(1))
            }
        );
        assert_eq!(tokens[1].token_type, TokenType::Colon);
    }

    #[test]
    fn test_header_prefix_of_function_is_not_a_reference() {
        let tokens = tokenize("=AVG(A)", &headers(&["A"]), &labels(2)).unwrap();
        assert_eq!(tokens[0].token_type, TokenType::Func);
        assert_eq!(tokens[0].value, "AVG");
    }

    #[test]
    fn test_numeric_header_is_a_reference() {
        let tokens = tokenize("=2020*2 + 2020.5", &headers(&["2020", "A"]), &[]).unwrap();
        assert_eq!(
            tokens[0].token_type,
            TokenType::Reference {
                header: "2020".into(),
                label: None
            }
        );
        assert_eq!(tokens[2].token_type, TokenType::Number);
        assert_eq!(tokens[2].value, "2");
        assert_eq!(tokens[4].token_type, TokenType::Number);
        assert_eq!(tokens[4].value, "2020.5");
    }

    #[test]
    fn test_unknown_identifier_is_no_column() {
        let err = tokenize("=B + 1", &headers(&["A"]), &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NoColumn);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("=\"abc", &[], &[]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidFormula);
    }
}

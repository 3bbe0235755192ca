//! Mark expressions used to select items by their markers (`-m`).
//!
//! Grammar:
//!
//! ```text
//! expr     := and_expr ("or" and_expr)*
//! and_expr := not_expr ("and" not_expr)*
//! not_expr := "not" not_expr | "(" expr ")" | ident
//! ```

use crate::error::MarkError;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Or,
    And,
    Not,
    Ident(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Ident(String),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
}

impl Expr {
    fn evaluate(&self, matcher: &dyn Fn(&str) -> bool) -> bool {
        match self {
            Expr::Ident(name) => matcher(name),
            Expr::Not(inner) => !inner.evaluate(matcher),
            Expr::And(operands) => operands.iter().all(|e| e.evaluate(matcher)),
            Expr::Or(operands) => operands.iter().any(|e| e.evaluate(matcher)),
        }
    }
}

/// A compiled mark expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkExpression {
    source: String,
    expr: Expr,
}

impl MarkExpression {
    pub fn parse(source: &str) -> Result<Self, MarkError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(parser.error(format!("unexpected {token:?} after expression")));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate with `matcher` deciding whether a marker name is present.
    pub fn evaluate(&self, matcher: impl Fn(&str) -> bool) -> bool {
        self.expr.evaluate(&matcher)
    }

    /// Evaluate against a list of marker names.
    pub fn matches<S: AsRef<str>>(&self, names: &[S]) -> bool {
        self.evaluate(|ident| names.iter().any(|n| n.as_ref() == ident))
    }
}

fn token_regex() -> Result<&'static Regex, regex::Error> {
    static TOKEN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    TOKEN
        .get_or_init(|| Regex::new(r"(?P<lparen>\()|(?P<rparen>\))|(?P<ident>[\w.+\-]+)|(?P<other>\S)"))
        .as_ref()
        .map_err(Clone::clone)
}

fn tokenize(source: &str) -> Result<Vec<Token>, MarkError> {
    let regex = token_regex().map_err(|e| MarkError::Expression {
        expr: source.to_string(),
        message: e.to_string(),
    })?;

    let mut tokens = Vec::new();
    for caps in regex.captures_iter(source) {
        let token = if caps.name("lparen").is_some() {
            Token::LParen
        } else if caps.name("rparen").is_some() {
            Token::RParen
        } else if let Some(ident) = caps.name("ident") {
            match ident.as_str() {
                "or" => Token::Or,
                "and" => Token::And,
                "not" => Token::Not,
                other => Token::Ident(other.to_string()),
            }
        } else {
            let other = caps.name("other").map(|m| m.as_str()).unwrap_or_default();
            return Err(MarkError::Expression {
                expr: source.to_string(),
                message: format!("unexpected character {other:?}"),
            });
        };
        tokens.push(token);
    }
    Ok(tokens)
}

/// Deepest parenthesis nesting accepted by the parser.
const MAX_NESTING: usize = 64;

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, message: String) -> MarkError {
        MarkError::Expression {
            expr: self.source.to_string(),
            message,
        }
    }

    fn expr(&mut self) -> Result<Expr, MarkError> {
        let mut operands = vec![self.and_expr()?];
        while self.accept(&Token::Or) {
            operands.push(self.and_expr()?);
        }
        Ok(collapse(operands, Expr::Or))
    }

    fn and_expr(&mut self) -> Result<Expr, MarkError> {
        let mut operands = vec![self.not_expr()?];
        while self.accept(&Token::And) {
            operands.push(self.not_expr()?);
        }
        Ok(collapse(operands, Expr::And))
    }

    fn not_expr(&mut self) -> Result<Expr, MarkError> {
        let mut negations = 0usize;
        while self.accept(&Token::Not) {
            negations += 1;
        }

        let operand = self.atom()?;
        Ok(if negations % 2 == 1 {
            Expr::Not(Box::new(operand))
        } else {
            operand
        })
    }

    fn atom(&mut self) -> Result<Expr, MarkError> {
        if self.accept(&Token::LParen) {
            if self.depth == MAX_NESTING {
                return Err(self.error(format!("parentheses nested deeper than {MAX_NESTING}")));
            }
            self.depth += 1;
            let inner = self.expr()?;
            self.depth -= 1;
            if !self.accept(&Token::RParen) {
                return Err(self.error("expected \")\"".into()));
            }
            return Ok(inner);
        }
        match self.tokens.get(self.pos).cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                Ok(Expr::Ident(name))
            }
            Some(token) => Err(self.error(format!("expected identifier; got {token:?}"))),
            None => Err(self.error("expected identifier; got end of input".into())),
        }
    }
}

fn collapse(mut operands: Vec<Expr>, combine: fn(Vec<Expr>) -> Expr) -> Expr {
    if operands.len() == 1 {
        operands.remove(0)
    } else {
        combine(operands)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_identifier() {
        let expr = MarkExpression::parse("slow").unwrap();
        assert!(expr.matches(&["slow"]));
        assert!(!expr.matches(&["fast"]));
    }

    #[test]
    fn test_precedence() {
        // and binds tighter than or
        let expr = MarkExpression::parse("a or b and c").unwrap();
        assert!(expr.matches(&["a"]));
        assert!(!expr.matches(&["b"]));
        assert!(expr.matches(&["b", "c"]));
    }

    #[test]
    fn test_not_and_parens() {
        let expr = MarkExpression::parse("not (slow or db)").unwrap();
        assert!(expr.matches::<&str>(&[]));
        assert!(!expr.matches(&["db"]));

        let expr = MarkExpression::parse("not not slow").unwrap();
        assert!(expr.matches(&["slow"]));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "slow and", "(slow", "slow)", "slow !db", "and"] {
            assert!(
                matches!(MarkExpression::parse(bad), Err(MarkError::Expression { .. })),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_long_chains_parse_without_recursion() {
        let expr = MarkExpression::parse(&("not ".repeat(200_001) + "slow")).unwrap();
        assert!(!expr.matches(&["slow"]));
        assert!(expr.matches(&["fast"]));

        let expr = MarkExpression::parse(&vec!["a"; 100_000].join(" and ")).unwrap();
        assert!(expr.matches(&["a"]));
    }

    #[test]
    fn test_nesting_is_capped() {
        let ok = format!("{}slow{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(MarkExpression::parse(&ok).unwrap().matches(&["slow"]));

        let deep = format!("{}slow{}", "(".repeat(100_000), ")".repeat(100_000));
        match MarkExpression::parse(&deep) {
            Err(MarkError::Expression { message, .. }) => assert!(message.contains("nested")),
            other => panic!("expected a nesting error, got {other:?}"),
        }
    }

    #[test]
    fn test_source_is_kept() {
        let expr = MarkExpression::parse("  smoke ").unwrap();
        assert_eq!(expr.source(), "  smoke ");
    }
}

//! Condition expression DSL
//!
//! A small predicate language used by `requires` clauses and `validate`
//! steps: comparisons over field names and literals, combined with
//! `and`/`or`/`not` and parentheses.
//!
//! ```text
//! status = 'lead' and (score > 10 or vip = true)
//! ```
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! or_expr    := and_expr ( "or" and_expr )*
//! and_expr   := not_expr ( "and" not_expr )*
//! not_expr   := "not" not_expr | comparison
//! comparison := primary ( ("=" | "!=" | "<" | "<=" | ">" | ">=") primary )?
//! primary    := "(" or_expr ")" | literal | field
//! ```

use crate::error::{Error, Result};

/// A parsed condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// String, number, boolean, or null literal
    Literal(Literal),
    /// Reference to a field of the entity under action
    Field(String),
    /// `not <expr>`
    Not(Box<Expr>),
    /// Binary comparison or logical connective
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl Expr {
    /// Parse a condition string
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::ExprParse(format!(
                "unexpected trailing input in '{}'",
                input
            )));
        }
        Ok(expr)
    }

    /// All field names referenced by this expression, in first-seen order
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Field(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Not(inner) => inner.collect_fields(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_fields(out);
                rhs.collect_fields(out);
            }
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Op(BinOp),
    Not,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                chars.next();
                let mut s = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    s.push(ch);
                }
                if !closed {
                    return Err(Error::ExprParse(format!(
                        "unterminated string literal in '{}'",
                        input
                    )));
                }
                tokens.push(Token::Str(s));
            }
            '=' => {
                chars.next();
                tokens.push(Token::Op(BinOp::Eq));
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        tokens.push(Token::Op(BinOp::Ne));
                    }
                    _ => {
                        return Err(Error::ExprParse(format!(
                            "expected '=' after '!' at byte {} in '{}'",
                            i, input
                        )))
                    }
                }
            }
            '<' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Op(BinOp::Le));
                } else {
                    tokens.push(Token::Op(BinOp::Lt));
                }
            }
            '>' => {
                chars.next();
                if let Some(&(_, '=')) = chars.peek() {
                    chars.next();
                    tokens.push(Token::Op(BinOp::Ge));
                } else {
                    tokens.push(Token::Op(BinOp::Gt));
                }
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                chars.next();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map(|&(j, _)| j).unwrap_or(input.len());
                let text = &input[start..end];
                let num: f64 = text.parse().map_err(|_| {
                    Error::ExprParse(format!("invalid number '{}' in '{}'", text, input))
                })?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                chars.next();
                while let Some(&(_, ch)) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        chars.next();
                    } else {
                        break;
                    }
                }
                let end = chars.peek().map(|&(j, _)| j).unwrap_or(input.len());
                let word = &input[start..end];
                tokens.push(match word {
                    "and" => Token::Op(BinOp::And),
                    "or" => Token::Op(BinOp::Or),
                    "not" => Token::Not,
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => {
                return Err(Error::ExprParse(format!(
                    "unexpected character '{}' at byte {} in '{}'",
                    other, i, input
                )))
            }
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Op(BinOp::Or)) {
            self.next();
            let rhs = self.and_expr()?;
            lhs = Expr::Binary {
                op: BinOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.not_expr()?;
        while self.peek() == Some(&Token::Op(BinOp::And)) {
            self.next();
            let rhs = self.not_expr()?;
            lhs = Expr::Binary {
                op: BinOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.not_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let lhs = self.primary()?;
        if let Some(Token::Op(op)) = self.peek() {
            let op = *op;
            if matches!(
                op,
                BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
            ) {
                self.next();
                let rhs = self.primary()?;
                return Ok(Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                });
            }
        }
        Ok(lhs)
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(Error::ExprParse("missing closing parenthesis".into())),
                }
            }
            Some(Token::Str(s)) => Ok(Expr::Literal(Literal::Str(s))),
            Some(Token::Num(n)) => Ok(Expr::Literal(Literal::Num(n))),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Expr::Literal(Literal::Bool(true)),
                "false" => Expr::Literal(Literal::Bool(false)),
                "null" => Expr::Literal(Literal::Null),
                _ => Expr::Field(name),
            }),
            other => Err(Error::ExprParse(format!(
                "expected a value or field, got {:?}",
                other
            ))),
        }
    }
}

// ============================================================================
// Per-target rendering
// ============================================================================

impl Expr {
    /// Render to a PL/pgSQL boolean expression; field references become
    /// local `v_`-prefixed variables
    pub fn to_sql(&self) -> String {
        match self {
            Expr::Literal(l) => l.to_sql(),
            Expr::Field(name) => format!("v_{}", name),
            Expr::Not(inner) => format!("NOT ({})", inner.to_sql()),
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinOp::Eq => "=",
                    BinOp::Ne => "<>",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::And => "AND",
                    BinOp::Or => "OR",
                };
                // null comparison needs IS [NOT] in SQL
                if matches!(rhs.as_ref(), Expr::Literal(Literal::Null)) {
                    return match op {
                        BinOp::Eq => format!("{} IS NULL", lhs.to_sql()),
                        BinOp::Ne => format!("{} IS NOT NULL", lhs.to_sql()),
                        _ => format!("({} {} {})", lhs.to_sql(), symbol, rhs.to_sql()),
                    };
                }
                match op {
                    BinOp::And | BinOp::Or => {
                        format!("({} {} {})", lhs.to_sql(), symbol, rhs.to_sql())
                    }
                    _ => format!("{} {} {}", lhs.to_sql(), symbol, rhs.to_sql()),
                }
            }
        }
    }

    /// Render to a Python boolean expression over a `row` dict
    pub fn to_python(&self) -> String {
        match self {
            Expr::Literal(l) => l.to_python(),
            Expr::Field(name) => format!("row[\"{}\"]", name),
            Expr::Not(inner) => format!("not ({})", inner.to_python()),
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                };
                if matches!(rhs.as_ref(), Expr::Literal(Literal::Null)) {
                    return match op {
                        BinOp::Eq => format!("{} is None", lhs.to_python()),
                        BinOp::Ne => format!("{} is not None", lhs.to_python()),
                        _ => format!("({} {} {})", lhs.to_python(), symbol, rhs.to_python()),
                    };
                }
                match op {
                    BinOp::And | BinOp::Or => {
                        format!("({} {} {})", lhs.to_python(), symbol, rhs.to_python())
                    }
                    _ => format!("{} {} {}", lhs.to_python(), symbol, rhs.to_python()),
                }
            }
        }
    }

    /// Render to a TypeScript boolean expression over a `row` object
    pub fn to_typescript(&self) -> String {
        match self {
            Expr::Literal(l) => l.to_typescript(),
            Expr::Field(name) => format!("row.{}", name),
            Expr::Not(inner) => format!("!({})", inner.to_typescript()),
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinOp::Eq => "===",
                    BinOp::Ne => "!==",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                };
                match op {
                    BinOp::And | BinOp::Or => format!(
                        "({} {} {})",
                        lhs.to_typescript(),
                        symbol,
                        rhs.to_typescript()
                    ),
                    _ => format!("{} {} {}", lhs.to_typescript(), symbol, rhs.to_typescript()),
                }
            }
        }
    }

    /// Render to a Rust boolean expression over a `row` struct.
    ///
    /// Null literals have no direct Rust rendering; the caller reports an
    /// emission error before reaching here, so this renders a placeholder
    /// comparison against `None` for the `= null` / `!= null` forms only.
    pub fn to_rust(&self) -> String {
        match self {
            Expr::Literal(l) => l.to_rust(),
            Expr::Field(name) => format!("row.{}", name),
            Expr::Not(inner) => format!("!({})", inner.to_rust()),
            Expr::Binary { op, lhs, rhs } => {
                let symbol = match op {
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::And => "&&",
                    BinOp::Or => "||",
                };
                if matches!(rhs.as_ref(), Expr::Literal(Literal::Null)) {
                    return match op {
                        BinOp::Eq => format!("{}.is_none()", lhs.to_rust()),
                        BinOp::Ne => format!("{}.is_some()", lhs.to_rust()),
                        _ => format!("({} {} None)", lhs.to_rust(), symbol),
                    };
                }
                match op {
                    BinOp::And | BinOp::Or => {
                        format!("({} {} {})", lhs.to_rust(), symbol, rhs.to_rust())
                    }
                    _ => format!("{} {} {}", lhs.to_rust(), symbol, rhs.to_rust()),
                }
            }
        }
    }

    /// Whether any literal in the tree is `null`
    pub fn contains_null(&self) -> bool {
        match self {
            Expr::Literal(Literal::Null) => true,
            Expr::Literal(_) | Expr::Field(_) => false,
            Expr::Not(inner) => inner.contains_null(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_null() || rhs.contains_null(),
        }
    }
}

impl Literal {
    fn to_sql(&self) -> String {
        match self {
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Num(n) => format_num(*n),
            Literal::Bool(b) => if *b { "TRUE" } else { "FALSE" }.into(),
            Literal::Null => "NULL".into(),
        }
    }

    fn to_python(&self) -> String {
        match self {
            Literal::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            Literal::Num(n) => format_num(*n),
            Literal::Bool(b) => if *b { "True" } else { "False" }.into(),
            Literal::Null => "None".into(),
        }
    }

    fn to_typescript(&self) -> String {
        match self {
            Literal::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            Literal::Num(n) => format_num(*n),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => "null".into(),
        }
    }

    fn to_rust(&self) -> String {
        match self {
            Literal::Str(s) => format!("\"{}\"", s.replace('"', "\\\"")),
            Literal::Num(n) => format_num(*n),
            Literal::Bool(b) => b.to_string(),
            Literal::Null => "None".into(),
        }
    }
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_comparison() {
        let e = Expr::parse("status = 'lead'").unwrap();
        assert_eq!(
            e,
            Expr::Binary {
                op: BinOp::Eq,
                lhs: Box::new(Expr::Field("status".into())),
                rhs: Box::new(Expr::Literal(Literal::Str("lead".into()))),
            }
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = Expr::parse("a = 1 or b = 2 and c = 3").unwrap();
        match e {
            Expr::Binary { op: BinOp::Or, rhs, .. } => {
                assert!(matches!(*rhs, Expr::Binary { op: BinOp::And, .. }));
            }
            other => panic!("expected or at root, got {:?}", other),
        }
    }

    #[test]
    fn parens_override_precedence() {
        let e = Expr::parse("(a = 1 or b = 2) and c = 3").unwrap();
        assert!(matches!(e, Expr::Binary { op: BinOp::And, .. }));
    }

    #[test]
    fn not_and_comparisons() {
        let e = Expr::parse("not (score >= 10)").unwrap();
        assert!(matches!(e, Expr::Not(_)));
        assert_eq!(e.to_sql(), "NOT (v_score >= 10)");
    }

    #[test]
    fn keyword_literals() {
        assert_eq!(
            Expr::parse("vip = true").unwrap().to_python(),
            "row[\"vip\"] == True"
        );
        assert_eq!(
            Expr::parse("deleted_at = null").unwrap().to_sql(),
            "v_deleted_at IS NULL"
        );
        assert_eq!(
            Expr::parse("company != null").unwrap().to_python(),
            "row[\"company\"] is not None"
        );
    }

    #[test]
    fn fields_collects_in_order_without_duplicates() {
        let e = Expr::parse("a = 1 and b > 2 or a != 3").unwrap();
        assert_eq!(e.fields(), vec!["a", "b"]);
    }

    #[test]
    fn sql_escapes_quotes() {
        let e = Expr::parse("name = \"O'Brien\"").unwrap();
        assert_eq!(e.to_sql(), "v_name = 'O''Brien'");
    }

    #[test]
    fn reject_garbage() {
        assert!(Expr::parse("status = ").is_err());
        assert!(Expr::parse("status = 'lead").is_err());
        assert!(Expr::parse("(a = 1").is_err());
        assert!(Expr::parse("a ~ 1").is_err());
    }

    #[test]
    fn typescript_and_rust_rendering() {
        let e = Expr::parse("status = 'lead' and score > 10").unwrap();
        assert_eq!(
            e.to_typescript(),
            "(row.status === \"lead\" && row.score > 10)"
        );
        assert_eq!(e.to_rust(), "(row.status == \"lead\" && row.score > 10)");
    }

    #[test]
    fn contains_null_detection() {
        assert!(Expr::parse("a = null").unwrap().contains_null());
        assert!(!Expr::parse("a = 1").unwrap().contains_null());
    }
}

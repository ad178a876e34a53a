//! Numeric comparison expressions for declared rules.
//!
//! Grammar:
//!
//! ```text
//! comparison := expr CMP expr          CMP ∈ { <, <=, >, >=, ==, != }
//! expr       := term (('+' | '-') term)*
//! term       := unary (('*' | '/') unary)*
//! unary      := '-' unary | atom
//! atom       := NUMBER | IDENT | 'abs' '(' expr ')' | '(' expr ')'
//! ```
//!
//! The right-hand side is the limit.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Abs(Box<Expr>),
    Bin(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    /// A referenced value is not present on the request; the rule is skipped.
    Missing(String),
    /// Arithmetic failed (division by zero, non-finite result).
    Arithmetic(String),
}

/// A compiled `lhs CMP rhs` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    source: String,
    lhs: Expr,
    op: CmpOp,
    rhs: Expr,
}

/// Evaluated sides of a comparison after tolerance is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    pub measured: f64,
    pub limit: f64,
    pub holds: bool,
}

impl Comparison {
    pub fn parse(source: &str) -> Result<Self, String> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let lhs = parser.expr()?;
        let op = match parser.advance() {
            Some(Token::Cmp(op)) => op,
            Some(other) => return Err(format!("expected comparison operator, found {other}")),
            None => return Err("expected comparison operator".to_string()),
        };
        let rhs = parser.expr()?;
        if let Some(extra) = parser.advance() {
            return Err(format!("unexpected {extra} after comparison"));
        }
        Ok(Self {
            source: source.trim().to_string(),
            lhs,
            op,
            rhs,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn op(&self) -> CmpOp {
        self.op
    }

    /// Identifiers referenced anywhere in the expression, in order of appearance.
    pub fn identifiers(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_vars(&self.lhs, &mut out);
        collect_vars(&self.rhs, &mut out);
        out.dedup();
        out
    }

    /// Evaluate both sides and apply `tolerance` to the limit.
    pub fn evaluate(
        &self,
        tolerance: f64,
        resolve: &impl Fn(&str) -> Option<f64>,
    ) -> Result<Outcome, EvalError> {
        let measured = eval(&self.lhs, resolve)?;
        let rhs = eval(&self.rhs, resolve)?;
        let slack = rhs.abs() * tolerance.abs();

        let (limit, holds) = match self.op {
            CmpOp::Lt => (rhs + slack, measured < rhs + slack),
            CmpOp::Le => (rhs + slack, measured <= rhs + slack),
            CmpOp::Gt => (rhs - slack, measured > rhs - slack),
            CmpOp::Ge => (rhs - slack, measured >= rhs - slack),
            CmpOp::Eq => (rhs, (measured - rhs).abs() <= slack),
            CmpOp::Ne => (rhs, (measured - rhs).abs() > slack),
        };
        Ok(Outcome {
            measured,
            limit,
            holds,
        })
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn collect_vars<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
    match expr {
        Expr::Num(_) => {}
        Expr::Var(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Expr::Neg(inner) | Expr::Abs(inner) => collect_vars(inner, out),
        Expr::Bin(a, _, b) => {
            collect_vars(a, out);
            collect_vars(b, out);
        }
    }
}

fn eval(expr: &Expr, resolve: &impl Fn(&str) -> Option<f64>) -> Result<f64, EvalError> {
    let value = match expr {
        Expr::Num(n) => *n,
        Expr::Var(name) => resolve(name).ok_or_else(|| EvalError::Missing(name.clone()))?,
        Expr::Neg(inner) => -eval(inner, resolve)?,
        Expr::Abs(inner) => eval(inner, resolve)?.abs(),
        Expr::Bin(a, op, b) => {
            let a = eval(a, resolve)?;
            let b = eval(b, resolve)?;
            match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => {
                    if b == 0.0 {
                        return Err(EvalError::Arithmetic("division by zero".to_string()));
                    }
                    a / b
                }
            }
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Arithmetic("non-finite value".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Cmp(CmpOp),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "number {n}"),
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Plus => f.write_str("'+'"),
            Self::Minus => f.write_str("'-'"),
            Self::Star => f.write_str("'*'"),
            Self::Slash => f.write_str("'/'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Cmp(op) => write!(f, "'{}'", op.as_str()),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '<' | '>' | '=' | '!' => {
                let followed_by_eq = chars.get(i + 1) == Some(&'=');
                let op = match (c, followed_by_eq) {
                    ('<', true) => CmpOp::Le,
                    ('<', false) => CmpOp::Lt,
                    ('>', true) => CmpOp::Ge,
                    ('>', false) => CmpOp::Gt,
                    ('=', true) => CmpOp::Eq,
                    ('!', true) => CmpOp::Ne,
                    _ => return Err(format!("unexpected '{c}' at {i}")),
                };
                tokens.push(Token::Cmp(op));
                i += if followed_by_eq { 2 } else { 1 };
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // exponent, e.g. 1e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected '{other}' at {i}")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(format!("expected {expected}, found {t}")),
            None => Err(format!("expected {expected}, found end of input")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Bin(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Bin(Box::new(lhs), op, Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::Ident(name)) if name == "abs" => {
                self.expect(&Token::LParen)?;
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Abs(Box::new(inner)))
            }
            Some(Token::Ident(name)) => Ok(Expr::Var(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(t) => Err(format!("unexpected {t}")),
            None => Err("unexpected end of input".to_string()),
        }
    }
}

//! Tokenizer, parser and evaluator for the body of a `${...}` placeholder.
//!
//! Grammar:
//!
//! ```text
//! body    := sum ( '..' sum )?
//! sum     := product ( ('+' | '-') product )*
//! product := unary ( ('*' | '/' | '%') unary )*
//! unary   := '-' unary | primary
//! primary := INT | STRING | IDENT | '(' sum ')' | '[' ( sum ( ',' sum )* )? ']'
//! ```
//!
//! Arithmetic is 64-bit integer arithmetic; `/` truncates toward zero and `%`
//! takes the sign of the dividend.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    DotDot,
    Eof,
}

/// Parsed placeholder body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Int(i64),
    Str(String),
    Ident(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Range(Box<Expr>, Box<Expr>),
    List(Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Result of evaluating a scalar expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for EvalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalValue::Int(n) => write!(f, "{}", n),
            EvalValue::Text(s) => f.write_str(s),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<i64>()
                    .map_err(|_| format!("integer literal {} is out of range", text))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '\'' | '"' => {
                let quote = c;
                i += 1;
                let start = i;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            '.' => {
                if chars.get(i + 1) == Some(&'.') {
                    tokens.push(Token::DotDot);
                    i += 2;
                } else {
                    return Err(format!("unexpected '.' at position {}", i));
                }
            }
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
            '%' => {
                tokens.push(Token::Percent);
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
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    tokens.push(Token::Eof);
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        let token = self.advance();
        if token == expected {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", expected, token))
        }
    }

    fn parse_body(&mut self) -> Result<Expr, String> {
        let start = self.parse_sum()?;
        let expr = if *self.peek() == Token::DotDot {
            self.advance();
            let end = self.parse_sum()?;
            Expr::Range(Box::new(start), Box::new(end))
        } else {
            start
        };
        match self.peek() {
            Token::Eof => Ok(expr),
            other => Err(format!("unexpected trailing {:?}", other)),
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_product()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_product(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if *self.peek() == Token::Minus {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::Ident(name) => Ok(Expr::Ident(name)),
            Token::LParen => {
                let inner = self.parse_sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if *self.peek() != Token::RBracket {
                    loop {
                        items.push(self.parse_sum()?);
                        if *self.peek() == Token::Comma {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RBracket)?;
                Ok(Expr::List(items))
            }
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}

/// Parse the body of one placeholder.
pub(crate) fn parse(body: &str) -> Result<Expr, String> {
    let tokens = tokenize(body)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_body()
}

impl Expr {
    /// Evaluate to a single value, resolving identifiers through `lookup`.
    pub(crate) fn eval<F>(&self, lookup: &F) -> Result<EvalValue, String>
    where
        F: Fn(&str) -> Option<EvalValue>,
    {
        match self {
            Expr::Int(n) => Ok(EvalValue::Int(*n)),
            Expr::Str(s) => Ok(EvalValue::Text(s.clone())),
            Expr::Ident(name) => {
                lookup(name).ok_or_else(|| format!("no value bound to '{}'", name))
            }
            Expr::Neg(inner) => {
                let n = as_int(inner.eval(lookup)?)?;
                n.checked_neg()
                    .map(EvalValue::Int)
                    .ok_or_else(|| "integer overflow".to_string())
            }
            Expr::Binary(left, op, right) => {
                let a = as_int(left.eval(lookup)?)?;
                let b = as_int(right.eval(lookup)?)?;
                apply(*op, a, b).map(EvalValue::Int)
            }
            Expr::Range(..) | Expr::List(_) => {
                Err("ranges and lists are only allowed in data node patterns".to_string())
            }
        }
    }

    /// Enumerate every value the expression stands for.
    ///
    /// Ranges expand in the direction written (`3..1` yields 3, 2, 1) and
    /// lists keep their order. Identifiers are not allowed. A range holding
    /// more than `limit` values is rejected before anything is allocated.
    pub(crate) fn enumerate(&self, limit: usize) -> Result<Vec<EvalValue>, String> {
        let no_vars = |_: &str| None;
        match self {
            Expr::Range(start, end) => {
                let a = as_int(start.eval(&no_vars)?)?;
                let b = as_int(end.eval(&no_vars)?)?;
                if a.abs_diff(b) >= limit as u64 {
                    return Err(format!("range {}..{} holds more than {} values", a, b, limit));
                }
                let values: Vec<EvalValue> = if a <= b {
                    (a..=b).map(EvalValue::Int).collect()
                } else {
                    (b..=a).rev().map(EvalValue::Int).collect()
                };
                Ok(values)
            }
            Expr::List(items) => items.iter().map(|item| item.eval(&no_vars)).collect(),
            scalar => Ok(vec![scalar.eval(&no_vars)?]),
        }
    }
}

fn as_int(value: EvalValue) -> Result<i64, String> {
    match value {
        EvalValue::Int(n) => Ok(n),
        EvalValue::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("'{}' is not an integer", s)),
    }
}

fn apply(op: BinOp, a: i64, b: i64) -> Result<i64, String> {
    let result = match op {
        BinOp::Add => a.checked_add(b),
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div | BinOp::Rem if b == 0 => return Err("division by zero".to_string()),
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
    };
    result.ok_or_else(|| "integer overflow".to_string())
}

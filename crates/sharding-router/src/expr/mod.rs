//! Inline expressions.
//!
//! An inline expression is a template of literal text and placeholders,
//! written `${...}` or `$->{...}`:
//!
//! - `ds_${user_id % 2}` evaluates to one name for a given `user_id`
//!   (sharding algorithms).
//! - `ds_${0..1}.t_order_${[0, 1]}` enumerates every combination of its
//!   placeholders, leftmost placeholder varying slowest (data node patterns).

mod parser;

pub use parser::EvalValue;

use parser::Expr;

use crate::error::{Result, ShardingError};

/// Upper bound on the number of names one pattern may expand to.
const MAX_EXPANSION: usize = 100_000;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Placeholder(Expr),
}

/// A parsed inline expression.
#[derive(Debug, Clone)]
pub struct InlineExpression {
    source: String,
    segments: Vec<Segment>,
}

impl InlineExpression {
    /// Parse an expression.
    ///
    /// # Errors
    ///
    /// Returns `ShardingError::InvalidExpression` for an unterminated
    /// placeholder or a placeholder body that does not parse.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some((before, body_start)) = find_placeholder(rest) {
            literal.push_str(&rest[..before]);
            let body_and_tail = &rest[body_start..];
            let close = body_and_tail
                .find('}')
                .ok_or_else(|| ShardingError::expression(source, "unterminated placeholder"))?;
            let body = &body_and_tail[..close];
            let expr = parser::parse(body).map_err(|msg| ShardingError::expression(source, msg))?;

            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(Segment::Placeholder(expr));
            rest = &body_and_tail[close + 1..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate every placeholder to a single value and concatenate.
    pub fn evaluate<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<EvalValue>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(expr) => {
                    let value = expr
                        .eval(&lookup)
                        .map_err(|msg| ShardingError::expression(&self.source, msg))?;
                    out.push_str(&value.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Enumerate every name the expression describes, in order.
    pub fn expand(&self) -> Result<Vec<String>> {
        let mut names = vec![String::new()];
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => {
                    for name in &mut names {
                        name.push_str(text);
                    }
                }
                Segment::Placeholder(expr) => {
                    let values = expr
                        .enumerate(MAX_EXPANSION)
                        .map_err(|msg| ShardingError::expression(&self.source, msg))?;
                    if names.len().saturating_mul(values.len()) > MAX_EXPANSION {
                        return Err(ShardingError::expression(
                            &self.source,
                            format!("expands to more than {} names", MAX_EXPANSION),
                        ));
                    }
                    names = names
                        .iter()
                        .flat_map(|prefix| values.iter().map(move |v| format!("{}{}", prefix, v)))
                        .collect();
                }
            }
        }
        Ok(names)
    }
}

/// Locate the next placeholder opener, returning the byte offset of `$` and
/// the byte offset where the body starts.
fn find_placeholder(text: &str) -> Option<(usize, usize)> {
    let mut search = 0;
    while let Some(offset) = text[search..].find('$') {
        let at = search + offset;
        let tail = &text[at..];
        if tail.starts_with("${") {
            return Some((at, at + 2));
        }
        if tail.starts_with("$->{") {
            return Some((at, at + 4));
        }
        search = at + 1;
    }
    None
}

/// Split a list of expressions on commas that sit outside placeholders and
/// brackets. Empty items are dropped.
pub fn split_expressions(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in text.chars() {
        match c {
            '{' | '[' | '(' => {
                depth += 1;
                current.push(c);
            }
            '}' | ']' | ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                items.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    items.push(current);

    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

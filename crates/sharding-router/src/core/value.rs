//! Sharding values and value ranges.
//!
//! A [`ShardingValue`] is the value a statement (or a hint) supplies for a
//! sharding column. Algorithms interpret it as an integer, a datetime or plain
//! text depending on what they shard on, so the conversions here are lenient:
//! `"42"` is usable as an integer and `"2020-01-01 00:00:00"` as a datetime.

use std::fmt;
use std::ops::Bound;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Datetime layout accepted by time-based algorithms.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Length of a value rendered with [`DATETIME_FORMAT`].
const DATETIME_LEN: usize = 19;

/// A single sharding value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShardingValue {
    Int(i64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl ShardingValue {
    /// Interpret a command-line or config literal: integers stay integers,
    /// everything else is text.
    pub fn from_literal(literal: &str) -> Self {
        match literal.trim().parse::<i64>() {
            Ok(n) => ShardingValue::Int(n),
            Err(_) => ShardingValue::Text(literal.to_string()),
        }
    }

    /// Integer view of the value, if it has one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ShardingValue::Int(n) => Some(*n),
            ShardingValue::Text(s) => s.trim().parse().ok(),
            ShardingValue::DateTime(_) => None,
        }
    }

    /// Datetime view of the value, if it has one.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            ShardingValue::DateTime(dt) => Some(*dt),
            ShardingValue::Text(s) => parse_datetime(s),
            ShardingValue::Int(_) => None,
        }
    }
}

/// Parse a datetime in [`DATETIME_FORMAT`].
///
/// Anything after the seconds field (fractions, zone suffixes) is ignored.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let head = text.get(..DATETIME_LEN).unwrap_or(text);
    NaiveDateTime::parse_from_str(head, DATETIME_FORMAT).ok()
}

impl fmt::Display for ShardingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingValue::Int(n) => write!(f, "{}", n),
            ShardingValue::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            ShardingValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ShardingValue {
    fn from(value: i64) -> Self {
        ShardingValue::Int(value)
    }
}

impl From<i32> for ShardingValue {
    fn from(value: i32) -> Self {
        ShardingValue::Int(i64::from(value))
    }
}

impl From<u32> for ShardingValue {
    fn from(value: u32) -> Self {
        ShardingValue::Int(i64::from(value))
    }
}

impl From<&str> for ShardingValue {
    fn from(value: &str) -> Self {
        ShardingValue::Text(value.to_string())
    }
}

impl From<String> for ShardingValue {
    fn from(value: String) -> Self {
        ShardingValue::Text(value)
    }
}

impl From<NaiveDateTime> for ShardingValue {
    fn from(value: NaiveDateTime) -> Self {
        ShardingValue::DateTime(value)
    }
}

/// A possibly unbounded range of sharding values (`BETWEEN`, `<`, `>=`, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingRange {
    pub lower: Bound<ShardingValue>,
    pub upper: Bound<ShardingValue>,
}

impl ShardingRange {
    pub fn new(lower: Bound<ShardingValue>, upper: Bound<ShardingValue>) -> Self {
        Self { lower, upper }
    }

    /// `[lower, upper]`
    pub fn closed(lower: impl Into<ShardingValue>, upper: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Included(upper.into()))
    }

    /// `[lower, upper)`
    pub fn closed_open(lower: impl Into<ShardingValue>, upper: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Excluded(upper.into()))
    }

    /// `[lower, +inf)`
    pub fn at_least(lower: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Included(lower.into()), Bound::Unbounded)
    }

    /// `(lower, +inf)`
    pub fn greater_than(lower: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Excluded(lower.into()), Bound::Unbounded)
    }

    /// `(-inf, upper]`
    pub fn at_most(upper: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Unbounded, Bound::Included(upper.into()))
    }

    /// `(-inf, upper)`
    pub fn less_than(upper: impl Into<ShardingValue>) -> Self {
        Self::new(Bound::Unbounded, Bound::Excluded(upper.into()))
    }

    /// `(-inf, +inf)`
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn lower_endpoint(&self) -> Option<&ShardingValue> {
        endpoint(&self.lower)
    }

    pub fn upper_endpoint(&self) -> Option<&ShardingValue> {
        endpoint(&self.upper)
    }

    /// Inclusive integer bounds of the range, `None` per side when unbounded.
    ///
    /// Returns `None` overall when an endpoint is not an integer.
    pub fn inclusive_i64_bounds(&self) -> Option<(Option<i64>, Option<i64>)> {
        let lower = match &self.lower {
            Bound::Included(v) => Some(v.as_i64()?),
            Bound::Excluded(v) => Some(v.as_i64()?.checked_add(1)?),
            Bound::Unbounded => None,
        };
        let upper = match &self.upper {
            Bound::Included(v) => Some(v.as_i64()?),
            Bound::Excluded(v) => Some(v.as_i64()?.checked_sub(1)?),
            Bound::Unbounded => None,
        };
        Some((lower, upper))
    }
}

fn endpoint(bound: &Bound<ShardingValue>) -> Option<&ShardingValue> {
    match bound {
        Bound::Included(v) | Bound::Excluded(v) => Some(v),
        Bound::Unbounded => None,
    }
}

impl fmt::Display for ShardingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Bound::Included(v) => write!(f, "[{}", v)?,
            Bound::Excluded(v) => write!(f, "({}", v)?,
            Bound::Unbounded => f.write_str("(-inf")?,
        }
        f.write_str("..")?;
        match &self.upper {
            Bound::Included(v) => write!(f, "{}]", v),
            Bound::Excluded(v) => write!(f, "{})", v),
            Bound::Unbounded => f.write_str("+inf)"),
        }
    }
}

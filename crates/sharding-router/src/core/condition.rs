//! Sharding conditions extracted from a statement.
//!
//! The predicate extractor (outside this crate) turns the `WHERE` clause of a
//! parsed statement into one or more [`ShardingCondition`]s per logic table.
//! Conditions for the same table are alternatives (OR); the column
//! predicates inside one condition all hold together (AND).

use std::fmt;

use super::value::{ShardingRange, ShardingValue};

/// The shape of a predicate on one sharding column.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// `column = value`
    Precise(ShardingValue),
    /// `column BETWEEN a AND b`, `column > a`, ...
    Range(ShardingRange),
    /// `column IN (a, b, ...)`, or values injected through a hint
    List(Vec<ShardingValue>),
}

impl ConditionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ConditionValue::Precise(_) => "precise",
            ConditionValue::Range(_) => "range",
            ConditionValue::List(_) => "list",
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::Precise(v) => write!(f, "= {}", v),
            ConditionValue::Range(r) => write!(f, "in {}", r),
            ConditionValue::List(values) => {
                f.write_str("in (")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
        }
    }
}

/// A predicate on a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnCondition {
    pub column: String,
    pub value: ConditionValue,
}

/// The AND-ed sharding predicates of one logic table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingCondition {
    pub table: String,
    pub columns: Vec<ColumnCondition>,
}

impl ShardingCondition {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: ConditionValue) -> Self {
        self.columns.push(ColumnCondition {
            column: column.into(),
            value,
        });
        self
    }

    pub fn with_precise(self, column: impl Into<String>, value: impl Into<ShardingValue>) -> Self {
        self.with(column, ConditionValue::Precise(value.into()))
    }

    pub fn with_range(self, column: impl Into<String>, range: ShardingRange) -> Self {
        self.with(column, ConditionValue::Range(range))
    }

    pub fn with_list<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<ShardingValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(column, ConditionValue::List(values))
    }

    /// True if this condition targets the given logic table.
    pub fn applies_to(&self, table: &str) -> bool {
        self.table.eq_ignore_ascii_case(table)
    }

    /// Predicate on a column, matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ConditionValue> {
        self.columns
            .iter()
            .find(|c| c.column.eq_ignore_ascii_case(name))
            .map(|c| &c.value)
    }
}

//! What the routing engine needs to know about a statement.

use crate::core::ShardingCondition;
use crate::error::Result;

/// Logic tables of one statement and the sharding conditions found on them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementContext {
    /// Logic tables in statement order.
    pub tables: Vec<String>,
    /// Alternatives per table; see [`ShardingCondition`].
    pub conditions: Vec<ShardingCondition>,
}

impl StatementContext {
    pub fn new<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
            conditions: Vec::new(),
        }
    }

    pub fn with_condition(mut self, condition: ShardingCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Distinct logic tables, statement tables first, then tables only named
    /// by a condition. Matching is case-insensitive; the first spelling wins.
    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        let all = self
            .tables
            .iter()
            .map(String::as_str)
            .chain(self.conditions.iter().map(|c| c.table.as_str()));
        for name in all {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name);
            }
        }
        names
    }

    /// Conditions on one logic table.
    pub fn conditions_for(&self, table: &str) -> Vec<&ShardingCondition> {
        self.conditions
            .iter()
            .filter(|c| c.applies_to(table))
            .collect()
    }
}

/// Turns a parsed statement into a [`StatementContext`].
///
/// Implemented by the SQL front end; the router never looks at SQL itself.
pub trait ConditionExtractor<S: ?Sized> {
    fn extract(&self, statement: &S) -> Result<StatementContext>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_names_dedup_and_order() {
        let ctx = StatementContext::new(["t_order", "T_ORDER_ITEM"])
            .with_condition(ShardingCondition::new("t_order_item").with_precise("order_id", 1))
            .with_condition(ShardingCondition::new("t_user").with_precise("user_id", 2));
        assert_eq!(ctx.table_names(), vec!["t_order", "T_ORDER_ITEM", "t_user"]);
        assert_eq!(ctx.conditions_for("t_order_item").len(), 1);
        assert!(ctx.conditions_for("t_order").is_empty());
    }
}

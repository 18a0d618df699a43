//! Expansion of `actual_data_nodes` patterns.

use std::collections::HashSet;

use crate::core::DataNode;
use crate::error::{Result, ShardingError};
use crate::expr::{split_expressions, InlineExpression};

/// Turns a data node pattern into an ordered list of data nodes.
pub trait DataNodeExpander: Send + Sync {
    /// Expand `pattern`. The result must be the same, in the same order,
    /// every time the same pattern is expanded.
    fn expand(&self, pattern: &str) -> Result<Vec<DataNode>>;
}

/// Expands comma-separated inline expressions such as
/// `ds_${0..1}.t_order_${[0, 1]}, ds_2.t_order_2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDataNodeExpander;

impl DataNodeExpander for InlineDataNodeExpander {
    fn expand(&self, pattern: &str) -> Result<Vec<DataNode>> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();

        for item in split_expressions(pattern) {
            for text in InlineExpression::parse(&item)?.expand()? {
                let node = DataNode::parse(&text)?;
                if !seen.insert(node.clone()) {
                    return Err(ShardingError::Config(format!(
                        "data node {} appears more than once in '{}'",
                        node, pattern
                    )));
                }
                nodes.push(node);
            }
        }

        if nodes.is_empty() {
            return Err(ShardingError::expression(pattern, "expands to no data nodes"));
        }
        Ok(nodes)
    }
}

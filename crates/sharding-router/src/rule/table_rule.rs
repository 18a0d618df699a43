//! Effective per-table rules.

use crate::core::DataNode;

use super::strategy::ShardingStrategy;

/// Key generation settings of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenerateStrategy {
    pub column: String,
    pub key_generator: String,
}

/// Audit settings of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStrategy {
    pub auditors: Vec<String>,
    pub force_sharding: bool,
}

/// A logic table with its actual data nodes and the strategies that apply
/// to it, rule-wide defaults already merged in.
#[derive(Debug, Clone)]
pub struct TableRule {
    pub(crate) logic_table: String,
    pub(crate) actual_data_nodes: Vec<DataNode>,
    pub(crate) database_strategy: ShardingStrategy,
    pub(crate) table_strategy: ShardingStrategy,
    pub(crate) key_generate: Option<KeyGenerateStrategy>,
    pub(crate) audit: Option<AuditStrategy>,
    pub(crate) auto: bool,
}

impl TableRule {
    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    /// Actual data nodes in configuration order.
    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    pub fn database_strategy(&self) -> &ShardingStrategy {
        &self.database_strategy
    }

    pub fn table_strategy(&self) -> &ShardingStrategy {
        &self.table_strategy
    }

    pub fn key_generate(&self) -> Option<&KeyGenerateStrategy> {
        self.key_generate.as_ref()
    }

    pub fn audit(&self) -> Option<&AuditStrategy> {
        self.audit.as_ref()
    }

    /// True for auto tables, whose nodes were laid out by their algorithm.
    pub fn is_auto(&self) -> bool {
        self.auto
    }

    /// Distinct data sources of the actual data nodes, in first-seen order.
    pub fn data_source_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for node in &self.actual_data_nodes {
            if !names.contains(&node.data_source) {
                names.push(node.data_source.clone());
            }
        }
        names
    }

    /// Actual tables on one data source, in node order.
    pub fn actual_tables(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|n| n.data_source == data_source)
            .map(|n| n.table.clone())
            .collect()
    }

    /// True if `column` (lowercase) is a sharding column of either dimension.
    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.database_strategy
            .columns()
            .into_iter()
            .chain(self.table_strategy.columns())
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// Lay out the actual nodes of an auto table: `<logic>_<i>` for each table
/// index, assigned round-robin over `data_sources`.
pub(crate) fn auto_table_nodes(logic_table: &str, data_sources: &[String], amount: usize) -> Vec<DataNode> {
    if data_sources.is_empty() {
        return Vec::new();
    }
    (0..amount)
        .map(|i| {
            DataNode::new(
                data_sources[i % data_sources.len()].clone(),
                format!("{}_{}", logic_table, i),
            )
        })
        .collect()
}

//! The sharding rule model.
//!
//! A [`ShardingRule`] is built once from a [`RuleConfig`] and is read-only
//! afterwards. Building it instantiates every algorithm, expands every data
//! node pattern and checks binding groups, so a rule that builds can route
//! any statement without further configuration errors. Reconfiguration
//! builds a new rule and swaps it in whole.

mod expander;
mod strategy;
mod table_rule;

pub use expander::{DataNodeExpander, InlineDataNodeExpander};
pub use strategy::ShardingStrategy;
pub use table_rule::{AuditStrategy, KeyGenerateStrategy, TableRule};

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info};

use crate::algorithm::{AlgorithmCatalog, ShardingAlgorithm, ShardingAuditAlgorithm};
use crate::config::{AuditStrategyConfig, KeyGenerateStrategyConfig, RuleConfig, StrategyConfig};
use crate::core::DataNode;
use crate::error::{Result, ShardingError};
use crate::expr::split_expressions;
use crate::keygen::KeyGenerator;

use table_rule::auto_table_nodes;

/// A key drawn for an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedKey {
    pub column: String,
    pub value: i64,
}

/// Immutable routing configuration.
#[derive(Debug)]
pub struct ShardingRule {
    data_sources: Vec<String>,
    default_data_source: Option<String>,
    /// Table rules by lowercase logic table name.
    tables: BTreeMap<String, TableRule>,
    /// Binding groups as lowercase logic table names, in declaration order.
    binding_groups: Vec<Vec<String>>,
    /// Broadcast tables by lowercase name, mapped to the declared name.
    broadcast_tables: BTreeMap<String, String>,
    algorithms: HashMap<String, ShardingAlgorithm>,
    key_generators: HashMap<String, Arc<dyn KeyGenerator>>,
    auditors: HashMap<String, Arc<dyn ShardingAuditAlgorithm>>,
    fingerprint: String,
}

impl ShardingRule {
    /// Build a rule with the built-in algorithms and inline data node patterns.
    pub fn from_config(config: &RuleConfig) -> Result<Self> {
        Self::new(
            config,
            &AlgorithmCatalog::with_builtins(),
            &InlineDataNodeExpander,
        )
    }

    /// Build a rule.
    ///
    /// # Errors
    ///
    /// Any configuration or algorithm initialization error. Nothing is
    /// partially built.
    pub fn new(
        config: &RuleConfig,
        catalog: &AlgorithmCatalog,
        expander: &dyn DataNodeExpander,
    ) -> Result<Self> {
        config.validate()?;

        let mut algorithms = HashMap::new();
        for (name, algorithm) in &config.sharding_algorithms {
            algorithms.insert(name.clone(), catalog.create_sharding(algorithm)?);
        }
        let mut key_generators = HashMap::new();
        for (name, generator) in &config.key_generators {
            key_generators.insert(name.clone(), catalog.create_key_generator(generator)?);
        }
        let mut auditors = HashMap::new();
        for (name, auditor) in &config.auditors {
            auditors.insert(name.clone(), catalog.create_auditor(auditor)?);
        }

        let default_column = config.default_sharding_column.as_deref();
        let resolve = |own: Option<&StrategyConfig>, fallback: Option<&StrategyConfig>| {
            match own.or(fallback) {
                Some(strategy) => ShardingStrategy::resolve(strategy, default_column, &algorithms),
                None => Ok(ShardingStrategy::None),
            }
        };

        let mut tables = BTreeMap::new();
        for (name, table) in &config.tables {
            let actual_data_nodes = match &table.actual_data_nodes {
                Some(pattern) => expander.expand(pattern)?,
                None => config
                    .data_sources
                    .iter()
                    .map(|ds| DataNode::new(ds.clone(), name.clone()))
                    .collect(),
            };
            check_nodes(name, &actual_data_nodes, &config.data_sources)?;

            let rule = TableRule {
                logic_table: name.clone(),
                actual_data_nodes,
                database_strategy: resolve(
                    table.database_strategy.as_ref(),
                    config.default_database_strategy.as_ref(),
                )?,
                table_strategy: resolve(
                    table.table_strategy.as_ref(),
                    config.default_table_strategy.as_ref(),
                )?,
                key_generate: key_generate(
                    table.key_generate_strategy.as_ref(),
                    config.default_key_generate_strategy.as_ref(),
                ),
                audit: audit(
                    table.audit_strategy.as_ref(),
                    config.default_audit_strategy.as_ref(),
                ),
                auto: false,
            };
            debug!(
                "Table rule {}: {} nodes, database {}, table {}",
                name,
                rule.actual_data_nodes.len(),
                rule.database_strategy,
                rule.table_strategy
            );
            tables.insert(name.to_ascii_lowercase(), rule);
        }

        for (name, table) in &config.auto_tables {
            let sources = match &table.actual_data_sources {
                Some(list) => split_expressions(list),
                None => config.data_sources.clone(),
            };
            let strategy = resolve(Some(&table.sharding_strategy), None)?;
            let amount = strategy
                .standard_algorithm()
                .and_then(|a| a.auto_tables_amount())
                .ok_or_else(|| {
                    ShardingError::Config(format!(
                        "{}: algorithm '{}' cannot lay out an auto table",
                        name,
                        strategy.algorithm_name().unwrap_or("none")
                    ))
                })?;
            let actual_data_nodes = auto_table_nodes(name, &sources, amount);
            check_nodes(name, &actual_data_nodes, &config.data_sources)?;

            let rule = TableRule {
                logic_table: name.clone(),
                actual_data_nodes,
                database_strategy: ShardingStrategy::None,
                table_strategy: strategy,
                key_generate: key_generate(
                    table.key_generate_strategy.as_ref(),
                    config.default_key_generate_strategy.as_ref(),
                ),
                audit: audit(
                    table.audit_strategy.as_ref(),
                    config.default_audit_strategy.as_ref(),
                ),
                auto: true,
            };
            debug!(
                "Auto table rule {}: {} tables over {} data sources",
                name,
                amount,
                sources.len()
            );
            tables.insert(name.to_ascii_lowercase(), rule);
        }

        let binding_groups: Vec<Vec<String>> = config
            .binding_tables
            .iter()
            .map(|group| {
                split_expressions(group)
                    .into_iter()
                    .map(|t| t.to_ascii_lowercase())
                    .collect()
            })
            .collect();
        for group in &binding_groups {
            check_binding_group(group, &tables)?;
        }

        let broadcast_tables = config
            .broadcast_tables
            .iter()
            .map(|t| (t.to_ascii_lowercase(), t.clone()))
            .collect();

        let rule = Self {
            data_sources: config.data_sources.clone(),
            default_data_source: config.resolved_default_data_source().map(str::to_string),
            tables,
            binding_groups,
            broadcast_tables,
            algorithms,
            key_generators,
            auditors,
            fingerprint: config.hash(),
        };
        info!(
            "Sharding rule built: {} tables, {} binding groups, {} broadcast tables, {} algorithms (fingerprint {})",
            rule.tables.len(),
            rule.binding_groups.len(),
            rule.broadcast_tables.len(),
            rule.algorithms.len(),
            &rule.fingerprint[..12.min(rule.fingerprint.len())]
        );
        Ok(rule)
    }

    pub fn data_sources(&self) -> &[String] {
        &self.data_sources
    }

    /// Data source for tables without a sharding rule.
    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    /// SHA256 fingerprint of the rule file this rule was built from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Effective rule of a sharded logic table, matched case-insensitively.
    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    /// All table rules, ordered by lowercase logic table name.
    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.tables.values()
    }

    pub fn is_sharded(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    pub fn is_broadcast(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .contains_key(&logic_table.to_ascii_lowercase())
    }

    pub fn broadcast_tables(&self) -> impl Iterator<Item = &str> {
        self.broadcast_tables.values().map(String::as_str)
    }

    /// Every node a broadcast table lives on: its table rule's nodes if it
    /// has one, otherwise the table on every data source.
    pub fn broadcast_nodes(&self, logic_table: &str) -> Vec<DataNode> {
        match self.table_rule(logic_table) {
            Some(rule) => rule.actual_data_nodes.clone(),
            None => self
                .data_sources
                .iter()
                .map(|ds| DataNode::new(ds.clone(), logic_table))
                .collect(),
        }
    }

    /// Members of the binding group containing `logic_table`, lowercase.
    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let key = logic_table.to_ascii_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&key))
            .map(Vec::as_slice)
    }

    /// A configured sharding algorithm by name.
    pub fn algorithm(&self, name: &str) -> Option<&ShardingAlgorithm> {
        self.algorithms.get(name)
    }

    pub fn auditor(&self, name: &str) -> Option<&Arc<dyn ShardingAuditAlgorithm>> {
        self.auditors.get(name)
    }

    pub fn key_generator(&self, name: &str) -> Option<&Arc<dyn KeyGenerator>> {
        self.key_generators.get(name)
    }

    /// Draw a key for an insert into `logic_table`.
    ///
    /// Returns `None` when the table has no key generate strategy.
    pub fn generate_key(&self, logic_table: &str) -> Result<Option<GeneratedKey>> {
        let Some(strategy) = self
            .table_rule(logic_table)
            .and_then(TableRule::key_generate)
        else {
            return Ok(None);
        };
        let generator = self.key_generators.get(&strategy.key_generator).ok_or_else(|| {
            ShardingError::Config(format!(
                "key generator '{}' is not declared",
                strategy.key_generator
            ))
        })?;
        Ok(Some(GeneratedKey {
            column: strategy.column.clone(),
            value: generator.generate_key()?,
        }))
    }
}

fn key_generate(
    own: Option<&KeyGenerateStrategyConfig>,
    fallback: Option<&KeyGenerateStrategyConfig>,
) -> Option<KeyGenerateStrategy> {
    own.or(fallback).map(|c| KeyGenerateStrategy {
        column: c.column.clone(),
        key_generator: c.key_generator.clone(),
    })
}

fn audit(own: Option<&AuditStrategyConfig>, fallback: Option<&AuditStrategyConfig>) -> Option<AuditStrategy> {
    own.or(fallback).map(|c| AuditStrategy {
        auditors: c.auditors.clone(),
        force_sharding: c.force_sharding,
    })
}

fn check_nodes(logic_table: &str, nodes: &[DataNode], data_sources: &[String]) -> Result<()> {
    if nodes.is_empty() {
        return Err(ShardingError::Config(format!(
            "{}: no actual data nodes",
            logic_table
        )));
    }
    if let Some(node) = nodes.iter().find(|n| !data_sources.contains(&n.data_source)) {
        return Err(ShardingError::Config(format!(
            "{}: data node {} uses undeclared data source '{}'",
            logic_table, node, node.data_source
        )));
    }
    Ok(())
}

/// Binding group members must share data sources and have the same number
/// of actual tables on each, so an index on one maps onto every other.
fn check_binding_group(group: &[String], tables: &BTreeMap<String, TableRule>) -> Result<()> {
    let mut rules = Vec::with_capacity(group.len());
    for member in group {
        let rule = tables.get(member).ok_or_else(|| {
            ShardingError::Config(format!("binding table '{}' has no table rule", member))
        })?;
        rules.push(rule);
    }
    let Some((first, rest)) = rules.split_first() else {
        return Ok(());
    };
    let shape = |rule: &TableRule| -> Vec<(String, usize)> {
        rule.data_source_names()
            .into_iter()
            .map(|ds| {
                let count = rule.actual_tables(&ds).len();
                (ds, count)
            })
            .collect()
    };
    let expected = shape(first);
    for other in rest {
        if shape(other) != expected {
            return Err(ShardingError::Config(format!(
                "binding tables {} and {} have different actual data node layouts",
                first.logic_table, other.logic_table
            )));
        }
    }
    Ok(())
}

//! Rule file type definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::Properties;

/// Root of a sharding rule file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Physical data source names, in routing order.
    pub data_sources: Vec<String>,

    /// Data source for tables without a sharding rule (default: the only
    /// data source, if there is exactly one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_data_source: Option<String>,

    /// Sharded tables keyed by logic table name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableRuleConfig>,

    /// Auto tables keyed by logic table name.
    #[serde(default)]
    pub auto_tables: BTreeMap<String, AutoTableRuleConfig>,

    /// Binding groups, each a comma-separated list of logic tables.
    #[serde(default)]
    pub binding_tables: Vec<String>,

    /// Tables present in full on every data source.
    #[serde(default)]
    pub broadcast_tables: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database_strategy: Option<StrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_table_strategy: Option<StrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_key_generate_strategy: Option<KeyGenerateStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_audit_strategy: Option<AuditStrategyConfig>,

    /// Column used by standard strategies that name none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sharding_column: Option<String>,

    #[serde(default)]
    pub sharding_algorithms: BTreeMap<String, AlgorithmConfig>,

    #[serde(default)]
    pub key_generators: BTreeMap<String, AlgorithmConfig>,

    #[serde(default)]
    pub auditors: BTreeMap<String, AlgorithmConfig>,
}

/// One sharded logic table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    /// Data node pattern, e.g. `ds_${0..1}.t_order_${0..1}` (default: the
    /// logic table on every data source).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_data_nodes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_strategy: Option<StrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_strategy: Option<StrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generate_strategy: Option<KeyGenerateStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_strategy: Option<AuditStrategyConfig>,
}

/// A logic table whose actual tables are laid out by its sharding algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTableRuleConfig {
    /// Comma-separated data sources (default: all data sources).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_data_sources: Option<String>,

    pub sharding_strategy: StrategyConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generate_strategy: Option<KeyGenerateStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_strategy: Option<AuditStrategyConfig>,
}

/// Sharding strategy of one dimension. At most one kind may be set; none set
/// means the dimension is not sharded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<StandardStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complex: Option<ComplexStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<HintStrategyConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<NoneStrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardStrategyConfig {
    /// Sharding column (default: `default_sharding_column`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding_column: Option<String>,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexStrategyConfig {
    /// Comma-separated sharding columns.
    pub sharding_columns: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintStrategyConfig {
    pub algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoneStrategyConfig {}

impl StrategyConfig {
    pub fn standard(column: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            standard: Some(StandardStrategyConfig {
                sharding_column: Some(column.into()),
                algorithm: algorithm.into(),
            }),
            ..Self::default()
        }
    }

    pub fn complex(columns: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            complex: Some(ComplexStrategyConfig {
                sharding_columns: columns.into(),
                algorithm: algorithm.into(),
            }),
            ..Self::default()
        }
    }

    pub fn hint(algorithm: impl Into<String>) -> Self {
        Self {
            hint: Some(HintStrategyConfig {
                algorithm: algorithm.into(),
            }),
            ..Self::default()
        }
    }

    pub fn none() -> Self {
        Self {
            none: Some(NoneStrategyConfig {}),
            ..Self::default()
        }
    }

    /// Number of strategy kinds set.
    pub fn kinds_set(&self) -> usize {
        [
            self.standard.is_some(),
            self.complex.is_some(),
            self.hint.is_some(),
            self.none.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Name of the referenced sharding algorithm, if any.
    pub fn algorithm(&self) -> Option<&str> {
        if let Some(s) = &self.standard {
            return Some(&s.algorithm);
        }
        if let Some(c) = &self.complex {
            return Some(&c.algorithm);
        }
        self.hint.as_ref().map(|h| h.algorithm.as_str())
    }
}

/// Column and generator for keys of inserted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfig {
    pub column: String,
    pub key_generator: String,
}

/// Auditors run before routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditStrategyConfig {
    pub auditors: Vec<String>,

    /// Fail routing when an auditor rejects the table (default: false).
    #[serde(default)]
    pub force_sharding: bool,
}

/// `{type, props}` reference to an algorithm implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    #[serde(rename = "type")]
    pub algorithm_type: String,

    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub props: Properties,
}

impl AlgorithmConfig {
    pub fn new(algorithm_type: impl Into<String>, props: Properties) -> Self {
        Self {
            algorithm_type: algorithm_type.into(),
            props,
        }
    }
}

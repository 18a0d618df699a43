//! Resolved sharding strategies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::algorithm::{
    ComplexShardingAlgorithm, HintShardingAlgorithm, ShardingAlgorithm,
    StandardShardingAlgorithm,
};
use crate::config::StrategyConfig;
use crate::error::{Result, ShardingError};
use crate::expr::split_expressions;

/// The strategy of one routing dimension, bound to its algorithm instance.
#[derive(Debug, Clone)]
pub enum ShardingStrategy {
    Standard {
        column: String,
        algorithm_name: String,
        algorithm: Arc<dyn StandardShardingAlgorithm>,
    },
    Complex {
        columns: Vec<String>,
        algorithm_name: String,
        algorithm: Arc<dyn ComplexShardingAlgorithm>,
    },
    Hint {
        algorithm_name: String,
        algorithm: Arc<dyn HintShardingAlgorithm>,
    },
    None,
}

impl ShardingStrategy {
    /// Bind a strategy configuration to the instantiated algorithms.
    ///
    /// Column names are lowercased. The referenced algorithm must have the
    /// capability shape the strategy kind needs.
    pub(crate) fn resolve(
        config: &StrategyConfig,
        default_column: Option<&str>,
        algorithms: &HashMap<String, ShardingAlgorithm>,
    ) -> Result<Self> {
        let lookup = |name: &str| {
            algorithms.get(name).ok_or_else(|| {
                ShardingError::Config(format!("sharding algorithm '{}' is not declared", name))
            })
        };

        if let Some(standard) = &config.standard {
            let column = standard
                .sharding_column
                .as_deref()
                .or(default_column)
                .ok_or_else(|| {
                    ShardingError::Config(format!(
                        "standard strategy using '{}' has no sharding column",
                        standard.algorithm
                    ))
                })?;
            return match lookup(&standard.algorithm)? {
                ShardingAlgorithm::Standard(algorithm) => Ok(ShardingStrategy::Standard {
                    column: column.trim().to_ascii_lowercase(),
                    algorithm_name: standard.algorithm.clone(),
                    algorithm: Arc::clone(algorithm),
                }),
                other => Err(kind_mismatch("standard", &standard.algorithm, other)),
            };
        }

        if let Some(complex) = &config.complex {
            return match lookup(&complex.algorithm)? {
                ShardingAlgorithm::Complex(algorithm) => Ok(ShardingStrategy::Complex {
                    columns: split_expressions(&complex.sharding_columns)
                        .into_iter()
                        .map(|c| c.to_ascii_lowercase())
                        .collect(),
                    algorithm_name: complex.algorithm.clone(),
                    algorithm: Arc::clone(algorithm),
                }),
                other => Err(kind_mismatch("complex", &complex.algorithm, other)),
            };
        }

        if let Some(hint) = &config.hint {
            return match lookup(&hint.algorithm)? {
                ShardingAlgorithm::Hint(algorithm) => Ok(ShardingStrategy::Hint {
                    algorithm_name: hint.algorithm.clone(),
                    algorithm: Arc::clone(algorithm),
                }),
                other => Err(kind_mismatch("hint", &hint.algorithm, other)),
            };
        }

        Ok(ShardingStrategy::None)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ShardingStrategy::None)
    }

    /// Sharding columns the strategy reads from statement conditions.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            ShardingStrategy::Standard { column, .. } => vec![column.as_str()],
            ShardingStrategy::Complex { columns, .. } => columns.iter().map(String::as_str).collect(),
            ShardingStrategy::Hint { .. } | ShardingStrategy::None => Vec::new(),
        }
    }

    pub fn algorithm_name(&self) -> Option<&str> {
        match self {
            ShardingStrategy::Standard { algorithm_name, .. }
            | ShardingStrategy::Complex { algorithm_name, .. }
            | ShardingStrategy::Hint { algorithm_name, .. } => Some(algorithm_name),
            ShardingStrategy::None => None,
        }
    }

    /// The standard algorithm, if this is a standard strategy.
    pub fn standard_algorithm(&self) -> Option<&Arc<dyn StandardShardingAlgorithm>> {
        match self {
            ShardingStrategy::Standard { algorithm, .. } => Some(algorithm),
            _ => None,
        }
    }
}

fn kind_mismatch(strategy: &str, name: &str, algorithm: &ShardingAlgorithm) -> ShardingError {
    ShardingError::Config(format!(
        "{} strategy references '{}', which is a {} algorithm ({})",
        strategy,
        name,
        algorithm.kind(),
        algorithm.algorithm_type()
    ))
}

impl fmt::Display for ShardingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardingStrategy::Standard {
                column,
                algorithm_name,
                ..
            } => write!(f, "standard({}, {})", column, algorithm_name),
            ShardingStrategy::Complex {
                columns,
                algorithm_name,
                ..
            } => write!(f, "complex({}, {})", columns.join(","), algorithm_name),
            ShardingStrategy::Hint { algorithm_name, .. } => write!(f, "hint({})", algorithm_name),
            ShardingStrategy::None => write!(f, "none"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{AlgorithmCatalog, Properties};
    use crate::config::AlgorithmConfig;

    fn algorithms() -> HashMap<String, ShardingAlgorithm> {
        let catalog = AlgorithmCatalog::with_builtins();
        let mut map = HashMap::new();
        map.insert(
            "mod2".to_string(),
            catalog
                .create_sharding(&AlgorithmConfig::new(
                    "INLINE",
                    Properties::new().with("algorithm-expression", "ds_${id % 2}"),
                ))
                .unwrap(),
        );
        map.insert(
            "by_hint".to_string(),
            catalog
                .create_sharding(&AlgorithmConfig::new("HINT_INLINE", Properties::new()))
                .unwrap(),
        );
        map
    }

    #[test]
    fn test_resolve_standard_with_default_column() {
        let mut config = StrategyConfig::standard("ignored", "mod2");
        if let Some(standard) = config.standard.as_mut() {
            standard.sharding_column = None;
        }
        let strategy = ShardingStrategy::resolve(&config, Some("Order_ID"), &algorithms()).unwrap();
        assert_eq!(strategy.columns(), vec!["order_id"]);
        assert_eq!(strategy.to_string(), "standard(order_id, mod2)");
    }

    #[test]
    fn test_resolve_kind_mismatch() {
        let config = StrategyConfig::standard("id", "by_hint");
        let err = ShardingStrategy::resolve(&config, None, &algorithms()).unwrap_err();
        assert!(err.to_string().contains("which is a hint algorithm"));

        let hint = ShardingStrategy::resolve(&StrategyConfig::hint("by_hint"), None, &algorithms())
            .unwrap();
        assert!(hint.columns().is_empty());
        assert_eq!(hint.algorithm_name(), Some("by_hint"));
    }

    #[test]
    fn test_resolve_none() {
        let strategy =
            ShardingStrategy::resolve(&StrategyConfig::none(), None, &algorithms()).unwrap();
        assert!(strategy.is_none());
    }
}

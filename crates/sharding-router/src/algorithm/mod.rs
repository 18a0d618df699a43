//! Sharding algorithm SPI and built-in algorithms.
//!
//! This module defines the three capability shapes a sharding algorithm can
//! have, and the registry that turns an `{type, props}` configuration into a
//! live instance:
//!
//! - [`StandardShardingAlgorithm`]: one column, precise or range values
//! - [`ComplexShardingAlgorithm`]: several columns sharded jointly
//! - [`HintShardingAlgorithm`]: values injected through the hint context
//! - [`ShardingAuditAlgorithm`]: checks run before a statement is routed
//!
//! # Dispatch
//!
//! A configured algorithm is held as a [`ShardingAlgorithm`] variant, one per
//! capability shape. The routing engine matches on the variant to decide which
//! call a condition turns into; there is no downcasting.
//!
//! Algorithms are constructed once per rule model and shared read-only across
//! every routing call, so all of them are `Send + Sync`.

pub mod audit;
pub mod auto_interval;
pub mod catalog;
pub mod complex_inline;
pub mod hint_inline;
pub mod inline;
pub mod props;
pub mod volume_range;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::core::{ConditionValue, ShardingRange, ShardingValue};
use crate::error::Result;

pub use audit::{AuditContext, DmlShardingConditionsAuditor, ShardingAuditAlgorithm};
pub use auto_interval::AutoIntervalShardingAlgorithm;
pub use catalog::AlgorithmCatalog;
pub use complex_inline::ComplexInlineShardingAlgorithm;
pub use hint_inline::HintInlineShardingAlgorithm;
pub use inline::InlineShardingAlgorithm;
pub use props::Properties;
pub use volume_range::VolumeRangeShardingAlgorithm;

/// Sharding on a single column.
pub trait StandardShardingAlgorithm: Send + Sync + fmt::Debug {
    /// Registered type name (e.g. `INLINE`).
    fn algorithm_type(&self) -> &str;

    /// Select the one target holding `value`, or `None` if no candidate does.
    fn select_precise(
        &self,
        candidates: &[String],
        column: &str,
        value: &ShardingValue,
    ) -> Result<Option<String>>;

    /// Select every target that may hold a value in `range`, in candidate order.
    fn select_range(
        &self,
        candidates: &[String],
        column: &str,
        range: &ShardingRange,
    ) -> Result<Vec<String>>;

    /// Number of actual tables the algorithm lays out when it shards an auto
    /// table. `None` if it cannot drive an auto table.
    fn auto_tables_amount(&self) -> Option<usize> {
        None
    }
}

/// Sharding on several columns at once.
///
/// `values` is keyed by lowercase column name and only holds the sharding
/// columns the statement constrains.
pub trait ComplexShardingAlgorithm: Send + Sync + fmt::Debug {
    fn algorithm_type(&self) -> &str;

    fn select_complex(
        &self,
        candidates: &[String],
        values: &BTreeMap<String, ConditionValue>,
    ) -> Result<Vec<String>>;
}

/// Sharding on values supplied out-of-band through the hint context.
pub trait HintShardingAlgorithm: Send + Sync + fmt::Debug {
    fn algorithm_type(&self) -> &str;

    fn select_hint(&self, candidates: &[String], values: &[ShardingValue]) -> Result<Vec<String>>;
}

/// A configured sharding algorithm, tagged by capability shape.
#[derive(Debug, Clone)]
pub enum ShardingAlgorithm {
    Standard(Arc<dyn StandardShardingAlgorithm>),
    Complex(Arc<dyn ComplexShardingAlgorithm>),
    Hint(Arc<dyn HintShardingAlgorithm>),
}

/// Capability shape of a [`ShardingAlgorithm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Standard,
    Complex,
    Hint,
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlgorithmKind::Standard => write!(f, "standard"),
            AlgorithmKind::Complex => write!(f, "complex"),
            AlgorithmKind::Hint => write!(f, "hint"),
        }
    }
}

impl ShardingAlgorithm {
    pub fn algorithm_type(&self) -> &str {
        match self {
            ShardingAlgorithm::Standard(a) => a.algorithm_type(),
            ShardingAlgorithm::Complex(a) => a.algorithm_type(),
            ShardingAlgorithm::Hint(a) => a.algorithm_type(),
        }
    }

    pub fn kind(&self) -> AlgorithmKind {
        match self {
            ShardingAlgorithm::Standard(_) => AlgorithmKind::Standard,
            ShardingAlgorithm::Complex(_) => AlgorithmKind::Complex,
            ShardingAlgorithm::Hint(_) => AlgorithmKind::Hint,
        }
    }

    pub fn auto_tables_amount(&self) -> Option<usize> {
        match self {
            ShardingAlgorithm::Standard(a) => a.auto_tables_amount(),
            _ => None,
        }
    }
}

/// Find the candidate whose trailing decimal digits equal `index`.
///
/// Auto-table layouts name their actual tables `<logic>_<index>`; range and
/// interval algorithms compute the index and look the table up by suffix.
pub fn find_by_suffix<'a>(candidates: &'a [String], index: usize) -> Option<&'a String> {
    candidates.iter().find(|name| numeric_suffix(name) == Some(index))
}

fn numeric_suffix(name: &str) -> Option<usize> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Keep the candidates that appear in `selected`, in candidate order.
pub(crate) fn retain_candidates<'a, I>(candidates: &[String], selected: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let selected: Vec<&str> = selected.into_iter().collect();
    candidates
        .iter()
        .filter(|c| selected.iter().any(|s| s.eq_ignore_ascii_case(c)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_suffix() {
        let candidates: Vec<String> = ["t_log_0", "t_log_1", "t_log_10", "t_log"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(find_by_suffix(&candidates, 1).map(String::as_str), Some("t_log_1"));
        assert_eq!(find_by_suffix(&candidates, 10).map(String::as_str), Some("t_log_10"));
        assert!(find_by_suffix(&candidates, 2).is_none());
    }

    #[test]
    fn test_retain_candidates_keeps_candidate_order() {
        let candidates: Vec<String> = ["ds_0", "ds_1", "ds_2"].iter().map(|s| s.to_string()).collect();
        let kept = retain_candidates(&candidates, ["DS_2", "ds_0", "ds_9"]);
        assert_eq!(kept, vec!["ds_0", "ds_2"]);
    }
}

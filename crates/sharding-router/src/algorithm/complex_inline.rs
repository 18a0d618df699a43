//! `COMPLEX_INLINE`: one inline expression over several sharding columns.

use std::collections::BTreeMap;

use crate::core::{ConditionValue, ShardingValue};
use crate::error::{Result, ShardingError};
use crate::expr::{split_expressions, InlineExpression};

use super::inline::to_eval_value;
use super::props::Properties;
use super::{retain_candidates, ComplexShardingAlgorithm};

pub const TYPE: &str = "COMPLEX_INLINE";

const SHARDING_COLUMNS: &str = "sharding-columns";
const ALGORITHM_EXPRESSION: &str = "algorithm-expression";

/// Upper bound on value combinations evaluated for one call.
const MAX_COMBINATIONS: usize = 65_536;

#[derive(Debug)]
pub struct ComplexInlineShardingAlgorithm {
    columns: Vec<String>,
    expression: InlineExpression,
}

impl ComplexInlineShardingAlgorithm {
    pub fn new(props: &Properties) -> Result<Self> {
        let columns: Vec<String> = split_expressions(props.require(TYPE, SHARDING_COLUMNS)?)
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let source = props.require(TYPE, ALGORITHM_EXPRESSION)?;
        let expression = InlineExpression::parse(source)
            .map_err(|e| ShardingError::algorithm_init(TYPE, e.to_string()))?;
        Ok(Self {
            columns,
            expression,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Every combination of one value per column, first column varying slowest.
    fn combinations<'a>(
        &self,
        values: &'a BTreeMap<String, ConditionValue>,
    ) -> Result<Vec<Vec<&'a ShardingValue>>> {
        let mut combos: Vec<Vec<&ShardingValue>> = vec![Vec::new()];
        for column in &self.columns {
            let column_values: Vec<&ShardingValue> = match values.get(column) {
                Some(ConditionValue::Precise(v)) => vec![v],
                Some(ConditionValue::List(vs)) => vs.iter().collect(),
                Some(ConditionValue::Range(_)) => {
                    return Err(ShardingError::algorithm(
                        TYPE,
                        format!("range values on column {} are not supported", column),
                    ))
                }
                None => {
                    return Err(ShardingError::algorithm(
                        TYPE,
                        format!(
                            "needs values for all {} sharding columns, column {} has none",
                            self.columns.len(),
                            column
                        ),
                    ))
                }
            };
            if combos.len().saturating_mul(column_values.len()) > MAX_COMBINATIONS {
                return Err(ShardingError::algorithm(TYPE, "too many value combinations"));
            }
            combos = combos
                .iter()
                .flat_map(|prefix| {
                    column_values.iter().map(move |v| {
                        let mut next = prefix.clone();
                        next.push(*v);
                        next
                    })
                })
                .collect();
        }
        Ok(combos)
    }
}

impl ComplexShardingAlgorithm for ComplexInlineShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn select_complex(
        &self,
        candidates: &[String],
        values: &BTreeMap<String, ConditionValue>,
    ) -> Result<Vec<String>> {
        let mut targets = Vec::new();
        for combo in self.combinations(values)? {
            let target = self
                .expression
                .evaluate(|name| {
                    self.columns
                        .iter()
                        .position(|c| c.eq_ignore_ascii_case(name))
                        .map(|i| to_eval_value(combo[i]))
                })
                .map_err(|e| ShardingError::algorithm(TYPE, e.to_string()))?;
            targets.push(target);
        }
        Ok(retain_candidates(
            candidates,
            targets.iter().map(String::as_str),
        ))
    }
}

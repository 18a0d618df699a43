//! `INLINE`: name the target with an inline expression.

use crate::core::{ShardingRange, ShardingValue};
use crate::error::{Result, ShardingError};
use crate::expr::{EvalValue, InlineExpression};

use super::props::Properties;
use super::{retain_candidates, StandardShardingAlgorithm};

pub const TYPE: &str = "INLINE";

const ALGORITHM_EXPRESSION: &str = "algorithm-expression";

/// Widest bounded range evaluated value by value. Wider ranges select every
/// candidate.
pub const MAX_RANGE_SPAN: i64 = 65_536;

/// Evaluates `algorithm-expression` with the sharding column (and `value`)
/// bound to the sharding value, e.g. `t_order_${order_id % 4}`.
#[derive(Debug)]
pub struct InlineShardingAlgorithm {
    expression: InlineExpression,
}

impl InlineShardingAlgorithm {
    pub fn new(props: &Properties) -> Result<Self> {
        let source = props.require(TYPE, ALGORITHM_EXPRESSION)?;
        let expression = InlineExpression::parse(source)
            .map_err(|e| ShardingError::algorithm_init(TYPE, e.to_string()))?;
        Ok(Self { expression })
    }

    fn evaluate(&self, column: &str, value: &ShardingValue) -> Result<String> {
        let bound = to_eval_value(value);
        self.expression
            .evaluate(|name| {
                (name.eq_ignore_ascii_case(column) || name == "value").then(|| bound.clone())
            })
            .map_err(|e| ShardingError::algorithm(TYPE, e.to_string()))
    }
}

pub(crate) fn to_eval_value(value: &ShardingValue) -> EvalValue {
    match value {
        ShardingValue::Int(n) => EvalValue::Int(*n),
        other => EvalValue::Text(other.to_string()),
    }
}

impl StandardShardingAlgorithm for InlineShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn select_precise(
        &self,
        candidates: &[String],
        column: &str,
        value: &ShardingValue,
    ) -> Result<Option<String>> {
        let target = self.evaluate(column, value)?;
        Ok(candidates
            .iter()
            .find(|c| c.eq_ignore_ascii_case(&target))
            .cloned())
    }

    fn select_range(
        &self,
        candidates: &[String],
        column: &str,
        range: &ShardingRange,
    ) -> Result<Vec<String>> {
        let (lower, upper) = range.inclusive_i64_bounds().ok_or_else(|| {
            ShardingError::algorithm(TYPE, format!("range {} has non-integer bounds", range))
        })?;
        let (lower, upper) = match (lower, upper) {
            (Some(lower), Some(upper)) => (lower, upper),
            _ => return Ok(candidates.to_vec()),
        };
        if upper < lower {
            return Ok(Vec::new());
        }
        if upper.saturating_sub(lower) >= MAX_RANGE_SPAN {
            return Ok(candidates.to_vec());
        }

        let mut targets: Vec<String> = Vec::new();
        for n in lower..=upper {
            let target = self.evaluate(column, &ShardingValue::Int(n))?;
            let known = candidates.iter().any(|c| c.eq_ignore_ascii_case(&target));
            if known && !targets.iter().any(|t| t.eq_ignore_ascii_case(&target)) {
                targets.push(target);
            }
            if targets.len() == candidates.len() {
                break;
            }
        }
        Ok(retain_candidates(
            candidates,
            targets.iter().map(String::as_str),
        ))
    }
}

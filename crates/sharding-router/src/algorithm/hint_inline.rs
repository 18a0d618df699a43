//! `HINT_INLINE`: inline expression over hinted values.

use crate::core::ShardingValue;
use crate::error::{Result, ShardingError};
use crate::expr::InlineExpression;

use super::inline::to_eval_value;
use super::props::Properties;
use super::{retain_candidates, HintShardingAlgorithm};

pub const TYPE: &str = "HINT_INLINE";

const ALGORITHM_EXPRESSION: &str = "algorithm-expression";
const DEFAULT_EXPRESSION: &str = "${value}";

#[derive(Debug)]
pub struct HintInlineShardingAlgorithm {
    expression: InlineExpression,
}

impl HintInlineShardingAlgorithm {
    pub fn new(props: &Properties) -> Result<Self> {
        let source = props
            .get(ALGORITHM_EXPRESSION)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_EXPRESSION);
        let expression = InlineExpression::parse(source)
            .map_err(|e| ShardingError::algorithm_init(TYPE, e.to_string()))?;
        Ok(Self { expression })
    }
}

impl HintShardingAlgorithm for HintInlineShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn select_hint(&self, candidates: &[String], values: &[ShardingValue]) -> Result<Vec<String>> {
        let mut targets = Vec::with_capacity(values.len());
        for value in values {
            let bound = to_eval_value(value);
            let target = self
                .expression
                .evaluate(|name| (name == "value").then(|| bound.clone()))
                .map_err(|e| ShardingError::algorithm(TYPE, e.to_string()))?;
            targets.push(target);
        }
        Ok(retain_candidates(
            candidates,
            targets.iter().map(String::as_str),
        ))
    }
}

//! `AUTO_INTERVAL`: fixed-width time buckets between two datetimes.
//!
//! The bucket of a value is `ceil(round2(seconds_since_lower / sharding_seconds))`,
//! clamped to the bucket range. The quotient is a binary `f64` and `round2`
//! formats it to two decimal places before the ceiling is taken. This is what
//! existing deployments assign: with one-hour buckets `lower + 18s` is
//! bucket 1 (0.005 is stored slightly above the tie), `lower + 3601s` is
//! bucket 1 and `lower + 28818s` is bucket 9.

use chrono::NaiveDateTime;

use crate::core::{parse_datetime, ShardingRange, ShardingValue, DATETIME_FORMAT};
use crate::error::{Result, ShardingError};

use super::props::Properties;
use super::{find_by_suffix, StandardShardingAlgorithm};

pub const TYPE: &str = "AUTO_INTERVAL";

const DATETIME_LOWER: &str = "datetime-lower";
const DATETIME_UPPER: &str = "datetime-upper";
const SHARDING_SECONDS: &str = "sharding-seconds";

#[derive(Debug)]
pub struct AutoIntervalShardingAlgorithm {
    lower: NaiveDateTime,
    sharding_seconds: i64,
    bucket_count: usize,
}

impl AutoIntervalShardingAlgorithm {
    pub fn new(props: &Properties) -> Result<Self> {
        let lower = required_datetime(props, DATETIME_LOWER)?;
        let upper = required_datetime(props, DATETIME_UPPER)?;
        let sharding_seconds: i64 = props.parse_required(TYPE, SHARDING_SECONDS)?;

        if sharding_seconds <= 0 {
            return Err(ShardingError::algorithm_init(
                TYPE,
                format!("{} must be positive, got {}", SHARDING_SECONDS, sharding_seconds),
            ));
        }
        if upper < lower {
            return Err(ShardingError::algorithm_init(
                TYPE,
                format!("{} is earlier than {}", DATETIME_UPPER, DATETIME_LOWER),
            ));
        }

        let span = seconds_between(lower, upper);
        let buckets = span / sharding_seconds + i64::from(span % sharding_seconds != 0);
        let bucket_count = usize::try_from(buckets + 2).map_err(|_| {
            ShardingError::algorithm_init(TYPE, "interval yields too many buckets")
        })?;

        Ok(Self {
            lower,
            sharding_seconds,
            bucket_count,
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    /// Bucket index of a datetime.
    pub fn bucket_of(&self, value: NaiveDateTime) -> usize {
        let quotient = seconds_between(self.lower, value) as f64 / self.sharding_seconds as f64;
        let rounded: f64 = format!("{:.2}", quotient).parse().unwrap_or(quotient);
        let last = self.bucket_count.saturating_sub(1);
        if rounded <= 0.0 {
            0
        } else {
            (rounded.ceil() as usize).min(last)
        }
    }

    fn bucket_of_value(&self, value: &ShardingValue) -> Result<usize> {
        value.as_datetime().map(|dt| self.bucket_of(dt)).ok_or_else(|| {
            ShardingError::algorithm(
                TYPE,
                format!("'{}' is not a datetime in format {}", value, DATETIME_FORMAT),
            )
        })
    }
}

fn required_datetime(props: &Properties, key: &str) -> Result<NaiveDateTime> {
    let raw = props.require(TYPE, key)?;
    parse_datetime(raw).ok_or_else(|| {
        ShardingError::algorithm_init(
            TYPE,
            format!("{} '{}' does not match {}", key, raw, DATETIME_FORMAT),
        )
    })
}

/// Whole seconds from `from` to `to`, truncated toward zero.
fn seconds_between(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_milliseconds() / 1000
}

impl StandardShardingAlgorithm for AutoIntervalShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn select_precise(
        &self,
        candidates: &[String],
        _column: &str,
        value: &ShardingValue,
    ) -> Result<Option<String>> {
        let bucket = self.bucket_of_value(value)?;
        Ok(find_by_suffix(candidates, bucket).cloned())
    }

    fn select_range(
        &self,
        candidates: &[String],
        _column: &str,
        range: &ShardingRange,
    ) -> Result<Vec<String>> {
        let first = match range.lower_endpoint() {
            Some(v) => self.bucket_of_value(v)?,
            None => 0,
        };
        let last = match range.upper_endpoint() {
            Some(v) => self.bucket_of_value(v)?,
            None => self.bucket_count - 1,
        };
        Ok((first..=last)
            .filter_map(|bucket| find_by_suffix(candidates, bucket).cloned())
            .collect())
    }

    fn auto_tables_amount(&self) -> Option<usize> {
        Some(self.bucket_count)
    }
}

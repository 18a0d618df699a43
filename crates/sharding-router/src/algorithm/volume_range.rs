//! `VOLUME_RANGE`: fixed-volume integer partitions.
//!
//! With `n = ceil((upper - lower) / volume)` the partitions are:
//!
//! ```text
//! 0        (-inf, lower)
//! 1..=n    [lower + (i-1)*volume, min(lower + i*volume, upper))
//! n+1      [upper, +inf)
//! ```

use crate::core::{ShardingRange, ShardingValue};
use crate::error::{Result, ShardingError};

use super::props::Properties;
use super::{find_by_suffix, StandardShardingAlgorithm};

pub const TYPE: &str = "VOLUME_RANGE";

const RANGE_LOWER: &str = "range-lower";
const RANGE_UPPER: &str = "range-upper";
const SHARDING_VOLUME: &str = "sharding-volume";

#[derive(Debug)]
pub struct VolumeRangeShardingAlgorithm {
    lower: i64,
    upper: i64,
    volume: i64,
    /// Number of bounded partitions (`n`).
    partitions: usize,
}

impl VolumeRangeShardingAlgorithm {
    pub fn new(props: &Properties) -> Result<Self> {
        let lower: i64 = props.parse_required(TYPE, RANGE_LOWER)?;
        let upper: i64 = props.parse_required(TYPE, RANGE_UPPER)?;
        let volume: i64 = props.parse_required(TYPE, SHARDING_VOLUME)?;

        if volume <= 0 {
            return Err(ShardingError::algorithm_init(
                TYPE,
                format!("{} must be positive, got {}", SHARDING_VOLUME, volume),
            ));
        }
        let span = upper
            .checked_sub(lower)
            .ok_or_else(|| ShardingError::algorithm_init(TYPE, "range is too wide"))?;
        if span < volume {
            return Err(ShardingError::algorithm_init(
                TYPE,
                "Range can not be smaller than volume",
            ));
        }

        let partitions = span / volume + i64::from(span % volume != 0);
        let partitions = usize::try_from(partitions)
            .map_err(|_| ShardingError::algorithm_init(TYPE, "too many partitions"))?;

        Ok(Self {
            lower,
            upper,
            volume,
            partitions,
        })
    }

    /// Partition index holding `value`.
    pub fn partition_of(&self, value: i64) -> usize {
        if value < self.lower {
            0
        } else if value >= self.upper {
            self.partitions + 1
        } else {
            ((value - self.lower) / self.volume) as usize + 1
        }
    }

    fn integer(value: &ShardingValue) -> Result<i64> {
        value
            .as_i64()
            .ok_or_else(|| ShardingError::algorithm(TYPE, format!("'{}' is not an integer", value)))
    }
}

impl StandardShardingAlgorithm for VolumeRangeShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn select_precise(
        &self,
        candidates: &[String],
        _column: &str,
        value: &ShardingValue,
    ) -> Result<Option<String>> {
        let partition = self.partition_of(Self::integer(value)?);
        Ok(find_by_suffix(candidates, partition).cloned())
    }

    fn select_range(
        &self,
        candidates: &[String],
        _column: &str,
        range: &ShardingRange,
    ) -> Result<Vec<String>> {
        let (lower, upper) = range.inclusive_i64_bounds().ok_or_else(|| {
            ShardingError::algorithm(TYPE, format!("range {} has non-integer bounds", range))
        })?;
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if upper < lower {
                return Ok(Vec::new());
            }
        }
        let first = lower.map_or(0, |v| self.partition_of(v));
        let last = upper.map_or(self.partitions + 1, |v| self.partition_of(v));
        Ok((first..=last)
            .filter_map(|partition| find_by_suffix(candidates, partition).cloned())
            .collect())
    }

    fn auto_tables_amount(&self) -> Option<usize> {
        Some(self.partitions + 2)
    }
}

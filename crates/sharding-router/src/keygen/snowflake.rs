//! `SNOWFLAKE` key generator.
//!
//! Key layout, most significant bit first:
//!
//! ```text
//! | 1 sign (0) | 41 ms since epoch | 10 worker id | 12 sequence |
//! ```
//!
//! Keys from one generator strictly increase. Within a millisecond the
//! sequence counts up; on a new millisecond it restarts from a rotating offset
//! in `[0, max-vibration-offset]`, so keys reduced modulo a small power of two
//! do not all land on 0 or 1.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::algorithm::Properties;
use crate::error::{Result, ShardingError};

use super::{Clock, KeyGenerator, KeyGeneratorContext};

pub const TYPE: &str = "SNOWFLAKE";

/// 2016-11-01 00:00:00 UTC.
pub const EPOCH_MILLIS: i64 = 1_477_958_400_000;

const SEQUENCE_BITS: u32 = 12;
const WORKER_ID_BITS: u32 = 10;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;

/// Largest worker id that fits the layout.
pub const MAX_WORKER_ID: u32 = (1 << WORKER_ID_BITS) - 1;

const MAX_VIBRATION_OFFSET: &str = "max-vibration-offset";
const MAX_TOLERATE_DIFFERENCE: &str = "max-tolerate-time-difference-milliseconds";
const DEFAULT_MAX_VIBRATION_OFFSET: i64 = 1;
const DEFAULT_MAX_TOLERATE_DIFFERENCE: i64 = 10;

#[derive(Debug)]
struct State {
    last_millis: i64,
    sequence: i64,
    sequence_offset: i64,
}

#[derive(Debug)]
pub struct SnowflakeKeyGenerator {
    epoch_millis: i64,
    worker_id: i64,
    max_vibration_offset: i64,
    max_tolerate_millis: i64,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl SnowflakeKeyGenerator {
    pub fn new(props: &Properties, context: &KeyGeneratorContext) -> Result<Self> {
        let max_vibration_offset =
            props.parse_or(TYPE, MAX_VIBRATION_OFFSET, DEFAULT_MAX_VIBRATION_OFFSET)?;
        if !(0..=SEQUENCE_MASK).contains(&max_vibration_offset) {
            return Err(ShardingError::algorithm_init(
                TYPE,
                format!("Illegal max vibration offset {}", max_vibration_offset),
            ));
        }
        let max_tolerate_millis =
            props.parse_or(TYPE, MAX_TOLERATE_DIFFERENCE, DEFAULT_MAX_TOLERATE_DIFFERENCE)?;

        let worker_id = match &context.worker_id_provider {
            Some(provider) => provider.worker_id()?,
            None => 0,
        };
        if worker_id > MAX_WORKER_ID {
            return Err(ShardingError::algorithm_init(
                TYPE,
                format!("worker id {} exceeds {}", worker_id, MAX_WORKER_ID),
            ));
        }

        Ok(Self {
            epoch_millis: EPOCH_MILLIS,
            worker_id: i64::from(worker_id),
            max_vibration_offset,
            max_tolerate_millis,
            clock: Arc::clone(&context.clock),
            state: Mutex::new(State {
                last_millis: 0,
                sequence: 0,
                sequence_offset: -1,
            }),
        })
    }

    /// Replace the epoch keys are measured from.
    pub fn with_epoch(mut self, epoch_millis: i64) -> Self {
        self.epoch_millis = epoch_millis;
        self
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    /// Read the clock, waiting out a backward step shorter than the tolerance.
    fn current_millis(&self, last_millis: i64) -> Result<i64> {
        loop {
            let now = self.clock.current_millis();
            if now >= last_millis {
                return Ok(now);
            }
            let behind = last_millis - now;
            if behind >= self.max_tolerate_millis {
                return Err(ShardingError::ClockMovedBack {
                    last_millis,
                    current_millis: now,
                });
            }
            warn!(
                "Clock moved back {}ms (last {}ms, now {}ms), waiting",
                behind, last_millis, now
            );
            self.clock.sleep_ms(behind as u64);
        }
    }

    fn wait_until_after(&self, millis: i64) -> i64 {
        loop {
            let now = self.clock.current_millis();
            if now > millis {
                return now;
            }
            self.clock.sleep_ms(0);
        }
    }
}

impl KeyGenerator for SnowflakeKeyGenerator {
    fn algorithm_type(&self) -> &str {
        TYPE
    }

    fn generate_key(&self) -> Result<i64> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let mut now = self.current_millis(state.last_millis)?;
        if now == state.last_millis {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                now = self.wait_until_after(now);
            }
        } else {
            state.sequence_offset = if state.sequence_offset >= self.max_vibration_offset {
                0
            } else {
                state.sequence_offset + 1
            };
            state.sequence = state.sequence_offset;
        }
        state.last_millis = now;

        Ok(((now - self.epoch_millis) << TIMESTAMP_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }
}

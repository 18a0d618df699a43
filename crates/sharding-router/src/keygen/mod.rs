//! Distributed key generation.
//!
//! A [`KeyGenerator`] hands out 64-bit keys for inserts that do not supply
//! their own. Generators are created from the `key_generators` section of a
//! rule file through the [`AlgorithmCatalog`](crate::algorithm::AlgorithmCatalog),
//! which also supplies the [`Clock`] and the optional [`WorkerIdProvider`].

pub mod snowflake;

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::error::Result;

pub use snowflake::SnowflakeKeyGenerator;

/// Produces unique keys.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn algorithm_type(&self) -> &str;

    fn generate_key(&self) -> Result<i64>;
}

/// Source of wall-clock milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn current_millis(&self) -> i64;

    /// Block the calling thread. A zero-length sleep yields.
    fn sleep_ms(&self, millis: u64);
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn sleep_ms(&self, millis: u64) {
        if millis == 0 {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_millis(millis));
        }
    }
}

/// A clock that only moves when told to.
///
/// Sleeping advances it by the sleep length; a zero-length sleep advances it
/// by one millisecond so spin-waits terminate.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(start_millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn current_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, millis: u64) {
        let step = i64::try_from(millis).unwrap_or(i64::MAX).max(1);
        self.advance(step);
    }
}

/// Supplies the worker id of this instance.
pub trait WorkerIdProvider: Send + Sync + fmt::Debug {
    fn worker_id(&self) -> Result<u32>;
}

/// A fixed worker id, e.g. from deployment configuration.
#[derive(Debug, Clone, Copy)]
pub struct StaticWorkerId(pub u32);

impl WorkerIdProvider for StaticWorkerId {
    fn worker_id(&self) -> Result<u32> {
        Ok(self.0)
    }
}

/// Collaborators handed to key generator factories.
#[derive(Debug, Clone)]
pub struct KeyGeneratorContext {
    pub clock: Arc<dyn Clock>,
    pub worker_id_provider: Option<Arc<dyn WorkerIdProvider>>,
}

impl Default for KeyGeneratorContext {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            worker_id_provider: None,
        }
    }
}

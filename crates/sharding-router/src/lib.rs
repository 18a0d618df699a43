//! # sharding-router
//!
//! Routing core for sharding database middleware.
//!
//! Given a rule model that spreads logic tables over many physical data
//! sources, this library decides which actual data nodes each statement must
//! reach, and generates distributed primary keys:
//!
//! - **Rule model** loaded from YAML, validated and fully built at load time
//! - **Sharding algorithms** behind a registry: inline expressions, time
//!   intervals, volume ranges, multi-column and hint algorithms
//! - **Snowflake keys** with clock-regression tolerance and an injectable clock
//! - **Hint context** for caller-supplied sharding values, scoped to a thread
//! - **Binding and broadcast tables** kept consistent across a statement
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sharding_router::{RouteEngine, RuleConfig, ShardingCondition, ShardingRule, StatementContext};
//!
//! fn main() -> sharding_router::Result<()> {
//!     let config = RuleConfig::load("rules.yaml")?;
//!     let engine = RouteEngine::new(Arc::new(ShardingRule::from_config(&config)?));
//!
//!     let statement = StatementContext::new(["t_order"])
//!         .with_condition(ShardingCondition::new("t_order").with_precise("order_id", 10));
//!     for node in engine.route(&statement)?.nodes() {
//!         println!("{}", node);
//!     }
//!     Ok(())
//! }
//! ```

pub mod algorithm;
pub mod config;
pub mod core;
pub mod error;
pub mod expr;
pub mod hint;
pub mod keygen;
pub mod route;
pub mod rule;

// Re-exports for convenient access
pub use algorithm::{AlgorithmCatalog, Properties, ShardingAlgorithm};
pub use config::{AlgorithmConfig, RuleConfig, StrategyConfig};
pub use crate::core::{ConditionValue, DataNode, ShardingCondition, ShardingRange, ShardingValue};
pub use error::{Result, ShardingError};
pub use hint::{HintManager, HintState};
pub use keygen::{Clock, KeyGenerator, SnowflakeKeyGenerator};
pub use route::{ConditionExtractor, RouteEngine, RouteResult, StatementContext};
pub use rule::{GeneratedKey, ShardingRule, TableRule};

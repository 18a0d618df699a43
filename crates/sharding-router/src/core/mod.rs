//! Core value types shared by the rule model, the algorithms and the router.
//!
//! - [`value`]: sharding values and ranges
//! - [`condition`]: per-table sharding predicates extracted from a statement
//! - [`data_node`]: the `(data source, table)` unit of routing output
//!
//! These types carry no behavior beyond conversion and comparison. They are
//! created per statement and dropped once the statement is routed.

pub mod condition;
pub mod data_node;
pub mod value;

pub use condition::{ColumnCondition, ConditionValue, ShardingCondition};
pub use data_node::DataNode;
pub use value::{parse_datetime, ShardingRange, ShardingValue, DATETIME_FORMAT};

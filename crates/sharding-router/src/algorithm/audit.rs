//! Audit algorithms run before a table is routed.

use std::fmt;

use crate::error::Result;

use super::props::Properties;

pub const DML_SHARDING_CONDITIONS: &str = "DML_SHARDING_CONDITIONS";

/// What an auditor sees about one table of a statement.
#[derive(Debug, Clone, Copy)]
pub struct AuditContext<'a> {
    pub logic_table: &'a str,
    /// A sharding condition reached the table from the statement, a hint, or
    /// a binding group member.
    pub has_sharding_condition: bool,
    pub hinted: bool,
}

/// Decides whether a table may be routed.
pub trait ShardingAuditAlgorithm: Send + Sync + fmt::Debug {
    fn algorithm_type(&self) -> &str;

    /// `true` if the table passes the audit.
    fn check(&self, context: &AuditContext<'_>) -> bool;
}

/// Rejects statements that reach a sharded table without a sharding condition,
/// which would otherwise fan out to every actual data node.
#[derive(Debug, Default)]
pub struct DmlShardingConditionsAuditor;

impl DmlShardingConditionsAuditor {
    pub fn new(_props: &Properties) -> Result<Self> {
        Ok(Self)
    }
}

impl ShardingAuditAlgorithm for DmlShardingConditionsAuditor {
    fn algorithm_type(&self) -> &str {
        DML_SHARDING_CONDITIONS
    }

    fn check(&self, context: &AuditContext<'_>) -> bool {
        context.has_sharding_condition || context.hinted
    }
}

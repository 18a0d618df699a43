//! Error types for the sharding router.

use thiserror::Error;

/// Main error type for rule loading, routing and key generation.
#[derive(Error, Debug)]
pub enum ShardingError {
    /// Configuration error (invalid YAML, unknown references, bad layout, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A sharding, key generation or audit algorithm rejected its properties
    #[error("Algorithm initialization failed for {algorithm_type}: {message}")]
    AlgorithmInit {
        algorithm_type: String,
        message: String,
    },

    /// Malformed inline expression or data node pattern
    #[error("Invalid expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    /// Wall clock moved backward further than the generator tolerates
    #[error("Clock moved backwards: last timestamp {last_millis}ms, current timestamp {current_millis}ms")]
    ClockMovedBack {
        last_millis: i64,
        current_millis: i64,
    },

    /// A hint context is already attached to the current thread
    #[error("Hint context is already active on this thread - release it before acquiring another")]
    HintAlreadyActive,

    /// The sharding condition shape cannot be consumed by the table's strategy
    #[error("Cannot route table {table}: {message}")]
    ConditionMismatch { table: String, message: String },

    /// An algorithm could not evaluate the values it was given
    #[error("{algorithm_type} sharding failed: {message}")]
    Algorithm {
        algorithm_type: String,
        message: String,
    },

    /// A forced audit found no sharding condition for the table
    #[error("Audit '{auditor}' rejected table {table}: a sharding condition is required")]
    AuditViolation { table: String, auditor: String },

    /// Routing a sharded table selected no configured data node
    #[error("No actual data node matched the sharding conditions of table {0}")]
    NoRouteTarget(String),

    /// An unconfigured table has no data source to fall back to
    #[error("Table {0} is not sharded and no default data source is configured")]
    NoDefaultDataSource(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShardingError {
    /// Create an AlgorithmInit error for the given algorithm type
    pub fn algorithm_init(algorithm_type: impl Into<String>, message: impl Into<String>) -> Self {
        ShardingError::AlgorithmInit {
            algorithm_type: algorithm_type.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidExpression error
    pub fn expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        ShardingError::InvalidExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an Algorithm evaluation error
    pub fn algorithm(algorithm_type: impl Into<String>, message: impl Into<String>) -> Self {
        ShardingError::Algorithm {
            algorithm_type: algorithm_type.into(),
            message: message.into(),
        }
    }

    /// Create a ConditionMismatch error
    pub fn mismatch(table: impl Into<String>, message: impl Into<String>) -> Self {
        ShardingError::ConditionMismatch {
            table: table.into(),
            message: message.into(),
        }
    }

    /// True for errors raised while loading or initializing the rule model.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ShardingError::Config(_)
                | ShardingError::AlgorithmInit { .. }
                | ShardingError::InvalidExpression { .. }
                | ShardingError::Yaml(_)
        )
    }

    /// True for errors that abort routing of a single statement.
    pub fn is_routing(&self) -> bool {
        matches!(
            self,
            ShardingError::ConditionMismatch { .. }
                | ShardingError::Algorithm { .. }
                | ShardingError::AuditViolation { .. }
                | ShardingError::NoRouteTarget(_)
                | ShardingError::NoDefaultDataSource(_)
                | ShardingError::HintAlreadyActive
        )
    }

    /// Process exit code for the command-line front end.
    pub fn exit_code(&self) -> u8 {
        if self.is_configuration() {
            2
        } else if self.is_routing() {
            3
        } else if matches!(self, ShardingError::ClockMovedBack { .. }) {
            4
        } else {
            1
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for sharding operations.
pub type Result<T> = std::result::Result<T, ShardingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_class() {
        assert_eq!(ShardingError::Config("x".into()).exit_code(), 2);
        assert_eq!(ShardingError::algorithm_init("INLINE", "x").exit_code(), 2);
        assert_eq!(ShardingError::mismatch("t_order", "x").exit_code(), 3);
        assert_eq!(ShardingError::HintAlreadyActive.exit_code(), 3);
        assert_eq!(
            ShardingError::ClockMovedBack {
                last_millis: 10,
                current_millis: 1
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = ShardingError::AuditViolation {
            table: "t_order".into(),
            auditor: "sharding_key_required".into(),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Audit 'sharding_key_required' rejected table t_order"));
    }
}

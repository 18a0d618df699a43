//! Rule file validation.
//!
//! Only structural checks live here: names, references and shapes. Whether
//! algorithms accept their properties and patterns expand is checked when the
//! rule model is built.

use std::collections::{HashMap, HashSet};

use super::{AuditStrategyConfig, KeyGenerateStrategyConfig, RuleConfig, StrategyConfig};
use crate::error::{Result, ShardingError};
use crate::expr::split_expressions;

/// Validate the rule file.
pub fn validate(config: &RuleConfig) -> Result<()> {
    // Data sources
    if config.data_sources.is_empty() {
        return Err(ShardingError::Config(
            "data_sources must list at least one data source".into(),
        ));
    }
    let mut data_sources = HashSet::new();
    for ds in &config.data_sources {
        if ds.trim().is_empty() {
            return Err(ShardingError::Config(
                "data_sources contains an empty name".into(),
            ));
        }
        if !data_sources.insert(ds.as_str()) {
            return Err(ShardingError::Config(format!(
                "data source '{}' is declared twice",
                ds
            )));
        }
    }
    if let Some(default) = &config.default_data_source {
        if !data_sources.contains(default.as_str()) {
            return Err(ShardingError::Config(format!(
                "default_data_source '{}' is not a declared data source",
                default
            )));
        }
    }

    // Logic tables are unique across tables and auto_tables, ignoring case
    let mut logic_tables: HashSet<String> = HashSet::new();
    for name in config.tables.keys().chain(config.auto_tables.keys()) {
        if name.trim().is_empty() {
            return Err(ShardingError::Config("logic table name is empty".into()));
        }
        if !logic_tables.insert(name.to_ascii_lowercase()) {
            return Err(ShardingError::Config(format!(
                "logic table '{}' is declared more than once",
                name
            )));
        }
    }

    // Strategy and algorithm references
    let scope = "default";
    check_strategy(config, scope, "default_database_strategy", config.default_database_strategy.as_ref())?;
    check_strategy(config, scope, "default_table_strategy", config.default_table_strategy.as_ref())?;
    check_key_generate(config, scope, config.default_key_generate_strategy.as_ref())?;
    check_audit(config, scope, config.default_audit_strategy.as_ref())?;

    for (name, table) in &config.tables {
        check_strategy(config, name, "database_strategy", table.database_strategy.as_ref())?;
        check_strategy(config, name, "table_strategy", table.table_strategy.as_ref())?;
        check_key_generate(config, name, table.key_generate_strategy.as_ref())?;
        check_audit(config, name, table.audit_strategy.as_ref())?;
    }
    for (name, table) in &config.auto_tables {
        check_strategy(config, name, "sharding_strategy", Some(&table.sharding_strategy))?;
        if table.sharding_strategy.standard.is_none() {
            return Err(ShardingError::Config(format!(
                "{}: auto table sharding_strategy must be a standard strategy",
                name
            )));
        }
        check_key_generate(config, name, table.key_generate_strategy.as_ref())?;
        check_audit(config, name, table.audit_strategy.as_ref())?;
        if let Some(sources) = &table.actual_data_sources {
            for ds in split_expressions(sources) {
                if !data_sources.contains(ds.as_str()) {
                    return Err(ShardingError::Config(format!(
                        "{}: actual_data_sources names undeclared data source '{}'",
                        name, ds
                    )));
                }
            }
        }
    }

    // Binding groups
    let mut group_of: HashMap<String, usize> = HashMap::new();
    for (index, group) in config.binding_tables.iter().enumerate() {
        let members = split_expressions(group);
        if members.is_empty() {
            return Err(ShardingError::Config(format!(
                "binding group {} is empty",
                index
            )));
        }
        for member in members {
            let key = member.to_ascii_lowercase();
            if !logic_tables.contains(&key) {
                return Err(ShardingError::Config(format!(
                    "binding table '{}' is not a declared sharded table",
                    member
                )));
            }
            if group_of.insert(key, index).is_some() {
                return Err(ShardingError::Config(format!(
                    "binding table '{}' belongs to more than one binding group",
                    member
                )));
            }
        }
    }

    // Broadcast tables
    let auto_tables: HashSet<String> = config
        .auto_tables
        .keys()
        .map(|t| t.to_ascii_lowercase())
        .collect();
    for table in &config.broadcast_tables {
        let key = table.to_ascii_lowercase();
        if auto_tables.contains(&key) {
            return Err(ShardingError::Config(format!(
                "broadcast table '{}' is also an auto table",
                table
            )));
        }
        if group_of.contains_key(&key) {
            return Err(ShardingError::Config(format!(
                "broadcast table '{}' cannot be a binding table",
                table
            )));
        }
    }

    Ok(())
}

fn check_strategy(
    config: &RuleConfig,
    scope: &str,
    field: &str,
    strategy: Option<&StrategyConfig>,
) -> Result<()> {
    let Some(strategy) = strategy else {
        return Ok(());
    };
    if strategy.kinds_set() > 1 {
        return Err(ShardingError::Config(format!(
            "{}: {} sets more than one strategy kind",
            scope, field
        )));
    }
    if let Some(standard) = &strategy.standard {
        let column = standard
            .sharding_column
            .as_deref()
            .or(config.default_sharding_column.as_deref());
        if column.map_or(true, |c| c.trim().is_empty()) {
            return Err(ShardingError::Config(format!(
                "{}: {} has no sharding_column and no default_sharding_column is set",
                scope, field
            )));
        }
    }
    if let Some(complex) = &strategy.complex {
        if split_expressions(&complex.sharding_columns).is_empty() {
            return Err(ShardingError::Config(format!(
                "{}: {} lists no sharding_columns",
                scope, field
            )));
        }
    }
    if let Some(algorithm) = strategy.algorithm() {
        if !config.sharding_algorithms.contains_key(algorithm) {
            return Err(ShardingError::Config(format!(
                "{}: {} references undeclared sharding algorithm '{}'",
                scope, field, algorithm
            )));
        }
    }
    Ok(())
}

fn check_key_generate(
    config: &RuleConfig,
    scope: &str,
    strategy: Option<&KeyGenerateStrategyConfig>,
) -> Result<()> {
    let Some(strategy) = strategy else {
        return Ok(());
    };
    if strategy.column.trim().is_empty() {
        return Err(ShardingError::Config(format!(
            "{}: key_generate_strategy.column is required",
            scope
        )));
    }
    if !config.key_generators.contains_key(&strategy.key_generator) {
        return Err(ShardingError::Config(format!(
            "{}: key_generate_strategy references undeclared key generator '{}'",
            scope, strategy.key_generator
        )));
    }
    Ok(())
}

fn check_audit(config: &RuleConfig, scope: &str, strategy: Option<&AuditStrategyConfig>) -> Result<()> {
    let Some(strategy) = strategy else {
        return Ok(());
    };
    for auditor in &strategy.auditors {
        if !config.auditors.contains_key(auditor) {
            return Err(ShardingError::Config(format!(
                "{}: audit_strategy references undeclared auditor '{}'",
                scope, auditor
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::Properties;
    use crate::config::{AlgorithmConfig, AutoTableRuleConfig, TableRuleConfig};

    fn valid_config() -> RuleConfig {
        let mut config = RuleConfig {
            data_sources: vec!["ds_0".into(), "ds_1".into()],
            ..RuleConfig::default()
        };
        config.sharding_algorithms.insert(
            "db_inline".into(),
            AlgorithmConfig::new(
                "INLINE",
                Properties::new().with("algorithm-expression", "ds_${user_id % 2}"),
            ),
        );
        config.tables.insert(
            "t_order".into(),
            TableRuleConfig {
                actual_data_nodes: Some("ds_${0..1}.t_order".into()),
                database_strategy: Some(StrategyConfig::standard("user_id", "db_inline")),
                ..TableRuleConfig::default()
            },
        );
        config.tables.insert(
            "t_order_item".into(),
            TableRuleConfig {
                actual_data_nodes: Some("ds_${0..1}.t_order_item".into()),
                database_strategy: Some(StrategyConfig::standard("user_id", "db_inline")),
                ..TableRuleConfig::default()
            },
        );
        config.binding_tables.push("t_order, t_order_item".into());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_no_data_sources() {
        let mut config = valid_config();
        config.data_sources.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_duplicate_data_source() {
        let mut config = valid_config();
        config.data_sources.push("ds_0".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_unknown_default_data_source() {
        let mut config = valid_config();
        config.default_data_source = Some("ds_9".into());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_logic_table_names_unique_ignoring_case() {
        let mut config = valid_config();
        config.auto_tables.insert(
            "T_ORDER".into(),
            AutoTableRuleConfig {
                actual_data_sources: None,
                sharding_strategy: StrategyConfig::standard("user_id", "db_inline"),
                key_generate_strategy: None,
                audit_strategy: None,
            },
        );
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("declared more than once"));
    }

    #[test]
    fn test_undeclared_algorithm_reference() {
        let mut config = valid_config();
        config.default_table_strategy = Some(StrategyConfig::hint("missing"));
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("undeclared sharding algorithm 'missing'"));
    }

    #[test]
    fn test_undeclared_key_generator_and_auditor() {
        let mut config = valid_config();
        config.default_key_generate_strategy = Some(KeyGenerateStrategyConfig {
            column: "order_id".into(),
            key_generator: "snowflake".into(),
        });
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.default_audit_strategy = Some(AuditStrategyConfig {
            auditors: vec!["sharding_key_required".into()],
            force_sharding: true,
        });
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_standard_strategy_needs_a_column() {
        let mut config = valid_config();
        let mut strategy = StrategyConfig::standard("user_id", "db_inline");
        if let Some(standard) = strategy.standard.as_mut() {
            standard.sharding_column = None;
        }
        config.default_database_strategy = Some(strategy);
        assert!(validate(&config).is_err());

        config.default_sharding_column = Some("user_id".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_two_strategy_kinds() {
        let mut config = valid_config();
        let mut strategy = StrategyConfig::standard("user_id", "db_inline");
        strategy.none = Some(Default::default());
        config.default_database_strategy = Some(strategy);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_binding_group_rules() {
        let mut config = valid_config();
        config.binding_tables.push("t_order_item, t_user".into());
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config.binding_tables = vec!["t_order".into(), "t_order, t_order_item".into()];
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("more than one binding group"));
    }

    #[test]
    fn test_broadcast_table_cannot_be_auto_table() {
        let mut config = valid_config();
        config.auto_tables.insert(
            "t_dict".into(),
            AutoTableRuleConfig {
                actual_data_sources: None,
                sharding_strategy: StrategyConfig::standard("id", "db_inline"),
                key_generate_strategy: None,
                audit_strategy: None,
            },
        );
        config.broadcast_tables.push("t_dict".into());
        assert!(validate(&config).is_err());
    }
}

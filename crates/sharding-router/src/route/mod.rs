//! Statement routing.
//!
//! The [`RouteEngine`] resolves every logic table of a statement to actual
//! data nodes:
//!
//! - broadcast tables go to all of their nodes;
//! - sharded tables run their database strategy over their data sources,
//!   then their table strategy over the actual tables of each selected data
//!   source, so every result is one of the table's configured nodes;
//! - members of a binding group reuse the node indexes of the group's primary
//!   table instead of running their own strategies;
//! - other tables go to the default data source.
//!
//! Hint values take precedence over statement conditions. Any error aborts
//! the whole statement; there is no partial route.

mod context;
mod result;

pub use context::{ConditionExtractor, StatementContext};
pub use result::{RouteResult, RouteSource, TableRoute};

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::algorithm::{retain_candidates, AuditContext};
use crate::core::{ConditionValue, DataNode, ShardingCondition, ShardingValue};
use crate::error::{Result, ShardingError};
use crate::hint::{HintManager, HintState};
use crate::rule::{ShardingRule, ShardingStrategy, TableRule};

/// Where one routing dimension takes its sharding values from.
#[derive(Clone, Copy)]
enum DimensionInput<'a> {
    Hint(&'a [ShardingValue]),
    Conditions(&'a [&'a ShardingCondition]),
}

/// Routes statements against one rule model generation.
///
/// The engine holds no mutable state; clone it or share it freely across
/// threads.
#[derive(Debug, Clone)]
pub struct RouteEngine {
    rule: Arc<ShardingRule>,
}

impl RouteEngine {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> &ShardingRule {
        &self.rule
    }

    /// Route with the hint context attached to the current thread, if any.
    pub fn route(&self, statement: &StatementContext) -> Result<RouteResult> {
        let hint = HintManager::snapshot();
        self.route_with(statement, hint.as_ref())
    }

    /// Extract the conditions of `statement`, then [`route`](Self::route) it.
    pub fn route_statement<S: ?Sized>(
        &self,
        statement: &S,
        extractor: &dyn ConditionExtractor<S>,
    ) -> Result<RouteResult> {
        let context = extractor.extract(statement)?;
        self.route(&context)
    }

    /// Route with an explicit hint state instead of the thread's.
    pub fn route_with(
        &self,
        statement: &StatementContext,
        hint: Option<&HintState>,
    ) -> Result<RouteResult> {
        let tables = statement.table_names();
        let write_route_only = hint.is_some_and(HintState::is_write_route_only);

        if let Some(data_source) = hint.and_then(HintState::data_source_name) {
            return self.route_to_data_source(&tables, data_source, write_route_only);
        }

        let primaries = self.binding_primaries(&tables, statement, hint);
        let mut routes: Vec<Option<TableRoute>> = vec![None; tables.len()];

        // Everything except binding followers first, so primaries are ready.
        for (i, name) in tables.iter().enumerate() {
            if self.rule.is_broadcast(name) {
                routes[i] = Some(TableRoute {
                    logic_table: name.to_string(),
                    nodes: self.rule.broadcast_nodes(name),
                    source: RouteSource::Broadcast,
                });
                continue;
            }
            let Some(table_rule) = self.rule.table_rule(name) else {
                let data_source = self
                    .rule
                    .default_data_source()
                    .ok_or_else(|| ShardingError::NoDefaultDataSource(name.to_string()))?;
                routes[i] = Some(TableRoute {
                    logic_table: name.to_string(),
                    nodes: vec![DataNode::new(data_source, *name)],
                    source: RouteSource::Default,
                });
                continue;
            };
            if is_follower(&primaries, &self.rule, name) {
                continue;
            }
            let conditions = statement.conditions_for(name);
            self.audit(
                table_rule,
                has_sharding_condition(table_rule, &conditions),
                is_hinted(name, hint),
            )?;
            let nodes = self.route_sharded(table_rule, &conditions, hint)?;
            routes[i] = Some(TableRoute {
                logic_table: name.to_string(),
                nodes,
                source: RouteSource::Sharded,
            });
        }

        for (i, name) in tables.iter().enumerate() {
            if routes[i].is_some() {
                continue;
            }
            let Some(table_rule) = self.rule.table_rule(name) else {
                continue;
            };
            let primary = primary_of(&primaries, &self.rule, name)
                .ok_or_else(|| ShardingError::NoRouteTarget(name.to_string()))?;
            let primary_index = tables
                .iter()
                .position(|t| t.eq_ignore_ascii_case(primary))
                .ok_or_else(|| ShardingError::NoRouteTarget(name.to_string()))?;
            let (primary_rule, primary_nodes) = match (
                self.rule.table_rule(primary),
                routes[primary_index].as_ref(),
            ) {
                (Some(rule), Some(route)) => (rule, route.nodes.clone()),
                _ => return Err(ShardingError::NoRouteTarget(name.to_string())),
            };

            let own_conditions = statement.conditions_for(name);
            let has_condition = has_sharding_condition(table_rule, &own_conditions)
                || has_sharding_condition(primary_rule, &statement.conditions_for(primary));
            self.audit(
                table_rule,
                has_condition,
                is_hinted(name, hint) || is_hinted(primary, hint),
            )?;

            let nodes = follow_binding(primary_rule, &primary_nodes, table_rule)?;
            routes[i] = Some(TableRoute {
                logic_table: name.to_string(),
                nodes,
                source: RouteSource::Binding {
                    primary: primary.to_string(),
                },
            });
        }

        let table_routes: Vec<TableRoute> = routes.into_iter().flatten().collect();
        for route in &table_routes {
            debug!(
                "Routed {} ({}): {}",
                route.logic_table,
                route.source,
                route
                    .nodes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(RouteResult {
            table_routes,
            write_route_only,
        })
    }

    fn route_to_data_source(
        &self,
        tables: &[&str],
        data_source: &str,
        write_route_only: bool,
    ) -> Result<RouteResult> {
        if !self.rule.data_sources().iter().any(|ds| ds == data_source) {
            return Err(ShardingError::mismatch(
                tables.first().copied().unwrap_or("*"),
                format!("hinted data source '{}' is not configured", data_source),
            ));
        }
        let table_routes = tables
            .iter()
            .map(|name| TableRoute {
                logic_table: name.to_string(),
                nodes: vec![DataNode::new(data_source, *name)],
                source: RouteSource::Hinted,
            })
            .collect();
        debug!("Routed statement to hinted data source {}", data_source);
        Ok(RouteResult {
            table_routes,
            write_route_only,
        })
    }

    /// Pick the primary of every binding group the statement touches: the
    /// first member in statement order with a condition or hint, else the
    /// first member in statement order. Keyed by the group's first member.
    fn binding_primaries<'a>(
        &self,
        tables: &[&'a str],
        statement: &StatementContext,
        hint: Option<&HintState>,
    ) -> HashMap<String, &'a str> {
        let mut with_condition: HashMap<String, &'a str> = HashMap::new();
        let mut first_seen: HashMap<String, &'a str> = HashMap::new();

        for name in tables {
            if self.rule.is_broadcast(name) {
                continue;
            }
            let (Some(group), Some(table_rule)) =
                (self.rule.binding_group(name), self.rule.table_rule(name))
            else {
                continue;
            };
            let Some(key) = group.first() else {
                continue;
            };
            first_seen.entry(key.clone()).or_insert(*name);
            let conditioned = has_sharding_condition(table_rule, &statement.conditions_for(name))
                || is_hinted(name, hint);
            if conditioned {
                with_condition.entry(key.clone()).or_insert(*name);
            }
        }

        for (key, name) in with_condition {
            first_seen.insert(key, name);
        }
        first_seen
    }

    fn route_sharded(
        &self,
        table_rule: &TableRule,
        conditions: &[&ShardingCondition],
        hint: Option<&HintState>,
    ) -> Result<Vec<DataNode>> {
        let table = table_rule.logic_table();
        let database_input = match hint {
            Some(h) if h.is_database_sharding_only() => {
                DimensionInput::Hint(h.unkeyed_database_values())
            }
            Some(h) if !h.database_sharding_values(table).is_empty() => {
                DimensionInput::Hint(h.database_sharding_values(table))
            }
            _ => DimensionInput::Conditions(conditions),
        };
        let table_input = match hint {
            Some(h) if !h.table_sharding_values(table).is_empty() => {
                DimensionInput::Hint(h.table_sharding_values(table))
            }
            _ => DimensionInput::Conditions(conditions),
        };

        let data_sources = table_rule.data_source_names();
        let selected_sources = select(
            table,
            table_rule.database_strategy(),
            &data_sources,
            database_input,
        )?;

        let mut nodes = Vec::new();
        for data_source in &selected_sources {
            let candidates = table_rule.actual_tables(data_source);
            for actual in select(table, table_rule.table_strategy(), &candidates, table_input)? {
                nodes.push(DataNode::new(data_source.clone(), actual));
            }
        }

        if nodes.is_empty() {
            return Err(ShardingError::NoRouteTarget(table.to_string()));
        }
        Ok(nodes)
    }

    fn audit(&self, table_rule: &TableRule, has_sharding_condition: bool, hinted: bool) -> Result<()> {
        let Some(audit) = table_rule.audit().filter(|a| a.force_sharding) else {
            return Ok(());
        };
        let context = AuditContext {
            logic_table: table_rule.logic_table(),
            has_sharding_condition,
            hinted,
        };
        if audit.auditors.is_empty() && !has_sharding_condition && !hinted {
            return Err(ShardingError::AuditViolation {
                table: table_rule.logic_table().to_string(),
                auditor: "force_sharding".to_string(),
            });
        }
        for name in &audit.auditors {
            let auditor = self.rule.auditor(name).ok_or_else(|| {
                ShardingError::Config(format!("auditor '{}' is not declared", name))
            })?;
            if !auditor.check(&context) {
                return Err(ShardingError::AuditViolation {
                    table: table_rule.logic_table().to_string(),
                    auditor: name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl From<ShardingRule> for RouteEngine {
    fn from(rule: ShardingRule) -> Self {
        Self::new(Arc::new(rule))
    }
}

fn is_follower(primaries: &HashMap<String, &str>, rule: &ShardingRule, name: &str) -> bool {
    primary_of(primaries, rule, name).is_some_and(|p| !p.eq_ignore_ascii_case(name))
}

fn primary_of<'a>(
    primaries: &HashMap<String, &'a str>,
    rule: &ShardingRule,
    name: &str,
) -> Option<&'a str> {
    let key = rule.binding_group(name)?.first()?;
    primaries.get(key).copied()
}

fn has_sharding_condition(table_rule: &TableRule, conditions: &[&ShardingCondition]) -> bool {
    conditions.iter().any(|condition| {
        condition
            .columns
            .iter()
            .any(|c| table_rule.is_sharding_column(&c.column))
    })
}

fn is_hinted(table: &str, hint: Option<&HintState>) -> bool {
    hint.is_some_and(|h| {
        h.is_database_sharding_only()
            || !h.database_sharding_values(table).is_empty()
            || !h.table_sharding_values(table).is_empty()
    })
}

/// Map the primary's nodes onto a binding follower by position within each
/// data source.
fn follow_binding(
    primary: &TableRule,
    primary_nodes: &[DataNode],
    follower: &TableRule,
) -> Result<Vec<DataNode>> {
    let mut nodes = Vec::with_capacity(primary_nodes.len());
    for node in primary_nodes {
        let index = primary
            .actual_tables(&node.data_source)
            .iter()
            .position(|t| *t == node.table);
        let follower_tables = follower.actual_tables(&node.data_source);
        match index.and_then(|i| follower_tables.get(i)) {
            Some(table) => nodes.push(DataNode::new(node.data_source.clone(), table.clone())),
            None => return Err(ShardingError::NoRouteTarget(follower.logic_table().to_string())),
        }
    }
    Ok(nodes)
}

/// Run one dimension's strategy over `candidates`.
///
/// Algorithm evaluation failures are reported as a condition mismatch on
/// the table.
fn select(
    table: &str,
    strategy: &ShardingStrategy,
    candidates: &[String],
    input: DimensionInput<'_>,
) -> Result<Vec<String>> {
    let selected = match select_unordered(table, strategy, candidates, input) {
        Ok(Some(selected)) => selected,
        Ok(None) => return Ok(candidates.to_vec()),
        Err(ShardingError::Algorithm { algorithm_type, message }) => {
            return Err(ShardingError::mismatch(
                table,
                format!("{} sharding failed: {}", algorithm_type, message),
            ))
        }
        Err(e) => return Err(e),
    };
    Ok(retain_candidates(candidates, selected.iter().map(String::as_str)))
}

/// `Ok(None)` means unconstrained: every candidate.
fn select_unordered(
    table: &str,
    strategy: &ShardingStrategy,
    candidates: &[String],
    input: DimensionInput<'_>,
) -> Result<Option<Vec<String>>> {
    match (strategy, input) {
        (ShardingStrategy::None, _) => Ok(None),

        (ShardingStrategy::Hint { .. }, DimensionInput::Conditions(_)) => Ok(None),
        (ShardingStrategy::Hint { algorithm, .. }, DimensionInput::Hint(values)) => {
            algorithm.select_hint(candidates, values).map(Some)
        }

        (ShardingStrategy::Standard { column, algorithm, .. }, DimensionInput::Hint(values)) => {
            let mut selected = Vec::new();
            for value in values {
                selected.extend(algorithm.select_precise(candidates, column, value)?);
            }
            Ok(Some(selected))
        }
        (ShardingStrategy::Standard { column, algorithm, .. }, DimensionInput::Conditions(conditions)) => {
            if conditions.is_empty() {
                return Ok(None);
            }
            let mut selected = Vec::new();
            for condition in conditions {
                match condition.column(column) {
                    None => return Ok(None),
                    Some(ConditionValue::Precise(value)) => {
                        selected.extend(algorithm.select_precise(candidates, column, value)?);
                    }
                    Some(ConditionValue::Range(range)) => {
                        selected.extend(algorithm.select_range(candidates, column, range)?);
                    }
                    Some(ConditionValue::List(values)) => {
                        for value in values {
                            selected.extend(algorithm.select_precise(candidates, column, value)?);
                        }
                    }
                }
            }
            Ok(Some(selected))
        }

        (ShardingStrategy::Complex { algorithm_name, .. }, DimensionInput::Hint(_)) => {
            Err(ShardingError::mismatch(
                table,
                format!(
                    "hint values cannot drive complex strategy '{}'",
                    algorithm_name
                ),
            ))
        }
        (ShardingStrategy::Complex { columns, algorithm, .. }, DimensionInput::Conditions(conditions)) => {
            if conditions.is_empty() {
                return Ok(None);
            }
            let mut selected = HashSet::new();
            for condition in conditions {
                let values: BTreeMap<String, ConditionValue> = columns
                    .iter()
                    .filter_map(|c| condition.column(c).map(|v| (c.clone(), v.clone())))
                    .collect();
                if values.is_empty() {
                    return Ok(None);
                }
                selected.extend(algorithm.select_complex(candidates, &values)?);
            }
            Ok(Some(selected.into_iter().collect()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleConfig;
    use crate::core::ShardingRange;

    const RULES: &str = r#"
data_sources: [ds_0, ds_1]
tables:
  t_order:
    actual_data_nodes: ds_${0..1}.t_order_${0..1}
    database_strategy:
      standard: { sharding_column: user_id, algorithm: db_inline }
    table_strategy:
      standard: { sharding_column: order_id, algorithm: t_order_inline }
  t_mod3:
    actual_data_nodes: ds_0.t_mod3_${0..1}
    table_strategy:
      standard: { sharding_column: id, algorithm: mod3 }
  t_user:
    actual_data_nodes: ds_${0..1}.t_user
    database_strategy:
      complex: { sharding_columns: "region, user_id", algorithm: by_region }
  t_hinted:
    actual_data_nodes: ds_${0..1}.t_hinted
    database_strategy:
      hint: { algorithm: by_hint }
sharding_algorithms:
  db_inline: { type: INLINE, props: { algorithm-expression: "ds_${user_id % 2}" } }
  t_order_inline: { type: INLINE, props: { algorithm-expression: "t_order_${order_id % 2}" } }
  mod3: { type: INLINE, props: { algorithm-expression: "t_mod3_${id % 3}" } }
  by_region: { type: COMPLEX_INLINE, props: { sharding-columns: "region, user_id", algorithm-expression: "ds_${(region + user_id) % 2}" } }
  by_hint: { type: HINT_INLINE, props: { algorithm-expression: "ds_${value % 2}" } }
"#;

    fn engine() -> RouteEngine {
        let rule = ShardingRule::from_config(&RuleConfig::from_yaml(RULES).unwrap()).unwrap();
        RouteEngine::from(rule)
    }

    fn names(result: &RouteResult, table: &str) -> Vec<String> {
        result.nodes_for(table).iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_precise_on_both_dimensions() {
        let ctx = StatementContext::new(["t_order"]).with_condition(
            ShardingCondition::new("t_order")
                .with_precise("user_id", 1)
                .with_precise("order_id", 4),
        );
        let result = engine().route_with(&ctx, None).unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_1.t_order_0"]);
        assert_eq!(result.route_for("t_order").unwrap().source, RouteSource::Sharded);
    }

    #[test]
    fn test_missing_dimension_fans_out() {
        let ctx = StatementContext::new(["t_order"])
            .with_condition(ShardingCondition::new("t_order").with_precise("order_id", 3));
        let result = engine().route_with(&ctx, None).unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_0.t_order_1", "ds_1.t_order_1"]);
    }

    #[test]
    fn test_conditions_are_ored_and_lists_expand() {
        let ctx = StatementContext::new(["t_order"])
            .with_condition(
                ShardingCondition::new("t_order")
                    .with_precise("user_id", 0)
                    .with_list("order_id", [1, 3]),
            )
            .with_condition(
                ShardingCondition::new("t_order")
                    .with_precise("user_id", 1)
                    .with_range("order_id", ShardingRange::closed(10, 10)),
            );
        let result = engine().route_with(&ctx, None).unwrap();
        assert_eq!(
            names(&result, "t_order"),
            vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]
        );
    }

    #[test]
    fn test_selection_outside_actual_nodes() {
        let ctx = StatementContext::new(["t_mod3"])
            .with_condition(ShardingCondition::new("t_mod3").with_precise("id", 2));
        let err = engine().route_with(&ctx, None).unwrap_err();
        assert!(matches!(err, ShardingError::NoRouteTarget(ref t) if t == "t_mod3"));
    }

    #[test]
    fn test_algorithm_failure_is_condition_mismatch() {
        let ctx = StatementContext::new(["t_order"]).with_condition(
            ShardingCondition::new("t_order")
                .with_range("order_id", ShardingRange::closed("a", "z")),
        );
        let err = engine().route_with(&ctx, None).unwrap_err();
        assert!(matches!(err, ShardingError::ConditionMismatch { ref table, .. } if table == "t_order"));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_complex_strategy() {
        let ctx = StatementContext::new(["t_user"]).with_condition(
            ShardingCondition::new("t_user")
                .with_precise("region", 1)
                .with_list("user_id", [1, 2]),
        );
        let result = engine().route_with(&ctx, None).unwrap();
        assert_eq!(names(&result, "t_user"), vec!["ds_0.t_user", "ds_1.t_user"]);
    }

    #[test]
    fn test_hint_against_complex_strategy_is_mismatch() {
        let mut hint = HintState::new();
        hint.add_database_sharding_value("t_user", 1);
        let err = engine()
            .route_with(&StatementContext::new(["t_user"]), Some(&hint))
            .unwrap_err();
        assert!(matches!(err, ShardingError::ConditionMismatch { .. }));
    }

    #[test]
    fn test_hint_strategy() {
        let engine = engine();
        let ctx = StatementContext::new(["t_hinted"]);

        let all = engine.route_with(&ctx, None).unwrap();
        assert_eq!(all.nodes_for("t_hinted").len(), 2);

        let mut hint = HintState::new();
        hint.add_database_sharding_value("t_hinted", 3);
        let one = engine.route_with(&ctx, Some(&hint)).unwrap();
        assert_eq!(names(&one, "t_hinted"), vec!["ds_1.t_hinted"]);
    }

    #[test]
    fn test_hint_overrides_statement_condition() {
        let mut hint = HintState::new();
        hint.add_database_sharding_value("t_order", 0);
        hint.add_table_sharding_value("t_order", 1);
        let ctx = StatementContext::new(["t_order"]).with_condition(
            ShardingCondition::new("t_order")
                .with_precise("user_id", 1)
                .with_precise("order_id", 0),
        );
        let result = engine().route_with(&ctx, Some(&hint)).unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_0.t_order_1"]);
    }

    #[test]
    fn test_database_only_hint() {
        let mut hint = HintState::new();
        hint.set_database_sharding_value(1);
        let ctx = StatementContext::new(["t_order"])
            .with_condition(ShardingCondition::new("t_order").with_precise("order_id", 2));
        let result = engine().route_with(&ctx, Some(&hint)).unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_1.t_order_0"]);
    }

    #[test]
    fn test_hinted_data_source() {
        let mut hint = HintState::new();
        hint.set_data_source_name("ds_1");
        hint.set_write_route_only();
        let ctx = StatementContext::new(["t_order", "t_unknown"]);
        let result = engine().route_with(&ctx, Some(&hint)).unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_1.t_order"]);
        assert_eq!(names(&result, "t_unknown"), vec!["ds_1.t_unknown"]);
        assert!(result.write_route_only);

        hint.set_data_source_name("ds_9");
        assert!(engine().route_with(&ctx, Some(&hint)).is_err());
    }

    #[test]
    fn test_unconfigured_table_without_default() {
        let err = engine()
            .route_with(&StatementContext::new(["t_unknown"]), None)
            .unwrap_err();
        assert!(matches!(err, ShardingError::NoDefaultDataSource(_)));
    }

    #[test]
    fn test_route_reads_thread_hint() {
        let engine = engine();
        let ctx = StatementContext::new(["t_hinted"]);
        {
            let mut hint = HintManager::acquire().unwrap();
            hint.add_database_sharding_value("t_hinted", 2);
            let result = engine.route(&ctx).unwrap();
            assert_eq!(names(&result, "t_hinted"), vec!["ds_0.t_hinted"]);
        }
        assert_eq!(engine.route(&ctx).unwrap().nodes_for("t_hinted").len(), 2);
    }

    struct CsvExtractor;

    impl ConditionExtractor<str> for CsvExtractor {
        fn extract(&self, statement: &str) -> Result<StatementContext> {
            let mut parts = statement.split(',');
            let table = parts.next().unwrap_or_default().trim();
            let mut condition = ShardingCondition::new(table);
            for pair in parts {
                if let Some((column, value)) = pair.split_once('=') {
                    condition = condition
                        .with_precise(column.trim(), ShardingValue::from_literal(value));
                }
            }
            Ok(StatementContext::new([table]).with_condition(condition))
        }
    }

    #[test]
    fn test_route_statement_with_extractor() {
        let result = engine()
            .route_statement("t_order, user_id=0, order_id=1", &CsvExtractor)
            .unwrap();
        assert_eq!(names(&result, "t_order"), vec!["ds_0.t_order_1"]);
    }
}

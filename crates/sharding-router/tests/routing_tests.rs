//! End-to-end routing against a complete rule file.

use std::collections::HashSet;
use std::sync::Arc;

use sharding_router::keygen::snowflake;
use sharding_router::keygen::ManualClock;
use sharding_router::route::RouteSource;
use sharding_router::rule::{DataNodeExpander, InlineDataNodeExpander};
use sharding_router::{
    AlgorithmCatalog, HintManager, HintState, RouteEngine, RuleConfig, ShardingCondition,
    ShardingError, ShardingRange, ShardingRule, StatementContext,
};

const RULES: &str = r#"
data_sources: [ds_0, ds_1]
default_data_source: ds_0
tables:
  t_order:
    actual_data_nodes: ds_${0..1}.t_order_${0..1}
    database_strategy:
      standard: { sharding_column: user_id, algorithm: db_inline }
    table_strategy:
      standard: { sharding_column: order_id, algorithm: t_order_inline }
    key_generate_strategy: { column: order_id, key_generator: snowflake }
    audit_strategy: { auditors: [sharding_key_required], force_sharding: true }
  t_order_item:
    actual_data_nodes: ds_${0..1}.t_order_item_${0..1}
    database_strategy:
      standard: { sharding_column: user_id, algorithm: db_inline }
    table_strategy:
      standard: { sharding_column: order_id, algorithm: t_order_item_inline }
  t_dict:
    actual_data_nodes: ds_${0..1}.t_dict
auto_tables:
  t_log:
    sharding_strategy:
      standard: { sharding_column: created_at, algorithm: log_interval }
  t_metric:
    actual_data_sources: ds_1
    sharding_strategy:
      standard: { sharding_column: value, algorithm: metric_volume }
binding_tables: ["t_order, t_order_item"]
broadcast_tables: [t_dict, t_region]
sharding_algorithms:
  db_inline: { type: INLINE, props: { algorithm-expression: "ds_${user_id % 2}" } }
  t_order_inline: { type: INLINE, props: { algorithm-expression: "t_order_${order_id % 2}" } }
  t_order_item_inline: { type: INLINE, props: { algorithm-expression: "t_order_item_${(order_id + 1) % 2}" } }
  log_interval:
    type: AUTO_INTERVAL
    props:
      datetime-lower: "2020-01-01 00:00:00"
      datetime-upper: "2020-01-02 00:00:00"
      sharding-seconds: 3600
  metric_volume: { type: VOLUME_RANGE, props: { range-lower: 0, range-upper: 100, sharding-volume: 30 } }
key_generators:
  snowflake: { type: SNOWFLAKE, props: { max-vibration-offset: 3 } }
auditors:
  sharding_key_required: { type: DML_SHARDING_CONDITIONS }
"#;

fn engine() -> RouteEngine {
    let config = RuleConfig::from_yaml(RULES).unwrap();
    RouteEngine::new(Arc::new(ShardingRule::from_config(&config).unwrap()))
}

fn names(engine: &RouteEngine, ctx: &StatementContext, hint: Option<&HintState>, table: &str) -> Vec<String> {
    engine
        .route_with(ctx, hint)
        .unwrap()
        .nodes_for(table)
        .iter()
        .map(ToString::to_string)
        .collect()
}

/// Strip the logic table prefix, leaving `<ds>.<index>`.
fn indexes(nodes: &[String], logic_table: &str) -> Vec<String> {
    nodes
        .iter()
        .map(|n| n.replace(&format!("{}_", logic_table), ""))
        .collect()
}

#[test]
fn test_binding_tables_share_indexes() {
    let engine = engine();
    for order_id in 0..8 {
        let ctx = StatementContext::new(["t_order", "t_order_item"]).with_condition(
            ShardingCondition::new("t_order")
                .with_precise("user_id", order_id / 2)
                .with_precise("order_id", order_id),
        );
        let orders = names(&engine, &ctx, None, "t_order");
        let items = names(&engine, &ctx, None, "t_order_item");
        assert_eq!(orders.len(), 1);
        assert_eq!(indexes(&orders, "t_order"), indexes(&items, "t_order_item"));
    }
}

#[test]
fn test_binding_follower_ignores_its_own_algorithm() {
    // t_order_item's own expression would pick the other table index.
    let engine = engine();
    let ctx = StatementContext::new(["t_order_item", "t_order"]).with_condition(
        ShardingCondition::new("t_order_item")
            .with_precise("user_id", 0)
            .with_precise("order_id", 0),
    );
    let result = engine.route_with(&ctx, None).unwrap();
    assert_eq!(result.nodes_for("t_order_item")[0].to_string(), "ds_0.t_order_item_1");
    assert_eq!(result.nodes_for("t_order")[0].to_string(), "ds_0.t_order_1");
    assert_eq!(
        result.route_for("t_order").unwrap().source,
        RouteSource::Binding {
            primary: "t_order_item".into()
        }
    );
    assert_eq!(result.table_routes[0].logic_table, "t_order_item");
}

#[test]
fn test_broadcast_tables_reach_every_node() {
    let engine = engine();
    let conditions = [
        None,
        Some(ShardingCondition::new("t_dict").with_precise("id", 1)),
        Some(ShardingCondition::new("t_dict").with_range("id", ShardingRange::all())),
    ];
    for condition in conditions {
        let mut ctx = StatementContext::new(["t_dict", "t_region"]);
        if let Some(condition) = condition {
            ctx = ctx.with_condition(condition);
        }
        assert_eq!(names(&engine, &ctx, None, "t_dict"), vec!["ds_0.t_dict", "ds_1.t_dict"]);
        assert_eq!(names(&engine, &ctx, None, "t_region"), vec!["ds_0.t_region", "ds_1.t_region"]);
    }
}

#[test]
fn test_audit_requires_sharding_condition() {
    let engine = engine();
    let bare = StatementContext::new(["t_order"]);
    let err = engine.route_with(&bare, None).unwrap_err();
    assert!(matches!(
        err,
        ShardingError::AuditViolation { ref table, ref auditor }
            if table == "t_order" && auditor == "sharding_key_required"
    ));

    let with_condition = StatementContext::new(["t_order"])
        .with_condition(ShardingCondition::new("t_order").with_precise("order_id", 1));
    assert_eq!(engine.route_with(&with_condition, None).unwrap().nodes_for("t_order").len(), 2);

    let unrelated = StatementContext::new(["t_order"])
        .with_condition(ShardingCondition::new("t_order").with_precise("status", "NEW"));
    assert!(engine.route_with(&unrelated, None).is_err());
}

#[test]
fn test_audit_passes_with_hint() {
    let engine = engine();
    let mut hint = HintState::new();
    hint.add_table_sharding_value("t_order", 1);
    let ctx = StatementContext::new(["t_order"]);
    assert_eq!(
        names(&engine, &ctx, Some(&hint), "t_order"),
        vec!["ds_0.t_order_1", "ds_1.t_order_1"]
    );
}

#[test]
fn test_binding_follower_passes_audit_through_primary() {
    let engine = engine();
    let ctx = StatementContext::new(["t_order_item", "t_order"])
        .with_condition(ShardingCondition::new("t_order_item").with_precise("order_id", 3));
    let result = engine.route_with(&ctx, None).unwrap();
    assert_eq!(result.nodes_for("t_order").len(), 2);
}

#[test]
fn test_thread_hint_is_released_on_error_path() {
    let engine = engine();
    let failing = || -> sharding_router::Result<()> {
        let mut hint = HintManager::acquire()?;
        hint.set_data_source_name("ds_9");
        engine.route(&StatementContext::new(["t_order"]))?;
        Ok(())
    };
    assert!(failing().is_err());
    assert!(!HintManager::is_instantiated());
    assert!(HintManager::acquire().is_ok());
}

#[test]
fn test_database_only_hint_routes_all_sharded_tables() {
    let engine = engine();
    let mut hint = HintState::new();
    hint.set_database_sharding_value(1);
    hint.add_table_sharding_value("t_order", 0);
    // Adding a keyed value leaves database-only mode.
    assert!(!hint.is_database_sharding_only());

    let mut hint = HintState::new();
    hint.set_database_sharding_value(1);
    let ctx = StatementContext::new(["t_order", "t_order_item"]);
    let result = engine.route_with(&ctx, Some(&hint)).unwrap();
    assert_eq!(result.data_sources(), vec!["ds_1"]);
    assert_eq!(result.nodes_for("t_order_item").len(), 2);
}

#[test]
fn test_unconfigured_table_goes_to_default_data_source() {
    let engine = engine();
    let ctx = StatementContext::new(["t_user"]);
    let result = engine.route_with(&ctx, None).unwrap();
    assert_eq!(result.nodes_for("t_user")[0].to_string(), "ds_0.t_user");
    assert_eq!(result.route_for("t_user").unwrap().source, RouteSource::Default);
}

#[test]
fn test_auto_interval_table_routes_by_bucket() {
    let engine = engine();
    let precise = StatementContext::new(["t_log"]).with_condition(
        ShardingCondition::new("t_log").with_precise("created_at", "2020-01-01 05:30:00"),
    );
    assert_eq!(names(&engine, &precise, None, "t_log"), vec!["ds_0.t_log_6"]);

    let boundary = StatementContext::new(["t_log"]).with_condition(
        ShardingCondition::new("t_log").with_precise("created_at", "2020-01-01 00:00:18"),
    );
    assert_eq!(names(&engine, &boundary, None, "t_log"), vec!["ds_1.t_log_1"]);

    let before = StatementContext::new(["t_log"]).with_condition(
        ShardingCondition::new("t_log").with_precise("created_at", "2019-06-01 00:00:00"),
    );
    assert_eq!(names(&engine, &before, None, "t_log"), vec!["ds_0.t_log_0"]);

    let after = StatementContext::new(["t_log"]).with_condition(
        ShardingCondition::new("t_log").with_precise("created_at", "2021-01-01 00:00:00"),
    );
    assert_eq!(names(&engine, &after, None, "t_log"), vec!["ds_1.t_log_25"]);

    let range = StatementContext::new(["t_log"]).with_condition(ShardingCondition::new("t_log").with_range(
        "created_at",
        ShardingRange::closed("2020-01-01 01:30:00", "2020-01-01 03:30:00"),
    ));
    assert_eq!(
        names(&engine, &range, None, "t_log"),
        vec!["ds_0.t_log_2", "ds_0.t_log_4", "ds_1.t_log_3"]
    );
}

#[test]
fn test_volume_range_auto_table() {
    let engine = engine();
    let rule = engine.rule().table_rule("t_metric").unwrap();
    assert_eq!(rule.actual_data_nodes().len(), 6);
    assert!(rule.actual_data_nodes().iter().all(|n| n.data_source == "ds_1"));

    let cases = [(-5, "t_metric_0"), (0, "t_metric_1"), (29, "t_metric_1"), (30, "t_metric_2"), (100, "t_metric_5")];
    for (value, table) in cases {
        let ctx = StatementContext::new(["t_metric"])
            .with_condition(ShardingCondition::new("t_metric").with_precise("value", value));
        assert_eq!(names(&engine, &ctx, None, "t_metric"), vec![format!("ds_1.{}", table)]);
    }
}

#[test]
fn test_data_node_patterns_expand_deterministically() {
    let config = RuleConfig::from_yaml(RULES).unwrap();
    for table in config.tables.values() {
        let Some(pattern) = &table.actual_data_nodes else { continue };
        let first = InlineDataNodeExpander.expand(pattern).unwrap();
        for _ in 0..10 {
            assert_eq!(InlineDataNodeExpander.expand(pattern).unwrap(), first);
        }
    }
    let a = ShardingRule::from_config(&config).unwrap();
    let b = ShardingRule::from_config(&config).unwrap();
    for (x, y) in a.table_rules().zip(b.table_rules()) {
        assert_eq!(x.actual_data_nodes(), y.actual_data_nodes());
    }
    assert_eq!(a.fingerprint(), b.fingerprint());
}

#[test]
fn test_generated_keys_are_unique_and_routable() {
    let config = RuleConfig::from_yaml(RULES).unwrap();
    let clock = Arc::new(ManualClock::new(snowflake::EPOCH_MILLIS + 1_000));
    let catalog = AlgorithmCatalog::with_builtins().with_clock(clock.clone());
    let rule = ShardingRule::new(&config, &catalog, &InlineDataNodeExpander).unwrap();
    let engine = RouteEngine::new(Arc::new(rule));

    let mut seen = HashSet::new();
    let mut last = i64::MIN;
    for i in 0..10_000 {
        if i % 1_000 == 0 {
            clock.advance(1);
        }
        let key = engine.rule().generate_key("t_order").unwrap().unwrap();
        assert_eq!(key.column, "order_id");
        assert!(key.value > last);
        last = key.value;
        assert!(seen.insert(key.value));
    }

    let ctx = StatementContext::new(["t_order"]).with_condition(
        ShardingCondition::new("t_order")
            .with_precise("user_id", 7)
            .with_precise("order_id", last),
    );
    assert_eq!(engine.route_with(&ctx, None).unwrap().nodes_for("t_order").len(), 1);
}

#[test]
fn test_routing_is_shareable_across_threads() {
    let engine = engine();
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                for order_id in 0..100 {
                    let ctx = StatementContext::new(["t_order"]).with_condition(
                        ShardingCondition::new("t_order")
                            .with_precise("user_id", t)
                            .with_precise("order_id", order_id),
                    );
                    let nodes = engine.route_with(&ctx, None).unwrap();
                    assert_eq!(nodes.nodes_for("t_order").len(), 1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

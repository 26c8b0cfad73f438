//! End-to-end tests: configuration, parsing, routing, rewriting and merging.

mod common;

use serde_json::json;
use shardql::config::CONFIG_FILE_NAME;
use shardql::metadata::DataSourceMetas;
use shardql::rewrite::SnowflakeKeyGenerator;
use shardql::{
    MergeEngine, RouteEngineSelector, RouteResult, RouteUnit, ShardError, ShardingConfig,
    ShardingRule, SqlRewriteEngine, SqlTokenGenerator, SqlUnit,
};
use tempfile::TempDir;

/// Rewrite a statement for every unit of a route result.
fn rewrite_all(rule: &ShardingRule, sql: &str, route: &RouteResult) -> Vec<(String, SqlUnit)> {
    let (statement, context) = common::parse_context(sql);
    let tokens = SqlTokenGenerator::new(rule).generate(&statement, &context).unwrap();
    let engine = SqlRewriteEngine::new(rule, sql, &context, tokens, vec![]).unwrap();
    let builder = engine.rewrite(!route.is_single_routing()).unwrap();
    route
        .units()
        .iter()
        .map(|unit| {
            (
                unit.data_source().to_string(),
                engine.generate_sql(unit, &builder).unwrap(),
            )
        })
        .collect()
}

#[test]
fn test_config_loaded_from_directory() {
    common::init_tracing();
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    assert!(matches!(
        ShardingConfig::load(tmp_dir.path()),
        Err(ShardError::ConfigError(_))
    ));

    std::fs::write(tmp_dir.path().join(CONFIG_FILE_NAME), common::SHARDING_CONFIG).unwrap();
    let config = ShardingConfig::load(tmp_dir.path()).unwrap();
    assert_eq!(config.data_source_names(), vec!["ds0", "ds1", "ds2"]);

    let rule = ShardingRule::new(&config).unwrap();
    assert!(rule.is_broadcast_table("T_CONFIG"));
    assert_eq!(rule.key_generate_column("t_order"), Some("order_id"));
    assert!(rule.find_binding_table_rule("t_order_item").is_some());
}

#[test]
fn test_create_index_routed_and_rewritten() {
    common::init_tracing();
    let config = common::sharding_config();
    let rule = ShardingRule::new(&config).unwrap();
    let schema = common::schema();
    let metas = DataSourceMetas::new(&config.data_sources).unwrap();

    let sql = "CREATE INDEX idx_order_status ON t_order (status)";
    let (_, context) = common::parse_context(sql);
    let route = RouteEngineSelector::new(&rule, &schema, &metas)
        .route(&context)
        .unwrap();

    let statements: Vec<(String, String)> = rewrite_all(&rule, sql, &route)
        .into_iter()
        .map(|(data_source, unit)| (data_source, unit.sql))
        .collect();
    assert_eq!(
        statements,
        vec![
            ("ds0".to_string(), "CREATE INDEX idx_order_status_t_order_0 ON t_order_0 (status)".to_string()),
            ("ds0".to_string(), "CREATE INDEX idx_order_status_t_order_1 ON t_order_1 (status)".to_string()),
            ("ds1".to_string(), "CREATE INDEX idx_order_status_t_order_0 ON t_order_0 (status)".to_string()),
            ("ds1".to_string(), "CREATE INDEX idx_order_status_t_order_1 ON t_order_1 (status)".to_string()),
        ]
    );
}

#[test]
fn test_show_tables_routed_to_group_representative() {
    common::init_tracing();
    let config = common::sharding_config();
    let rule = ShardingRule::new(&config).unwrap();
    let schema = common::schema();
    let metas = DataSourceMetas::new(&config.data_sources).unwrap();

    let sql = "SHOW TABLES FROM logic_db";
    let (_, context) = common::parse_context(sql);
    let route = RouteEngineSelector::new(&rule, &schema, &metas)
        .route(&context)
        .unwrap();
    let units = rewrite_all(&rule, sql, &route);
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].1.sql, "SHOW TABLES FROM ds0");
}

#[test]
fn test_select_fanned_out_rewritten_and_merged() {
    common::init_tracing();
    let rule = common::sharding_rule();
    let schema = common::schema();

    let sql = "SELECT user_id, AVG(price) AS avg_price FROM t_order GROUP BY user_id ORDER BY user_id LIMIT 1";
    let route: RouteResult = rule
        .find_table_rule("t_order")
        .unwrap()
        .actual_data_nodes()
        .iter()
        .map(|node| RouteUnit::new(node.data_source.clone()).with_table("t_order", node.table.clone()))
        .collect();
    assert_eq!(route.len(), 4);

    let units = rewrite_all(&rule, sql, &route);
    assert_eq!(
        units[3].1.sql,
        "SELECT user_id, AVG(price) AS avg_price, COUNT(price) AS AVG_DERIVED_COUNT_0, \
         SUM(price) AS AVG_DERIVED_SUM_0 FROM t_order_1 GROUP BY user_id ORDER BY user_id LIMIT 1"
    );

    // Each shard answers with the rewritten column layout.
    let labels = &["user_id", "avg_price", "AVG_DERIVED_COUNT_0", "AVG_DERIVED_SUM_0"];
    let cursors = vec![
        common::cursor(labels, vec![vec![json!(7), json!(10.0), json!(1), json!(10)]]),
        common::cursor(labels, vec![vec![json!(3), json!(2.0), json!(2), json!(4)]]),
        common::cursor(labels, vec![]),
        common::cursor(labels, vec![vec![json!(3), json!(3.0), json!(1), json!(3)]]),
    ];
    let (_, context) = common::parse_context(sql);
    let select = context.select.unwrap();
    let mut merged = MergeEngine::new(&select, &schema).merge(cursors).unwrap();

    assert!(merged.next().unwrap());
    assert_eq!(merged.value_by_label("user_id").unwrap(), json!(3));
    assert_eq!(merged.value_by_label("avg_price").unwrap(), json!(2.3333));
    assert!(!merged.next().unwrap());
}

#[test]
fn test_insert_gets_snowflake_key() {
    common::init_tracing();
    let rule = common::sharding_rule();
    let sql = "INSERT INTO t_order (user_id) VALUES (?)";
    let (statement, context) = common::parse_context(sql);
    let generator = SnowflakeKeyGenerator::new(3).unwrap();
    let tokens = SqlTokenGenerator::new(&rule)
        .with_key_generator(&generator)
        .generate(&statement, &context)
        .unwrap();
    let engine = SqlRewriteEngine::new(&rule, sql, &context, tokens, vec![json!(9)]).unwrap();
    let builder = engine.rewrite(false).unwrap();
    let unit = engine
        .generate_sql(&RouteUnit::new("ds1").with_table("t_order", "t_order_1"), &builder)
        .unwrap();

    assert_eq!(unit.sql, "INSERT INTO t_order_1 (user_id, order_id) VALUES (?, ?)");
    assert_eq!(unit.parameters.len(), 2);
    assert_eq!(unit.parameters[0], json!(9));
    let key = unit.parameters[1].as_u64().unwrap();
    assert_eq!((key >> 12) & 0x3ff, 3);
}

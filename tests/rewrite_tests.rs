//! SQL rewrite tests
//!
//! Statements go through token generation and the rewrite engine, then get
//! rendered for a concrete route unit.

mod common;

use serde_json::{json, Value};
use shardql::rewrite::KeyGenerator;
use shardql::{RouteUnit, SqlRewriteEngine, SqlTokenGenerator, SqlUnit};

struct FixedKey(i64);

impl KeyGenerator for FixedKey {
    fn generate_key(&self) -> Value {
        Value::from(self.0)
    }
}

fn rewrite(sql: &str, parameters: Vec<Value>, unit: &RouteUnit, rewrite_limit: bool) -> SqlUnit {
    common::init_tracing();
    let rule = common::sharding_rule();
    let key = FixedKey(42);
    let (statement, context) = common::parse_context(sql);
    let tokens = SqlTokenGenerator::new(&rule)
        .with_key_generator(&key)
        .generate(&statement, &context)
        .unwrap();
    let engine = SqlRewriteEngine::new(&rule, sql, &context, tokens, parameters).unwrap();
    let builder = engine.rewrite(rewrite_limit).unwrap();
    engine.generate_sql(unit, &builder).unwrap()
}

fn order_unit(data_source: &str, actual_table: &str) -> RouteUnit {
    RouteUnit::new(data_source).with_table("t_order", actual_table)
}

#[test]
fn test_statement_without_tokens_is_unchanged() {
    let sql = "SELECT name FROM t_unknown WHERE id = ?";
    let unit = rewrite(sql, vec![json!(7)], &RouteUnit::new("ds0"), true);
    assert_eq!(unit.sql, sql);
    assert_eq!(unit.parameters, vec![json!(7)]);
}

#[test]
fn test_table_names_replaced_per_unit() {
    let sql = "SELECT t_order.status FROM t_order WHERE t_order.order_id = ?";
    let first = rewrite(sql, vec![json!(1)], &order_unit("ds0", "t_order_0"), false);
    let second = rewrite(sql, vec![json!(1)], &order_unit("ds1", "t_order_1"), false);
    assert_eq!(
        first.sql,
        "SELECT t_order_0.status FROM t_order_0 WHERE t_order_0.order_id = ?"
    );
    assert_eq!(
        second.sql,
        "SELECT t_order_1.status FROM t_order_1 WHERE t_order_1.order_id = ?"
    );
}

#[test]
fn test_quoted_table_keeps_quotes() {
    let unit = rewrite(
        "SELECT * FROM `t_order` WHERE order_id = 1",
        vec![],
        &order_unit("ds0", "t_order_1"),
        false,
    );
    assert_eq!(unit.sql, "SELECT * FROM `t_order_1` WHERE order_id = 1");
}

#[test]
fn test_binding_table_follows_routed_table() {
    let sql = "SELECT i.* FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.order_id = ?";
    let unit = rewrite(sql, vec![json!(11)], &order_unit("ds1", "t_order_1"), false);
    assert_eq!(
        unit.sql,
        "SELECT i.* FROM t_order_1 o JOIN t_order_item_1 i ON o.order_id = i.order_id WHERE o.order_id = ?"
    );
}

// ==================== Aggregation and Pagination ====================

#[test]
fn test_avg_group_by_and_limit_rewritten_for_merge() {
    let sql = "SELECT user_id, AVG(price) FROM t_order GROUP BY user_id LIMIT 10, 20";
    let unit = rewrite(sql, vec![], &order_unit("ds0", "t_order_1"), true);
    assert_eq!(
        unit.sql,
        "SELECT user_id, AVG(price), COUNT(price) AS AVG_DERIVED_COUNT_0, SUM(price) AS AVG_DERIVED_SUM_0 \
         FROM t_order_1 GROUP BY user_id ORDER BY user_id ASC  LIMIT 0, 30"
    );
}

#[test]
fn test_single_target_keeps_pagination_and_items() {
    let sql = "SELECT user_id, AVG(price) FROM t_order GROUP BY user_id LIMIT 10, 20";
    let unit = rewrite(sql, vec![], &order_unit("ds0", "t_order_1"), false);
    assert_eq!(
        unit.sql,
        "SELECT user_id, AVG(price) FROM t_order_1 GROUP BY user_id LIMIT 10, 20"
    );
}

#[test]
fn test_group_by_with_other_order_fetches_all_rows() {
    let sql = "SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id ORDER BY COUNT(*) DESC LIMIT 5";
    let unit = rewrite(sql, vec![], &order_unit("ds0", "t_order_0"), true);
    assert_eq!(
        unit.sql,
        format!(
            "SELECT user_id, COUNT(*) FROM t_order_0 GROUP BY user_id ORDER BY COUNT(*) DESC LIMIT {}",
            shardql::sql::UNBOUNDED_ROW_COUNT
        )
    );
}

#[test]
fn test_parameterized_limit_rewritten() {
    let sql = "SELECT * FROM t_order ORDER BY order_id LIMIT ?, ?";
    let unit = rewrite(sql, vec![json!(5), json!(10)], &order_unit("ds0", "t_order_0"), true);
    assert_eq!(unit.sql, "SELECT * FROM t_order_0 ORDER BY order_id LIMIT ?, ?");
    assert_eq!(unit.parameters, vec![json!(0), json!(15)]);

    let single = rewrite(sql, vec![json!(5), json!(10)], &order_unit("ds0", "t_order_0"), false);
    assert_eq!(single.parameters, vec![json!(5), json!(10)]);
}

// ==================== Generated Keys ====================

#[test]
fn test_generated_key_bound_as_parameter() {
    let unit = rewrite(
        "INSERT INTO t_order (user_id, status) VALUES (?, ?)",
        vec![json!(10), json!("init")],
        &order_unit("ds0", "t_order_0"),
        false,
    );
    assert_eq!(
        unit.sql,
        "INSERT INTO t_order_0 (user_id, status, order_id) VALUES (?, ?, ?)"
    );
    assert_eq!(unit.parameters, vec![json!(10), json!("init"), json!(42)]);
}

#[test]
fn test_generated_key_inlined_for_literal_rows() {
    let unit = rewrite(
        "INSERT INTO t_order (user_id) VALUES (1), (2)",
        vec![],
        &order_unit("ds1", "t_order_1"),
        false,
    );
    assert_eq!(
        unit.sql,
        "INSERT INTO t_order_1 (user_id, order_id) VALUES (1, 42), (2, 42)"
    );
}

#[test]
fn test_explicit_key_column_left_alone() {
    let sql = "INSERT INTO t_order (order_id, user_id) VALUES (?, ?)";
    let unit = rewrite(sql, vec![json!(1), json!(2)], &order_unit("ds0", "t_order_1"), false);
    assert_eq!(unit.sql, "INSERT INTO t_order_1 (order_id, user_id) VALUES (?, ?)");
    assert_eq!(unit.parameters, vec![json!(1), json!(2)]);
}

// ==================== DDL and DAL ====================

#[test]
fn test_index_name_suffixed_with_actual_table() {
    let unit = rewrite(
        "DROP INDEX idx_order_status ON t_order",
        vec![],
        &order_unit("ds0", "t_order_1"),
        false,
    );
    assert_eq!(unit.sql, "DROP INDEX idx_order_status_t_order_1 ON t_order_1");

    let unit = rewrite(
        "DROP INDEX idx_order_status",
        vec![],
        &order_unit("ds1", "t_order_0"),
        false,
    );
    assert_eq!(unit.sql, "DROP INDEX idx_order_status_t_order_0");
}

#[test]
fn test_schema_replaced_by_data_source() {
    let unit = rewrite("SHOW TABLES FROM logic_db", vec![], &RouteUnit::new("ds1"), false);
    assert_eq!(unit.sql, "SHOW TABLES FROM ds1");
}

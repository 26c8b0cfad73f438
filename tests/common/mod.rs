//! Common test utilities for sharding tests
//!
//! Provides shared helper functions for:
//! - Building the sharding rule and schema fixtures
//! - Parsing statements into their context
//! - Creating in-memory cursors

#![allow(dead_code)]

use serde_json::Value;
use shardql::metadata::{ColumnMetaData, InMemorySchema, TableMetaData};
use shardql::merge::MemoryQueryResult;
use shardql::{
    parse, DatabaseType, QueryResult, ShardingConfig, ShardingRule, SqlStatement, StatementContext,
};

/// Two data sources on one instance and a third on another host. Orders
/// and their items are bound; `t_config` is broadcast.
pub const SHARDING_CONFIG: &str = r#"
database_type = "MySQL"
binding_tables = ["t_order, t_order_item"]
broadcast_tables = ["t_config"]

[[data_sources]]
name = "ds0"
url = "mysql://10.0.0.1:3306/demo_ds_0"

[[data_sources]]
name = "ds1"
url = "mysql://10.0.0.1:3306/demo_ds_1"

[[data_sources]]
name = "ds2"
url = "mysql://10.0.0.2:3306/demo_ds_2"

[[tables]]
logic_table = "t_order"
actual_data_nodes = "ds${0..1}.t_order_${0..1}"
key_generate_column = "order_id"

[tables.table_strategy.inline]
sharding_column = "order_id"
algorithm_expression = "t_order_${order_id % 2}"

[[tables]]
logic_table = "t_order_item"
actual_data_nodes = "ds${0..1}.t_order_item_${0..1}"
"#;

/// Route tracing to the test writer; `RUST_LOG=shardql=debug` shows it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sharding_config() -> ShardingConfig {
    ShardingConfig::from_toml_str(SHARDING_CONFIG).expect("Failed to parse sharding config")
}

pub fn sharding_rule() -> ShardingRule {
    ShardingRule::new(&sharding_config()).expect("Failed to build sharding rule")
}

pub fn schema() -> InMemorySchema {
    InMemorySchema::new()
        .with_table(
            TableMetaData::new(
                "t_order",
                vec![
                    ColumnMetaData::new("order_id", "BIGINT").primary_key(),
                    ColumnMetaData::new("user_id", "INT"),
                    ColumnMetaData::new("status", "VARCHAR").case_insensitive(),
                    ColumnMetaData::new("price", "DECIMAL"),
                ],
            )
            .with_index("idx_order_status"),
        )
        .with_table(TableMetaData::new(
            "t_order_item",
            vec![
                ColumnMetaData::new("item_id", "BIGINT").primary_key(),
                ColumnMetaData::new("order_id", "BIGINT"),
            ],
        ))
        .with_table(TableMetaData::new(
            "t_config",
            vec![ColumnMetaData::new("name", "VARCHAR")],
        ))
}

pub fn parse_context(sql: &str) -> (SqlStatement, StatementContext) {
    let statement = parse(sql).expect("Failed to parse statement");
    let context = StatementContext::from_statement(&statement, DatabaseType::MySql)
        .expect("Failed to build statement context");
    (statement, context)
}

pub fn cursor(labels: &[&str], rows: Vec<Vec<Value>>) -> Box<dyn QueryResult> {
    Box::new(MemoryQueryResult::new(
        labels.iter().map(|label| label.to_string()).collect(),
        rows,
    ))
}

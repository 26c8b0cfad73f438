//! Broadcast routing engines
//!
//! Statements that carry no sharding condition are sent to several targets:
//! - datasource-group broadcast reaches every disjoint group of data sources once
//! - instance broadcast reaches every physical database instance once
//! - table broadcast reaches every actual table of the statement's tables

use super::router::{RouteResult, RouteUnit, RoutingEngine};
use super::rule::ShardingRule;
use crate::error::{ShardError, ShardResult};
use crate::metadata::{DataSourceMetas, SchemaMetaData};
use crate::sql::{DdlKind, StatementContext, StatementKind};

/// Routes once into each disjoint group of data sources spanned by the table
/// rules, plus the default data source.
#[derive(Debug, Default)]
pub struct DataSourceGroupBroadcastRoutingEngine;

impl DataSourceGroupBroadcastRoutingEngine {
    pub fn new() -> Self {
        Self
    }

    fn data_source_sets(rule: &ShardingRule) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = rule
            .table_rules()
            .iter()
            .map(|table_rule| {
                table_rule
                    .actual_data_source_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        if let Some(default) = rule.default_data_source() {
            sets.push(vec![default.to_string()]);
        }
        if sets.is_empty() {
            sets.push(rule.data_source_names().to_vec());
        }
        sets
    }
}

/// Fold one data source set into the candidate groups.
///
/// Groups sharing members with `target` narrow to the intersection; when no
/// group does, `target` joins as a new disjoint group.
fn merge_candidate_groups(candidates: Vec<Vec<String>>, target: Vec<String>) -> Vec<Vec<String>> {
    if candidates.is_empty() {
        return vec![target];
    }

    let mut result: Vec<Vec<String>> = Vec::with_capacity(candidates.len() + 1);
    let mut intersected = false;
    for group in candidates {
        let intersection: Vec<String> = group
            .iter()
            .filter(|name| target.contains(name))
            .cloned()
            .collect();
        let next = if intersection.is_empty() {
            group
        } else {
            intersected = true;
            intersection
        };
        if !result.contains(&next) {
            result.push(next);
        }
    }
    if !intersected {
        result.push(target);
    }
    result
}

impl RoutingEngine for DataSourceGroupBroadcastRoutingEngine {
    fn route(&self, rule: &ShardingRule) -> ShardResult<RouteResult> {
        let groups = Self::data_source_sets(rule)
            .into_iter()
            .fold(Vec::new(), merge_candidate_groups);

        tracing::debug!("[ROUTE] Datasource groups: {:?}", groups);

        Ok(groups
            .iter()
            .filter_map(|group| group.first())
            .map(RouteUnit::new)
            .collect())
    }
}

/// Routes once into every physical database instance.
pub struct InstanceBroadcastRoutingEngine<'a> {
    data_source_metas: &'a DataSourceMetas,
}

impl<'a> InstanceBroadcastRoutingEngine<'a> {
    pub fn new(data_source_metas: &'a DataSourceMetas) -> Self {
        Self { data_source_metas }
    }
}

impl RoutingEngine for InstanceBroadcastRoutingEngine<'_> {
    fn route(&self, rule: &ShardingRule) -> ShardResult<RouteResult> {
        Ok(self
            .data_source_metas
            .all_instance_data_source_names(rule.data_source_names())
            .into_iter()
            .map(RouteUnit::new)
            .collect())
    }
}

/// Routes into every actual table of the statement's logical tables.
pub struct TableBroadcastRoutingEngine<'a> {
    schema: &'a dyn SchemaMetaData,
    context: &'a StatementContext,
}

impl<'a> TableBroadcastRoutingEngine<'a> {
    pub fn new(schema: &'a dyn SchemaMetaData, context: &'a StatementContext) -> Self {
        Self { schema, context }
    }

    /// Logical tables to fan out, validated against schema metadata.
    fn logic_tables(&self) -> ShardResult<Vec<String>> {
        match self.context.kind {
            StatementKind::Ddl(DdlKind::DropIndex) => self.drop_index_tables(),
            StatementKind::Ddl(DdlKind::CreateTable) => Ok(self.context.tables.clone()),
            _ => {
                for table in &self.context.tables {
                    if !self.schema.contains_table(table) {
                        return Err(ShardError::TableNotFound(table.clone()));
                    }
                }
                Ok(self.context.tables.clone())
            }
        }
    }

    fn drop_index_tables(&self) -> ShardResult<Vec<String>> {
        let index = self.context.index.as_deref().ok_or_else(|| {
            ShardError::RouteError("DROP INDEX statement without index name".to_string())
        })?;

        if self.context.tables.is_empty() {
            return self
                .schema
                .find_table_by_index(index)
                .map(|table| vec![table.name.clone()])
                .ok_or_else(|| ShardError::IndexNotFound(index.to_string()));
        }

        for table in &self.context.tables {
            let metadata = self
                .schema
                .table(table)
                .ok_or_else(|| ShardError::TableNotFound(table.clone()))?;
            if !metadata.contains_index(index) {
                return Err(ShardError::IndexNotFound(format!("{} on {}", index, table)));
            }
        }
        Ok(self.context.tables.clone())
    }
}

impl RoutingEngine for TableBroadcastRoutingEngine<'_> {
    fn route(&self, rule: &ShardingRule) -> ShardResult<RouteResult> {
        let logic_tables = self.logic_tables()?;
        if logic_tables.is_empty() {
            return Ok(rule.data_source_names().iter().map(RouteUnit::new).collect());
        }

        let mut result = RouteResult::new();
        for logic_table in &logic_tables {
            let table_rule = rule.table_rule(logic_table)?;
            for node in table_rule.actual_data_nodes() {
                result.push(
                    RouteUnit::new(node.data_source.clone())
                        .with_table(table_rule.logic_table(), node.table.clone()),
                );
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingConfig;
    use crate::metadata::{ColumnMetaData, InMemorySchema, TableMetaData};
    use crate::sql::{parse, DatabaseType};

    fn sets(groups: &[&[&str]]) -> Vec<Vec<String>> {
        groups
            .iter()
            .map(|group| group.iter().map(|s| s.to_string()).collect())
            .collect()
    }

    fn rule() -> ShardingRule {
        let config = ShardingConfig::from_toml_str(
            r#"
broadcast_tables = ["t_config"]

[[data_sources]]
name = "ds0"

[[data_sources]]
name = "ds1"

[[tables]]
logic_table = "t_order"
actual_data_nodes = "ds${0..1}.t_order_${0..2}"
"#,
        )
        .unwrap();
        ShardingRule::new(&config).unwrap()
    }

    fn schema() -> InMemorySchema {
        InMemorySchema::new()
            .with_table(
                TableMetaData::new("t_order", vec![ColumnMetaData::new("order_id", "BIGINT")])
                    .with_index("idx_order_status"),
            )
            .with_table(TableMetaData::new("t_config", vec![]))
    }

    fn route(sql: &str) -> ShardResult<RouteResult> {
        let context =
            StatementContext::from_statement(&parse(sql).unwrap(), DatabaseType::MySql).unwrap();
        let schema = schema();
        TableBroadcastRoutingEngine::new(&schema, &context).route(&rule())
    }

    fn units(result: &RouteResult) -> Vec<String> {
        result
            .units()
            .iter()
            .map(|unit| match unit.table_units().first() {
                Some(table) => format!("{}/{}", unit.data_source(), table.actual_table),
                None => unit.data_source().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_candidate_groups() {
        let groups = sets(&[&["ds1", "ds2", "ds3"], &["ds3", "ds4"], &["ds9"]])
            .into_iter()
            .fold(Vec::new(), merge_candidate_groups);
        assert_eq!(groups, sets(&[&["ds3"], &["ds9"]]));

        let groups = sets(&[&["ds1", "ds2"], &["ds2", "ds3"], &["ds2"]])
            .into_iter()
            .fold(Vec::new(), merge_candidate_groups);
        assert_eq!(groups, sets(&[&["ds2"]]));

        let groups = sets(&[&["ds1"], &["ds2"], &["ds1", "ds2"]])
            .into_iter()
            .fold(Vec::new(), merge_candidate_groups);
        assert_eq!(groups, sets(&[&["ds1"], &["ds2"]]));
    }

    #[test]
    fn test_group_broadcast_without_rules_uses_first_data_source() {
        let config = ShardingConfig::from_toml_str(
            "[[data_sources]]\nname = \"ds0\"\n\n[[data_sources]]\nname = \"ds1\"\n",
        )
        .unwrap();
        let rule = ShardingRule::new(&config).unwrap();
        let result = DataSourceGroupBroadcastRoutingEngine::new().route(&rule).unwrap();
        assert_eq!(units(&result), vec!["ds0"]);
    }

    #[test]
    fn test_alter_table_fans_out_in_order() {
        let result = route("ALTER TABLE t_order ADD COLUMN status VARCHAR(10)").unwrap();
        assert_eq!(
            units(&result),
            vec![
                "ds0/t_order_0",
                "ds0/t_order_1",
                "ds0/t_order_2",
                "ds1/t_order_0",
                "ds1/t_order_1",
                "ds1/t_order_2",
            ]
        );
    }

    #[test]
    fn test_broadcast_table_reaches_every_data_source() {
        let result = route("TRUNCATE TABLE t_config").unwrap();
        assert_eq!(units(&result), vec!["ds0/t_config", "ds1/t_config"]);
    }

    #[test]
    fn test_drop_index_resolves_table() {
        assert_eq!(route("DROP INDEX idx_order_status").unwrap().len(), 6);
        assert_eq!(
            route("DROP INDEX idx_order_status ON t_order").unwrap().len(),
            6
        );
        assert!(matches!(
            route("DROP INDEX idx_missing"),
            Err(ShardError::IndexNotFound(_))
        ));
        assert!(matches!(
            route("DROP INDEX idx_missing ON t_order"),
            Err(ShardError::IndexNotFound(_))
        ));
    }

    #[test]
    fn test_unknown_table_fails() {
        assert!(matches!(
            route("ALTER TABLE t_unknown ADD COLUMN c INT"),
            Err(ShardError::TableNotFound(_))
        ));
    }
}

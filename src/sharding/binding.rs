//! Binding table resolution
//!
//! Bound tables share their data node layout, so once one of them is routed
//! to the n-th actual table of a data source every other member of the group
//! lives in its own n-th actual table on that data source.

use std::collections::HashMap;

use super::router::RouteUnit;
use super::rule::ShardingRule;
use crate::error::{ShardError, ShardResult};

pub struct BindingTableResolver<'a> {
    rule: &'a ShardingRule,
}

impl<'a> BindingTableResolver<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    /// Resolve the actual table of `logic_table` bound to an already routed
    /// actual table of another member of its binding group.
    ///
    /// # Arguments
    /// * `data_source` - Data source of the route unit
    /// * `logic_table` - Logical table to resolve
    /// * `other_actual_table` - Actual table already chosen for a bound table
    pub fn binding_actual_table(
        &self,
        data_source: &str,
        logic_table: &str,
        other_actual_table: &str,
    ) -> ShardResult<String> {
        let binding = self.rule.find_binding_table_rule(logic_table).ok_or_else(|| {
            ShardError::ConfigError(format!("'{}' is not a binding table", logic_table))
        })?;

        let index = binding
            .logic_tables()
            .iter()
            .filter(|table| !table.eq_ignore_ascii_case(logic_table))
            .filter_map(|table| self.rule.find_table_rule(table))
            .find_map(|rule| rule.find_actual_table_index(data_source, other_actual_table));

        let target = self.rule.find_table_rule(logic_table).ok_or_else(|| {
            ShardError::ConfigError(format!("Binding table '{}' has no table rule", logic_table))
        })?;

        index
            .and_then(|index| target.actual_table_at(data_source, index))
            .map(str::to_string)
            .ok_or_else(|| {
                ShardError::ConfigError(format!(
                    "Cannot find binding actual table of '{}' for '{}' on data source '{}'",
                    logic_table, other_actual_table, data_source
                ))
            })
    }

    /// Logical to actual table map of one route unit: its own table units
    /// plus every bound table among `logic_tables`.
    pub fn actual_table_map(
        &self,
        unit: &RouteUnit,
        logic_tables: &[String],
    ) -> ShardResult<HashMap<String, String>> {
        let mut result: HashMap<String, String> = unit
            .table_units()
            .iter()
            .map(|table_unit| {
                (
                    table_unit.logic_table.to_lowercase(),
                    table_unit.actual_table.clone(),
                )
            })
            .collect();

        for logic_table in logic_tables {
            let key = logic_table.to_lowercase();
            if result.contains_key(&key) {
                continue;
            }
            let Some(binding) = self.rule.find_binding_table_rule(&key) else {
                continue;
            };
            let routed = unit.table_units().iter().find(|table_unit| {
                binding.has_logic_table(&table_unit.logic_table)
            });
            if let Some(routed) = routed {
                let actual =
                    self.binding_actual_table(unit.data_source(), &key, &routed.actual_table)?;
                result.insert(key, actual);
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingConfig;

    fn rule() -> ShardingRule {
        let config = ShardingConfig::from_toml_str(
            r#"
binding_tables = ["t_order, t_order_item"]

[[data_sources]]
name = "ds0"

[[data_sources]]
name = "ds1"

[[tables]]
logic_table = "t_order"
actual_data_nodes = "ds${0..1}.t_order_${0..1}"

[[tables]]
logic_table = "t_order_item"
actual_data_nodes = "ds${0..1}.t_order_item_${0..1}"

[[tables]]
logic_table = "t_user"
actual_data_nodes = "ds${0..1}.t_user"
"#,
        )
        .unwrap();
        ShardingRule::new(&config).unwrap()
    }

    #[test]
    fn test_binding_actual_table() {
        let rule = rule();
        let resolver = BindingTableResolver::new(&rule);
        assert_eq!(
            resolver
                .binding_actual_table("ds1", "t_order_item", "t_order_1")
                .unwrap(),
            "t_order_item_1"
        );
        assert!(matches!(
            resolver.binding_actual_table("ds1", "t_order_item", "t_order_7"),
            Err(ShardError::ConfigError(_))
        ));
        assert!(resolver
            .binding_actual_table("ds1", "t_user", "t_order_1")
            .is_err());
    }

    #[test]
    fn test_actual_table_map_includes_bound_tables() {
        let rule = rule();
        let resolver = BindingTableResolver::new(&rule);
        let unit = RouteUnit::new("ds0").with_table("t_order", "t_order_1");
        let tables = vec![
            "t_order".to_string(),
            "T_ORDER_ITEM".to_string(),
            "t_user".to_string(),
        ];
        let map = resolver.actual_table_map(&unit, &tables).unwrap();
        assert_eq!(map.get("t_order").map(String::as_str), Some("t_order_1"));
        assert_eq!(map.get("t_order_item").map(String::as_str), Some("t_order_item_1"));
        assert!(!map.contains_key("t_user"));
    }
}

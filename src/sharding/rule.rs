use std::borrow::Cow;

use super::table::TableRule;
use crate::config::ShardingConfig;
use crate::error::{ShardError, ShardResult};

/// Logic tables that shard in lockstep: the same data node position on a
/// data source belongs together.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingTableRule {
    logic_tables: Vec<String>,
}

impl BindingTableRule {
    pub fn logic_tables(&self) -> &[String] {
        &self.logic_tables
    }

    pub fn has_logic_table(&self, logic_table: &str) -> bool {
        self.logic_tables
            .iter()
            .any(|table| table.eq_ignore_ascii_case(logic_table))
    }
}

/// Validated sharding rules, the rule service consulted by routing and rewriting.
#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    table_rules: Vec<TableRule>,
    binding_table_rules: Vec<BindingTableRule>,
    broadcast_tables: Vec<String>,
    default_data_source: Option<String>,
}

impl ShardingRule {
    pub fn new(config: &ShardingConfig) -> ShardResult<Self> {
        let data_source_names = config.data_source_names();
        if data_source_names.is_empty() {
            return Err(ShardError::ConfigError("No data sources configured".to_string()));
        }
        for (i, name) in data_source_names.iter().enumerate() {
            if data_source_names[..i].contains(name) {
                return Err(ShardError::ConfigError(format!(
                    "Duplicate data source '{}'",
                    name
                )));
            }
        }

        let default_data_source = config.default_data_source_name()?.map(str::to_string);
        if let Some(default) = &default_data_source {
            if !data_source_names.contains(default) {
                return Err(ShardError::ConfigError(format!(
                    "Default data source '{}' is not configured",
                    default
                )));
            }
        }

        let mut table_rules: Vec<TableRule> = Vec::with_capacity(config.tables.len());
        for table_config in &config.tables {
            let rule = TableRule::new(table_config, &data_source_names)?;
            if table_rules.iter().any(|existing| existing.logic_table() == rule.logic_table()) {
                return Err(ShardError::ConfigError(format!(
                    "Duplicate table rule for '{}'",
                    rule.logic_table()
                )));
            }
            table_rules.push(rule);
        }

        let binding_table_rules = config
            .binding_tables
            .iter()
            .map(|group| build_binding_rule(group, &table_rules))
            .collect::<ShardResult<Vec<_>>>()?;

        for strategy in [&config.default_database_strategy, &config.default_table_strategy]
            .into_iter()
            .flatten()
        {
            strategy.build()?;
        }

        tracing::debug!(
            "[RULE] {} data sources, {} table rules, {} binding groups, {} broadcast tables",
            data_source_names.len(),
            table_rules.len(),
            binding_table_rules.len(),
            config.broadcast_tables.len()
        );

        Ok(Self {
            data_source_names,
            table_rules,
            binding_table_rules,
            broadcast_tables: config
                .broadcast_tables
                .iter()
                .map(|table| table.trim().to_lowercase())
                .collect(),
            default_data_source,
        })
    }

    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    pub fn find_table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules
            .iter()
            .find(|rule| rule.logic_table().eq_ignore_ascii_case(logic_table))
    }

    /// Find the rule of a logic table.
    ///
    /// Configured rules come first, then broadcast tables (every data
    /// source), then the default data source. Anything else is unknown.
    pub fn table_rule(&self, logic_table: &str) -> ShardResult<Cow<'_, TableRule>> {
        if let Some(rule) = self.find_table_rule(logic_table) {
            return Ok(Cow::Borrowed(rule));
        }
        if self.is_broadcast_table(logic_table) {
            return Ok(Cow::Owned(TableRule::broadcast(
                logic_table,
                &self.data_source_names,
            )));
        }
        if let Some(default) = &self.default_data_source {
            return Ok(Cow::Owned(TableRule::single(logic_table, default)));
        }
        Err(ShardError::TableNotFound(logic_table.to_string()))
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables
            .iter()
            .any(|table| table.eq_ignore_ascii_case(logic_table))
    }

    /// Whether SQL references to this table must be rewritten.
    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.find_table_rule(logic_table).is_some()
    }

    pub fn find_binding_table_rule(&self, logic_table: &str) -> Option<&BindingTableRule> {
        self.binding_table_rules
            .iter()
            .find(|rule| rule.has_logic_table(logic_table))
    }

    pub fn key_generate_column(&self, logic_table: &str) -> Option<&str> {
        self.find_table_rule(logic_table)
            .and_then(TableRule::key_generate_column)
    }
}

fn build_binding_rule(group: &str, table_rules: &[TableRule]) -> ShardResult<BindingTableRule> {
    let logic_tables: Vec<String> = group
        .split(',')
        .map(|table| table.trim().to_lowercase())
        .filter(|table| !table.is_empty())
        .collect();

    let mut rules = Vec::with_capacity(logic_tables.len());
    for logic_table in &logic_tables {
        let rule = table_rules
            .iter()
            .find(|rule| rule.logic_table() == logic_table)
            .ok_or_else(|| {
                ShardError::ConfigError(format!(
                    "Binding table '{}' has no table rule",
                    logic_table
                ))
            })?;
        rules.push(rule);
    }

    // Bound tables need the same number of actual tables on each data source.
    if let Some((first, others)) = rules.split_first() {
        let shape = |rule: &TableRule| -> Vec<(String, usize)> {
            rule.actual_data_source_names()
                .into_iter()
                .map(|ds| (ds.to_string(), rule.data_node_group(ds).len()))
                .collect()
        };
        let expected = shape(first);
        for other in others {
            if shape(other) != expected {
                return Err(ShardError::ConfigError(format!(
                    "Binding tables '{}' and '{}' have different data node distributions",
                    first.logic_table(),
                    other.logic_table()
                )));
            }
        }
    }

    Ok(BindingTableRule { logic_tables })
}

//! Sharding rule configuration
//!
//! Rules are described in a TOML file (`shardql.toml` by default):
//!
//! ```toml
//! database_type = "MySQL"
//! default_data_source = "ds0"
//! binding_tables = ["t_order, t_order_item"]
//! broadcast_tables = ["t_config"]
//!
//! [[data_sources]]
//! name = "ds0"
//! url = "mysql://127.0.0.1:3306/demo_ds_0"
//!
//! [[tables]]
//! logic_table = "t_order"
//! actual_data_nodes = "ds${0..1}.t_order_${0..1}"
//! key_generate_column = "order_id"
//!
//! [tables.table_strategy.inline]
//! sharding_column = "order_id"
//! algorithm_expression = "t_order_${order_id % 2}"
//! ```
//!
//! Arrays of tables keep their order, which is the configuration order used
//! by routing.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ShardError, ShardResult};
use crate::sql::DatabaseType;

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "shardql.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShardingConfig {
    /// Dialect of the actual databases
    #[serde(default)]
    pub database_type: DatabaseType,
    /// Data sources in configuration order
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
    /// Sharded table rules
    #[serde(default)]
    pub tables: Vec<TableRuleConfig>,
    /// Groups of bound tables, each a comma-separated list
    #[serde(default)]
    pub binding_tables: Vec<String>,
    /// Tables present in full on every data source
    #[serde(default)]
    pub broadcast_tables: Vec<String>,
    /// Data source holding tables without a rule
    #[serde(default)]
    pub default_data_source: Option<DefaultDataSource>,
    #[serde(default)]
    pub default_database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub default_table_strategy: Option<ShardingStrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    /// Connection URL, used to identify the physical instance
    #[serde(default)]
    pub url: Option<String>,
}

/// A single default data source name, or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultDataSource {
    Single(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRuleConfig {
    pub logic_table: String,
    /// Inline expression such as `ds${0..1}.t_order_${0..1}`; every data
    /// source holds the logic table when absent
    #[serde(default)]
    pub actual_data_nodes: Option<String>,
    #[serde(default)]
    pub database_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub table_strategy: Option<ShardingStrategyConfig>,
    #[serde(default)]
    pub key_generate_column: Option<String>,
}

/// Strategy block: exactly one of the entries may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardingStrategyConfig {
    #[serde(default)]
    pub standard: Option<StandardStrategyConfig>,
    #[serde(default)]
    pub complex: Option<ComplexStrategyConfig>,
    #[serde(default)]
    pub inline: Option<InlineStrategyConfig>,
    #[serde(default)]
    pub hint: Option<HintStrategyConfig>,
    #[serde(default)]
    pub none: Option<NoneStrategyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardStrategyConfig {
    pub sharding_column: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexStrategyConfig {
    /// Comma-separated column list
    pub sharding_columns: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineStrategyConfig {
    pub sharding_column: String,
    pub algorithm_expression: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HintStrategyConfig {
    pub algorithm: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NoneStrategyConfig {}

/// Validated sharding strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShardingStrategy {
    None,
    Standard {
        sharding_column: String,
        algorithm: String,
    },
    Complex {
        sharding_columns: Vec<String>,
        algorithm: String,
    },
    Inline {
        sharding_column: String,
        algorithm_expression: String,
    },
    Hint {
        algorithm: String,
    },
}

impl ShardingStrategyConfig {
    /// Validate the block into a strategy.
    ///
    /// More than one configured entry is an ambiguous strategy; an empty
    /// block means no sharding.
    pub fn build(&self) -> ShardResult<ShardingStrategy> {
        let configured: Vec<&str> = [
            ("standard", self.standard.is_some()),
            ("complex", self.complex.is_some()),
            ("inline", self.inline.is_some()),
            ("hint", self.hint.is_some()),
            ("none", self.none.is_some()),
        ]
        .iter()
        .filter(|(_, set)| *set)
        .map(|(name, _)| *name)
        .collect();

        if configured.len() > 1 {
            return Err(ShardError::AmbiguousStrategy(configured.join(", ")));
        }

        if let Some(standard) = &self.standard {
            return Ok(ShardingStrategy::Standard {
                sharding_column: standard.sharding_column.clone(),
                algorithm: standard.algorithm.clone(),
            });
        }
        if let Some(complex) = &self.complex {
            return Ok(ShardingStrategy::Complex {
                sharding_columns: complex
                    .sharding_columns
                    .split(',')
                    .map(|column| column.trim().to_string())
                    .filter(|column| !column.is_empty())
                    .collect(),
                algorithm: complex.algorithm.clone(),
            });
        }
        if let Some(inline) = &self.inline {
            return Ok(ShardingStrategy::Inline {
                sharding_column: inline.sharding_column.clone(),
                algorithm_expression: inline.algorithm_expression.clone(),
            });
        }
        if let Some(hint) = &self.hint {
            return Ok(ShardingStrategy::Hint {
                algorithm: hint.algorithm.clone(),
            });
        }
        Ok(ShardingStrategy::None)
    }
}

impl ShardingConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> ShardResult<Self> {
        let config: ShardingConfig = toml::from_str(content)?;
        tracing::debug!(
            "[CONFIG] Parsed {} data sources, {} table rules",
            config.data_sources.len(),
            config.tables.len()
        );
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_path(path: &Path) -> ShardResult<Self> {
        tracing::debug!("[CONFIG] Loading sharding config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `shardql.toml` from a directory
    pub fn load(dir: &Path) -> ShardResult<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(ShardError::ConfigError(format!(
                "Configuration file not found: {}",
                config_path.display()
            )));
        }
        Self::from_path(&config_path)
    }

    pub fn data_source_names(&self) -> Vec<String> {
        self.data_sources.iter().map(|ds| ds.name.clone()).collect()
    }

    /// The default data source, if any. A list naming more than one is rejected.
    pub fn default_data_source_name(&self) -> ShardResult<Option<&str>> {
        match &self.default_data_source {
            None => Ok(None),
            Some(DefaultDataSource::Single(name)) => Ok(Some(name.as_str())),
            Some(DefaultDataSource::List(names)) => match names.as_slice() {
                [] => Ok(None),
                [name] => Ok(Some(name.as_str())),
                _ => Err(ShardError::ConfigError(format!(
                    "Only one default data source is allowed, found {}: {}",
                    names.len(),
                    names.join(", ")
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
database_type = "PostgreSQL"
default_data_source = "ds0"
binding_tables = ["t_order, t_order_item"]
broadcast_tables = ["t_config"]

[[data_sources]]
name = "ds0"
url = "postgresql://127.0.0.1:5432/demo_ds_0"

[[data_sources]]
name = "ds1"

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

[tables.database_strategy.complex]
sharding_columns = "user_id, order_id"
algorithm = "user_order"
"#;

    #[test]
    fn test_parse_config() {
        let config = ShardingConfig::from_toml_str(CONFIG).unwrap();
        assert_eq!(config.database_type, DatabaseType::PostgreSql);
        assert_eq!(config.data_source_names(), vec!["ds0", "ds1"]);
        assert_eq!(config.data_sources[1].url, None);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.default_data_source_name().unwrap(), Some("ds0"));

        let strategy = config.tables[0].table_strategy.as_ref().unwrap().build().unwrap();
        assert_eq!(
            strategy,
            ShardingStrategy::Inline {
                sharding_column: "order_id".to_string(),
                algorithm_expression: "t_order_${order_id % 2}".to_string(),
            }
        );
        let strategy = config.tables[1].database_strategy.as_ref().unwrap().build().unwrap();
        assert_eq!(
            strategy,
            ShardingStrategy::Complex {
                sharding_columns: vec!["user_id".to_string(), "order_id".to_string()],
                algorithm: "user_order".to_string(),
            }
        );
    }

    #[test]
    fn test_multiple_default_data_sources_rejected() {
        let config = ShardingConfig::from_toml_str("default_data_source = [\"ds0\", \"ds1\"]").unwrap();
        assert!(matches!(
            config.default_data_source_name(),
            Err(ShardError::ConfigError(_))
        ));

        let config = ShardingConfig::from_toml_str("default_data_source = [\"ds1\"]").unwrap();
        assert_eq!(config.default_data_source_name().unwrap(), Some("ds1"));
    }

    #[test]
    fn test_ambiguous_strategy() {
        let config = ShardingConfig::from_toml_str(
            r#"
[default_table_strategy.standard]
sharding_column = "order_id"
algorithm = "mod"

[default_table_strategy.none]
"#,
        )
        .unwrap();
        let result = config.default_table_strategy.unwrap().build();
        match result {
            Err(ShardError::AmbiguousStrategy(names)) => assert_eq!(names, "standard, none"),
            other => panic!("Expected ambiguous strategy, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_strategy_is_none() {
        let strategy = ShardingStrategyConfig::default().build().unwrap();
        assert_eq!(strategy, ShardingStrategy::None);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ShardingConfig::from_toml_str("data_sources = 3"),
            Err(ShardError::TomlError(_))
        ));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ShardingConfig::load(dir.path()),
            Err(ShardError::ConfigError(_))
        ));

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), CONFIG).unwrap();
        let config = ShardingConfig::load(dir.path()).unwrap();
        assert_eq!(config.tables[0].logic_table, "t_order");
    }
}

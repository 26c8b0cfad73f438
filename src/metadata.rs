//! Schema and data-source metadata consulted by routing and merging.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::DataSourceConfig;
use crate::error::{ShardError, ShardResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetaData {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

impl ColumnMetaData {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            primary_key: false,
            case_sensitive: true,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Column whose collation compares strings without regard to case.
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetaData {
    pub name: String,
    pub columns: Vec<ColumnMetaData>,
    #[serde(default)]
    pub indexes: Vec<String>,
}

impl TableMetaData {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnMetaData>) -> Self {
        Self {
            name: name.into(),
            columns,
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.indexes.push(index.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Unknown columns count as case-sensitive.
    pub fn is_case_sensitive(&self, column: &str) -> bool {
        self.column(column)
            .map(|column| column.case_sensitive)
            .unwrap_or(true)
    }

    pub fn contains_index(&self, index: &str) -> bool {
        self.indexes
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(index))
    }
}

/// Read access to the logical schema.
pub trait SchemaMetaData {
    /// Look up a logical table.
    ///
    /// # Arguments
    /// * `name` - Logical table name, matched case-insensitively
    fn table(&self, name: &str) -> Option<&TableMetaData>;

    /// All logical table names.
    fn table_names(&self) -> Vec<String>;

    fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    /// Find the logical table owning an index.
    ///
    /// # Returns
    /// The first table, in name order, whose metadata lists the index
    fn find_table_by_index(&self, index: &str) -> Option<&TableMetaData> {
        let mut names = self.table_names();
        names.sort();
        names
            .iter()
            .filter_map(|name| self.table(name))
            .find(|table| table.contains_index(index))
    }
}

/// Schema metadata held in memory, keyed by lower-cased table name.
#[derive(Debug, Clone, Default)]
pub struct InMemorySchema {
    tables: HashMap<String, TableMetaData>,
}

impl InMemorySchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: TableMetaData) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    pub fn with_table(mut self, table: TableMetaData) -> Self {
        self.add_table(table);
        self
    }
}

impl SchemaMetaData for InMemorySchema {
    fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.tables.get(&name.to_lowercase())
    }

    fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|table| table.name.clone()).collect()
    }
}

/// Physical location of a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceMeta {
    pub host: String,
    pub port: Option<u16>,
    pub catalog: Option<String>,
}

impl DataSourceMeta {
    /// Parse a connection URL such as `mysql://127.0.0.1:3306/demo_ds_0`.
    /// A leading `jdbc:` is accepted.
    pub fn parse(url: &str) -> ShardResult<Self> {
        let trimmed = url.strip_prefix("jdbc:").unwrap_or(url);
        let parsed = Url::parse(trimmed)
            .map_err(|e| ShardError::ConfigError(format!("Invalid data source url '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ShardError::ConfigError(format!("Data source url '{}' has no host", url)))?
            .to_lowercase();
        let catalog = parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string);

        Ok(Self {
            host,
            port: parsed.port_or_known_default(),
            catalog,
        })
    }

    pub fn is_in_same_instance(&self, other: &DataSourceMeta) -> bool {
        self.host == other.host && self.port == other.port
    }
}

/// Metadata of all configured data sources, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct DataSourceMetas {
    metas: Vec<(String, DataSourceMeta)>,
}

impl DataSourceMetas {
    pub fn new(configs: &[DataSourceConfig]) -> ShardResult<Self> {
        let mut metas = Vec::new();
        for config in configs {
            if let Some(url) = &config.url {
                metas.push((config.name.clone(), DataSourceMeta::parse(url)?));
            }
        }
        Ok(Self { metas })
    }

    pub fn meta(&self, data_source: &str) -> Option<&DataSourceMeta> {
        self.metas
            .iter()
            .find(|(name, _)| name == data_source)
            .map(|(_, meta)| meta)
    }

    /// One data source per physical instance: the first of each instance in
    /// the given order. Data sources without metadata are their own instance.
    pub fn all_instance_data_source_names(&self, data_source_names: &[String]) -> Vec<String> {
        let mut seen: Vec<&DataSourceMeta> = Vec::new();
        let mut result = Vec::new();
        for name in data_source_names {
            match self.meta(name) {
                Some(meta) => {
                    if seen.iter().any(|other| other.is_in_same_instance(meta)) {
                        continue;
                    }
                    seen.push(meta);
                    result.push(name.clone());
                }
                None => result.push(name.clone()),
            }
        }
        result
    }
}

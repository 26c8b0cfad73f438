use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

use super::inline;
use crate::config::TableRuleConfig;
use crate::error::{ShardError, ShardResult};

/// One `(data source, actual table)` placement of a logic table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table: table.into(),
        }
    }

    /// Parse `ds0.t_order_0`.
    pub fn parse(text: &str) -> ShardResult<Self> {
        match text.trim().split_once('.') {
            Some((data_source, table)) if !data_source.is_empty() && !table.is_empty() => {
                Ok(Self::new(data_source, table))
            }
            _ => Err(ShardError::ConfigError(format!(
                "Invalid data node '{}', expected <data_source>.<table>",
                text
            ))),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Split a table name into its prefix and trailing numeric suffix.
fn numeric_suffix(name: &str) -> (&str, Option<u64>) {
    let digits = name.chars().rev().take_while(|c| c.is_ascii_digit()).count();
    let (prefix, suffix) = name.split_at(name.len() - digits);
    (prefix, suffix.parse().ok())
}

/// Natural ordering of actual tables: `t_2` before `t_10`.
pub fn compare_actual_tables(a: &str, b: &str) -> Ordering {
    let (prefix_a, suffix_a) = numeric_suffix(a);
    let (prefix_b, suffix_b) = numeric_suffix(b);
    prefix_a
        .cmp(prefix_b)
        .then_with(|| suffix_a.cmp(&suffix_b))
        .then_with(|| a.cmp(b))
}

/// Placement of one logic table across data sources.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRule {
    logic_table: String,
    /// Ordered by data source configuration order, then actual table suffix.
    actual_data_nodes: Vec<DataNode>,
    key_generate_column: Option<String>,
}

impl TableRule {
    pub fn new(config: &TableRuleConfig, data_source_names: &[String]) -> ShardResult<Self> {
        let logic_table = config.logic_table.to_lowercase();
        let nodes = match &config.actual_data_nodes {
            Some(expression) => inline::expand(expression)?
                .iter()
                .map(|node| DataNode::parse(node))
                .collect::<ShardResult<Vec<_>>>()?,
            None => data_source_names
                .iter()
                .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
                .collect(),
        };
        if nodes.is_empty() {
            return Err(ShardError::ConfigError(format!(
                "Table rule '{}' has no data nodes",
                logic_table
            )));
        }

        // Validated only; broadcast routing never consults a strategy.
        for strategy in [&config.database_strategy, &config.table_strategy].into_iter().flatten() {
            strategy.build()?;
        }

        Ok(Self {
            logic_table,
            actual_data_nodes: sort_nodes(nodes, data_source_names)?,
            key_generate_column: config.key_generate_column.clone(),
        })
    }

    /// Rule of a table present on every data source under its own name.
    pub fn broadcast(logic_table: &str, data_source_names: &[String]) -> Self {
        let logic_table = logic_table.to_lowercase();
        Self {
            actual_data_nodes: data_source_names
                .iter()
                .map(|ds| DataNode::new(ds.clone(), logic_table.clone()))
                .collect(),
            logic_table,
            key_generate_column: None,
        }
    }

    /// Rule of an unsharded table living on a single data source.
    pub fn single(logic_table: &str, data_source: &str) -> Self {
        let logic_table = logic_table.to_lowercase();
        Self {
            actual_data_nodes: vec![DataNode::new(data_source, logic_table.clone())],
            logic_table,
            key_generate_column: None,
        }
    }

    pub fn logic_table(&self) -> &str {
        &self.logic_table
    }

    pub fn actual_data_nodes(&self) -> &[DataNode] {
        &self.actual_data_nodes
    }

    pub fn key_generate_column(&self) -> Option<&str> {
        self.key_generate_column.as_deref()
    }

    /// Data sources holding this table, in configuration order.
    pub fn actual_data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for node in &self.actual_data_nodes {
            if !names.contains(&node.data_source.as_str()) {
                names.push(&node.data_source);
            }
        }
        names
    }

    /// Actual tables of this rule on one data source, in order.
    pub fn data_node_group(&self, data_source: &str) -> Vec<&DataNode> {
        self.actual_data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .collect()
    }

    pub fn find_actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.data_node_group(data_source)
            .iter()
            .position(|node| node.table.eq_ignore_ascii_case(actual_table))
    }

    pub fn actual_table_at(&self, data_source: &str, index: usize) -> Option<&str> {
        self.data_node_group(data_source)
            .get(index)
            .map(|node| node.table.as_str())
    }
}

fn sort_nodes(mut nodes: Vec<DataNode>, data_source_names: &[String]) -> ShardResult<Vec<DataNode>> {
    let mut positions = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let position = data_source_names
            .iter()
            .position(|name| *name == node.data_source)
            .ok_or_else(|| {
                ShardError::ConfigError(format!(
                    "Data node '{}' references unknown data source '{}'",
                    node, node.data_source
                ))
            })?;
        positions.push(position);
    }

    let mut indexed: Vec<(usize, DataNode)> = positions.into_iter().zip(nodes.drain(..)).collect();
    indexed.sort_by(|(pos_a, a), (pos_b, b)| {
        pos_a
            .cmp(pos_b)
            .then_with(|| compare_actual_tables(&a.table, &b.table))
    });
    Ok(indexed.into_iter().map(|(_, node)| node).collect())
}

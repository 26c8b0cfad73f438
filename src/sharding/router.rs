//! Route results and route engine selection

use serde::Serialize;

use super::broadcast::{
    DataSourceGroupBroadcastRoutingEngine, InstanceBroadcastRoutingEngine,
    TableBroadcastRoutingEngine,
};
use super::rule::ShardingRule;
use crate::error::{ShardError, ShardResult};
use crate::metadata::{DataSourceMetas, SchemaMetaData};
use crate::sql::StatementKind;
use crate::sql::StatementContext;

/// A logical table and the actual table it maps to in one route unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableUnit {
    pub logic_table: String,
    pub actual_table: String,
}

/// One physical execution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteUnit {
    data_source: String,
    table_units: Vec<TableUnit>,
}

impl RouteUnit {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            table_units: Vec::new(),
        }
    }

    pub fn with_table(mut self, logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        self.table_units.push(TableUnit {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        });
        self
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn table_units(&self) -> &[TableUnit] {
        &self.table_units
    }

    pub fn find_table_unit(&self, logic_table: &str) -> Option<&TableUnit> {
        self.table_units
            .iter()
            .find(|unit| unit.logic_table.eq_ignore_ascii_case(logic_table))
    }

    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.find_table_unit(logic_table)
            .map(|unit| unit.actual_table.as_str())
    }
}

/// Ordered route units of one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteResult {
    units: Vec<RouteUnit>,
}

impl RouteResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, unit: RouteUnit) {
        self.units.push(unit);
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// A single target needs neither LIMIT rewriting nor merge-only items.
    pub fn is_single_routing(&self) -> bool {
        self.units.len() == 1
    }

    /// Distinct data sources, in route order.
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source()) {
                names.push(unit.data_source());
            }
        }
        names
    }
}

impl FromIterator<RouteUnit> for RouteResult {
    fn from_iter<I: IntoIterator<Item = RouteUnit>>(iter: I) -> Self {
        Self {
            units: iter.into_iter().collect(),
        }
    }
}

/// A strategy computing the route units of a statement.
pub trait RoutingEngine {
    fn route(&self, rule: &ShardingRule) -> ShardResult<RouteResult>;
}

/// Picks the broadcast routing engine matching a statement.
pub struct RouteEngineSelector<'a> {
    rule: &'a ShardingRule,
    schema: &'a dyn SchemaMetaData,
    data_source_metas: &'a DataSourceMetas,
}

impl<'a> RouteEngineSelector<'a> {
    pub fn new(
        rule: &'a ShardingRule,
        schema: &'a dyn SchemaMetaData,
        data_source_metas: &'a DataSourceMetas,
    ) -> Self {
        Self {
            rule,
            schema,
            data_source_metas,
        }
    }

    /// Select the engine for a statement.
    ///
    /// DDL goes through the table broadcast. DAL uses the table broadcast
    /// when it names a table and the datasource-group broadcast otherwise.
    /// DCL reaches every physical instance once. Queries and DML are routed
    /// by sharding conditions, which this selector does not handle.
    pub fn select<'c>(&'c self, context: &'c StatementContext) -> ShardResult<Box<dyn RoutingEngine + 'c>> {
        match context.kind {
            StatementKind::Ddl(_) => {
                tracing::debug!("[ROUTE] DDL on {:?}: table broadcast", context.tables);
                Ok(Box::new(TableBroadcastRoutingEngine::new(self.schema, context)))
            }
            StatementKind::Dal(_) if !context.tables.is_empty() => {
                tracing::debug!("[ROUTE] DAL on {:?}: table broadcast", context.tables);
                Ok(Box::new(TableBroadcastRoutingEngine::new(self.schema, context)))
            }
            StatementKind::Dal(_) => {
                tracing::debug!("[ROUTE] DAL without table: datasource-group broadcast");
                Ok(Box::new(DataSourceGroupBroadcastRoutingEngine::new()))
            }
            StatementKind::Dcl(_) => {
                tracing::debug!("[ROUTE] DCL: instance broadcast");
                Ok(Box::new(InstanceBroadcastRoutingEngine::new(self.data_source_metas)))
            }
            StatementKind::Select
            | StatementKind::Insert
            | StatementKind::Update
            | StatementKind::Delete => Err(ShardError::OperationNotSupported(format!(
                "{:?} statements are not routed by broadcast",
                context.kind
            ))),
        }
    }

    pub fn route(&self, context: &StatementContext) -> ShardResult<RouteResult> {
        let result = self.select(context)?.route(self.rule)?;
        tracing::debug!(
            "[ROUTE] {:?} routed to {} units on {:?}",
            context.kind,
            result.len(),
            result.data_source_names()
        );
        Ok(result)
    }
}

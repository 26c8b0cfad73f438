//! Statement context: the facts about a parsed statement that routing,
//! rewriting and merging need.
//!
//! A `SelectStatementContext` describes the select list (with the derived
//! columns the rewrite adds for merging), GROUP BY and ORDER BY items with
//! their result-set labels and 1-based column indexes, and pagination.
//! Contexts are built from a parsed statement with `from_statement`, or
//! assembled directly with the builder methods.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dialect::DatabaseType;
use super::parser::{
    DalKind, DclKind, DdlKind, OrderByColumn, OrderByItemSegment, ProjectionKind, SelectStatement,
    SqlStatement,
};
use crate::error::{ShardError, ShardResult};

/// Row count used when every shard must return all of its rows.
pub const UNBOUNDED_ROW_COUNT: u64 = i32::MAX as u64;

const AVG_DERIVED_COUNT: &str = "AVG_DERIVED_COUNT_";
const AVG_DERIVED_SUM: &str = "AVG_DERIVED_SUM_";
const GROUP_BY_DERIVED: &str = "GROUP_BY_DERIVED_";
const ORDER_BY_DERIVED: &str = "ORDER_BY_DERIVED_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => write!(f, "ASC"),
            OrderDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// Absolute placement of nulls, independent of the sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Count,
    Sum,
    Avg,
    Max,
    Min,
    BitXor,
    GroupConcat,
}

impl AggregationType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "COUNT" => Some(AggregationType::Count),
            "SUM" => Some(AggregationType::Sum),
            "AVG" => Some(AggregationType::Avg),
            "MAX" => Some(AggregationType::Max),
            "MIN" => Some(AggregationType::Min),
            "BIT_XOR" => Some(AggregationType::BitXor),
            "GROUP_CONCAT" => Some(AggregationType::GroupConcat),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregationType::Count => "COUNT",
            AggregationType::Sum => "SUM",
            AggregationType::Avg => "AVG",
            AggregationType::Max => "MAX",
            AggregationType::Min => "MIN",
            AggregationType::BitXor => "BIT_XOR",
            AggregationType::GroupConcat => "GROUP_CONCAT",
        }
    }
}

/// A GROUP BY or ORDER BY item.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    /// Label of the column in the result set (alias, column name or derived alias).
    pub label: String,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
    /// 1-based column index, 0 until resolved.
    pub index: usize,
}

impl OrderByItem {
    pub fn new(label: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            label: label.into(),
            direction,
            nulls: None,
            index: 0,
        }
    }

    /// Item addressing a result column by position.
    pub fn at(index: usize, direction: OrderDirection) -> Self {
        Self {
            label: index.to_string(),
            direction,
            nulls: None,
            index,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }

    /// Explicit `NULLS FIRST/LAST`, or the dialect default for the direction.
    pub fn nulls_order(&self, database_type: DatabaseType) -> NullsOrder {
        self.nulls
            .unwrap_or_else(|| database_type.default_nulls_order(self.direction))
    }

    fn same_as(&self, other: &OrderByItem) -> bool {
        self.label.eq_ignore_ascii_case(&other.label)
            && self.direction == other.direction
            && self.nulls == other.nulls
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationProjection {
    pub kind: AggregationType,
    pub inner_expression: String,
    pub alias: Option<String>,
    pub separator: Option<String>,
    /// 1-based column index, 0 until resolved.
    pub index: usize,
    /// Sub-aggregations whose values feed this one (COUNT and SUM for AVG).
    pub derived: Vec<AggregationProjection>,
}

impl AggregationProjection {
    pub fn new(kind: AggregationType, inner_expression: impl Into<String>) -> Self {
        Self {
            kind,
            inner_expression: inner_expression.into(),
            alias: None,
            separator: None,
            index: 0,
            derived: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    pub fn expression(&self) -> String {
        format!("{}({})", self.kind.name(), self.inner_expression)
    }

    pub fn column_label(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.expression())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*` or `owner.*`
    Shorthand { owner: Option<String> },
    Column {
        owner: Option<String>,
        name: String,
        alias: Option<String>,
    },
    Expression {
        expression: String,
        alias: Option<String>,
    },
    Aggregation(AggregationProjection),
}

impl Projection {
    pub fn column(name: impl Into<String>) -> Self {
        Projection::Column {
            owner: None,
            name: name.into(),
            alias: None,
        }
    }

    pub fn column_label(&self) -> Option<String> {
        match self {
            Projection::Shorthand { .. } => None,
            Projection::Column { name, alias, .. } => Some(alias.clone().unwrap_or_else(|| name.clone())),
            Projection::Expression { expression, alias } => {
                Some(alias.clone().unwrap_or_else(|| expression.clone()))
            }
            Projection::Aggregation(aggregation) => Some(aggregation.column_label()),
        }
    }

    fn alias(&self) -> Option<&str> {
        match self {
            Projection::Shorthand { .. } => None,
            Projection::Column { alias, .. } | Projection::Expression { alias, .. } => alias.as_deref(),
            Projection::Aggregation(aggregation) => aggregation.alias.as_deref(),
        }
    }

    fn matches_expression(&self, text: &str) -> bool {
        let text = normalize(text);
        match self {
            Projection::Shorthand { .. } => false,
            Projection::Column { owner, name, .. } => {
                let qualified = owner.as_ref().map(|owner| format!("{}.{}", owner, name));
                normalize(name) == text || qualified.map(|q| normalize(&q) == text).unwrap_or(false)
            }
            Projection::Expression { expression, .. } => normalize(expression) == text,
            Projection::Aggregation(aggregation) => normalize(&aggregation.expression()) == text,
        }
    }
}

/// A column added to the select list only so that merging can read it.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedColumn {
    pub expression: String,
    pub alias: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationValue {
    Literal(u64),
    /// 0-based index into the statement parameters.
    Parameter(usize),
}

impl PaginationValue {
    pub fn resolve(&self, parameters: &[Value]) -> ShardResult<u64> {
        match self {
            PaginationValue::Literal(value) => Ok(*value),
            PaginationValue::Parameter(index) => parameters
                .get(*index)
                .and_then(Value::as_u64)
                .ok_or_else(|| {
                    ShardError::ParseError(format!(
                        "Pagination parameter {} is not a non-negative integer",
                        index
                    ))
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pagination {
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

impl Pagination {
    pub fn new(offset: Option<u64>, row_count: Option<u64>) -> Self {
        Self {
            offset: offset.map(PaginationValue::Literal),
            row_count: row_count.map(PaginationValue::Literal),
        }
    }

    pub fn offset(&self, parameters: &[Value]) -> ShardResult<u64> {
        self.offset
            .map(|value| value.resolve(parameters))
            .transpose()
            .map(|offset| offset.unwrap_or(0))
    }

    pub fn row_count(&self, parameters: &[Value]) -> ShardResult<Option<u64>> {
        self.row_count.map(|value| value.resolve(parameters)).transpose()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatementContext {
    /// Logical tables in declaration order.
    pub tables: Vec<String>,
    pub projections: Vec<Projection>,
    pub derived_columns: Vec<DerivedColumn>,
    pub group_by: Vec<OrderByItem>,
    pub order_by: Vec<OrderByItem>,
    /// ORDER BY was copied from GROUP BY because the statement has none.
    pub generated_order_by: bool,
    pub pagination: Option<Pagination>,
    pub database_type: DatabaseType,
}

impl SelectStatementContext {
    pub fn new(database_type: DatabaseType) -> Self {
        Self {
            tables: Vec::new(),
            projections: Vec::new(),
            derived_columns: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            generated_order_by: false,
            pagination: None,
            database_type,
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.tables.push(table.into());
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    /// Without explicit ORDER BY items, the GROUP BY items also order the result.
    pub fn with_group_by(mut self, items: Vec<OrderByItem>) -> Self {
        if self.order_by.is_empty() || self.generated_order_by {
            self.order_by = items.clone();
            self.generated_order_by = !items.is_empty();
        }
        self.group_by = items;
        self
    }

    pub fn with_order_by(mut self, items: Vec<OrderByItem>) -> Self {
        self.order_by = items;
        self.generated_order_by = false;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn from_statement(statement: &SelectStatement, database_type: DatabaseType) -> ShardResult<Self> {
        if statement.having {
            return Err(ShardError::OperationNotSupported(
                "HAVING in a sharded query".to_string(),
            ));
        }

        let mut context = Self::new(database_type);
        context.tables = statement.tables.iter().map(|t| t.name.clone()).collect();

        for segment in &statement.projections {
            let projection = match &segment.kind {
                ProjectionKind::Shorthand { owner } => Projection::Shorthand {
                    owner: owner.clone(),
                },
                ProjectionKind::Column { owner, name } => Projection::Column {
                    owner: owner.clone(),
                    name: name.clone(),
                    alias: segment.alias.clone(),
                },
                ProjectionKind::Aggregation { distinct: true, .. } => {
                    return Err(ShardError::OperationNotSupported(format!(
                        "DISTINCT aggregation: {}",
                        segment.text
                    )));
                }
                ProjectionKind::Aggregation {
                    kind,
                    inner,
                    separator,
                    ..
                } => {
                    let mut aggregation = AggregationProjection::new(*kind, inner.clone());
                    aggregation.alias = segment.alias.clone();
                    aggregation.separator = separator.clone();
                    Projection::Aggregation(aggregation)
                }
                ProjectionKind::Expression => Projection::Expression {
                    expression: segment.text.clone(),
                    alias: segment.alias.clone(),
                },
            };
            context.projections.push(projection);
        }

        context.derive_average_columns();

        let group_by = context.order_items(&statement.group_by, GROUP_BY_DERIVED)?;
        context = context.with_group_by(group_by);
        if !statement.order_by.is_empty() {
            let order_by = context.order_items(&statement.order_by, ORDER_BY_DERIVED)?;
            context = context.with_order_by(order_by);
        }

        if let Some(limit) = &statement.limit {
            context.pagination = Some(Pagination {
                offset: limit.offset.as_ref().map(|v| v.value),
                row_count: limit.row_count.as_ref().map(|v| v.value),
            });
        }

        if !context.has_shorthand() {
            context.assign_positional_indexes();
        }

        Ok(context)
    }

    fn derive_average_columns(&mut self) {
        let mut ordinal = 0;
        for projection in &mut self.projections {
            if let Projection::Aggregation(aggregation) = projection {
                if aggregation.kind == AggregationType::Avg {
                    let inner = aggregation.inner_expression.clone();
                    aggregation.derived = vec![
                        AggregationProjection::new(AggregationType::Count, inner.clone())
                            .with_alias(format!("{}{}", AVG_DERIVED_COUNT, ordinal)),
                        AggregationProjection::new(AggregationType::Sum, inner)
                            .with_alias(format!("{}{}", AVG_DERIVED_SUM, ordinal)),
                    ];
                    ordinal += 1;
                }
            }
        }
    }

    fn order_items(&mut self, segments: &[OrderByItemSegment], derived_prefix: &str) -> ShardResult<Vec<OrderByItem>> {
        let mut items = Vec::with_capacity(segments.len());
        for segment in segments {
            let label = match &segment.column {
                OrderByColumn::Index(index) => self
                    .projections
                    .get(index - 1)
                    .and_then(Projection::column_label)
                    .unwrap_or_else(|| index.to_string()),
                OrderByColumn::Column { owner, name } => match self.find_column_label(owner.as_deref(), name) {
                    Some(label) => label,
                    None => self.derive_column(&segment.text, derived_prefix),
                },
                OrderByColumn::Expression => match self.find_expression_label(&segment.text) {
                    Some(label) => label,
                    None => self.derive_column(&segment.text, derived_prefix),
                },
            };
            let mut item = OrderByItem::new(label, segment.direction);
            item.nulls = segment.nulls;
            if let OrderByColumn::Index(index) = segment.column {
                item.index = index;
            }
            items.push(item);
        }
        Ok(items)
    }

    fn find_column_label(&self, owner: Option<&str>, name: &str) -> Option<String> {
        let owners_match = |projection_owner: &Option<String>| match (projection_owner, owner) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => true,
        };

        for projection in &self.projections {
            if let Projection::Column {
                owner: projection_owner,
                name: projection_name,
                alias,
            } = projection
            {
                if projection_name.eq_ignore_ascii_case(name) && owners_match(projection_owner) {
                    return Some(alias.clone().unwrap_or_else(|| projection_name.clone()));
                }
            }
        }
        if owner.is_none() {
            if let Some(alias) = self
                .projections
                .iter()
                .filter_map(Projection::alias)
                .find(|alias| alias.eq_ignore_ascii_case(name))
            {
                return Some(alias.to_string());
            }
        }
        let covered_by_shorthand = self.projections.iter().any(|projection| {
            matches!(projection, Projection::Shorthand { owner: shorthand_owner } if owners_match(shorthand_owner))
        });
        if covered_by_shorthand {
            return Some(name.to_string());
        }
        let text = match owner {
            Some(owner) => format!("{}.{}", owner, name),
            None => name.to_string(),
        };
        self.find_derived_label(&text)
    }

    fn find_expression_label(&self, text: &str) -> Option<String> {
        self.projections
            .iter()
            .find(|projection| projection.matches_expression(text))
            .and_then(Projection::column_label)
            .or_else(|| self.find_derived_label(text))
    }

    fn find_derived_label(&self, text: &str) -> Option<String> {
        let text = normalize(text);
        self.derived_columns
            .iter()
            .find(|derived| normalize(&derived.expression) == text)
            .map(|derived| derived.alias.clone())
    }

    fn derive_column(&mut self, expression: &str, prefix: &str) -> String {
        let ordinal = self
            .derived_columns
            .iter()
            .filter(|derived| derived.alias.starts_with(prefix))
            .count();
        let alias = format!("{}{}", prefix, ordinal);
        self.derived_columns.push(DerivedColumn {
            expression: expression.to_string(),
            alias: alias.clone(),
        });
        alias
    }

    /// Column layout of the rewritten select list: original projections,
    /// AVG-derived aggregations, then derived GROUP BY / ORDER BY columns.
    pub fn column_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .projections
            .iter()
            .map(|projection| projection.column_label().unwrap_or_else(|| "*".to_string()))
            .collect();
        for aggregation in self.aggregation_projections() {
            labels.extend(aggregation.derived.iter().map(AggregationProjection::column_label));
        }
        labels.extend(self.derived_columns.iter().map(|derived| derived.alias.clone()));
        labels
    }

    /// Columns appended to the select list for merging only. They trail the
    /// client's columns and are never part of the merged result.
    pub fn derived_column_count(&self) -> usize {
        self.aggregation_projections()
            .map(|aggregation| aggregation.derived.len())
            .sum::<usize>()
            + self.derived_columns.len()
    }

    fn assign_positional_indexes(&mut self) {
        let labels = self.column_labels();
        let position = |label: &str| {
            labels
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(label))
                .map(|i| i + 1)
                .unwrap_or(0)
        };

        let mut next_derived = self.projections.len() + 1;
        for (i, projection) in self.projections.iter_mut().enumerate() {
            if let Projection::Aggregation(aggregation) = projection {
                aggregation.index = i + 1;
            }
        }
        for projection in &mut self.projections {
            if let Projection::Aggregation(aggregation) = projection {
                for derived in &mut aggregation.derived {
                    derived.index = next_derived;
                    next_derived += 1;
                }
            }
        }
        for item in self.group_by.iter_mut().chain(self.order_by.iter_mut()) {
            if item.index == 0 {
                item.index = position(&item.label);
            }
        }
    }

    /// Resolve every still-unknown column index against the labels of an
    /// actual result set.
    pub fn resolve_indexes(&mut self, labels: &[String]) -> ShardResult<()> {
        let position = |label: &str| -> ShardResult<usize> {
            labels
                .iter()
                .position(|candidate| candidate.eq_ignore_ascii_case(label))
                .map(|i| i + 1)
                .ok_or_else(|| {
                    ShardError::QueryResultError(format!(
                        "Can not find column label '{}' in query result",
                        label
                    ))
                })
        };

        for projection in &mut self.projections {
            if let Projection::Aggregation(aggregation) = projection {
                if aggregation.index == 0 {
                    aggregation.index = position(&aggregation.column_label())?;
                }
                for derived in &mut aggregation.derived {
                    if derived.index == 0 {
                        derived.index = position(&derived.column_label())?;
                    }
                }
            }
        }
        for item in self.group_by.iter_mut().chain(self.order_by.iter_mut()) {
            if item.index == 0 {
                item.index = position(&item.label)?;
            }
        }
        Ok(())
    }

    pub fn aggregation_projections(&self) -> impl Iterator<Item = &AggregationProjection> {
        self.projections.iter().filter_map(|projection| match projection {
            Projection::Aggregation(aggregation) => Some(aggregation),
            _ => None,
        })
    }

    pub fn has_aggregation(&self) -> bool {
        self.aggregation_projections().next().is_some()
    }

    pub fn has_shorthand(&self) -> bool {
        self.projections
            .iter()
            .any(|projection| matches!(projection, Projection::Shorthand { .. }))
    }

    /// GROUP BY or aggregation requires the in-memory group-by merge.
    pub fn is_group_by_merge(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregation()
    }

    pub fn is_same_group_by_and_order_by_items(&self) -> bool {
        !self.group_by.is_empty()
            && self.group_by.len() == self.order_by.len()
            && self
                .group_by
                .iter()
                .zip(&self.order_by)
                .all(|(group, order)| group.same_as(order))
    }

    /// Extra select items that must be appended for merging.
    pub fn derived_items(&self) -> Vec<String> {
        let mut items = Vec::new();
        for aggregation in self.aggregation_projections() {
            for derived in &aggregation.derived {
                items.push(format!("{} AS {}", derived.expression(), derived.column_label()));
            }
        }
        for derived in &self.derived_columns {
            items.push(format!("{} AS {}", derived.expression, derived.alias));
        }
        items
    }

    /// Row count each shard must return when pagination is moved to the merge.
    pub fn rewritten_row_count(&self, row_count: u64, parameters: &[Value]) -> ShardResult<u64> {
        if self.is_group_by_merge() && !self.is_same_group_by_and_order_by_items() {
            return Ok(UNBOUNDED_ROW_COUNT);
        }
        if self.database_type.is_row_count_offset_relative() {
            let offset = match &self.pagination {
                Some(pagination) => pagination.offset(parameters)?,
                None => 0,
            };
            return Ok(row_count.saturating_add(offset));
        }
        Ok(row_count)
    }
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl(DdlKind),
    Dal(DalKind),
    Dcl(DclKind),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementContext {
    pub kind: StatementKind,
    /// Logical tables in declaration order.
    pub tables: Vec<String>,
    /// Index named by a CREATE INDEX / DROP INDEX statement.
    pub index: Option<String>,
    pub select: Option<SelectStatementContext>,
}

impl StatementContext {
    pub fn from_statement(statement: &SqlStatement, database_type: DatabaseType) -> ShardResult<Self> {
        let tables = statement.tables().iter().map(|t| t.name.clone()).collect();
        let context = match statement {
            SqlStatement::Select(select) => {
                Self::select(SelectStatementContext::from_statement(select, database_type)?)
            }
            SqlStatement::Insert(_) => Self::with_kind(StatementKind::Insert, tables),
            SqlStatement::Update(_) => Self::with_kind(StatementKind::Update, tables),
            SqlStatement::Delete(_) => Self::with_kind(StatementKind::Delete, tables),
            SqlStatement::Ddl(ddl) => Self::ddl(
                ddl.kind,
                tables,
                ddl.index.as_ref().map(|index| index.name.clone()),
            ),
            SqlStatement::Dal(dal) => Self::with_kind(StatementKind::Dal(dal.kind), tables),
            SqlStatement::Dcl(dcl) => Self::with_kind(StatementKind::Dcl(dcl.kind), tables),
        };
        Ok(context)
    }

    pub fn with_kind(kind: StatementKind, tables: Vec<String>) -> Self {
        Self {
            kind,
            tables,
            index: None,
            select: None,
        }
    }

    pub fn select(select: SelectStatementContext) -> Self {
        Self {
            kind: StatementKind::Select,
            tables: select.tables.clone(),
            index: None,
            select: Some(select),
        }
    }

    pub fn ddl(kind: DdlKind, tables: Vec<String>, index: Option<String>) -> Self {
        Self {
            kind: StatementKind::Ddl(kind),
            tables,
            index,
            select: None,
        }
    }

    pub fn is_insert(&self) -> bool {
        self.kind == StatementKind::Insert
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::parse;

    fn select_context(sql: &str) -> SelectStatementContext {
        match parse(sql).unwrap() {
            SqlStatement::Select(select) => {
                SelectStatementContext::from_statement(&select, DatabaseType::MySql).unwrap()
            }
            other => panic!("Expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn test_average_derives_count_and_sum() {
        let context = select_context("SELECT AVG(x.age) FROM table_x x");
        assert_eq!(
            context.derived_items(),
            vec![
                "COUNT(x.age) AS AVG_DERIVED_COUNT_0",
                "SUM(x.age) AS AVG_DERIVED_SUM_0"
            ]
        );
        let avg = context.aggregation_projections().next().unwrap();
        assert_eq!(avg.index, 1);
        assert_eq!(avg.derived[0].index, 2);
        assert_eq!(avg.derived[1].index, 3);
        assert_eq!(context.derived_column_count(), 2);
    }

    #[test]
    fn test_group_and_order_by_derived_columns() {
        let context = select_context("SELECT x.age FROM table_x x GROUP BY x.id ORDER BY x.name");
        assert_eq!(
            context.derived_items(),
            vec!["x.id AS GROUP_BY_DERIVED_0", "x.name AS ORDER_BY_DERIVED_0"]
        );
        assert_eq!(context.group_by[0].label, "GROUP_BY_DERIVED_0");
        assert_eq!(context.group_by[0].index, 2);
        assert_eq!(context.order_by[0].index, 3);
        assert!(!context.generated_order_by);
    }

    #[test]
    fn test_items_resolve_to_projection_labels() {
        let context = select_context(
            "SELECT o.user_id uid, COUNT(*) AS cnt FROM t_order o GROUP BY o.user_id ORDER BY cnt DESC",
        );
        assert!(context.derived_items().is_empty());
        assert_eq!(context.group_by[0].label, "uid");
        assert_eq!(context.group_by[0].index, 1);
        assert_eq!(context.order_by[0].label, "cnt");
        assert_eq!(context.order_by[0].index, 2);
        assert!(!context.is_same_group_by_and_order_by_items());
    }

    #[test]
    fn test_group_by_generates_order_by() {
        let context = select_context("SELECT user_id, SUM(amount) FROM t_order GROUP BY user_id");
        assert!(context.generated_order_by);
        assert!(context.is_same_group_by_and_order_by_items());
    }

    #[test]
    fn test_shorthand_defers_index_resolution() {
        let mut context = select_context("SELECT * FROM t_order ORDER BY status");
        assert_eq!(context.order_by[0].index, 0);
        context
            .resolve_indexes(&["order_id".to_string(), "STATUS".to_string()])
            .unwrap();
        assert_eq!(context.order_by[0].index, 2);

        let mut context = select_context("SELECT * FROM t_order ORDER BY missing");
        assert!(matches!(
            context.resolve_indexes(&["order_id".to_string()]),
            Err(ShardError::QueryResultError(_))
        ));
    }

    #[test]
    fn test_rewritten_row_count() {
        let context = SelectStatementContext::new(DatabaseType::MySql)
            .with_pagination(Pagination::new(Some(2), Some(2)));
        assert_eq!(context.rewritten_row_count(2, &[]).unwrap(), 4);

        let context = SelectStatementContext::new(DatabaseType::Oracle)
            .with_pagination(Pagination::new(Some(2), Some(2)));
        assert_eq!(context.rewritten_row_count(2, &[]).unwrap(), 2);

        let context = SelectStatementContext::new(DatabaseType::MySql)
            .with_group_by(vec![OrderByItem::new("id", OrderDirection::Desc).with_index(1)])
            .with_order_by(vec![OrderByItem::new("id", OrderDirection::Asc).with_index(1)])
            .with_pagination(Pagination::new(Some(2), Some(2)));
        assert_eq!(
            context.rewritten_row_count(2, &[]).unwrap(),
            UNBOUNDED_ROW_COUNT
        );
    }

    #[test]
    fn test_parameter_pagination() {
        let pagination = Pagination {
            offset: Some(PaginationValue::Parameter(0)),
            row_count: Some(PaginationValue::Parameter(1)),
        };
        let parameters = vec![Value::from(5), Value::from(10)];
        assert_eq!(pagination.offset(&parameters).unwrap(), 5);
        assert_eq!(pagination.row_count(&parameters).unwrap(), Some(10));
        assert!(pagination.offset(&[Value::from("x")]).is_err());
    }

    #[test]
    fn test_having_and_distinct_aggregation_are_rejected() {
        for sql in [
            "SELECT user_id FROM t_order GROUP BY user_id HAVING COUNT(*) > 1",
            "SELECT COUNT(DISTINCT user_id) FROM t_order",
        ] {
            match parse(sql).unwrap() {
                SqlStatement::Select(select) => assert!(matches!(
                    SelectStatementContext::from_statement(&select, DatabaseType::MySql),
                    Err(ShardError::OperationNotSupported(_))
                )),
                other => panic!("Expected SELECT, got {:?}", other),
            }
        }
    }
}

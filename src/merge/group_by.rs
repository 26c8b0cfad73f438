//! In-memory GROUP BY merge
//!
//! Every cursor is drained to exhaustion. Rows are grouped by the values of
//! the GROUP BY columns, the first row of a group is kept as its
//! representative and the aggregation columns of that row are overwritten
//! with the merged aggregation results. Groups are then sorted in memory.

use std::collections::HashMap;

use serde_json::Value;

use super::aggregation::AggregationUnit;
use super::compare::RowComparator;
use super::result::{column_labels, MemoryMergedResult, MemoryQueryResultRow, MergedResult, QueryResult};
use super::{column_case_sensitivity, sort_rows};
use crate::error::{ShardError, ShardResult};
use crate::metadata::SchemaMetaData;
use crate::sql::{AggregationProjection, SelectStatementContext};

/// Hashable form of one GROUP BY cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum GroupKeyPart {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned values above `i64::MAX`
    UInt(u64),
    /// Bit pattern of a non-integral number
    Float(u64),
    String(String),
    /// Arrays and objects, keyed by their JSON text
    Other(String),
}

impl From<&Value> for GroupKeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => GroupKeyPart::Null,
            Value::Bool(b) => GroupKeyPart::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return GroupKeyPart::Int(i);
                }
                if let Some(u) = n.as_u64() {
                    return GroupKeyPart::UInt(u);
                }
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    GroupKeyPart::Int(f as i64)
                } else {
                    GroupKeyPart::Float(f.to_bits())
                }
            }
            Value::String(s) => GroupKeyPart::String(s.clone()),
            other => GroupKeyPart::Other(other.to_string()),
        }
    }
}

/// The GROUP BY values of one row; numerically equal numbers are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupByValue(Vec<GroupKeyPart>);

impl GroupByValue {
    pub fn new(values: &[Value]) -> Self {
        Self(values.iter().map(GroupKeyPart::from).collect())
    }

    fn from_query_result(result: &dyn QueryResult, indexes: &[usize]) -> ShardResult<Self> {
        let values = indexes
            .iter()
            .map(|index| result.value(*index))
            .collect::<ShardResult<Vec<_>>>()?;
        Ok(Self::new(&values))
    }
}

struct Group {
    row: MemoryQueryResultRow,
    units: Vec<AggregationUnit>,
}

/// Merged result of a statement with GROUP BY or aggregation projections.
pub struct GroupByMemoryMergedResult {
    inner: MemoryMergedResult,
}

impl GroupByMemoryMergedResult {
    pub fn new(
        context: &SelectStatementContext,
        schema: &dyn SchemaMetaData,
        mut cursors: Vec<Box<dyn QueryResult>>,
    ) -> ShardResult<Self> {
        let mut context = context.clone();
        let labels = match cursors.first() {
            Some(first) => column_labels(first.as_ref())?,
            None => context.column_labels(),
        };
        context.resolve_indexes(&labels)?;
        let visible = labels.len().saturating_sub(context.derived_column_count());

        let aggregations: Vec<AggregationProjection> =
            context.aggregation_projections().cloned().collect();
        let group_indexes: Vec<usize> = context.group_by.iter().map(|item| item.index).collect();

        let mut groups: Vec<Group> = Vec::new();
        let mut positions: HashMap<GroupByValue, usize> = HashMap::new();
        let mut row_count = 0usize;

        for cursor in cursors.iter_mut() {
            while cursor.next()? {
                row_count += 1;
                let key = GroupByValue::from_query_result(cursor.as_ref(), &group_indexes)?;
                let position = match positions.get(&key) {
                    Some(position) => *position,
                    None => {
                        groups.push(Group {
                            row: MemoryQueryResultRow::from_query_result(cursor.as_ref())?,
                            units: aggregations.iter().map(AggregationUnit::new).collect(),
                        });
                        positions.insert(key, groups.len() - 1);
                        groups.len() - 1
                    }
                };
                let group = &mut groups[position];
                for (aggregation, unit) in aggregations.iter().zip(group.units.iter_mut()) {
                    unit.merge(&aggregation_values(cursor.as_ref(), aggregation)?)?;
                }
            }
        }

        tracing::debug!(
            "[MERGE] {} rows from {} cursors grouped into {} groups",
            row_count,
            cursors.len(),
            groups.len()
        );

        let mut rows = Vec::with_capacity(groups.len().max(1));
        for group in groups {
            let mut row = group.row;
            for (aggregation, unit) in aggregations.iter().zip(&group.units) {
                row.set_cell(aggregation.index, unit.result()?)?;
            }
            rows.push(row);
        }

        if rows.is_empty() {
            if context.group_by.is_empty() && !aggregations.is_empty() {
                rows.push(empty_aggregation_row(labels.len(), &aggregations)?);
            }
            return Ok(Self {
                inner: MemoryMergedResult::new(labels, rows).with_visible_columns(visible),
            });
        }

        let items = if context.order_by.is_empty() {
            &context.group_by
        } else {
            &context.order_by
        };
        if !items.is_empty() && rows.len() > 1 {
            let case_sensitivity = match cursors.first() {
                Some(first) => column_case_sensitivity(first.as_ref(), &context.tables, schema)?,
                None => Vec::new(),
            };
            let comparator = RowComparator::new(items, context.database_type, &case_sensitivity);
            sort_rows(&mut rows, &comparator)?;
        }

        Ok(Self {
            inner: MemoryMergedResult::new(labels, rows).with_visible_columns(visible),
        })
    }

    pub fn rows(&self) -> &[MemoryQueryResultRow] {
        self.inner.rows()
    }
}

/// Values an aggregation reads from the current row: its own column, or
/// the derived columns in declared order.
fn aggregation_values(
    result: &dyn QueryResult,
    aggregation: &AggregationProjection,
) -> ShardResult<Vec<Value>> {
    if aggregation.derived.is_empty() {
        return Ok(vec![result.value(aggregation.index)?]);
    }
    aggregation
        .derived
        .iter()
        .map(|derived| result.value(derived.index))
        .collect()
}

fn empty_aggregation_row(
    column_count: usize,
    aggregations: &[AggregationProjection],
) -> ShardResult<MemoryQueryResultRow> {
    let mut row = MemoryQueryResultRow::new(vec![Value::Null; column_count]);
    for aggregation in aggregations {
        if aggregation.index == 0 || aggregation.index > column_count {
            return Err(ShardError::QueryResultError(format!(
                "Aggregation '{}' has no column in the result",
                aggregation.column_label()
            )));
        }
        row.set_cell(aggregation.index, AggregationUnit::empty_result(aggregation.kind))?;
    }
    Ok(row)
}

impl MergedResult for GroupByMemoryMergedResult {
    fn next(&mut self) -> ShardResult<bool> {
        self.inner.next()
    }

    fn value(&self, index: usize) -> ShardResult<Value> {
        self.inner.value(index)
    }

    fn column_labels(&self) -> &[String] {
        self.inner.column_labels()
    }
}

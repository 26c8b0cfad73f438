//! Result merging
//!
//! Combines the cursors returned by every routed target into one logical
//! result. Statements with GROUP BY or aggregation go through the in-memory
//! group-by merge; ordered statements are sorted in memory; everything else
//! streams the cursors one after another. Pagination moved off the targets
//! by the rewrite is applied on top.

pub mod aggregation;
pub mod compare;
pub mod group_by;
pub mod iterator;
pub mod result;

use std::cmp::Ordering;

use serde_json::Value;

pub use aggregation::AggregationUnit;
pub use compare::{compare_to, compare_values, RowComparator};
pub use group_by::{GroupByMemoryMergedResult, GroupByValue};
pub use iterator::{IteratorMergedResult, PaginationMergedResult};
pub use result::{MemoryMergedResult, MemoryQueryResult, MemoryQueryResultRow, MergedResult, QueryResult};

use crate::error::{ShardError, ShardResult};
use crate::metadata::SchemaMetaData;
use crate::sql::SelectStatementContext;

/// Case sensitivity of every column of a cursor, indexed by `column - 1`.
///
/// The first statement table whose metadata knows the column decides.
/// Columns no table knows are case-sensitive.
pub fn column_case_sensitivity(
    result: &dyn QueryResult,
    tables: &[String],
    schema: &dyn SchemaMetaData,
) -> ShardResult<Vec<bool>> {
    let mut sensitivity = Vec::with_capacity(result.column_count());
    for index in 1..=result.column_count() {
        let column = result.column_name(index)?;
        let mut case_sensitive = true;
        for table in tables {
            let metadata = schema
                .table(table)
                .ok_or_else(|| ShardError::TableNotFound(table.clone()))?;
            if metadata.contains_column(&column) {
                case_sensitive = metadata.is_case_sensitive(&column);
                break;
            }
        }
        sensitivity.push(case_sensitive);
    }
    Ok(sensitivity)
}

/// Stable sort; the first comparison error aborts the sort.
pub(crate) fn sort_rows(rows: &mut [MemoryQueryResultRow], comparator: &RowComparator<'_>) -> ShardResult<()> {
    let mut error: Option<ShardError> = None;
    rows.sort_by(|a, b| {
        if error.is_some() {
            return Ordering::Equal;
        }
        match comparator.compare(a.cells(), b.cells()) {
            Ok(ordering) => ordering,
            Err(e) => {
                error = Some(e);
                Ordering::Equal
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Chooses and builds the merged result of a query.
pub struct MergeEngine<'a> {
    context: &'a SelectStatementContext,
    schema: &'a dyn SchemaMetaData,
    parameters: Vec<Value>,
}

impl<'a> MergeEngine<'a> {
    pub fn new(context: &'a SelectStatementContext, schema: &'a dyn SchemaMetaData) -> Self {
        Self {
            context,
            schema,
            parameters: Vec::new(),
        }
    }

    /// Parameters of the statement, needed for parameterized pagination.
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn merge(&self, cursors: Vec<Box<dyn QueryResult>>) -> ShardResult<Box<dyn MergedResult>> {
        if cursors.len() == 1 {
            tracing::debug!("[MERGE] Single cursor, streaming as is");
            return Ok(Box::new(IteratorMergedResult::new(cursors)?));
        }

        let merged: Box<dyn MergedResult> = if self.context.is_group_by_merge() {
            tracing::debug!("[MERGE] Group-by merge over {} cursors", cursors.len());
            Box::new(GroupByMemoryMergedResult::new(self.context, self.schema, cursors)?)
        } else if !self.context.order_by.is_empty() {
            tracing::debug!("[MERGE] Order-by merge over {} cursors", cursors.len());
            Box::new(self.sorted(cursors)?)
        } else {
            tracing::debug!("[MERGE] Iterator merge over {} cursors", cursors.len());
            Box::new(IteratorMergedResult::new(cursors)?)
        };

        match &self.context.pagination {
            Some(pagination) => Ok(Box::new(PaginationMergedResult::new(
                merged,
                pagination.offset(&self.parameters)?,
                pagination.row_count(&self.parameters)?,
            ))),
            None => Ok(merged),
        }
    }

    /// Materialize every row and sort by the ORDER BY items.
    fn sorted(&self, mut cursors: Vec<Box<dyn QueryResult>>) -> ShardResult<MemoryMergedResult> {
        let Some(first) = cursors.first() else {
            return Ok(MemoryMergedResult::default());
        };
        let labels = result::column_labels(first.as_ref())?;
        let case_sensitivity = column_case_sensitivity(first.as_ref(), &self.context.tables, self.schema)?;
        let mut context = self.context.clone();
        context.resolve_indexes(&labels)?;

        let mut rows = Vec::new();
        for cursor in cursors.iter_mut() {
            while cursor.next()? {
                rows.push(MemoryQueryResultRow::from_query_result(cursor.as_ref())?);
            }
        }
        let comparator = RowComparator::new(&context.order_by, context.database_type, &case_sensitivity);
        sort_rows(&mut rows, &comparator)?;
        let visible = labels.len().saturating_sub(context.derived_column_count());
        Ok(MemoryMergedResult::new(labels, rows).with_visible_columns(visible))
    }
}

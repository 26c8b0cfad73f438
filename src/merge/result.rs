//! Per-target cursors and merged cursors.

use serde_json::Value;

use crate::error::{ShardError, ShardResult};

/// Forward-only cursor over the rows one target returned.
pub trait QueryResult {
    /// Advance to the next row.
    ///
    /// # Returns
    /// true if a row is available
    fn next(&mut self) -> ShardResult<bool>;

    /// Value of the current row.
    ///
    /// # Arguments
    /// * `index` - 1-based column index
    fn value(&self, index: usize) -> ShardResult<Value>;

    fn column_count(&self) -> usize;

    /// Label (alias or name) of a 1-based column.
    fn column_label(&self, index: usize) -> ShardResult<String>;

    /// Underlying column name of a 1-based column.
    fn column_name(&self, index: usize) -> ShardResult<String> {
        self.column_label(index)
    }
}

/// Forward-only cursor over the merged rows of all targets.
pub trait MergedResult {
    fn next(&mut self) -> ShardResult<bool>;

    /// Value of the current row at a 1-based column index.
    fn value(&self, index: usize) -> ShardResult<Value>;

    fn column_labels(&self) -> &[String];

    fn value_by_label(&self, label: &str) -> ShardResult<Value> {
        let index = self
            .column_labels()
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(label))
            .ok_or_else(|| {
                ShardError::QueryResultError(format!("Can not find column label '{}'", label))
            })?;
        self.value(index + 1)
    }
}

/// Labels of all columns of a cursor, in order.
pub fn column_labels(result: &dyn QueryResult) -> ShardResult<Vec<String>> {
    (1..=result.column_count())
        .map(|index| result.column_label(index))
        .collect()
}

fn out_of_range(index: usize) -> ShardError {
    ShardError::QueryResultError(format!("Column index {} out of range", index))
}

/// A query result held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueryResult {
    labels: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl MemoryQueryResult {
    pub fn new(labels: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            labels,
            rows,
            position: None,
        }
    }

    fn current(&self) -> ShardResult<&Vec<Value>> {
        self.position
            .and_then(|position| self.rows.get(position))
            .ok_or_else(|| ShardError::QueryResultError("Cursor is not on a row".to_string()))
    }
}

impl QueryResult for MemoryQueryResult {
    fn next(&mut self) -> ShardResult<bool> {
        let next = self.position.map_or(0, |position| position + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn value(&self, index: usize) -> ShardResult<Value> {
        index
            .checked_sub(1)
            .and_then(|position| self.current().ok()?.get(position).cloned())
            .ok_or_else(|| out_of_range(index))
    }

    fn column_count(&self) -> usize {
        self.labels.len()
    }

    fn column_label(&self, index: usize) -> ShardResult<String> {
        index
            .checked_sub(1)
            .and_then(|position| self.labels.get(position).cloned())
            .ok_or_else(|| out_of_range(index))
    }
}

/// A row copied out of a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryQueryResultRow {
    cells: Vec<Value>,
}

impl MemoryQueryResultRow {
    pub fn new(cells: Vec<Value>) -> Self {
        Self { cells }
    }

    /// Snapshot the current row of a cursor.
    pub fn from_query_result(result: &dyn QueryResult) -> ShardResult<Self> {
        let cells = (1..=result.column_count())
            .map(|index| result.value(index))
            .collect::<ShardResult<Vec<_>>>()?;
        Ok(Self { cells })
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&Value> {
        index.checked_sub(1).and_then(|position| self.cells.get(position))
    }

    pub fn truncate(&mut self, width: usize) {
        self.cells.truncate(width);
    }

    pub fn set_cell(&mut self, index: usize, value: Value) -> ShardResult<()> {
        let cell = index
            .checked_sub(1)
            .and_then(|position| self.cells.get_mut(position))
            .ok_or_else(|| out_of_range(index))?;
        *cell = value;
        Ok(())
    }
}

/// Merged result over rows already materialized in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMergedResult {
    labels: Vec<String>,
    rows: Vec<MemoryQueryResultRow>,
    position: Option<usize>,
}

impl MemoryMergedResult {
    pub fn new(labels: Vec<String>, rows: Vec<MemoryQueryResultRow>) -> Self {
        Self {
            labels,
            rows,
            position: None,
        }
    }

    /// Keep the first `width` columns, dropping the trailing ones.
    pub fn with_visible_columns(mut self, width: usize) -> Self {
        self.labels.truncate(width);
        for row in &mut self.rows {
            row.truncate(width);
        }
        self
    }

    pub fn rows(&self) -> &[MemoryQueryResultRow] {
        &self.rows
    }
}

impl MergedResult for MemoryMergedResult {
    fn next(&mut self) -> ShardResult<bool> {
        let next = self.position.map_or(0, |position| position + 1);
        self.position = Some(next.min(self.rows.len()));
        Ok(next < self.rows.len())
    }

    fn value(&self, index: usize) -> ShardResult<Value> {
        self.position
            .and_then(|position| self.rows.get(position))
            .and_then(|row| row.cell(index).cloned())
            .ok_or_else(|| out_of_range(index))
    }

    fn column_labels(&self) -> &[String] {
        &self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_memory_query_result_cursor() {
        let mut result = MemoryQueryResult::new(
            labels(&["id", "name"]),
            vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]],
        );
        assert!(result.value(1).is_err());
        assert!(result.next().unwrap());
        assert_eq!(result.value(2).unwrap(), json!("a"));
        assert!(result.next().unwrap());
        assert_eq!(result.value(1).unwrap(), json!(2));
        assert!(!result.next().unwrap());
        assert!(!result.next().unwrap());
        assert!(result.value(0).is_err());
        assert_eq!(column_labels(&result).unwrap(), labels(&["id", "name"]));
    }

    #[test]
    fn test_row_snapshot_and_overwrite() {
        let mut result = MemoryQueryResult::new(labels(&["id"]), vec![vec![json!(7)]]);
        result.next().unwrap();
        let mut row = MemoryQueryResultRow::from_query_result(&result).unwrap();
        row.set_cell(1, json!(8)).unwrap();
        assert_eq!(row.cell(1), Some(&json!(8)));
        assert!(row.set_cell(2, json!(0)).is_err());
    }

    #[test]
    fn test_merged_result_value_by_label() {
        let mut merged = MemoryMergedResult::new(
            labels(&["id", "COUNT(*)"]),
            vec![MemoryQueryResultRow::new(vec![json!(1), json!(3)])],
        );
        assert!(merged.next().unwrap());
        assert_eq!(merged.value_by_label("count(*)").unwrap(), json!(3));
        assert!(merged.value_by_label("missing").is_err());
        assert!(!merged.next().unwrap());
    }

    #[test]
    fn test_trailing_columns_hidden() {
        let mut merged = MemoryMergedResult::new(
            labels(&["id", "AVG_DERIVED_COUNT_0"]),
            vec![MemoryQueryResultRow::new(vec![json!(1), json!(3)])],
        )
        .with_visible_columns(1);
        assert_eq!(merged.column_labels(), &["id".to_string()][..]);
        assert!(merged.next().unwrap());
        assert_eq!(merged.value(1).unwrap(), json!(1));
        assert!(merged.value(2).is_err());
        assert!(merged.value_by_label("AVG_DERIVED_COUNT_0").is_err());
    }
}

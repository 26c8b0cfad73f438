//! Streaming merged results.

use serde_json::Value;

use super::result::{column_labels, MergedResult, QueryResult};
use crate::error::{ShardError, ShardResult};

/// Concatenates the cursors, draining one before moving to the next.
pub struct IteratorMergedResult {
    cursors: Vec<Box<dyn QueryResult>>,
    current: usize,
    labels: Vec<String>,
}

impl IteratorMergedResult {
    pub fn new(cursors: Vec<Box<dyn QueryResult>>) -> ShardResult<Self> {
        let labels = match cursors.first() {
            Some(first) => column_labels(first.as_ref())?,
            None => Vec::new(),
        };
        Ok(Self {
            cursors,
            current: 0,
            labels,
        })
    }
}

impl MergedResult for IteratorMergedResult {
    fn next(&mut self) -> ShardResult<bool> {
        while let Some(cursor) = self.cursors.get_mut(self.current) {
            if cursor.next()? {
                return Ok(true);
            }
            self.current += 1;
        }
        Ok(false)
    }

    fn value(&self, index: usize) -> ShardResult<Value> {
        self.cursors
            .get(self.current)
            .ok_or_else(|| ShardError::QueryResultError("Cursor is exhausted".to_string()))?
            .value(index)
    }

    fn column_labels(&self) -> &[String] {
        &self.labels
    }
}

/// Applies LIMIT/OFFSET to an already merged result.
pub struct PaginationMergedResult {
    inner: Box<dyn MergedResult>,
    offset: u64,
    row_count: Option<u64>,
    skipped: bool,
    emitted: u64,
}

impl PaginationMergedResult {
    pub fn new(inner: Box<dyn MergedResult>, offset: u64, row_count: Option<u64>) -> Self {
        Self {
            inner,
            offset,
            row_count,
            skipped: false,
            emitted: 0,
        }
    }
}

impl MergedResult for PaginationMergedResult {
    fn next(&mut self) -> ShardResult<bool> {
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    self.row_count = Some(0);
                    return Ok(false);
                }
            }
        }
        if self.row_count.is_some_and(|limit| self.emitted >= limit) {
            return Ok(false);
        }
        let has_next = self.inner.next()?;
        if has_next {
            self.emitted += 1;
        }
        Ok(has_next)
    }

    fn value(&self, index: usize) -> ShardResult<Value> {
        self.inner.value(index)
    }

    fn column_labels(&self) -> &[String] {
        self.inner.column_labels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::result::MemoryQueryResult;
    use serde_json::json;

    fn cursor(values: &[i64]) -> Box<dyn QueryResult> {
        Box::new(MemoryQueryResult::new(
            vec!["id".to_string()],
            values.iter().map(|v| vec![json!(v)]).collect(),
        ))
    }

    fn drain(mut result: Box<dyn MergedResult>) -> Vec<Value> {
        let mut values = Vec::new();
        while result.next().unwrap() {
            values.push(result.value(1).unwrap());
        }
        values
    }

    #[test]
    fn test_iterator_skips_empty_cursors() {
        let merged =
            IteratorMergedResult::new(vec![cursor(&[1, 2]), cursor(&[]), cursor(&[3])]).unwrap();
        assert_eq!(merged.column_labels(), &["id".to_string()]);
        assert_eq!(drain(Box::new(merged)), vec![json!(1), json!(2), json!(3)]);
    }

    #[test]
    fn test_pagination() {
        let merged = IteratorMergedResult::new(vec![cursor(&[1, 2]), cursor(&[3, 4])]).unwrap();
        let page = PaginationMergedResult::new(Box::new(merged), 1, Some(2));
        assert_eq!(drain(Box::new(page)), vec![json!(2), json!(3)]);

        let merged = IteratorMergedResult::new(vec![cursor(&[1])]).unwrap();
        let page = PaginationMergedResult::new(Box::new(merged), 5, None);
        assert!(drain(Box::new(page)).is_empty());
    }
}

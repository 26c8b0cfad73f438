use serde_json::Value;

use crate::sql::OrderByItem;

/// A rewrite instruction anchored in the original SQL text.
///
/// Replacing tokens cover `start..stop` of the original text. Inserting
/// tokens (`Items`, `GeneratedKey`, `OrderBy`) add text at `start` and
/// replace nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlToken {
    /// A logical table name, with any schema qualifier.
    Table {
        start: usize,
        stop: usize,
        logic_table: String,
        quote: Option<char>,
    },
    /// A schema name, replaced by the target data source.
    Schema {
        start: usize,
        stop: usize,
        name: String,
    },
    /// An index name, made unique per actual table.
    Index {
        start: usize,
        stop: usize,
        index_name: String,
        logic_table: Option<String>,
    },
    /// Extra select or insert items, each rendered as `, item`.
    Items { start: usize, items: Vec<String> },
    /// Generated key value of one VALUES row.
    GeneratedKey {
        start: usize,
        /// Render `?` and bind the value instead of inlining it.
        parameterized: bool,
        /// Index in the original parameters where the value is bound.
        parameter_index: usize,
        value: Value,
    },
    RowCount { start: usize, stop: usize, row_count: u64 },
    Offset { start: usize, stop: usize, offset: u64 },
    /// ORDER BY clause synthesized from the GROUP BY items.
    OrderBy { start: usize, items: Vec<OrderByItem> },
}

impl SqlToken {
    pub fn start(&self) -> usize {
        match self {
            SqlToken::Table { start, .. }
            | SqlToken::Schema { start, .. }
            | SqlToken::Index { start, .. }
            | SqlToken::Items { start, .. }
            | SqlToken::GeneratedKey { start, .. }
            | SqlToken::RowCount { start, .. }
            | SqlToken::Offset { start, .. }
            | SqlToken::OrderBy { start, .. } => *start,
        }
    }

    /// End of the replaced text, `None` for inserting tokens.
    pub fn stop(&self) -> Option<usize> {
        match self {
            SqlToken::Table { stop, .. }
            | SqlToken::Schema { stop, .. }
            | SqlToken::Index { stop, .. }
            | SqlToken::RowCount { stop, .. }
            | SqlToken::Offset { stop, .. } => Some(*stop),
            SqlToken::Items { .. } | SqlToken::GeneratedKey { .. } | SqlToken::OrderBy { .. } => None,
        }
    }

    /// Where copying of the original text resumes after this token.
    pub fn end(&self) -> usize {
        self.stop().unwrap_or_else(|| self.start())
    }
}

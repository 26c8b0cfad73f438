//! SQL front end: lexer, clause-level parser and statement contexts.

pub mod context;
pub mod dialect;
pub mod lexer;
pub mod parser;

pub use context::{
    AggregationProjection, AggregationType, DerivedColumn, NullsOrder, OrderByItem,
    OrderDirection, Pagination, PaginationValue, Projection, SelectStatementContext,
    StatementContext, StatementKind, UNBOUNDED_ROW_COUNT,
};
pub use dialect::DatabaseType;
pub use parser::{parse, DalKind, DclKind, DdlKind, SqlParser, SqlStatement};

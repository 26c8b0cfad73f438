pub mod config;
pub mod error;
pub mod merge;
pub mod metadata;
pub mod rewrite;
pub mod sharding;
pub mod sql;

pub use config::ShardingConfig;
pub use error::{ShardError, ShardResult};
pub use merge::{MergeEngine, MergedResult, QueryResult};
pub use metadata::{DataSourceMetas, InMemorySchema, SchemaMetaData};
pub use rewrite::{SqlRewriteEngine, SqlTokenGenerator, SqlUnit};
pub use sharding::{RouteEngineSelector, RouteResult, RouteUnit, ShardingRule};
pub use sql::{parse, DatabaseType, SqlStatement, StatementContext};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Index '{0}' not found")]
    IndexNotFound(String),

    #[error("Value is not comparable: {0}")]
    NotComparable(String),

    #[error("Ambiguous sharding strategy: {0}")]
    AmbiguousStrategy(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Route error: {0}")]
    RouteError(String),

    #[error("Query result error: {0}")]
    QueryResultError(String),

    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type ShardResult<T> = Result<T, ShardError>;

impl serde::Serialize for ShardError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

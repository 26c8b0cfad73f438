use serde::{Deserialize, Serialize};

use super::context::{NullsOrder, OrderDirection};

/// Database dialect of the actual data sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DatabaseType {
    #[default]
    #[serde(rename = "MySQL", alias = "mysql")]
    MySql,
    #[serde(rename = "PostgreSQL", alias = "postgresql")]
    PostgreSql,
    #[serde(rename = "Oracle", alias = "oracle")]
    Oracle,
    #[serde(rename = "SQLServer", alias = "sqlserver")]
    SqlServer,
    #[serde(rename = "H2", alias = "h2")]
    H2,
    #[serde(rename = "SQL92", alias = "sql92")]
    Sql92,
    #[serde(rename = "openGauss", alias = "opengauss")]
    OpenGauss,
}

impl DatabaseType {
    /// Null placement used when an ORDER BY item does not say `NULLS FIRST/LAST`.
    ///
    /// MySQL-like dialects sort nulls as the smallest value, PostgreSQL-like
    /// dialects as the largest.
    pub fn default_nulls_order(self, direction: OrderDirection) -> NullsOrder {
        let nulls_smallest = matches!(
            self,
            DatabaseType::MySql | DatabaseType::Sql92 | DatabaseType::SqlServer | DatabaseType::H2
        );
        match (nulls_smallest, direction) {
            (true, OrderDirection::Asc) | (false, OrderDirection::Desc) => NullsOrder::First,
            (true, OrderDirection::Desc) | (false, OrderDirection::Asc) => NullsOrder::Last,
        }
    }

    /// Whether `LIMIT offset, count` counts rows after the offset, so a
    /// rewritten statement that resets the offset must fetch `count + offset`.
    pub fn is_row_count_offset_relative(self) -> bool {
        matches!(
            self,
            DatabaseType::MySql
                | DatabaseType::PostgreSql
                | DatabaseType::H2
                | DatabaseType::Sql92
                | DatabaseType::OpenGauss
        )
    }
}

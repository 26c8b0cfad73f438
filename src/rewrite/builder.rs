//! Templated SQL
//!
//! The rewrite engine produces a template once per statement; table, schema
//! and index names stay placeholders until the template is rendered for a
//! concrete route unit.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::sharding::RouteUnit;

#[derive(Debug, Clone, PartialEq)]
enum SqlSegment {
    Literal(String),
    Table {
        logic_table: String,
        quote: Option<char>,
    },
    Schema {
        name: String,
    },
    Index {
        index_name: String,
        logic_table: Option<String>,
    },
}

fn quoted(name: &str, quote: Option<char>) -> String {
    match quote {
        Some('[') => format!("[{}]", name),
        Some(quote) => format!("{}{}{}", quote, name, quote),
        None => name.to_string(),
    }
}

/// Rewritten SQL with placeholders for routed names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlBuilder {
    segments: Vec<SqlSegment>,
    parameters: Vec<Value>,
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn append_literal(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(SqlSegment::Literal(last)) = self.segments.last_mut() {
            last.push_str(text);
        } else {
            self.segments.push(SqlSegment::Literal(text.to_string()));
        }
    }

    pub fn append_table(&mut self, logic_table: &str, quote: Option<char>) {
        self.segments.push(SqlSegment::Table {
            logic_table: logic_table.to_string(),
            quote,
        });
    }

    pub fn append_schema(&mut self, name: &str) {
        self.segments.push(SqlSegment::Schema {
            name: name.to_string(),
        });
    }

    pub fn append_index(&mut self, index_name: &str, logic_table: Option<&str>) {
        self.segments.push(SqlSegment::Index {
            index_name: index_name.to_string(),
            logic_table: logic_table.map(str::to_string),
        });
    }

    /// Render the SQL of one route unit.
    ///
    /// # Arguments
    /// * `unit` - Target data source and its table units
    /// * `actual_tables` - Lower-cased logical table to actual table, bound
    ///   tables included
    pub fn to_sql(&self, unit: &RouteUnit, actual_tables: &HashMap<String, String>) -> String {
        let mut sql = String::new();
        for segment in &self.segments {
            match segment {
                SqlSegment::Literal(text) => sql.push_str(text),
                SqlSegment::Table { logic_table, quote } => {
                    let actual = actual_tables
                        .get(&logic_table.to_lowercase())
                        .map(String::as_str)
                        .unwrap_or(logic_table.as_str());
                    sql.push_str(&quoted(actual, *quote));
                }
                SqlSegment::Schema { .. } => sql.push_str(unit.data_source()),
                SqlSegment::Index {
                    index_name,
                    logic_table,
                } => {
                    let actual = match logic_table {
                        Some(logic_table) => actual_tables.get(&logic_table.to_lowercase()),
                        None => unit.table_units().first().map(|table| &table.actual_table),
                    };
                    match actual {
                        Some(actual) => sql.push_str(&format!("{}_{}", index_name, actual)),
                        None => sql.push_str(index_name),
                    }
                }
            }
        }
        sql
    }
}

/// The template with logical names in place.
impl fmt::Display for SqlBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                SqlSegment::Literal(text) => write!(f, "{}", text)?,
                SqlSegment::Table { logic_table, quote } => {
                    write!(f, "{}", quoted(logic_table, *quote))?
                }
                SqlSegment::Schema { name } => write!(f, "{}", name)?,
                SqlSegment::Index { index_name, .. } => write!(f, "{}", index_name)?,
            }
        }
        Ok(())
    }
}

/// Executable SQL of one route unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlUnit {
    pub sql: String,
    pub parameters: Vec<Value>,
}

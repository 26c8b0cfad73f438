//! SQL rewrite engine
//!
//! Walks the tokens of a statement in text order, copying the untouched SQL
//! between them and rendering each token's replacement into an
//! [`SqlBuilder`] template. The template is then rendered once per route
//! unit by [`SqlRewriteEngine::generate_sql`].

use serde_json::Value;

use super::builder::{SqlBuilder, SqlUnit};
use super::token::SqlToken;
use crate::error::{ShardError, ShardResult};
use crate::sharding::{BindingTableResolver, RouteUnit, ShardingRule};
use crate::sql::{OrderByItem, PaginationValue, StatementContext};

pub struct SqlRewriteEngine<'a> {
    rule: &'a ShardingRule,
    sql: &'a str,
    context: &'a StatementContext,
    tokens: Vec<SqlToken>,
    parameters: Vec<Value>,
}

impl<'a> SqlRewriteEngine<'a> {
    /// Sort and validate the tokens of a statement.
    ///
    /// Tokens must lie on character boundaries of `sql` and must not
    /// overlap; inserting tokens at the same position keep their order.
    pub fn new(
        rule: &'a ShardingRule,
        sql: &'a str,
        context: &'a StatementContext,
        mut tokens: Vec<SqlToken>,
        parameters: Vec<Value>,
    ) -> ShardResult<Self> {
        tokens.sort_by_key(SqlToken::start);

        let mut previous_end = 0;
        for token in &tokens {
            if token.start() < previous_end {
                return Err(ShardError::ParseError(format!(
                    "Overlapping rewrite tokens at position {}",
                    token.start()
                )));
            }
            if token.end() > sql.len()
                || !sql.is_char_boundary(token.start())
                || !sql.is_char_boundary(token.end())
            {
                return Err(ShardError::ParseError(format!(
                    "Rewrite token {}..{} outside of SQL text",
                    token.start(),
                    token.end()
                )));
            }
            previous_end = token.end();
        }

        Ok(Self {
            rule,
            sql,
            context,
            tokens,
            parameters,
        })
    }

    /// Build the SQL template.
    ///
    /// # Arguments
    /// * `rewrite_limit` - Whether the statement reaches several targets, so
    ///   pagination and merge-only items must be rewritten
    pub fn rewrite(&self, rewrite_limit: bool) -> ShardResult<SqlBuilder> {
        let mut builder = SqlBuilder::new();
        let mut parameters = self.rewritten_parameters(rewrite_limit)?;
        let mut inserted_parameters = 0usize;
        let mut cursor = 0usize;

        for token in &self.tokens {
            builder.append_literal(&self.sql[cursor..token.start()]);
            match token {
                SqlToken::Table {
                    logic_table, quote, ..
                } => builder.append_table(logic_table, *quote),
                SqlToken::Schema { name, .. } => builder.append_schema(name),
                SqlToken::Index {
                    index_name,
                    logic_table,
                    ..
                } => builder.append_index(index_name, logic_table.as_deref()),
                SqlToken::Items { items, .. } => {
                    if rewrite_limit || self.context.is_insert() {
                        for item in items {
                            builder.append_literal(", ");
                            builder.append_literal(item);
                        }
                    }
                }
                SqlToken::GeneratedKey {
                    parameterized,
                    parameter_index,
                    value,
                    ..
                } => {
                    if *parameterized {
                        builder.append_literal(", ?");
                        let position = (parameter_index + inserted_parameters).min(parameters.len());
                        parameters.insert(position, value.clone());
                        inserted_parameters += 1;
                    } else {
                        builder.append_literal(", ");
                        builder.append_literal(&literal(value));
                    }
                }
                SqlToken::RowCount {
                    start,
                    stop,
                    row_count,
                } => match (&self.context.select, rewrite_limit) {
                    (Some(select), true) => {
                        let revised = select.rewritten_row_count(*row_count, &self.parameters)?;
                        builder.append_literal(&revised.to_string());
                    }
                    _ => builder.append_literal(&self.sql[*start..*stop]),
                },
                SqlToken::Offset { start, stop, .. } => {
                    if rewrite_limit {
                        builder.append_literal("0");
                    } else {
                        builder.append_literal(&self.sql[*start..*stop]);
                    }
                }
                SqlToken::OrderBy { items, .. } => {
                    if rewrite_limit {
                        builder.append_literal(&order_by_clause(items));
                    }
                }
            }
            cursor = token.end();
        }
        builder.append_literal(&self.sql[cursor..]);

        let builder = builder.with_parameters(parameters);
        tracing::trace!("[REWRITE] {}", builder);
        Ok(builder)
    }

    /// Pagination parameters of a multi-target query: offsets become 0 and
    /// row counts are widened like literal row counts.
    fn rewritten_parameters(&self, rewrite_limit: bool) -> ShardResult<Vec<Value>> {
        let mut parameters = self.parameters.clone();
        let Some(select) = self.context.select.as_ref().filter(|_| rewrite_limit) else {
            return Ok(parameters);
        };
        let Some(pagination) = &select.pagination else {
            return Ok(parameters);
        };

        if let Some(PaginationValue::Parameter(index)) = pagination.offset {
            if let Some(slot) = parameters.get_mut(index) {
                *slot = Value::from(0);
            }
        }
        if let Some(row_count @ PaginationValue::Parameter(index)) = pagination.row_count {
            let original = row_count.resolve(&self.parameters)?;
            let revised = select.rewritten_row_count(original, &self.parameters)?;
            if let Some(slot) = parameters.get_mut(index) {
                *slot = Value::from(revised);
            }
        }
        Ok(parameters)
    }

    /// Render the executable SQL of one route unit.
    pub fn generate_sql(&self, unit: &RouteUnit, builder: &SqlBuilder) -> ShardResult<SqlUnit> {
        let actual_tables =
            BindingTableResolver::new(self.rule).actual_table_map(unit, &self.context.tables)?;
        let sql = builder.to_sql(unit, &actual_tables);
        tracing::trace!("[REWRITE] {}: {}", unit.data_source(), sql);
        Ok(SqlUnit {
            sql,
            parameters: builder.parameters().to_vec(),
        })
    }
}

fn order_by_clause(items: &[OrderByItem]) -> String {
    let columns: Vec<String> = items
        .iter()
        .map(|item| format!("{} {}", item.label, item.direction))
        .collect();
    format!(" ORDER BY {} ", columns.join(","))
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShardingConfig;
    use crate::sql::StatementKind;

    fn rule() -> ShardingRule {
        let config = ShardingConfig::from_toml_str(
            r#"
[[data_sources]]
name = "ds0"

[[tables]]
logic_table = "t_order"
actual_data_nodes = "ds0.t_order_${0..1}"
"#,
        )
        .unwrap();
        ShardingRule::new(&config).unwrap()
    }

    #[test]
    fn test_zero_tokens_returns_original_sql() {
        let rule = rule();
        let sql = "SELECT * FROM t_order WHERE order_id = ?";
        let context = StatementContext::with_kind(StatementKind::Select, vec!["t_order".to_string()]);
        let engine = SqlRewriteEngine::new(&rule, sql, &context, vec![], vec![Value::from(1)]).unwrap();
        let builder = engine.rewrite(true).unwrap();
        let unit = engine
            .generate_sql(&RouteUnit::new("ds0").with_table("t_order", "t_order_1"), &builder)
            .unwrap();
        assert_eq!(unit.sql, sql);
        assert_eq!(unit.parameters, vec![Value::from(1)]);
    }

    #[test]
    fn test_overlapping_tokens_rejected() {
        let rule = rule();
        let sql = "SELECT * FROM t_order";
        let context = StatementContext::with_kind(StatementKind::Select, vec![]);
        let tokens = vec![
            SqlToken::Table {
                start: 14,
                stop: 21,
                logic_table: "t_order".to_string(),
                quote: None,
            },
            SqlToken::Schema {
                start: 16,
                stop: 18,
                name: "x".to_string(),
            },
        ];
        assert!(matches!(
            SqlRewriteEngine::new(&rule, sql, &context, tokens, vec![]),
            Err(ShardError::ParseError(_))
        ));

        let out_of_range = vec![SqlToken::Offset {
            start: 20,
            stop: 40,
            offset: 1,
        }];
        assert!(SqlRewriteEngine::new(&rule, sql, &context, out_of_range, vec![]).is_err());
    }

    #[test]
    fn test_generated_key_parameters() {
        let rule = rule();
        let sql = "INSERT INTO t_order (status) VALUES (?), (?)";
        let context = StatementContext::with_kind(StatementKind::Insert, vec!["t_order".to_string()]);
        let tokens = vec![
            SqlToken::Items {
                start: 27,
                items: vec!["order_id".to_string()],
            },
            SqlToken::GeneratedKey {
                start: 38,
                parameterized: true,
                parameter_index: 1,
                value: Value::from(100),
            },
            SqlToken::GeneratedKey {
                start: 43,
                parameterized: true,
                parameter_index: 2,
                value: Value::from(101),
            },
        ];
        let parameters = vec![Value::from("a"), Value::from("b")];
        let engine = SqlRewriteEngine::new(&rule, sql, &context, tokens, parameters).unwrap();
        let builder = engine.rewrite(false).unwrap();
        assert_eq!(
            builder.to_string(),
            "INSERT INTO t_order (status, order_id) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(
            builder.parameters(),
            &[Value::from("a"), Value::from(100), Value::from("b"), Value::from(101)]
        );
    }
}

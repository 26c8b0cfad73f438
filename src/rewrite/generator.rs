//! Derives the rewrite tokens of a parsed statement.

use super::keygen::{KeyGenerator, SnowflakeKeyGenerator};
use super::token::SqlToken;
use crate::error::ShardResult;
use crate::sharding::ShardingRule;
use crate::sql::parser::{InsertStatement, LimitValueSegment, SelectStatement, TableSegment};
use crate::sql::{PaginationValue, SelectStatementContext, SqlStatement, StatementContext};

pub struct SqlTokenGenerator<'a> {
    rule: &'a ShardingRule,
    key_generator: &'a dyn KeyGenerator,
}

impl<'a> SqlTokenGenerator<'a> {
    /// Generator using the process-wide snowflake key generator.
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self {
            rule,
            key_generator: SnowflakeKeyGenerator::shared(),
        }
    }

    pub fn with_key_generator(mut self, key_generator: &'a dyn KeyGenerator) -> Self {
        self.key_generator = key_generator;
        self
    }

    pub fn generate(&self, statement: &SqlStatement, context: &StatementContext) -> ShardResult<Vec<SqlToken>> {
        let mut tokens = Vec::new();
        self.table_tokens(statement, &mut tokens);

        match statement {
            SqlStatement::Select(select) => {
                if let Some(select_context) = &context.select {
                    select_tokens(select, select_context, &mut tokens);
                }
            }
            SqlStatement::Insert(insert) => self.insert_tokens(insert, &mut tokens),
            SqlStatement::Ddl(ddl) => {
                if let Some(index) = &ddl.index {
                    tokens.push(SqlToken::Index {
                        start: index.start,
                        stop: index.stop,
                        index_name: index.name.clone(),
                        logic_table: ddl.tables.first().map(|table| table.name.clone()),
                    });
                }
            }
            SqlStatement::Dal(dal) => {
                if let Some(schema) = &dal.schema {
                    tokens.push(SqlToken::Schema {
                        start: schema.start,
                        stop: schema.stop,
                        name: schema.name.clone(),
                    });
                }
            }
            SqlStatement::Update(_) | SqlStatement::Delete(_) | SqlStatement::Dcl(_) => {}
        }

        tokens.sort_by_key(SqlToken::start);
        tracing::debug!("[REWRITE] Generated {} tokens", tokens.len());
        Ok(tokens)
    }

    fn is_routed_table(&self, name: &str) -> bool {
        self.rule.is_sharding_table(name) || self.rule.is_broadcast_table(name)
    }

    /// Table references and `table.column` owners naming a routed table.
    fn table_tokens(&self, statement: &SqlStatement, tokens: &mut Vec<SqlToken>) {
        let tables = statement.tables();
        for table in tables.iter().filter(|table| self.is_routed_table(&table.name)) {
            tokens.push(table_token(table));
        }

        for owner in statement.owners() {
            if is_alias(tables, &owner.name) || !self.is_routed_table(&owner.name) {
                continue;
            }
            tokens.push(SqlToken::Table {
                start: owner.start,
                stop: owner.stop,
                logic_table: owner.name.clone(),
                quote: owner.quote,
            });
        }
    }

    /// Add the generated key column and one key per VALUES row when the
    /// statement omits the table's key generate column. Once a placeholder
    /// appears, keys are bound as parameters.
    fn insert_tokens(&self, insert: &InsertStatement, tokens: &mut Vec<SqlToken>) {
        let Some(column) = self.rule.key_generate_column(&insert.table.name) else {
            return;
        };
        if insert
            .columns
            .iter()
            .any(|existing| existing.eq_ignore_ascii_case(column))
        {
            return;
        }
        let Some(columns_stop) = insert.columns_stop else {
            return;
        };

        tokens.push(SqlToken::Items {
            start: columns_stop,
            items: vec![column.to_string()],
        });
        for values in &insert.values {
            tokens.push(SqlToken::GeneratedKey {
                start: values.stop,
                parameterized: values.parameters_before > 0,
                parameter_index: values.parameters_before,
                value: self.key_generator.generate_key(),
            });
        }
    }
}

fn table_token(table: &TableSegment) -> SqlToken {
    SqlToken::Table {
        start: table.start,
        stop: table.stop,
        logic_table: table.name.clone(),
        quote: table.quote,
    }
}

fn is_alias(tables: &[TableSegment], name: &str) -> bool {
    tables.iter().any(|table| {
        table
            .alias
            .as_deref()
            .is_some_and(|alias| alias.eq_ignore_ascii_case(name))
    })
}

fn select_tokens(select: &SelectStatement, context: &SelectStatementContext, tokens: &mut Vec<SqlToken>) {
    let items = context.derived_items();
    if !items.is_empty() && !select.projections.is_empty() {
        tokens.push(SqlToken::Items {
            start: select.projections_stop(),
            items,
        });
    }

    if context.generated_order_by {
        if let Some(start) = select.group_by_stop() {
            tokens.push(SqlToken::OrderBy {
                start,
                items: context.order_by.clone(),
            });
        }
    }

    if let Some(limit) = &select.limit {
        if let Some((segment, offset)) = literal(limit.offset.as_ref()) {
            tokens.push(SqlToken::Offset {
                start: segment.start,
                stop: segment.stop,
                offset,
            });
        }
        if let Some((segment, row_count)) = literal(limit.row_count.as_ref()) {
            tokens.push(SqlToken::RowCount {
                start: segment.start,
                stop: segment.stop,
                row_count,
            });
        }
    }
}

fn literal(segment: Option<&LimitValueSegment>) -> Option<(&LimitValueSegment, u64)> {
    match segment {
        Some(segment @ LimitValueSegment {
            value: PaginationValue::Literal(value),
            ..
        }) => Some((segment, *value)),
        _ => None,
    }
}

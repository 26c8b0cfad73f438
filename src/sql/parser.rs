use super::context::{AggregationType, NullsOrder, OrderDirection, PaginationValue};
use super::lexer::{SpannedToken, SqlLexer, Token};
use crate::error::{ShardError, ShardResult};

/// Clause-level SQL syntax tree.
///
/// Only the parts the sharding pipeline needs are modelled: table
/// references, qualified column owners, projections, GROUP BY / ORDER BY
/// items, LIMIT, INSERT column and VALUES lists, and index names. Every
/// segment keeps its byte span in the original SQL text; `stop` is exclusive.

#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(DmlStatement),
    Delete(DmlStatement),
    Ddl(DdlStatement),
    Dal(DalStatement),
    Dcl(DclStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableSegment {
    pub name: String,
    pub quote: Option<char>,
    /// Schema qualifier, as in `db.t_order`.
    pub owner: Option<String>,
    pub alias: Option<String>,
    /// Start of the reference including a schema qualifier.
    pub start: usize,
    pub stop: usize,
}

/// Table qualifier of a column reference, as `t_order` in `t_order.id`.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerSegment {
    pub name: String,
    pub quote: Option<char>,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSegment {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSegment {
    pub name: String,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub projections: Vec<ProjectionSegment>,
    pub tables: Vec<TableSegment>,
    pub owners: Vec<OwnerSegment>,
    pub group_by: Vec<OrderByItemSegment>,
    pub having: bool,
    pub order_by: Vec<OrderByItemSegment>,
    pub limit: Option<LimitSegment>,
}

impl SelectStatement {
    /// End of the projection list, where derived columns are appended.
    pub fn projections_stop(&self) -> usize {
        self.projections.last().map(|p| p.stop).unwrap_or(0)
    }

    /// End of the GROUP BY clause, where a generated ORDER BY is inserted.
    pub fn group_by_stop(&self) -> Option<usize> {
        self.group_by.last().map(|item| item.stop)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSegment {
    pub kind: ProjectionKind,
    /// Expression text without the alias.
    pub text: String,
    pub alias: Option<String>,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionKind {
    Shorthand {
        owner: Option<String>,
    },
    Column {
        owner: Option<String>,
        name: String,
    },
    Aggregation {
        kind: AggregationType,
        distinct: bool,
        inner: String,
        separator: Option<String>,
    },
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItemSegment {
    pub column: OrderByColumn,
    pub text: String,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByColumn {
    Column { owner: Option<String>, name: String },
    /// 1-based position in the select list.
    Index(usize),
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitSegment {
    pub offset: Option<LimitValueSegment>,
    pub row_count: Option<LimitValueSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitValueSegment {
    pub value: PaginationValue,
    pub start: usize,
    pub stop: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableSegment,
    pub columns: Vec<String>,
    /// Position of the closing parenthesis of the column list.
    pub columns_stop: Option<usize>,
    pub values: Vec<InsertValuesSegment>,
    pub owners: Vec<OwnerSegment>,
}

/// One parenthesised row of a VALUES clause.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValuesSegment {
    /// Position of the closing parenthesis.
    pub stop: usize,
    /// Number of bind parameters in the statement before `stop`.
    pub parameters_before: usize,
    pub parameter_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DmlStatement {
    pub tables: Vec<TableSegment>,
    pub owners: Vec<OwnerSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlKind {
    CreateTable,
    AlterTable,
    DropTable,
    TruncateTable,
    CreateIndex,
    DropIndex,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DdlStatement {
    pub kind: DdlKind,
    pub tables: Vec<TableSegment>,
    pub index: Option<IndexSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DalKind {
    Show,
    Describe,
    Set,
    Use,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DalStatement {
    pub kind: DalKind,
    pub tables: Vec<TableSegment>,
    pub schema: Option<SchemaSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DclKind {
    Grant,
    Revoke,
    CreateUser,
    AlterUser,
    DropUser,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DclStatement {
    pub kind: DclKind,
}

impl SqlStatement {
    pub fn tables(&self) -> &[TableSegment] {
        match self {
            SqlStatement::Select(select) => &select.tables,
            SqlStatement::Insert(insert) => std::slice::from_ref(&insert.table),
            SqlStatement::Update(dml) | SqlStatement::Delete(dml) => &dml.tables,
            SqlStatement::Ddl(ddl) => &ddl.tables,
            SqlStatement::Dal(dal) => &dal.tables,
            SqlStatement::Dcl(_) => &[],
        }
    }

    pub fn owners(&self) -> &[OwnerSegment] {
        match self {
            SqlStatement::Select(select) => &select.owners,
            SqlStatement::Insert(insert) => &insert.owners,
            SqlStatement::Update(dml) | SqlStatement::Delete(dml) => &dml.owners,
            SqlStatement::Ddl(_) | SqlStatement::Dal(_) | SqlStatement::Dcl(_) => &[],
        }
    }
}

/// Parse one SQL statement.
pub fn parse(sql: &str) -> ShardResult<SqlStatement> {
    SqlParser::new(sql)?.parse()
}

pub struct SqlParser<'a> {
    sql: &'a str,
    tokens: Vec<SpannedToken>,
    parameter_ordinals: Vec<Option<usize>>,
    eof: SpannedToken,
    position: usize,
}

impl<'a> SqlParser<'a> {
    pub fn new(sql: &'a str) -> ShardResult<Self> {
        let tokens = SqlLexer::new(sql).tokenize()?;

        let mut next_ordinal = 0;
        let parameter_ordinals = tokens
            .iter()
            .map(|spanned| match spanned.token {
                Token::Placeholder(_) => {
                    next_ordinal += 1;
                    Some(next_ordinal - 1)
                }
                _ => None,
            })
            .collect();

        Ok(Self {
            sql,
            tokens,
            parameter_ordinals,
            eof: SpannedToken {
                token: Token::Eof,
                start: sql.len(),
                stop: sql.len(),
            },
            position: 0,
        })
    }

    fn spanned_at(&self, position: usize) -> &SpannedToken {
        self.tokens.get(position).unwrap_or(&self.eof)
    }

    fn current(&self) -> &SpannedToken {
        self.spanned_at(self.position)
    }

    fn current_token(&self) -> &Token {
        &self.current().token
    }

    fn peek_token(&self, offset: usize) -> &Token {
        &self.spanned_at(self.position + offset).token
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    fn expect(&mut self, expected: Token) -> ShardResult<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(ShardError::ParseError(format!(
                "Expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    /// Non-keyword word such as `USER` or `COLUMNS`.
    fn is_word(&self, word: &str) -> bool {
        matches!(self.current_token(), Token::Identifier(name) if name.eq_ignore_ascii_case(word))
    }

    fn text(&self, start: usize, stop: usize) -> String {
        self.sql.get(start..stop).unwrap_or_default().to_string()
    }

    fn stop_of_previous(&self) -> usize {
        self.position
            .checked_sub(1)
            .map(|previous| self.spanned_at(previous).stop)
            .unwrap_or(0)
    }

    fn parameters_in(&self, from: usize, to: usize) -> usize {
        self.parameter_ordinals
            .get(from..to)
            .map(|ordinals| ordinals.iter().filter(|o| o.is_some()).count())
            .unwrap_or(0)
    }

    pub fn parse(&mut self) -> ShardResult<SqlStatement> {
        let stmt = match self.current_token() {
            Token::Select => SqlStatement::Select(self.parse_select()?),
            Token::Insert => SqlStatement::Insert(self.parse_insert()?),
            Token::Update => SqlStatement::Update(self.parse_update()?),
            Token::Delete => SqlStatement::Delete(self.parse_delete()?),
            Token::Create => self.parse_create()?,
            Token::Alter => self.parse_alter()?,
            Token::Drop => self.parse_drop()?,
            Token::Truncate => SqlStatement::Ddl(self.parse_truncate()?),
            Token::Show => SqlStatement::Dal(self.parse_show()?),
            Token::Desc | Token::Describe => SqlStatement::Dal(self.parse_describe()?),
            Token::Set => {
                self.skip_rest(&mut Vec::new());
                SqlStatement::Dal(DalStatement {
                    kind: DalKind::Set,
                    tables: Vec::new(),
                    schema: None,
                })
            }
            Token::Use => {
                self.advance();
                let schema = self.parse_schema_segment()?;
                SqlStatement::Dal(DalStatement {
                    kind: DalKind::Use,
                    tables: Vec::new(),
                    schema: Some(schema),
                })
            }
            Token::Grant | Token::Revoke => {
                let kind = if *self.current_token() == Token::Grant {
                    DclKind::Grant
                } else {
                    DclKind::Revoke
                };
                self.skip_rest(&mut Vec::new());
                SqlStatement::Dcl(DclStatement { kind })
            }
            other => {
                return Err(ShardError::ParseError(format!(
                    "Unexpected token at start of statement: {:?}",
                    other
                )));
            }
        };

        // Optional semicolon at end
        if *self.current_token() == Token::Semicolon {
            self.advance();
        }

        if *self.current_token() != Token::Eof {
            return Err(ShardError::ParseError(format!(
                "Unexpected token after statement: {:?}",
                self.current_token()
            )));
        }

        Ok(stmt)
    }

    fn parse_select(&mut self) -> ShardResult<SelectStatement> {
        self.expect(Token::Select)?;

        let distinct = if *self.current_token() == Token::Distinct {
            self.advance();
            true
        } else {
            false
        };

        let mut owners = Vec::new();
        let mut projections = vec![self.parse_projection(&mut owners)?];
        while *self.current_token() == Token::Comma {
            self.advance();
            projections.push(self.parse_projection(&mut owners)?);
        }

        let mut tables = Vec::new();
        if *self.current_token() == Token::From {
            self.advance();
            self.parse_table_references(&mut tables, &mut owners)?;
        }

        if *self.current_token() == Token::Where {
            self.advance();
            self.skip_expression(&mut owners, &[]);
        }

        let group_by = if *self.current_token() == Token::Group {
            self.advance();
            self.expect(Token::By)?;
            self.parse_order_by_items(&mut owners)?
        } else {
            Vec::new()
        };

        let having = if *self.current_token() == Token::Having {
            self.advance();
            self.skip_expression(&mut owners, &[]);
            true
        } else {
            false
        };

        let order_by = if *self.current_token() == Token::Order {
            self.advance();
            self.expect(Token::By)?;
            self.parse_order_by_items(&mut owners)?
        } else {
            Vec::new()
        };

        let limit = self.parse_limit()?;

        Ok(SelectStatement {
            distinct,
            projections,
            tables,
            owners,
            group_by,
            having,
            order_by,
            limit,
        })
    }

    fn parse_projection(&mut self, owners: &mut Vec<OwnerSegment>) -> ShardResult<ProjectionSegment> {
        let first = self.position;
        let mut depth = 0usize;
        loop {
            match self.current_token() {
                Token::Eof => break,
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Token::Comma
                | Token::From
                | Token::Where
                | Token::Group
                | Token::Order
                | Token::Limit
                | Token::Semicolon
                    if depth == 0 =>
                {
                    break
                }
                _ => {}
            }
            self.advance();
        }
        let last = self.position;
        if first == last {
            return Err(ShardError::ParseError(format!(
                "Expected projection, found {:?}",
                self.current_token()
            )));
        }

        self.collect_owners(first, last, owners);
        let (expression_end, alias) = self.split_alias(first, last);
        let start = self.spanned_at(first).start;
        let expression_stop = self.spanned_at(expression_end - 1).stop;
        let kind = self.classify_projection(first, expression_end)?;

        Ok(ProjectionSegment {
            kind,
            text: self.text(start, expression_stop),
            alias,
            start,
            stop: self.spanned_at(last - 1).stop,
        })
    }

    fn split_alias(&self, first: usize, last: usize) -> (usize, Option<String>) {
        if last - first >= 2 {
            let alias = &self.spanned_at(last - 1).token;
            let before = &self.spanned_at(last - 2).token;
            if matches!(alias, Token::Identifier(_) | Token::QuotedIdentifier { .. }) {
                let name = alias.identifier_name().map(str::to_string);
                if *before == Token::As && last - first >= 3 {
                    return (last - 2, name);
                }
                if matches!(
                    before,
                    Token::Identifier(_)
                        | Token::QuotedIdentifier { .. }
                        | Token::RightParen
                        | Token::Integer(_)
                        | Token::Float(_)
                        | Token::String(_)
                ) {
                    return (last - 1, name);
                }
            }
        }
        (last, None)
    }

    fn classify_projection(&self, first: usize, last: usize) -> ShardResult<ProjectionKind> {
        let tokens: Vec<&Token> = (first..last).map(|i| &self.spanned_at(i).token).collect();

        let kind = match tokens.as_slice() {
            [Token::Star] => ProjectionKind::Shorthand { owner: None },
            [owner, Token::Dot, Token::Star] if owner.identifier_name().is_some() => {
                ProjectionKind::Shorthand {
                    owner: owner.identifier_name().map(str::to_string),
                }
            }
            [name] if name.identifier_name().is_some() => ProjectionKind::Column {
                owner: None,
                name: name.identifier_name().unwrap_or_default().to_string(),
            },
            [owner, Token::Dot, name]
                if owner.identifier_name().is_some() && name.identifier_name().is_some() =>
            {
                ProjectionKind::Column {
                    owner: owner.identifier_name().map(str::to_string),
                    name: name.identifier_name().unwrap_or_default().to_string(),
                }
            }
            [Token::Identifier(function), Token::LeftParen, .., Token::RightParen]
                if AggregationType::from_name(function).is_some()
                    && self.matching_paren(first + 1) == Some(last - 1) =>
            {
                self.parse_aggregation(function, first + 2, last - 1)?
            }
            _ => ProjectionKind::Expression,
        };
        Ok(kind)
    }

    /// `first..last` is the token range between the parentheses.
    fn parse_aggregation(&self, function: &str, first: usize, last: usize) -> ShardResult<ProjectionKind> {
        let kind = AggregationType::from_name(function).ok_or_else(|| {
            ShardError::ParseError(format!("Unknown aggregation function: {}", function))
        })?;

        let mut inner_first = first;
        let distinct = self.spanned_at(first).token == Token::Distinct;
        if distinct {
            inner_first += 1;
        }

        let mut inner_last = last;
        let mut separator = None;
        for i in inner_first..last {
            if matches!(&self.spanned_at(i).token, Token::Identifier(word) if word.eq_ignore_ascii_case("SEPARATOR"))
            {
                if let Token::String(value) = &self.spanned_at(i + 1).token {
                    separator = Some(value.clone());
                    inner_last = i;
                    break;
                }
            }
        }

        if inner_first >= inner_last {
            return Err(ShardError::ParseError(format!(
                "Missing argument for {}",
                function
            )));
        }

        Ok(ProjectionKind::Aggregation {
            kind,
            distinct,
            inner: self.text(
                self.spanned_at(inner_first).start,
                self.spanned_at(inner_last - 1).stop,
            ),
            separator,
        })
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, spanned) in self.tokens.iter().enumerate().skip(open) {
            match spanned.token {
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn collect_owners(&self, first: usize, last: usize, owners: &mut Vec<OwnerSegment>) {
        for i in first..last {
            let spanned = self.spanned_at(i);
            let Some(name) = spanned.token.identifier_name() else {
                continue;
            };
            if i + 2 < last
                && self.spanned_at(i + 1).token == Token::Dot
                && (self.spanned_at(i + 2).token.identifier_name().is_some()
                    || self.spanned_at(i + 2).token == Token::Star)
            {
                owners.push(OwnerSegment {
                    name: name.to_string(),
                    quote: spanned.token.quote(),
                    start: spanned.start,
                    stop: spanned.stop,
                });
            }
        }
    }

    /// Skip a condition expression, stopping at the next clause keyword or an
    /// unbalanced closing parenthesis.
    fn skip_expression(&mut self, owners: &mut Vec<OwnerSegment>, extra_stops: &[Token]) {
        let first = self.position;
        let mut depth = 0usize;
        loop {
            let token = self.current_token();
            match token {
                Token::Eof => break,
                Token::LeftParen => depth += 1,
                Token::RightParen => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                Token::Where
                | Token::Group
                | Token::Having
                | Token::Order
                | Token::Limit
                | Token::Offset
                | Token::Semicolon
                    if depth == 0 =>
                {
                    break
                }
                _ if depth == 0 && extra_stops.contains(token) => break,
                _ => {}
            }
            self.advance();
        }
        let last = self.position;
        self.collect_owners(first, last, owners);
    }

    fn skip_rest(&mut self, owners: &mut Vec<OwnerSegment>) {
        let first = self.position;
        while !matches!(self.current_token(), Token::Eof | Token::Semicolon) {
            self.advance();
        }
        let last = self.position;
        self.collect_owners(first, last, owners);
    }

    fn parse_table_references(
        &mut self,
        tables: &mut Vec<TableSegment>,
        owners: &mut Vec<OwnerSegment>,
    ) -> ShardResult<()> {
        tables.push(self.parse_table_segment(true)?);
        loop {
            match self.current_token() {
                Token::Comma => {
                    self.advance();
                    tables.push(self.parse_table_segment(true)?);
                }
                Token::Join | Token::Left | Token::Right | Token::Inner | Token::Cross => {
                    while matches!(
                        self.current_token(),
                        Token::Left | Token::Right | Token::Inner | Token::Cross | Token::Outer
                    ) {
                        self.advance();
                    }
                    self.expect(Token::Join)?;
                    tables.push(self.parse_table_segment(true)?);
                    if *self.current_token() == Token::On {
                        self.advance();
                        self.skip_expression(
                            owners,
                            &[
                                Token::Comma,
                                Token::Join,
                                Token::Left,
                                Token::Right,
                                Token::Inner,
                                Token::Cross,
                            ],
                        );
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn parse_table_segment(&mut self, with_alias: bool) -> ShardResult<TableSegment> {
        if *self.current_token() == Token::LeftParen {
            return Err(ShardError::OperationNotSupported(
                "subquery as table reference".to_string(),
            ));
        }

        let first = self.current().clone();
        let first_name = first
            .token
            .identifier_name()
            .ok_or_else(|| {
                ShardError::ParseError(format!("Expected table name, found {:?}", first.token))
            })?
            .to_string();
        self.advance();

        let segment = if *self.current_token() == Token::Dot
            && self.peek_token(1).identifier_name().is_some()
        {
            self.advance();
            let second = self.current().clone();
            self.advance();
            TableSegment {
                name: second.token.identifier_name().unwrap_or_default().to_string(),
                quote: second.token.quote(),
                owner: Some(first_name),
                alias: None,
                start: first.start,
                stop: second.stop,
            }
        } else {
            TableSegment {
                name: first_name,
                quote: first.token.quote(),
                owner: None,
                alias: None,
                start: first.start,
                stop: first.stop,
            }
        };

        let alias = if with_alias { self.parse_alias()? } else { None };
        Ok(TableSegment { alias, ..segment })
    }

    fn parse_alias(&mut self) -> ShardResult<Option<String>> {
        if *self.current_token() == Token::As {
            self.advance();
            let name = self
                .current_token()
                .identifier_name()
                .map(str::to_string)
                .ok_or_else(|| {
                    ShardError::ParseError(format!(
                        "Expected alias after AS, found {:?}",
                        self.current_token()
                    ))
                })?;
            self.advance();
            return Ok(Some(name));
        }
        match self.current_token() {
            Token::Identifier(name) | Token::QuotedIdentifier { name, .. } => {
                let name = name.clone();
                self.advance();
                Ok(Some(name))
            }
            _ => Ok(None),
        }
    }

    fn parse_order_by_items(&mut self, owners: &mut Vec<OwnerSegment>) -> ShardResult<Vec<OrderByItemSegment>> {
        let mut items = Vec::new();
        loop {
            let first = self.position;
            let mut depth = 0usize;
            loop {
                match self.current_token() {
                    Token::Eof => break,
                    Token::LeftParen => depth += 1,
                    Token::RightParen => {
                        if depth == 0 {
                            break;
                        }
                        depth -= 1;
                    }
                    Token::Comma
                    | Token::Asc
                    | Token::Desc
                    | Token::Nulls
                    | Token::Having
                    | Token::Order
                    | Token::Limit
                    | Token::Offset
                    | Token::Semicolon
                        if depth == 0 =>
                    {
                        break
                    }
                    _ => {}
                }
                self.advance();
            }
            let last = self.position;
            if first == last {
                return Err(ShardError::ParseError(format!(
                    "Expected ORDER BY item, found {:?}",
                    self.current_token()
                )));
            }
            self.collect_owners(first, last, owners);

            let tokens: Vec<&Token> = (first..last).map(|i| &self.spanned_at(i).token).collect();
            let column = match tokens.as_slice() {
                [Token::Integer(index)] if *index >= 1 => OrderByColumn::Index(*index as usize),
                [Token::Integer(index)] => {
                    return Err(ShardError::ParseError(format!(
                        "Invalid ORDER BY position: {}",
                        index
                    )));
                }
                [name] if name.identifier_name().is_some() => OrderByColumn::Column {
                    owner: None,
                    name: name.identifier_name().unwrap_or_default().to_string(),
                },
                [owner, Token::Dot, name]
                    if owner.identifier_name().is_some() && name.identifier_name().is_some() =>
                {
                    OrderByColumn::Column {
                        owner: owner.identifier_name().map(str::to_string),
                        name: name.identifier_name().unwrap_or_default().to_string(),
                    }
                }
                _ => OrderByColumn::Expression,
            };

            let start = self.spanned_at(first).start;
            let text = self.text(start, self.spanned_at(last - 1).stop);

            let direction = match self.current_token() {
                Token::Asc => {
                    self.advance();
                    OrderDirection::Asc
                }
                Token::Desc => {
                    self.advance();
                    OrderDirection::Desc
                }
                _ => OrderDirection::Asc,
            };

            let nulls = if *self.current_token() == Token::Nulls {
                self.advance();
                let nulls = match self.current_token() {
                    Token::First => NullsOrder::First,
                    Token::Last => NullsOrder::Last,
                    other => {
                        return Err(ShardError::ParseError(format!(
                            "Expected FIRST or LAST after NULLS, found {:?}",
                            other
                        )));
                    }
                };
                self.advance();
                Some(nulls)
            } else {
                None
            };

            items.push(OrderByItemSegment {
                column,
                text,
                direction,
                nulls,
                start,
                stop: self.stop_of_previous(),
            });

            if *self.current_token() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(items)
    }

    fn parse_limit(&mut self) -> ShardResult<Option<LimitSegment>> {
        let limit = match self.current_token() {
            Token::Limit => {
                self.advance();
                let first = self.parse_limit_value()?;
                match self.current_token() {
                    Token::Comma => {
                        self.advance();
                        let row_count = self.parse_limit_value()?;
                        LimitSegment {
                            offset: Some(first),
                            row_count: Some(row_count),
                        }
                    }
                    Token::Offset => {
                        self.advance();
                        let offset = self.parse_limit_value()?;
                        LimitSegment {
                            offset: Some(offset),
                            row_count: Some(first),
                        }
                    }
                    _ => LimitSegment {
                        offset: None,
                        row_count: Some(first),
                    },
                }
            }
            Token::Offset => {
                self.advance();
                let offset = self.parse_limit_value()?;
                let row_count = if *self.current_token() == Token::Limit {
                    self.advance();
                    Some(self.parse_limit_value()?)
                } else {
                    None
                };
                LimitSegment {
                    offset: Some(offset),
                    row_count,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(limit))
    }

    fn parse_limit_value(&mut self) -> ShardResult<LimitValueSegment> {
        let spanned = self.current().clone();
        let value = match &spanned.token {
            Token::Integer(n) if *n >= 0 => PaginationValue::Literal(*n as u64),
            Token::Placeholder(_) => {
                let ordinal = self
                    .parameter_ordinals
                    .get(self.position)
                    .copied()
                    .flatten()
                    .ok_or_else(|| ShardError::ParseError("Unindexed placeholder".to_string()))?;
                PaginationValue::Parameter(ordinal)
            }
            other => {
                return Err(ShardError::ParseError(format!(
                    "Expected integer or placeholder in LIMIT, found {:?}",
                    other
                )));
            }
        };
        self.advance();
        Ok(LimitValueSegment {
            value,
            start: spanned.start,
            stop: spanned.stop,
        })
    }

    fn parse_insert(&mut self) -> ShardResult<InsertStatement> {
        self.expect(Token::Insert)?;
        if *self.current_token() == Token::Into {
            self.advance();
        }
        let table = self.parse_table_segment(false)?;

        let mut columns = Vec::new();
        let mut columns_stop = None;
        if *self.current_token() == Token::LeftParen {
            self.advance();
            loop {
                let name = self
                    .current_token()
                    .identifier_name()
                    .map(str::to_string)
                    .ok_or_else(|| {
                        ShardError::ParseError(format!(
                            "Expected column name, found {:?}",
                            self.current_token()
                        ))
                    })?;
                columns.push(name);
                self.advance();
                if *self.current_token() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            columns_stop = Some(self.current().start);
            self.expect(Token::RightParen)?;
        }

        let mut values = Vec::new();
        if *self.current_token() == Token::Values {
            self.advance();
            loop {
                if *self.current_token() != Token::LeftParen {
                    return Err(ShardError::ParseError(format!(
                        "Expected ( in VALUES, found {:?}",
                        self.current_token()
                    )));
                }
                let open = self.position;
                let close = self
                    .matching_paren(open)
                    .ok_or_else(|| ShardError::ParseError("Unbalanced VALUES list".to_string()))?;
                values.push(InsertValuesSegment {
                    stop: self.spanned_at(close).start,
                    parameters_before: self.parameters_in(0, close),
                    parameter_count: self.parameters_in(open, close),
                });
                self.position = close + 1;
                if *self.current_token() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        let mut owners = Vec::new();
        self.skip_rest(&mut owners);

        Ok(InsertStatement {
            table,
            columns,
            columns_stop,
            values,
            owners,
        })
    }

    fn parse_update(&mut self) -> ShardResult<DmlStatement> {
        self.expect(Token::Update)?;
        let table = self.parse_table_segment(true)?;
        let mut owners = Vec::new();
        self.skip_rest(&mut owners);
        Ok(DmlStatement {
            tables: vec![table],
            owners,
        })
    }

    fn parse_delete(&mut self) -> ShardResult<DmlStatement> {
        self.expect(Token::Delete)?;
        if *self.current_token() == Token::From {
            self.advance();
        }
        let table = self.parse_table_segment(true)?;
        let mut owners = Vec::new();
        self.skip_rest(&mut owners);
        Ok(DmlStatement {
            tables: vec![table],
            owners,
        })
    }

    fn skip_if_exists(&mut self) {
        if *self.current_token() == Token::If {
            self.advance();
            if *self.current_token() == Token::Not {
                self.advance();
            }
            if *self.current_token() == Token::Exists {
                self.advance();
            }
        }
    }

    fn parse_index_segment(&mut self) -> ShardResult<IndexSegment> {
        let spanned = self.current().clone();
        let name = spanned
            .token
            .identifier_name()
            .ok_or_else(|| {
                ShardError::ParseError(format!("Expected index name, found {:?}", spanned.token))
            })?
            .to_string();
        self.advance();
        Ok(IndexSegment {
            name,
            start: spanned.start,
            stop: spanned.stop,
        })
    }

    fn parse_schema_segment(&mut self) -> ShardResult<SchemaSegment> {
        let spanned = self.current().clone();
        let name = spanned
            .token
            .identifier_name()
            .ok_or_else(|| {
                ShardError::ParseError(format!("Expected schema name, found {:?}", spanned.token))
            })?
            .to_string();
        self.advance();
        Ok(SchemaSegment {
            name,
            start: spanned.start,
            stop: spanned.stop,
        })
    }

    fn ddl(&mut self, kind: DdlKind, tables: Vec<TableSegment>, index: Option<IndexSegment>) -> SqlStatement {
        self.skip_rest(&mut Vec::new());
        SqlStatement::Ddl(DdlStatement { kind, tables, index })
    }

    fn dcl(&mut self, kind: DclKind) -> SqlStatement {
        self.skip_rest(&mut Vec::new());
        SqlStatement::Dcl(DclStatement { kind })
    }

    fn parse_create(&mut self) -> ShardResult<SqlStatement> {
        self.expect(Token::Create)?;
        match self.current_token() {
            Token::Table => {
                self.advance();
                self.skip_if_exists();
                let table = self.parse_table_segment(false)?;
                Ok(self.ddl(DdlKind::CreateTable, vec![table], None))
            }
            Token::Unique | Token::Index => {
                if *self.current_token() == Token::Unique {
                    self.advance();
                }
                self.expect(Token::Index)?;
                let index = self.parse_index_segment()?;
                self.expect(Token::On)?;
                let table = self.parse_table_segment(false)?;
                Ok(self.ddl(DdlKind::CreateIndex, vec![table], Some(index)))
            }
            _ if self.is_word("USER") || self.is_word("ROLE") => Ok(self.dcl(DclKind::CreateUser)),
            other => Err(ShardError::OperationNotSupported(format!("CREATE {:?}", other))),
        }
    }

    fn parse_alter(&mut self) -> ShardResult<SqlStatement> {
        self.expect(Token::Alter)?;
        match self.current_token() {
            Token::Table => {
                self.advance();
                let table = self.parse_table_segment(false)?;
                Ok(self.ddl(DdlKind::AlterTable, vec![table], None))
            }
            _ if self.is_word("USER") || self.is_word("ROLE") => Ok(self.dcl(DclKind::AlterUser)),
            other => Err(ShardError::OperationNotSupported(format!("ALTER {:?}", other))),
        }
    }

    fn parse_drop(&mut self) -> ShardResult<SqlStatement> {
        self.expect(Token::Drop)?;
        match self.current_token() {
            Token::Table => {
                self.advance();
                self.skip_if_exists();
                let mut tables = vec![self.parse_table_segment(false)?];
                while *self.current_token() == Token::Comma {
                    self.advance();
                    tables.push(self.parse_table_segment(false)?);
                }
                Ok(self.ddl(DdlKind::DropTable, tables, None))
            }
            Token::Index => {
                self.advance();
                self.skip_if_exists();
                let index = self.parse_index_segment()?;
                let mut tables = Vec::new();
                if *self.current_token() == Token::On {
                    self.advance();
                    tables.push(self.parse_table_segment(false)?);
                }
                Ok(self.ddl(DdlKind::DropIndex, tables, Some(index)))
            }
            _ if self.is_word("USER") || self.is_word("ROLE") => Ok(self.dcl(DclKind::DropUser)),
            other => Err(ShardError::OperationNotSupported(format!("DROP {:?}", other))),
        }
    }

    fn parse_truncate(&mut self) -> ShardResult<DdlStatement> {
        self.expect(Token::Truncate)?;
        if *self.current_token() == Token::Table {
            self.advance();
        }
        let table = self.parse_table_segment(false)?;
        self.skip_rest(&mut Vec::new());
        Ok(DdlStatement {
            kind: DdlKind::TruncateTable,
            tables: vec![table],
            index: None,
        })
    }

    fn parse_show(&mut self) -> ShardResult<DalStatement> {
        self.expect(Token::Show)?;
        let mut tables = Vec::new();
        let mut schema = None;

        if *self.current_token() == Token::Create && *self.peek_token(1) == Token::Table {
            self.advance();
            self.advance();
            tables.push(self.parse_table_segment(false)?);
        } else {
            if self.is_word("FULL") {
                self.advance();
            }
            let lists_table = self.is_word("COLUMNS")
                || self.is_word("FIELDS")
                || self.is_word("KEYS")
                || self.is_word("INDEXES")
                || *self.current_token() == Token::Index;
            if lists_table {
                self.advance();
                if matches!(self.current_token(), Token::From | Token::In) {
                    self.advance();
                    tables.push(self.parse_table_segment(false)?);
                }
            } else {
                while !matches!(
                    self.current_token(),
                    Token::From | Token::In | Token::Like | Token::Where | Token::Semicolon | Token::Eof
                ) {
                    self.advance();
                }
            }
            if matches!(self.current_token(), Token::From | Token::In) {
                self.advance();
                schema = Some(self.parse_schema_segment()?);
            }
        }

        self.skip_rest(&mut Vec::new());
        Ok(DalStatement {
            kind: DalKind::Show,
            tables,
            schema,
        })
    }

    fn parse_describe(&mut self) -> ShardResult<DalStatement> {
        self.advance(); // DESC or DESCRIBE
        let table = self.parse_table_segment(false)?;
        self.skip_rest(&mut Vec::new());
        Ok(DalStatement {
            kind: DalKind::Describe,
            tables: vec![table],
            schema: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(sql: &str) -> SelectStatement {
        match parse(sql).unwrap() {
            SqlStatement::Select(select) => select,
            other => panic!("Expected SELECT, got {:?}", other),
        }
    }

    #[test]
    fn test_select_tables_and_aliases() {
        let stmt = select("SELECT o.order_id FROM t_order o JOIN t_order_item AS i ON o.order_id = i.order_id");
        assert_eq!(stmt.tables.len(), 2);
        assert_eq!(stmt.tables[0].name, "t_order");
        assert_eq!(stmt.tables[0].alias.as_deref(), Some("o"));
        assert_eq!(stmt.tables[1].name, "t_order_item");
        assert_eq!(stmt.tables[1].alias.as_deref(), Some("i"));
        let owners: Vec<&str> = stmt.owners.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(owners, vec!["o", "o", "i"]);
    }

    #[test]
    fn test_table_span_includes_schema() {
        let sql = "SELECT * FROM sharding_db.`t_order`";
        let stmt = select(sql);
        let table = &stmt.tables[0];
        assert_eq!(table.owner.as_deref(), Some("sharding_db"));
        assert_eq!(table.quote, Some('`'));
        assert_eq!(&sql[table.start..table.stop], "sharding_db.`t_order`");
    }

    #[test]
    fn test_projections() {
        let sql = "SELECT x.id, x.name AS n, COUNT(*) cnt, AVG(DISTINCT x.age), x.* FROM t x";
        let stmt = select(sql);
        assert_eq!(stmt.projections.len(), 5);
        assert_eq!(
            stmt.projections[0].kind,
            ProjectionKind::Column {
                owner: Some("x".to_string()),
                name: "id".to_string()
            }
        );
        assert_eq!(stmt.projections[1].alias.as_deref(), Some("n"));
        assert_eq!(stmt.projections[2].text, "COUNT(*)");
        assert_eq!(stmt.projections[2].alias.as_deref(), Some("cnt"));
        assert_eq!(
            stmt.projections[3].kind,
            ProjectionKind::Aggregation {
                kind: AggregationType::Avg,
                distinct: true,
                inner: "x.age".to_string(),
                separator: None
            }
        );
        assert_eq!(
            stmt.projections[4].kind,
            ProjectionKind::Shorthand {
                owner: Some("x".to_string())
            }
        );
        assert_eq!(&sql[..stmt.projections_stop()], "SELECT x.id, x.name AS n, COUNT(*) cnt, AVG(DISTINCT x.age), x.*");
    }

    #[test]
    fn test_group_concat_separator() {
        let stmt = select("SELECT GROUP_CONCAT(name SEPARATOR '|') FROM t GROUP BY kind");
        assert_eq!(
            stmt.projections[0].kind,
            ProjectionKind::Aggregation {
                kind: AggregationType::GroupConcat,
                distinct: false,
                inner: "name".to_string(),
                separator: Some("|".to_string())
            }
        );
    }

    #[test]
    fn test_group_and_order_items() {
        let sql = "SELECT x.id, x.name FROM table_x x GROUP BY x.id, x.name DESC ORDER BY 2 DESC NULLS LAST";
        let stmt = select(sql);
        assert_eq!(stmt.group_by.len(), 2);
        assert_eq!(stmt.group_by[1].direction, OrderDirection::Desc);
        assert_eq!(stmt.group_by_stop(), Some(61));
        assert_eq!(stmt.order_by[0].column, OrderByColumn::Index(2));
        assert_eq!(stmt.order_by[0].nulls, Some(NullsOrder::Last));
    }

    #[test]
    fn test_limit_forms() {
        let sql = "SELECT id FROM t LIMIT 2, 10";
        let limit = select(sql).limit.unwrap();
        let offset = limit.offset.unwrap();
        assert_eq!(offset.value, PaginationValue::Literal(2));
        assert_eq!(&sql[offset.start..offset.stop], "2");
        assert_eq!(limit.row_count.unwrap().value, PaginationValue::Literal(10));

        let limit = select("SELECT id FROM t WHERE a = ? LIMIT ? OFFSET ?").limit.unwrap();
        assert_eq!(limit.row_count.unwrap().value, PaginationValue::Parameter(1));
        assert_eq!(limit.offset.unwrap().value, PaginationValue::Parameter(2));
    }

    #[test]
    fn test_insert() {
        let sql = "INSERT INTO t_order (user_id, status) VALUES (?, 'init'), (10, 'paid')";
        let stmt = match parse(sql).unwrap() {
            SqlStatement::Insert(insert) => insert,
            other => panic!("Expected INSERT, got {:?}", other),
        };
        assert_eq!(stmt.table.name, "t_order");
        assert_eq!(stmt.columns, vec!["user_id", "status"]);
        assert_eq!(stmt.columns_stop, Some(36));
        assert_eq!(stmt.values.len(), 2);
        assert_eq!(stmt.values[0].parameter_count, 1);
        assert_eq!(stmt.values[0].parameters_before, 1);
        assert_eq!(stmt.values[1].parameter_count, 0);
        assert_eq!(&sql[stmt.values[1].stop..], ")");
    }

    #[test]
    fn test_ddl() {
        match parse("CREATE INDEX idx_status ON t_order (status)").unwrap() {
            SqlStatement::Ddl(ddl) => {
                assert_eq!(ddl.kind, DdlKind::CreateIndex);
                assert_eq!(ddl.index.unwrap().name, "idx_status");
                assert_eq!(ddl.tables[0].name, "t_order");
            }
            other => panic!("Expected DDL, got {:?}", other),
        }

        match parse("DROP TABLE IF EXISTS t_order, t_order_item").unwrap() {
            SqlStatement::Ddl(ddl) => {
                assert_eq!(ddl.kind, DdlKind::DropTable);
                assert_eq!(ddl.tables.len(), 2);
            }
            other => panic!("Expected DDL, got {:?}", other),
        }

        match parse("DROP INDEX idx_status").unwrap() {
            SqlStatement::Ddl(ddl) => {
                assert_eq!(ddl.kind, DdlKind::DropIndex);
                assert!(ddl.tables.is_empty());
            }
            other => panic!("Expected DDL, got {:?}", other),
        }

        match parse("ALTER TABLE t_order ADD COLUMN remark VARCHAR(32)").unwrap() {
            SqlStatement::Ddl(ddl) => {
                assert_eq!(ddl.kind, DdlKind::AlterTable);
                assert_eq!(ddl.tables[0].alias, None);
            }
            other => panic!("Expected DDL, got {:?}", other),
        }
    }

    #[test]
    fn test_dal_and_dcl() {
        let sql = "SHOW COLUMNS FROM t_order FROM sharding_db";
        match parse(sql).unwrap() {
            SqlStatement::Dal(dal) => {
                assert_eq!(dal.kind, DalKind::Show);
                assert_eq!(dal.tables[0].name, "t_order");
                let schema = dal.schema.unwrap();
                assert_eq!(&sql[schema.start..schema.stop], "sharding_db");
            }
            other => panic!("Expected DAL, got {:?}", other),
        }

        match parse("SHOW TABLES").unwrap() {
            SqlStatement::Dal(dal) => assert!(dal.tables.is_empty()),
            other => panic!("Expected DAL, got {:?}", other),
        }

        assert!(matches!(
            parse("GRANT SELECT ON t_order TO shard_reader").unwrap(),
            SqlStatement::Dcl(DclStatement {
                kind: DclKind::Grant
            })
        ));
        assert!(matches!(
            parse("CREATE USER shard_admin").unwrap(),
            SqlStatement::Dcl(DclStatement {
                kind: DclKind::CreateUser
            })
        ));
    }

    #[test]
    fn test_unsupported_statements() {
        assert!(parse("EXPLAIN SELECT 1").is_err());
        assert!(parse("SELECT * FROM (SELECT 1) t").is_err());
    }
}

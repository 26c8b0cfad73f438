use crate::error::{ShardError, ShardResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // DML keywords
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Set,
    Delete,
    Distinct,

    // DDL / DAL / DCL keywords
    Create,
    Drop,
    Alter,
    Truncate,
    Table,
    Index,
    Unique,
    If,
    Exists,
    Show,
    Describe,
    Use,
    Grant,
    Revoke,

    // Clauses
    Order,
    By,
    Group,
    Having,
    Limit,
    Offset,
    As,

    // Joins
    Join,
    Left,
    Right,
    Inner,
    Outer,
    Cross,
    On,

    // Logical
    And,
    Or,
    Not,

    // Comparison
    Is,
    Null,
    Between,
    Like,
    In,

    // Boolean
    True,
    False,

    // Sort direction
    Asc,
    Desc,
    Nulls,
    First,
    Last,

    // Literals and identifiers
    Identifier(String),
    QuotedIdentifier { name: String, quote: char },
    Integer(i64),
    Float(f64),
    String(String),
    Placeholder(String), // ? or :name for bind parameters

    // Operators
    Equal,         // =
    NotEqual,      // != or <>
    LessThan,      // <
    LessThanEq,    // <=
    GreaterThan,   // >
    GreaterThanEq, // >=
    Plus,          // +
    Minus,         // -
    Star,          // *
    Slash,         // /
    Percent,       // %

    // Delimiters
    Comma,      // ,
    Dot,        // .
    LeftParen,  // (
    RightParen, // )
    Semicolon,  // ;

    // Special
    Eof,
}

impl Token {
    /// Name usable as an identifier, including keywords that are commonly
    /// used as column or table names (`first`, `last`, `index`...).
    pub fn identifier_name(&self) -> Option<&str> {
        match self {
            Token::Identifier(name) => Some(name),
            Token::QuotedIdentifier { name, .. } => Some(name),
            Token::First => Some("first"),
            Token::Last => Some("last"),
            Token::Nulls => Some("nulls"),
            Token::Index => Some("index"),
            Token::Unique => Some("unique"),
            _ => None,
        }
    }

    pub fn quote(&self) -> Option<char> {
        match self {
            Token::QuotedIdentifier { quote, .. } => Some(*quote),
            _ => None,
        }
    }
}

/// A token together with the byte range it occupies in the SQL text.
/// `stop` is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub start: usize,
    pub stop: usize,
}

pub struct SqlLexer {
    input: Vec<(usize, char)>,
    input_len: usize,
    position: usize,
    current_char: Option<char>,
}

impl SqlLexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<(usize, char)> = input.char_indices().collect();
        let current_char = chars.first().map(|(_, ch)| *ch);

        Self {
            input: chars,
            input_len: input.len(),
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).map(|(_, ch)| *ch);
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).map(|(_, ch)| *ch)
    }

    /// Byte offset of the current character.
    fn offset(&self) -> usize {
        self.input
            .get(self.position)
            .map(|(offset, _)| *offset)
            .unwrap_or(self.input_len)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        // Skip -- comments
        while let Some(ch) = self.current_char {
            if ch == '\n' {
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        // Skip /* */ comments
        self.advance(); // skip /
        self.advance(); // skip *
        while let Some(ch) = self.current_char {
            if ch == '*' && self.peek() == Some('/') {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn read_number(&mut self) -> ShardResult<Token> {
        let mut num_str = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot {
                // Decimal point only when a digit follows
                match self.peek() {
                    Some(next) if next.is_ascii_digit() => {
                        has_dot = true;
                        num_str.push(ch);
                        self.advance();
                    }
                    _ => break,
                }
            } else {
                break;
            }
        }

        if has_dot {
            num_str
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ShardError::ParseError(format!("Invalid float number: {}", num_str)))
        } else {
            num_str
                .parse::<i64>()
                .map(Token::Integer)
                .map_err(|_| ShardError::ParseError(format!("Invalid integer number: {}", num_str)))
        }
    }

    fn read_string(&mut self, quote: char) -> ShardResult<Token> {
        self.advance(); // Skip opening quote
        let mut string = String::new();

        while let Some(ch) = self.current_char {
            if ch == quote {
                // Doubled quote is an escaped quote
                if self.peek() == Some(quote) {
                    string.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance();
                    return Ok(Token::String(string));
                }
            } else if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    string.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        _ => escaped,
                    });
                    self.advance();
                }
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(ShardError::ParseError("Unterminated string".to_string()))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        // Keywords are case-insensitive
        match ident.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "FROM" => Token::From,
            "WHERE" => Token::Where,
            "INSERT" => Token::Insert,
            "INTO" => Token::Into,
            "VALUES" | "VALUE" => Token::Values,
            "UPDATE" => Token::Update,
            "SET" => Token::Set,
            "DELETE" => Token::Delete,
            "DISTINCT" => Token::Distinct,
            "CREATE" => Token::Create,
            "DROP" => Token::Drop,
            "ALTER" => Token::Alter,
            "TRUNCATE" => Token::Truncate,
            "TABLE" => Token::Table,
            "INDEX" => Token::Index,
            "UNIQUE" => Token::Unique,
            "IF" => Token::If,
            "EXISTS" => Token::Exists,
            "SHOW" => Token::Show,
            "DESCRIBE" => Token::Describe,
            "USE" => Token::Use,
            "GRANT" => Token::Grant,
            "REVOKE" => Token::Revoke,
            "ORDER" => Token::Order,
            "BY" => Token::By,
            "GROUP" => Token::Group,
            "HAVING" => Token::Having,
            "LIMIT" => Token::Limit,
            "OFFSET" => Token::Offset,
            "AS" => Token::As,
            "JOIN" => Token::Join,
            "LEFT" => Token::Left,
            "RIGHT" => Token::Right,
            "INNER" => Token::Inner,
            "OUTER" => Token::Outer,
            "CROSS" => Token::Cross,
            "ON" => Token::On,
            "AND" => Token::And,
            "OR" => Token::Or,
            "NOT" => Token::Not,
            "IS" => Token::Is,
            "NULL" => Token::Null,
            "BETWEEN" => Token::Between,
            "LIKE" => Token::Like,
            "IN" => Token::In,
            "TRUE" => Token::True,
            "FALSE" => Token::False,
            "ASC" => Token::Asc,
            "DESC" => Token::Desc,
            "NULLS" => Token::Nulls,
            "FIRST" => Token::First,
            "LAST" => Token::Last,
            _ => Token::Identifier(ident),
        }
    }

    fn read_quoted_identifier(&mut self, quote: char) -> ShardResult<Token> {
        self.advance(); // Skip opening quote

        let mut name = String::new();
        let closing = if quote == '[' { ']' } else { quote };

        while let Some(ch) = self.current_char {
            if ch == closing {
                self.advance();
                return Ok(Token::QuotedIdentifier { name, quote });
            }
            name.push(ch);
            self.advance();
        }

        Err(ShardError::ParseError("Unterminated quoted identifier".to_string()))
    }

    fn read_placeholder(&mut self) -> ShardResult<Token> {
        if self.current_char == Some('?') {
            self.advance();
            return Ok(Token::Placeholder("?".to_string()));
        }

        // :name style
        self.advance(); // skip :
        let mut name = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        if name.is_empty() {
            return Err(ShardError::ParseError(
                "Expected placeholder name after ':'".to_string(),
            ));
        }

        Ok(Token::Placeholder(name))
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn read_token(&mut self) -> ShardResult<Token> {
        let token = match self.current_char {
            None => Token::Eof,

            Some(ch) if ch.is_ascii_digit() => return self.read_number(),

            Some('\'') => return self.read_string('\''),

            Some(quote @ ('"' | '`' | '[')) => return self.read_quoted_identifier(quote),

            Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_identifier(),

            Some('?') | Some(':') => return self.read_placeholder(),

            Some('=') => self.single(Token::Equal),

            Some('!') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Not
                }
            }

            Some('<') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::LessThanEq
                } else if self.current_char == Some('>') {
                    self.advance();
                    Token::NotEqual // <>
                } else {
                    Token::LessThan
                }
            }

            Some('>') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::GreaterThanEq
                } else {
                    Token::GreaterThan
                }
            }

            Some('+') => self.single(Token::Plus),
            Some('-') => self.single(Token::Minus),
            Some('*') => self.single(Token::Star),
            Some('/') => self.single(Token::Slash),
            Some('%') => self.single(Token::Percent),
            Some(',') => self.single(Token::Comma),
            Some('.') => self.single(Token::Dot),
            Some('(') => self.single(Token::LeftParen),
            Some(')') => self.single(Token::RightParen),
            Some(';') => self.single(Token::Semicolon),

            Some(ch) => {
                return Err(ShardError::ParseError(format!(
                    "Unexpected character: {}",
                    ch
                )));
            }
        };

        Ok(token)
    }

    pub fn next_token(&mut self) -> ShardResult<SpannedToken> {
        loop {
            self.skip_whitespace();

            match self.current_char {
                Some('-') if self.peek() == Some('-') => self.skip_line_comment(),
                Some('/') if self.peek() == Some('*') => self.skip_block_comment(),
                _ => break,
            }
        }

        let start = self.offset();
        let token = self.read_token()?;
        Ok(SpannedToken {
            token,
            start,
            stop: self.offset(),
        })
    }

    pub fn tokenize(&mut self) -> ShardResult<Vec<SpannedToken>> {
        let mut tokens = Vec::new();

        loop {
            let spanned = self.next_token()?;
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

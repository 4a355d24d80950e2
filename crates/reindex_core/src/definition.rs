//! Index definitions and identifier quoting.
//!
//! [`IndexDefinition::parse`] reads the head of a definition as produced by
//! `pg_get_indexdef`:
//!
//! ```text
//! CREATE [UNIQUE] INDEX [CONCURRENTLY] name ON [ONLY] table [USING method] body
//! ```
//!
//! The head is read from the `sqlparser` token stream, so an `ON` inside a
//! quoted name or a string literal is never taken for the relation keyword.
//! The body (column list, INCLUDE, WITH, TABLESPACE, WHERE) is kept verbatim.
//!
//! [`replacement_sql`] rewrites a definition for its replacement through the
//! `sqlparser` AST when the statement survives a parse and print unchanged,
//! and splices the verbatim body otherwise.

use std::fmt;

use sqlparser::ast::{Ident, ObjectName, ObjectNamePart, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Location, Token, TokenWithSpan, Tokenizer};

/// Suffix appended to an index name to name its replacement.
pub const REPLACEMENT_SUFFIX: &str = "_new";

/// Longest identifier PostgreSQL keeps without truncation (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Name of the replacement built for `name`.
pub fn replacement_name(name: &str) -> String {
    format!("{}{}", name, REPLACEMENT_SUFFIX)
}

/// True if `name` survives as an identifier without being truncated.
pub fn fits_identifier(name: &str) -> bool {
    name.len() <= MAX_IDENTIFIER_LEN
}

/// Quotes an identifier the way `quote_ident()` does: only when it is not a
/// plain lower-case word or collides with a reserved keyword.
pub fn quote_ident(name: &str) -> String {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        }
        None => false,
    };
    if plain && !is_reserved(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// `schema.name` with both parts quoted as needed.
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
        "authorization", "binary", "both", "case", "cast", "check", "collate", "collation",
        "column", "concurrently", "constraint", "create", "cross", "current_catalog",
        "current_date", "current_role", "current_schema", "current_time", "current_timestamp",
        "current_user", "default", "deferrable", "desc", "distinct", "do", "else", "end",
        "except", "false", "fetch", "for", "foreign", "freeze", "from", "full", "grant",
        "group", "having", "ilike", "in", "initially", "inner", "intersect", "into", "is",
        "isnull", "join", "lateral", "leading", "left", "like", "limit", "localtime",
        "localtimestamp", "natural", "not", "notnull", "null", "offset", "on", "only", "or",
        "order", "outer", "overlaps", "placing", "primary", "references", "returning", "right",
        "select", "session_user", "similar", "some", "symmetric", "system_user", "table",
        "tablesample", "then", "to", "trailing", "true", "union", "unique", "user", "using",
        "variadic", "verbose", "when", "where", "window", "with",
    ];
    RESERVED.contains(&word)
}

/// Why a definition could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionError {
    /// Error message.
    pub message: String,
    /// Byte offset where the problem was found.
    pub position: usize,
}

impl DefinitionError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }
}

impl fmt::Display for DefinitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position + 1)
    }
}

impl std::error::Error for DefinitionError {}

/// A `CREATE INDEX` statement split into the parts a rebuild touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    /// `CREATE UNIQUE INDEX`.
    pub unique: bool,
    /// Built without blocking writes.
    pub concurrently: bool,
    /// Index name (unquoted value).
    pub name: String,
    /// `ON ONLY` (partitioned parent).
    pub only: bool,
    /// Target relation as written, possibly schema-qualified and quoted.
    pub table: String,
    /// Access method after `USING`.
    pub method: Option<String>,
    /// Everything after the method, verbatim.
    pub body: String,
}

impl IndexDefinition {
    /// Parses a definition.
    pub fn parse(sql: &str) -> Result<Self, DefinitionError> {
        let mut head = Head::tokenize(sql)?;

        head.expect_keyword(Keyword::CREATE, "CREATE")?;
        let unique = head.accept_keyword(Keyword::UNIQUE);
        head.expect_keyword(Keyword::INDEX, "INDEX")?;
        let concurrently = head.accept_keyword(Keyword::CONCURRENTLY);
        if head.accept_keyword(Keyword::IF) {
            head.expect_keyword(Keyword::NOT, "NOT")?;
            head.expect_keyword(Keyword::EXISTS, "EXISTS")?;
        }

        let name_at = head.offset();
        let name = match head.next() {
            Some(Token::Word(w)) if w.quote_style.is_none() && w.keyword == Keyword::ON => {
                return Err(DefinitionError::new("missing index name", name_at));
            }
            Some(Token::Word(w)) if w.quote_style.is_none() => w.value.to_ascii_lowercase(),
            Some(Token::Word(w)) => w.value.clone(),
            other => {
                return Err(DefinitionError::new(
                    format!("expected index name, found {}", describe(other)),
                    name_at,
                ))
            }
        };

        head.expect_keyword(Keyword::ON, "ON")?;
        let only = head.accept_keyword(Keyword::ONLY);

        let table_start = head.offset();
        head.expect_identifier("table name")?;
        while head.accept(&Token::Period) {
            head.expect_identifier("table name")?;
        }
        let table = sql[table_start..head.offset()].trim_end().to_string();

        let method = if head.accept_keyword(Keyword::USING) {
            let start = head.offset();
            head.expect_identifier("access method")?;
            Some(sql[start..head.offset()].trim_end().to_string())
        } else {
            None
        };

        let body_start = head.offset();
        if head.peek() != Some(&Token::LParen) {
            return Err(DefinitionError::new("expected column list", body_start));
        }
        let body = sql[body_start..].trim_end().to_string();

        Ok(Self {
            unique,
            concurrently,
            name,
            only,
            table,
            method,
            body,
        })
    }

    /// The non-blocking replacement: same target and body, built
    /// concurrently under [`replacement_name`].
    pub fn replacement(&self) -> Self {
        Self {
            concurrently: true,
            name: replacement_name(&self.name),
            ..self.clone()
        }
    }

    /// Serializes back to a statement.
    pub fn to_sql(&self) -> String {
        let mut sql = String::from("CREATE ");
        if self.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        if self.concurrently {
            sql.push_str("CONCURRENTLY ");
        }
        sql.push_str(&quote_ident(&self.name));
        sql.push_str(" ON ");
        if self.only {
            sql.push_str("ONLY ");
        }
        sql.push_str(&self.table);
        if let Some(method) = &self.method {
            sql.push_str(" USING ");
            sql.push_str(method);
        }
        sql.push(' ');
        sql.push_str(&self.body);
        sql
    }
}

impl fmt::Display for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// The statement that builds the replacement of the index defined by `sql`.
///
/// The definition is always validated by [`IndexDefinition::parse`]. When
/// `sqlparser` reads it as a single `CREATE INDEX` that prints back
/// unchanged, the replacement is printed from the AST; anything it cannot
/// reproduce exactly (opclasses, `ON ONLY`, lower-case access methods) keeps
/// the verbatim body.
pub fn replacement_sql(sql: &str) -> Result<String, DefinitionError> {
    let definition = IndexDefinition::parse(sql)?;
    let replacement = definition.replacement();

    if let Ok(mut statements) = Parser::parse_sql(&PostgreSqlDialect {}, sql) {
        if let [statement] = statements.as_mut_slice() {
            let round_trips = statement.to_string() == sql.trim_end();
            if let (true, Statement::CreateIndex(create)) = (round_trips, &mut *statement) {
                create.concurrently = true;
                create.name = Some(ObjectName(vec![ObjectNamePart::Identifier(ident(
                    &replacement.name,
                ))]));
                return Ok(statement.to_string());
            }
        }
    }
    Ok(replacement.to_sql())
}

fn ident(name: &str) -> Ident {
    if quote_ident(name).starts_with('"') {
        Ident::with_quote('"', name)
    } else {
        Ident::new(name)
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        Some(token) => format!("'{}'", token),
        None => "end of input".to_string(),
    }
}

/// Byte offset of a tokenizer location (1-based line and column in chars).
fn byte_offset(sql: &str, at: Location) -> usize {
    let line_start: usize = sql
        .split_inclusive('\n')
        .take((at.line as usize).saturating_sub(1))
        .map(str::len)
        .sum();
    let column = (at.column as usize).saturating_sub(1);
    sql[line_start..]
        .char_indices()
        .nth(column)
        .map_or(sql.len(), |(i, _)| line_start + i)
}

/// Cursor over the significant tokens of a definition.
struct Head<'a> {
    sql: &'a str,
    tokens: Vec<TokenWithSpan>,
    pos: usize,
}

impl<'a> Head<'a> {
    fn tokenize(sql: &'a str) -> Result<Self, DefinitionError> {
        let tokens = Tokenizer::new(&PostgreSqlDialect {}, sql)
            .tokenize_with_location()
            .map_err(|e| DefinitionError::new(e.message, byte_offset(sql, e.location)))?
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Whitespace(_) | Token::EOF))
            .collect();
        Ok(Self {
            sql,
            tokens,
            pos: 0,
        })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos).map(|t| &t.token);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Byte offset of the next token, or the end of input.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.sql.len(), |t| byte_offset(self.sql, t.span.start))
    }

    fn accept(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.quote_style.is_none() && w.keyword == keyword => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword, text: &str) -> Result<(), DefinitionError> {
        if self.accept_keyword(keyword) {
            return Ok(());
        }
        Err(DefinitionError::new(
            format!("expected {}, found {}", text, describe(self.peek())),
            self.offset(),
        ))
    }

    fn expect_identifier(&mut self, what: &str) -> Result<(), DefinitionError> {
        if let Some(Token::Word(_)) = self.peek() {
            self.pos += 1;
            return Ok(());
        }
        Err(DefinitionError::new(
            format!("expected {}, found {}", what, describe(self.peek())),
            self.offset(),
        ))
    }
}

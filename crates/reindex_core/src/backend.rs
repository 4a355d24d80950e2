//! Database backend abstraction.
//!
//! Everything above this module talks to the database through [`Backend`]:
//! plain statements go through [`Backend::execute`], catalog reads through
//! [`Backend::query`] with text parameters. [`PgBackend`] is the production
//! implementation on top of the `postgres` client.

use crate::config::ConnectionConfig;
use crate::error::{ReindexError, Result};
use postgres::error::SqlState;
use postgres::types::{ToSql, Type};
use postgres::{Client, NoTls};
use std::fmt;

/// A single column value from a catalog query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean column.
    Bool(bool),
    /// Any integer column, widened.
    Int(i64),
    /// Text-like column (text, name, varchar).
    Text(String),
}

/// One result row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Creates a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    fn get(&self, idx: usize) -> Result<&Value> {
        self.0
            .get(idx)
            .ok_or_else(|| ReindexError::UnexpectedRow(format!("missing column {}", idx)))
    }

    /// Reads a text column.
    pub fn text(&self, idx: usize) -> Result<&str> {
        match self.get(idx)? {
            Value::Text(s) => Ok(s),
            other => Err(ReindexError::UnexpectedRow(format!(
                "column {} is {:?}, expected text",
                idx, other
            ))),
        }
    }

    /// Reads a boolean column.
    pub fn bool(&self, idx: usize) -> Result<bool> {
        match self.get(idx)? {
            Value::Bool(b) => Ok(*b),
            other => Err(ReindexError::UnexpectedRow(format!(
                "column {} is {:?}, expected bool",
                idx, other
            ))),
        }
    }

    /// Reads an integer column.
    pub fn int(&self, idx: usize) -> Result<i64> {
        match self.get(idx)? {
            Value::Int(n) => Ok(*n),
            other => Err(ReindexError::UnexpectedRow(format!(
                "column {} is {:?}, expected integer",
                idx, other
            ))),
        }
    }
}

/// Classified failure of a single statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The server cancelled the statement (statement timeout or cancel request).
    Cancelled(String),
    /// The server rejected the statement.
    Database {
        /// SQLSTATE code, if reported.
        code: Option<String>,
        /// Server message.
        message: String,
    },
    /// The connection is gone.
    ConnectionLost(String),
    /// Anything the driver reports that is not a server error.
    Other(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled(msg) => write!(f, "cancelled: {}", msg),
            Self::Database {
                code: Some(code),
                message,
            } => write!(f, "{} (SQLSTATE {})", message, code),
            Self::Database {
                code: None,
                message,
            } => write!(f, "{}", message),
            Self::ConnectionLost(msg) => write!(f, "connection lost: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

/// Statement sink used by the executor.
pub trait Backend {
    /// Runs a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> std::result::Result<(), BackendError>;

    /// Runs a query with text parameters bound to `$1..$n`.
    fn query(&mut self, sql: &str, params: &[&str]) -> std::result::Result<Vec<Row>, BackendError>;
}

impl<B: Backend + ?Sized> Backend for &mut B {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), BackendError> {
        (**self).execute(sql)
    }

    fn query(&mut self, sql: &str, params: &[&str]) -> std::result::Result<Vec<Row>, BackendError> {
        (**self).query(sql, params)
    }
}

/// PostgreSQL backend over a single blocking connection in auto-commit mode.
pub struct PgBackend {
    client: Client,
}

impl PgBackend {
    /// Connects using the given settings.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let pg_config = config.to_pg_config()?;
        let client = pg_config
            .connect(NoTls)
            .map_err(|e| ReindexError::Connect {
                database: config.database.clone().unwrap_or_default(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }

    /// Returns a token that can cancel the statement currently running on
    /// this connection from another thread.
    pub fn cancel_token(&self) -> postgres::CancelToken {
        self.client.cancel_token()
    }

    /// Closes the connection.
    pub fn close(self) -> Result<()> {
        self.client
            .close()
            .map_err(|e| ReindexError::ConnectionLost(e.to_string()))
    }
}

impl Backend for PgBackend {
    fn execute(&mut self, sql: &str) -> std::result::Result<(), BackendError> {
        self.client.batch_execute(sql).map_err(classify)
    }

    fn query(&mut self, sql: &str, params: &[&str]) -> std::result::Result<Vec<Row>, BackendError> {
        let params: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(sql, &params).map_err(classify)?;
        rows.iter().map(convert_row).collect()
    }
}

fn convert_row(row: &postgres::Row) -> std::result::Result<Row, BackendError> {
    let mut values = Vec::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let ty = column.type_();
        let value = if *ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)
                .map(|v| v.map_or(Value::Null, Value::Bool))
        } else if *ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)
                .map(|v| v.map_or(Value::Null, Value::Int))
        } else if *ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)
                .map(|v| v.map_or(Value::Null, |n| Value::Int(n.into())))
        } else if *ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)
                .map(|v| v.map_or(Value::Null, |n| Value::Int(n.into())))
        } else {
            row.try_get::<_, Option<String>>(idx)
                .map(|v| v.map_or(Value::Null, Value::Text))
        };
        values.push(value.map_err(|e| BackendError::Other(e.to_string()))?);
    }
    Ok(Row(values))
}

/// Maps a driver error onto the statement error classes the executor knows.
fn classify(err: postgres::Error) -> BackendError {
    if let Some(code) = err.code() {
        if *code == SqlState::QUERY_CANCELED {
            return BackendError::Cancelled(err.to_string());
        }
        if is_connection_state(code) {
            return BackendError::ConnectionLost(err.to_string());
        }
    }
    if let Some(db) = err.as_db_error() {
        return BackendError::Database {
            code: Some(db.code().code().to_string()),
            message: db.message().to_string(),
        };
    }
    if err.is_closed() {
        return BackendError::ConnectionLost(err.to_string());
    }
    BackendError::Other(err.to_string())
}

fn is_connection_state(code: &SqlState) -> bool {
    // Class 08 (connection exception) and the operator-intervention shutdowns.
    code.code().starts_with("08")
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CRASH_SHUTDOWN
}

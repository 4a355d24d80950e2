//! Error types for reindex_core operations.

use thiserror::Error;

/// Core error type for reindex_core operations.
#[derive(Error, Debug)]
pub enum ReindexError {
    /// Could not establish the database connection.
    #[error("error connecting to database {database}: {reason}")]
    Connect {
        /// Target database name
        database: String,
        /// Driver error message
        reason: String,
    },

    /// The connection dropped while the run was in progress.
    #[error("database connection lost: {0}")]
    ConnectionLost(String),

    /// A statement failed and the error policy treats it as fatal.
    #[error("statement failed: {message} (SQL: {sql})")]
    Statement {
        /// The statement text
        sql: String,
        /// Database error message
        message: String,
    },

    /// The driver raised something that is not a database error.
    #[error("unexpected error executing query: {0}")]
    Unexpected(String),

    /// The run was interrupted by the user.
    #[error("interrupted by user")]
    Interrupted,

    /// A catalog row did not have the expected shape.
    #[error("unexpected catalog row: {0}")]
    UnexpectedRow(String),

    /// An index definition could not be parsed into a rebuildable form.
    #[error("unsupported index definition for {index}: {reason}")]
    UnsupportedDefinition {
        /// The index whose definition was rejected
        index: String,
        /// What did not match
        reason: String,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReindexError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Connect { .. } => {
                Some("Check --host, --port, --user and --password, and that the server accepts connections.")
            }
            Self::ConnectionLost(_) | Self::Interrupted => Some(
                "A replacement index may have been left behind; the next run drops it before rebuilding.",
            ),
            Self::Statement { .. } => {
                Some("Run without --strict to report statement failures and continue with the next index.")
            }
            Self::UnsupportedDefinition { .. } => {
                Some("Rebuild this index manually with CREATE INDEX CONCURRENTLY.")
            }
            Self::ConfigError(_) => Some("Check the TOML file passed with --config."),
            _ => None,
        }
    }

    /// Returns true if the run must stop because of this error.
    ///
    /// Every variant that reaches the driver is fatal except a rejected
    /// definition, which only skips the index at hand.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnsupportedDefinition { .. })
    }
}

/// Convenience Result type for reindex_core operations.
pub type Result<T> = std::result::Result<T, ReindexError>;

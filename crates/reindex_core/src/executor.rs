//! Statement executor.
//!
//! The single choke point between the rebuild logic and the database.
//! Mutating statements are printed instead of executed in dry-run mode;
//! catalog reads always run. Cancelled statements and generic database
//! errors are reported and returned as outcomes, everything else is fatal.

use crate::backend::{Backend, BackendError, Row};
use crate::cancel::CancelToken;
use crate::config::ErrorPolicy;
use crate::error::{ReindexError, Result};
use tracing::{error, info, trace, warn};

/// What happened to a mutating statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executed {
    /// The database ran the statement.
    Done,
    /// Dry run: the statement was printed only.
    Printed,
    /// The server cancelled the statement (enforced timeout).
    Cancelled,
    /// The server rejected the statement; reported and treated as a no-op.
    Failed(String),
}

impl Executed {
    /// True if the statement took effect (or would have, in a dry run).
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Done | Self::Printed)
    }
}

/// Sends statements to a [`Backend`].
pub struct StatementExecutor<B> {
    backend: B,
    dry_run: bool,
    policy: ErrorPolicy,
    cancel: CancelToken,
}

impl<B: Backend> StatementExecutor<B> {
    /// Creates an executor over `backend`.
    pub fn new(backend: B, dry_run: bool, policy: ErrorPolicy) -> Self {
        Self {
            backend,
            dry_run,
            policy,
            cancel: CancelToken::new(),
        }
    }

    /// Observes `token`: once it is raised every call returns
    /// [`ReindexError::Interrupted`].
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Whether mutating statements are only printed.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Consumes the executor, returning the backend.
    pub fn into_inner(self) -> B {
        self.backend
    }

    /// Runs (or in a dry run, prints) a mutating statement.
    pub fn execute(&mut self, sql: &str) -> Result<Executed> {
        self.check_cancelled()?;

        if self.dry_run {
            info!("DRY-RUN SQL: {}", sql);
            return Ok(Executed::Printed);
        }

        trace!("SQL: {}", sql);
        match self.backend.execute(sql) {
            Ok(()) => Ok(Executed::Done),
            Err(err) => self.handle_failure(sql, err).map(|outcome| match outcome {
                Failure::Cancelled => Executed::Cancelled,
                Failure::Reported(message) => Executed::Failed(message),
            }),
        }
    }

    /// Runs a read-only query, also in a dry run.
    ///
    /// A cancelled or rejected query is reported and yields no rows.
    pub fn query(&mut self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        self.check_cancelled()?;

        trace!("SQL: {} {:?}", sql, params);
        match self.backend.query(sql, params) {
            Ok(rows) => Ok(rows),
            Err(err) => self.handle_failure(sql, err).map(|_| Vec::new()),
        }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ReindexError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn handle_failure(&self, sql: &str, err: BackendError) -> Result<Failure> {
        // A cancel request from the interrupt handler shows up as a cancelled
        // or broken statement; the token tells the two causes apart.
        if self.cancel.is_cancelled() {
            return Err(ReindexError::Interrupted);
        }
        match err {
            BackendError::Cancelled(_) => {
                warn!("Query cancelled due to enforced timeout");
                Ok(Failure::Cancelled)
            }
            BackendError::Database { .. } => {
                error!("DB query error: {}", err);
                match self.policy {
                    ErrorPolicy::Lenient => Ok(Failure::Reported(err.to_string())),
                    ErrorPolicy::Strict => Err(ReindexError::Statement {
                        sql: sql.to_string(),
                        message: err.to_string(),
                    }),
                }
            }
            BackendError::ConnectionLost(msg) => Err(ReindexError::ConnectionLost(msg)),
            BackendError::Other(msg) => {
                error!("Unexpected error executing query: {}", msg);
                Err(ReindexError::Unexpected(msg))
            }
        }
    }
}

enum Failure {
    Cancelled,
    Reported(String),
}

//! Reindex Core Library
//!
//! Rebuilds bloated PostgreSQL indexes without blocking writes:
//! - Non-blocking builds of a renamed copy, validated before use
//! - Retries with cleanup of invalid copies
//! - Swap protocols for plain and primary-key indexes
//! - A wall-clock budget, optionally enforced as a statement timeout
//!
//! # Quick Start
//!
//! ```no_run
//! use reindex_core::{
//!     Config, PgBackend, Reindexer, RunBudget, RunPlan, StatementExecutor,
//! };
//!
//! let config = Config::default();
//! let backend = PgBackend::connect(&config.connection)?;
//! let exec = StatementExecutor::new(backend, config.run.dry_run, config.run.error_policy);
//! let budget = RunBudget::start(config.run.run_time(), config.run.enforce_time);
//!
//! let plan = RunPlan {
//!     tables: vec!["orders".into()],
//!     ..RunPlan::default()
//! };
//! let report = Reindexer::new(exec, budget, config.run).run(&plan)?;
//! println!("{}", report.totals.summary());
//! # Ok::<(), reindex_core::ReindexError>(())
//! ```
//!
//! # Definitions
//!
//! Replacement definitions are derived from the catalog definition by
//! parsing its head, never by text substitution:
//!
//! ```
//! use reindex_core::IndexDefinition;
//!
//! let def = IndexDefinition::parse(
//!     "CREATE UNIQUE INDEX users_email_key ON public.users USING btree (email)",
//! ).unwrap();
//! assert_eq!(
//!     def.replacement().to_sql(),
//!     "CREATE UNIQUE INDEX CONCURRENTLY users_email_key_new ON public.users USING btree (email)",
//! );
//! ```
//!
//! # Sizes
//!
//! ```
//! use reindex_core::format_size;
//!
//! assert_eq!(format_size(1536), "1.5 KiB");
//! ```

mod backend;
mod bloat;
mod budget;
mod cancel;
mod catalog;
mod config;
mod definition;
mod driver;
mod engine;
mod error;
mod executor;
mod swap;


pub use backend::{Backend, BackendError, PgBackend, Row, Value};
pub use bloat::{format_size, BloatSummary, RunTotals, SizeSample};
pub use budget::{Clock, RunBudget, SystemClock, MAX_STATEMENT_TIMEOUT, STATEMENT_TIMEOUT_GRACE};
pub use cancel::CancelToken;
pub use catalog::{CatalogInspector, TargetIndex, Validity};
pub use config::{Config, ConnectionConfig, ErrorPolicy, RunConfig, APPLICATION_NAME};
pub use definition::{
    fits_identifier, qualified_name, quote_ident, replacement_name, replacement_sql,
    DefinitionError, IndexDefinition, MAX_IDENTIFIER_LEN, REPLACEMENT_SUFFIX,
};
pub use driver::{IndexRecord, Reindexer, RunCounters, RunPlan, RunReport, TableOutcome};
pub use engine::{AttemptOutcome, IndexOutcome, IndexRebuildEngine};
pub use error::{ReindexError, Result};
pub use executor::{Executed, StatementExecutor};
pub use swap::{SwapEngine, SwapOutcome, SwapProtocol};

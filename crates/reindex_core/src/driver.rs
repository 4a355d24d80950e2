//! The run loop: explicit indexes first, then each table's indexes by name.

use crate::backend::Backend;
use crate::bloat::RunTotals;
use crate::budget::RunBudget;
use crate::catalog::CatalogInspector;
use crate::config::RunConfig;
use crate::engine::{IndexOutcome, IndexRebuildEngine};
use crate::error::{ReindexError, Result};
use crate::executor::StatementExecutor;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, trace, warn};

/// What to rebuild.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    /// Index names, processed in order.
    pub indexes: Vec<String>,
    /// Table names (optionally `schema.table`), processed after the indexes.
    pub tables: Vec<String>,
    /// Index names never touched.
    pub ignore: BTreeSet<String>,
}

/// Counts kept over a whole run. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    /// Indexes looked at, whatever became of them.
    pub indexes_seen: u64,
    /// Indexes rebuilt and swapped in.
    pub succeeded: u64,
    /// Indexes skipped because they are on the ignore list.
    pub ignored: u64,
    /// Extra builds after a replacement came out invalid.
    pub retries: u64,
    /// Requested indexes missing from the catalog.
    pub not_found: u64,
    /// Indexes left as they were after a failure.
    pub failed: u64,
    /// Tables whose indexes were handed to the engine.
    pub tables: u64,
}

impl RunCounters {
    /// Folds one index outcome into the counts.
    pub fn record(&mut self, outcome: &IndexOutcome) {
        if !outcome.seen() {
            return;
        }
        self.indexes_seen += 1;
        self.retries += u64::from(outcome.retries());
        match outcome {
            IndexOutcome::Rebuilt { .. } => self.succeeded += 1,
            IndexOutcome::Ignored => self.ignored += 1,
            IndexOutcome::NotFound => self.not_found += 1,
            _ if outcome.failed() => self.failed += 1,
            _ => {}
        }
    }
}

/// What happened to one table name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOutcome {
    /// The deadline had passed before the table was looked at.
    NotStarted,
    /// Its indexes were handed to the engine.
    Processed {
        /// Indexes listed for the table.
        indexes: usize,
    },
}

/// Outcome of one index, as listed in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexRecord {
    /// Index name as requested or listed.
    pub name: String,
    /// What the engine did with it.
    #[serde(flatten)]
    pub outcome: IndexOutcome,
}

/// Final state of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub counters: RunCounters,
    /// Size before and after, summed over rebuilt indexes.
    pub totals: RunTotals,
    /// One record per index, in processing order.
    pub indexes: Vec<IndexRecord>,
    /// The deadline stopped the run early.
    pub time_exit: bool,
    /// The user interrupted the run.
    pub interrupted: bool,
    pub run_minutes: u64,
    pub dry_run: bool,
    /// Wall-clock time of the run.
    pub elapsed_secs: f64,
}

impl RunReport {
    /// Closing line of the run.
    pub fn end_message(&self) -> String {
        if self.interrupted {
            "Reindexing interrupted by user".to_string()
        } else if self.counters.indexes_seen == 0 {
            "No indexes were found to reindex".to_string()
        } else if self.time_exit {
            format!(
                "Reindexing interrupted early (configured timeout {}min)",
                self.run_minutes
            )
        } else {
            "All indexes/tables reindexed".to_string()
        }
    }

    /// Per-counter lines for verbose output.
    pub fn counter_lines(&self) -> Vec<String> {
        let c = &self.counters;
        vec![
            format!("...{}/{} indexes reindexed", c.succeeded, c.indexes_seen),
            format!("...{} tables processed", c.tables),
            format!(
                "...{} reindex retries due to state `invalid` after creating 'concurrently'",
                c.retries
            ),
            format!("...{} indexes skipped cause ignored", c.ignored),
            format!("...{} indexes omitted cause not found", c.not_found),
            format!("...{} indexes failed", c.failed),
        ]
    }
}

/// Owns the executor and budget for a run and aggregates outcomes.
pub struct Reindexer<B> {
    exec: StatementExecutor<B>,
    budget: RunBudget,
    config: RunConfig,
    ignore: BTreeSet<String>,
    counters: RunCounters,
    totals: RunTotals,
    indexes: Vec<IndexRecord>,
    time_exit: bool,
    interrupted: bool,
}

impl<B: Backend> Reindexer<B> {
    pub fn new(exec: StatementExecutor<B>, budget: RunBudget, config: RunConfig) -> Self {
        Self {
            exec,
            budget,
            config,
            ignore: BTreeSet::new(),
            counters: RunCounters::default(),
            totals: RunTotals::default(),
            indexes: Vec::new(),
            time_exit: false,
            interrupted: false,
        }
    }

    /// The executor, e.g. to inspect the backend after a run.
    pub fn executor(&self) -> &StatementExecutor<B> {
        &self.exec
    }

    /// Consumes the driver, returning the executor.
    pub fn into_executor(self) -> StatementExecutor<B> {
        self.exec
    }

    /// Runs `plan` to completion, the deadline, or an interrupt.
    ///
    /// An interrupt ends the run with a report; other fatal errors are
    /// returned as they are.
    pub fn run(&mut self, plan: &RunPlan) -> Result<RunReport> {
        self.ignore = plan.ignore.clone();

        match self.run_plan(plan) {
            Ok(()) => {}
            Err(ReindexError::Interrupted) => {
                warn!("Interrupted, stopping the run");
                self.interrupted = true;
            }
            Err(err) => return Err(err),
        }
        Ok(self.report())
    }

    fn run_plan(&mut self, plan: &RunPlan) -> Result<()> {
        for name in &plan.indexes {
            self.process_index(name)?;
            if self.time_exit {
                return Ok(());
            }
        }
        for table in &plan.tables {
            self.process_table(table)?;
            if self.time_exit {
                return Ok(());
            }
        }
        Ok(())
    }

    /// Rebuilds one index and records its outcome.
    pub fn process_index(&mut self, name: &str) -> Result<IndexOutcome> {
        let outcome =
            IndexRebuildEngine::new(&mut self.exec, &self.budget, &self.config, &self.ignore)
                .rebuild(name)?;

        self.counters.record(&outcome);
        if let IndexOutcome::Rebuilt { sample, .. } = &outcome {
            self.totals.record(*sample);
        }
        if outcome.hit_deadline() {
            self.time_exit = true;
        }
        if outcome.seen() {
            self.indexes.push(IndexRecord {
                name: name.to_string(),
                outcome: outcome.clone(),
            });
        }
        Ok(outcome)
    }

    /// Rebuilds every index of `table`, ordered by name.
    pub fn process_table(&mut self, table: &str) -> Result<TableOutcome> {
        if self.budget.expired() {
            debug!("Reached time limit. Exiting.");
            self.time_exit = true;
            return Ok(TableOutcome::NotStarted);
        }

        info!("Working on table {}", table);
        self.counters.tables += 1;

        let names = CatalogInspector::list_table_indexes(&mut self.exec, table)?;
        trace!("idx_names: {:?}", names);

        for name in &names {
            self.process_index(name)?;
            if self.time_exit {
                break;
            }
        }
        Ok(TableOutcome::Processed {
            indexes: names.len(),
        })
    }

    /// Snapshot of the run so far.
    pub fn report(&self) -> RunReport {
        RunReport {
            counters: self.counters,
            totals: self.totals,
            indexes: self.indexes.clone(),
            time_exit: self.time_exit,
            interrupted: self.interrupted,
            run_minutes: self.config.run_minutes,
            dry_run: self.exec.dry_run(),
            elapsed_secs: self.budget.elapsed().as_secs_f64(),
        }
    }
}

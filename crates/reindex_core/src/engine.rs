//! Rebuild of a single index.
//!
//! ```text
//! Start -> Resolve -> NotFound | Ignored | BuildAttempt
//! BuildAttempt -> Valid | Invalid | TimedOut | (deadline)
//! Invalid, TimedOut -> BuildAttempt | give up
//! Valid -> Swap -> Done
//! ```
//!
//! Every attempt starts by dropping a replacement left behind by an earlier
//! run, builds a new one concurrently and checks its validity flag. Invalid
//! replacements are dropped before the next attempt. The deadline is checked
//! before the index and before every attempt; a build already running is
//! only bounded by the statement timeout.

use crate::backend::Backend;
use crate::bloat::SizeSample;
use crate::budget::RunBudget;
use crate::catalog::{CatalogInspector, TargetIndex, Validity};
use crate::config::RunConfig;
use crate::definition::fits_identifier;
use crate::error::Result;
use crate::executor::{Executed, StatementExecutor};
use crate::swap::{SwapEngine, SwapOutcome};
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Result of one build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The replacement is valid and can be swapped in.
    Valid,
    /// The build finished but left an invalid (or no) replacement.
    Invalid,
    /// The build was cancelled by the statement timeout.
    TimedOut,
}

/// What happened to one index name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// The deadline had passed before the index was looked at.
    NotStarted,
    /// Listed in the ignore set; nothing was sent to the database.
    Ignored,
    /// No unique catalog entry.
    NotFound,
    /// Resolved but not rebuildable (definition or name).
    Skipped {
        /// Why the index was skipped.
        reason: String,
    },
    /// Swapped in a rebuilt copy.
    Rebuilt {
        /// Failed attempts before the successful one.
        retries: u32,
        /// Sizes before and after.
        sample: SizeSample,
    },
    /// Every attempt produced an invalid replacement.
    Exhausted {
        /// Failed attempts.
        retries: u32,
    },
    /// A valid replacement was built but could not be swapped in.
    SwapFailed {
        /// Failed attempts before the build that could not be swapped.
        retries: u32,
        /// Database message of the failed step.
        reason: String,
    },
    /// The deadline passed between attempts.
    OutOfTime {
        /// Failed attempts before the deadline.
        retries: u32,
    },
}

impl IndexOutcome {
    /// True if the index counts as seen by the run.
    pub fn seen(&self) -> bool {
        !matches!(self, Self::NotStarted)
    }

    /// True if the deadline stopped work on this index.
    pub fn hit_deadline(&self) -> bool {
        matches!(self, Self::NotStarted | Self::OutOfTime { .. })
    }

    /// Attempts that ended with an invalid or cancelled build.
    pub fn retries(&self) -> u32 {
        match self {
            Self::Rebuilt { retries, .. }
            | Self::Exhausted { retries }
            | Self::SwapFailed { retries, .. }
            | Self::OutOfTime { retries } => *retries,
            _ => 0,
        }
    }

    /// True if the index was resolved but is still not rebuilt for a reason
    /// other than the deadline.
    pub fn failed(&self) -> bool {
        matches!(
            self,
            Self::Skipped { .. } | Self::Exhausted { .. } | Self::SwapFailed { .. }
        )
    }
}

/// Drives the attempt loop for one index at a time.
pub struct IndexRebuildEngine<'a, B> {
    exec: &'a mut StatementExecutor<B>,
    budget: &'a RunBudget,
    ignore: &'a BTreeSet<String>,
    retries: u32,
    pause: Duration,
}

impl<'a, B: Backend> IndexRebuildEngine<'a, B> {
    /// Creates an engine using `config`'s retry count and pause.
    pub fn new(
        exec: &'a mut StatementExecutor<B>,
        budget: &'a RunBudget,
        config: &RunConfig,
        ignore: &'a BTreeSet<String>,
    ) -> Self {
        Self {
            exec,
            budget,
            ignore,
            retries: config.retries,
            pause: config.pause(),
        }
    }

    /// Rebuilds the index called `name`.
    ///
    /// Only fatal errors are returned; everything the run can continue from
    /// is an [`IndexOutcome`].
    pub fn rebuild(&mut self, name: &str) -> Result<IndexOutcome> {
        if self.budget.expired() {
            debug!("Reached time limit. Exiting.");
            return Ok(IndexOutcome::NotStarted);
        }

        info!("Working on index {}", name);

        if self.ignore.contains(name) {
            info!("Skipping (index in 'ignore-indexes' list)");
            return Ok(IndexOutcome::Ignored);
        }

        let target = match CatalogInspector::resolve_index(self.exec, name) {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!("Index does not exist, omit");
                return Ok(IndexOutcome::NotFound);
            }
            Err(err) if !err.is_fatal() => {
                warn!("Skipping: {}", err);
                return Ok(IndexOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };

        if !fits_identifier(&target.replacement_name) {
            warn!(
                "Skipping: replacement name {} exceeds the identifier length limit",
                target.replacement_name
            );
            return Ok(IndexOutcome::Skipped {
                reason: format!("replacement name {} is too long", target.replacement_name),
            });
        }

        self.attempt_loop(&target)
    }

    fn attempt_loop(&mut self, target: &TargetIndex) -> Result<IndexOutcome> {
        let mut retries = 0;
        let mut leftover = false;

        for attempt in 1..=self.retries {
            if self.budget.expired() {
                debug!("Reached time limit. Exiting.");
                self.drop_leftover(target, leftover)?;
                return Ok(IndexOutcome::OutOfTime { retries });
            }

            debug!("Attempt #{} to create index concurrently", attempt);
            let (outcome, validity) = self.attempt(target)?;

            if outcome == AttemptOutcome::Valid {
                debug!("Valid replacement index has been created, replacing existing.");
                let sample = self.measure(target)?;
                debug!("Index bloat reduced: {}", sample.summary());

                let swapped = SwapEngine::swap(self.exec, target)?;
                self.pause_after_attempt();
                return Ok(match swapped {
                    SwapOutcome::Swapped => IndexOutcome::Rebuilt { retries, sample },
                    SwapOutcome::Aborted { reason } | SwapOutcome::RenameFailed { reason } => {
                        IndexOutcome::SwapFailed { retries, reason }
                    }
                });
            }

            if outcome == AttemptOutcome::TimedOut {
                debug!("Replacement build cancelled, cleaning up.");
            } else {
                debug!("Invalid replacement index, cleaning up.");
            }
            trace!("invalid, drop and continue");
            leftover = self.drop_invalid(target, validity)?;
            self.pause_after_attempt();
            retries += 1;
        }

        self.drop_leftover(target, leftover)?;
        Ok(IndexOutcome::Exhausted { retries })
    }

    fn attempt(&mut self, target: &TargetIndex) -> Result<(AttemptOutcome, Validity)> {
        self.exec.execute(&format!(
            "DROP INDEX CONCURRENTLY IF EXISTS {}",
            target.qualified_replacement()
        ))?;

        if let Some(timeout) = self.budget.statement_timeout() {
            self.exec
                .execute(&format!("SET statement_timeout = '{}s'", timeout.as_secs()))?;
        }

        let built = self.exec.execute(&target.replacement_definition)?;

        let mut validity =
            CatalogInspector::validity(self.exec, &target.schema, &target.replacement_name)?;
        if self.exec.dry_run() {
            validity = Validity::Valid;
        }

        let outcome = match (built, validity) {
            (Executed::Cancelled, _) => AttemptOutcome::TimedOut,
            (_, Validity::Valid) => AttemptOutcome::Valid,
            _ => AttemptOutcome::Invalid,
        };
        Ok((outcome, validity))
    }

    fn measure(&mut self, target: &TargetIndex) -> Result<SizeSample> {
        let before = CatalogInspector::relation_size(self.exec, &target.schema, &target.name)?;
        let after = if self.exec.dry_run() {
            before
        } else {
            CatalogInspector::relation_size(self.exec, &target.schema, &target.replacement_name)?
        };
        Ok(SizeSample { before, after })
    }

    /// Drops a replacement the catalog still knows about. Returns true if it
    /// could not be dropped.
    fn drop_invalid(&mut self, target: &TargetIndex, validity: Validity) -> Result<bool> {
        if validity == Validity::Missing {
            return Ok(false);
        }
        let dropped = self.exec.execute(&format!(
            "DROP INDEX CONCURRENTLY {}",
            target.qualified_replacement()
        ))?;
        Ok(!dropped.succeeded())
    }

    fn drop_leftover(&mut self, target: &TargetIndex, leftover: bool) -> Result<()> {
        if leftover {
            self.exec.execute(&format!(
                "DROP INDEX CONCURRENTLY IF EXISTS {}",
                target.qualified_replacement()
            ))?;
        }
        Ok(())
    }

    fn pause_after_attempt(&self) {
        if !self.pause.is_zero() {
            debug!("Completed, sleeping for {}s.", self.pause.as_secs());
            self.budget.pause(self.pause);
        }
    }
}

//! Replacing an index with its validated replacement.
//!
//! Two protocols, chosen by primary-key membership:
//!
//! - **Plain**: drop the original concurrently, then rename the replacement.
//!   Three auto-commit statements; between drop and rename the name is
//!   briefly unused, which only affects the catalog.
//! - **Primary key**: drop the constraint, rename the replacement and re-add
//!   the constraint on top of it, all in one transaction so the table is
//!   never observed without its primary key.
//!
//! Both protocols refresh statistics before and after. When a step fails the
//! swap backs out and discards the replacement so two live copies of the
//! same index never remain. A failed or cancelled concurrent drop can still
//! leave the original invalid or gone, so the replacement is only discarded
//! once the original reads valid again; otherwise the drop is finished and
//! the swap goes on.

use crate::backend::Backend;
use crate::catalog::{CatalogInspector, TargetIndex, Validity};
use crate::definition::quote_ident;
use crate::error::Result;
use crate::executor::{Executed, StatementExecutor};
use serde::Serialize;
use tracing::{error, trace, warn};

/// Which swap protocol applies to an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SwapProtocol {
    /// Drop and rename, no transaction.
    Plain,
    /// Transactional constraint swap.
    PrimaryKey,
}

impl SwapProtocol {
    /// Protocol for `target`.
    pub fn for_target(target: &TargetIndex) -> Self {
        if target.is_primary_key {
            Self::PrimaryKey
        } else {
            Self::Plain
        }
    }
}

/// Result of a swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The replacement now carries the original name.
    Swapped,
    /// The swap backed out; the original is untouched and the replacement
    /// was discarded.
    Aborted {
        /// Why it backed out.
        reason: String,
    },
    /// The original was dropped (or left unusable) but the replacement
    /// could not take its name; it serves under its own name.
    RenameFailed {
        /// Database message of the failed rename.
        reason: String,
    },
}

impl SwapOutcome {
    /// True if the original name now refers to the rebuilt index.
    pub fn is_swapped(&self) -> bool {
        matches!(self, Self::Swapped)
    }
}

/// Performs swaps.
pub struct SwapEngine;

impl SwapEngine {
    /// Swaps `target`'s replacement in for the original.
    pub fn swap<B: Backend>(
        exec: &mut StatementExecutor<B>,
        target: &TargetIndex,
    ) -> Result<SwapOutcome> {
        let analyze = format!("ANALYZE {}", target.qualified_table());
        if let Err(err) = exec.execute(&analyze) {
            Self::abandon(exec, target);
            return Err(err);
        }

        let outcome = match SwapProtocol::for_target(target) {
            SwapProtocol::PrimaryKey => {
                trace!("is valid, is pk, drop constraint, rename & add as new pk");
                Self::swap_primary_key(exec, target)?
            }
            SwapProtocol::Plain => {
                trace!("is valid, drop old and rename");
                Self::swap_plain(exec, target)?
            }
        };

        exec.execute(&analyze)?;
        Ok(outcome)
    }

    fn swap_plain<B: Backend>(
        exec: &mut StatementExecutor<B>,
        target: &TargetIndex,
    ) -> Result<SwapOutcome> {
        let dropped = match exec.execute(&format!(
            "DROP INDEX CONCURRENTLY {}",
            target.qualified_name()
        )) {
            Ok(dropped) => dropped,
            Err(err) => {
                if Self::original_is_valid(exec, target) {
                    Self::abandon(exec, target);
                } else {
                    warn!(
                        "{} may be unusable after the failed drop, keeping {}",
                        target.name, target.replacement_name
                    );
                }
                return Err(err);
            }
        };
        if let Some(reason) = failure_reason(&dropped) {
            match CatalogInspector::validity(exec, &target.schema, &target.name)? {
                Validity::Valid => {
                    warn!(
                        "Could not drop {}, discarding replacement {}",
                        target.name, target.replacement_name
                    );
                    Self::discard_replacement(exec, target)?;
                    return Ok(SwapOutcome::Aborted { reason });
                }
                Validity::Invalid => {
                    warn!(
                        "Drop of {} stopped halfway ({}), dropping it again",
                        target.name, reason
                    );
                    let retried = exec.execute(&format!(
                        "DROP INDEX CONCURRENTLY IF EXISTS {}",
                        target.qualified_name()
                    ))?;
                    if let Some(reason) = failure_reason(&retried) {
                        error!(
                            "{} is invalid and could not be dropped; {} keeps its name",
                            target.name, target.replacement_name
                        );
                        return Ok(SwapOutcome::RenameFailed { reason });
                    }
                }
                Validity::Missing => {
                    warn!("{} is gone despite the failed drop ({})", target.name, reason);
                }
            }
        }

        let renamed = exec.execute(&rename_statement(target))?;
        if let Some(reason) = failure_reason(&renamed) {
            error!(
                "Dropped {} but could not rename {}; the rebuilt index keeps its temporary name",
                target.name, target.replacement_name
            );
            return Ok(SwapOutcome::RenameFailed { reason });
        }

        Ok(SwapOutcome::Swapped)
    }

    fn swap_primary_key<B: Backend>(
        exec: &mut StatementExecutor<B>,
        target: &TargetIndex,
    ) -> Result<SwapOutcome> {
        let table = target.qualified_table();
        let name = quote_ident(&target.name);
        let steps = [
            "BEGIN".to_string(),
            format!("ALTER TABLE {} DROP CONSTRAINT {}", table, name),
            rename_statement(target),
            format!("ALTER TABLE {} ADD PRIMARY KEY USING INDEX {}", table, name),
            "COMMIT".to_string(),
        ];

        for step in &steps {
            let executed = match exec.execute(step) {
                Ok(executed) => executed,
                Err(err) => {
                    let _ = exec.execute("ROLLBACK");
                    Self::abandon(exec, target);
                    return Err(err);
                }
            };
            if let Some(reason) = failure_reason(&executed) {
                warn!(
                    "Primary key swap of {} failed, rolling back and discarding {}",
                    target.name, target.replacement_name
                );
                exec.execute("ROLLBACK")?;
                Self::discard_replacement(exec, target)?;
                return Ok(SwapOutcome::Aborted { reason });
            }
        }

        Ok(SwapOutcome::Swapped)
    }

    /// True only when the catalog confirms the original is still valid.
    fn original_is_valid<B: Backend>(
        exec: &mut StatementExecutor<B>,
        target: &TargetIndex,
    ) -> bool {
        matches!(
            CatalogInspector::validity(exec, &target.schema, &target.name),
            Ok(Validity::Valid)
        )
    }

    /// Best-effort discard on the way out of a fatal error. Only valid
    /// while the original still exists.
    fn abandon<B: Backend>(exec: &mut StatementExecutor<B>, target: &TargetIndex) {
        if let Err(err) = Self::discard_replacement(exec, target) {
            warn!("Could not discard {}: {}", target.replacement_name, err);
        }
    }

    fn discard_replacement<B: Backend>(
        exec: &mut StatementExecutor<B>,
        target: &TargetIndex,
    ) -> Result<Executed> {
        exec.execute(&format!(
            "DROP INDEX CONCURRENTLY IF EXISTS {}",
            target.qualified_replacement()
        ))
    }
}

fn rename_statement(target: &TargetIndex) -> String {
    format!(
        "ALTER INDEX {} RENAME TO {}",
        target.qualified_replacement(),
        quote_ident(&target.name)
    )
}

fn failure_reason(executed: &Executed) -> Option<String> {
    match executed {
        Executed::Done | Executed::Printed => None,
        Executed::Cancelled => Some("statement cancelled".to_string()),
        Executed::Failed(message) => Some(message.clone()),
    }
}

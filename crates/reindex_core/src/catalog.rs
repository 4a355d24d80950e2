//! Catalog lookups.
//!
//! Resolves index names to their owning table and primary-key status, reads
//! definitions for cloning, lists a table's indexes and reports validity and
//! size of index relations. All lookups are read-only and run through the
//! executor, so they also run in a dry run.

use crate::backend::Backend;
use crate::definition::{qualified_name, replacement_name, replacement_sql};
use crate::error::{ReindexError, Result};
use crate::executor::StatementExecutor;
use serde::Serialize;
use tracing::{debug, trace};

const RESOLVE_SQL: &str = "\
SELECT n.nspname, t.relname, ix.indisprimary
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
JOIN pg_index ix ON ix.indexrelid = c.oid
JOIN pg_class t ON t.oid = ix.indrelid
WHERE c.relname = $1";

const DEFINITION_SQL: &str =
    "SELECT indexdef FROM pg_indexes WHERE schemaname = $1 AND indexname = $2";

const TABLE_INDEXES_SQL: &str =
    "SELECT indexname FROM pg_indexes WHERE tablename = $1 ORDER BY indexname";

const SCHEMA_TABLE_INDEXES_SQL: &str =
    "SELECT indexname FROM pg_indexes WHERE schemaname = $1 AND tablename = $2 ORDER BY indexname";

const VALIDITY_SQL: &str = "\
SELECT c.relname, ix.indisvalid
FROM pg_class c
JOIN pg_index ix ON ix.indexrelid = c.oid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = $1 AND c.relname = $2";

const SIZE_SQL: &str = "SELECT pg_relation_size($1::text::regclass)";

/// An index resolved from the catalog, ready to be rebuilt.
///
/// Resolved fresh for every index the driver processes and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetIndex {
    /// Schema of the index and its table.
    pub schema: String,
    /// Index name.
    pub name: String,
    /// Owning table.
    pub table: String,
    /// Whether the index backs the table's primary key.
    pub is_primary_key: bool,
    /// Current definition as stored in the catalog.
    pub source_definition: String,
    /// Non-blocking definition of the replacement.
    pub replacement_definition: String,
    /// Name of the replacement (`<name>_new`).
    pub replacement_name: String,
}

impl TargetIndex {
    /// Schema-qualified, quoted index name.
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.schema, &self.name)
    }

    /// Schema-qualified, quoted replacement name.
    pub fn qualified_replacement(&self) -> String {
        qualified_name(&self.schema, &self.replacement_name)
    }

    /// Schema-qualified, quoted table name.
    pub fn qualified_table(&self) -> String {
        qualified_name(&self.schema, &self.table)
    }
}

/// Validity of a replacement after a concurrent build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Usable by the planner.
    Valid,
    /// Left behind by a failed or interrupted build.
    Invalid,
    /// No such index (the build never created it).
    Missing,
}

/// Read-only view of the system catalog.
pub struct CatalogInspector;

impl CatalogInspector {
    /// Resolves `name` to its owning table and primary-key status and reads
    /// its definition.
    ///
    /// Returns `None` unless exactly one catalog row matches, which covers
    /// both a missing index and one that exists in several schemas.
    pub fn resolve_index<B: Backend>(
        exec: &mut StatementExecutor<B>,
        name: &str,
    ) -> Result<Option<TargetIndex>> {
        let rows = exec.query(RESOLVE_SQL, &[name])?;
        if rows.len() != 1 {
            debug!("{} catalog rows for index {}", rows.len(), name);
            return Ok(None);
        }
        let row = &rows[0];
        let schema = row.text(0)?.to_string();
        let table = row.text(1)?.to_string();
        let is_primary_key = row.bool(2)?;
        trace!("idx table: {}.{}, is_pk: {}", schema, table, is_primary_key);

        let Some((source_definition, replacement_definition)) =
            Self::fetch_definition(exec, &schema, name)?
        else {
            return Ok(None);
        };

        Ok(Some(TargetIndex {
            schema,
            name: name.to_string(),
            table,
            is_primary_key,
            source_definition,
            replacement_definition,
            replacement_name: replacement_name(name),
        }))
    }

    /// Reads the definition of `schema.name` and derives the non-blocking,
    /// renamed definition of its replacement.
    pub fn fetch_definition<B: Backend>(
        exec: &mut StatementExecutor<B>,
        schema: &str,
        name: &str,
    ) -> Result<Option<(String, String)>> {
        let rows = exec.query(DEFINITION_SQL, &[schema, name])?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let original = row.text(0)?.to_string();
        let replacement = replacement_sql(&original).map_err(|e| {
            ReindexError::UnsupportedDefinition {
                index: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Some((original, replacement)))
    }

    /// Indexes of `table` ordered by name. `table` may be `schema.table`.
    pub fn list_table_indexes<B: Backend>(
        exec: &mut StatementExecutor<B>,
        table: &str,
    ) -> Result<Vec<String>> {
        let rows = match table.split_once('.') {
            Some((schema, table)) => exec.query(SCHEMA_TABLE_INDEXES_SQL, &[schema, table])?,
            None => exec.query(TABLE_INDEXES_SQL, &[table])?,
        };
        rows.iter()
            .map(|row| row.text(0).map(str::to_string))
            .collect()
    }

    /// Validity flag of `schema.name`.
    pub fn validity<B: Backend>(
        exec: &mut StatementExecutor<B>,
        schema: &str,
        name: &str,
    ) -> Result<Validity> {
        let rows = exec.query(VALIDITY_SQL, &[schema, name])?;
        match rows.first() {
            Some(row) if row.bool(1)? => Ok(Validity::Valid),
            Some(_) => Ok(Validity::Invalid),
            None => Ok(Validity::Missing),
        }
    }

    /// On-disk size of `schema.name` in bytes (zero if it cannot be read).
    pub fn relation_size<B: Backend>(
        exec: &mut StatementExecutor<B>,
        schema: &str,
        name: &str,
    ) -> Result<u64> {
        let relation = qualified_name(schema, name);
        let rows = exec.query(SIZE_SQL, &[relation.as_str()])?;
        match rows.first() {
            Some(row) => Ok(u64::try_from(row.int(0)?).unwrap_or(0)),
            None => Ok(0),
        }
    }
}

//! Merges per-job output databases into the consolidated store.
//!
//! Schemas are discovered, not hard-coded: the first job that declares a
//! target table donates that table's own definition, extended with a
//! `geometry` provenance column. The tag is injected into the attached
//! source table before copying, so a single `INSERT .. SELECT *` carries
//! it without any column-order bookkeeping.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use thiserror::Error;
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::job::Job;
use crate::manifest::{OutputDecl, OutputKind};

/// Name of the provenance column appended to every merged table.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Alias each job's output database is attached under.
const SOURCE_ALIAS: &str = "src";

/// Errors raised during a merge run. Any of them aborts the whole merge;
/// outputs committed before the failure stay in the store.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The consolidated store could not be opened or created.
    #[error("Could not open consolidated store {path}: {source}")]
    OpenStore {
        path: PathBuf,
        source: rusqlite::Error,
    },
    /// A job's output database could not be attached.
    #[error("Job {job}: could not attach output database {path}: {source}")]
    Attach {
        job: String,
        path: PathBuf,
        source: rusqlite::Error,
    },
    /// A declared target table does not exist in the job's output.
    #[error("Job {job}: output database {path} has no table \"{table}\"")]
    MissingTable {
        job: String,
        path: PathBuf,
        table: String,
    },
    /// Tagging or copying rows for one target failed.
    #[error("Job {job}: merging table \"{table}\" failed: {source}")]
    Copy {
        job: String,
        table: String,
        source: rusqlite::Error,
    },
    /// Any other store-level query failure.
    #[error("Database query failed: {0}")]
    Sql(#[from] rusqlite::Error),
}

/// Counters describing one completed merge run.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeSummary {
    /// Output databases attached and copied.
    pub outputs_merged: usize,
    /// Target tables whose schema this run created in the store.
    pub tables_created: usize,
    /// Total rows copied into the store.
    pub rows_copied: usize,
}

/// Merge every database output of every job, in catalog order, into the
/// store at `store_path`. The store is created if absent and extended if
/// present. All-or-nothing: the first failure aborts the run.
pub fn merge(catalog: &Catalog, store_path: &Path) -> Result<MergeSummary, MergeError> {
    let mut conn = Connection::open(store_path).map_err(|source| MergeError::OpenStore {
        path: store_path.to_path_buf(),
        source,
    })?;
    info!(
        "Merging {} jobs into {}",
        catalog.len(),
        store_path.display()
    );
    // Memoized "have we created this target" check; pre-existing tables
    // in the store count as created.
    let mut created: HashSet<String> = HashSet::new();
    let mut summary = MergeSummary::default();
    for job in catalog.jobs() {
        for output in &job.outputs {
            match output.kind {
                OutputKind::Database => {
                    merge_output(&mut conn, job, output, &mut created, &mut summary)?;
                }
            }
        }
    }
    info!(
        "Merge complete: {} rows into {} tables from {} outputs",
        summary.rows_copied,
        created.len(),
        summary.outputs_merged
    );
    Ok(summary)
}

fn merge_output(
    conn: &mut Connection,
    job: &Job,
    output: &OutputDecl,
    created: &mut HashSet<String>,
    summary: &mut MergeSummary,
) -> Result<(), MergeError> {
    let source_path = job.dir.join(&output.path);
    // ATTACH must run outside any transaction.
    conn.execute(
        &format!("ATTACH DATABASE ?1 AS {SOURCE_ALIAS}"),
        params![source_path.to_string_lossy().into_owned()],
    )
    .map_err(|source| MergeError::Attach {
        job: job.id.clone(),
        path: source_path.clone(),
        source,
    })?;

    let copied = copy_targets(conn, job, output, &source_path, created, summary);
    let detached = conn.execute_batch(&format!("DETACH DATABASE {SOURCE_ALIAS}"));
    copied?;
    detached?;
    summary.outputs_merged += 1;
    Ok(())
}

/// Copy every declared target of one output inside a single transaction,
/// committed once all targets are in.
fn copy_targets(
    conn: &mut Connection,
    job: &Job,
    output: &OutputDecl,
    source_path: &Path,
    created: &mut HashSet<String>,
    summary: &mut MergeSummary,
) -> Result<(), MergeError> {
    let tx = conn.transaction()?;
    for target in &output.targets {
        let source_sql = source_table_sql(&tx, target)?.ok_or_else(|| {
            MergeError::MissingTable {
                job: job.id.clone(),
                path: source_path.to_path_buf(),
                table: target.clone(),
            }
        })?;

        if !created.contains(target) && !store_table_exists(&tx, target)? {
            // The source's own definition, verbatim, plus the provenance
            // column.
            tx.execute_batch(&source_sql)?;
            tx.execute_batch(&format!(
                "ALTER TABLE main.{} ADD COLUMN {GEOMETRY_COLUMN} TEXT",
                quote_ident(target)
            ))?;
            summary.tables_created += 1;
            debug!("Created table {target} from job {}", job.id);
        }
        created.insert(target.clone());

        let copied = tag_and_copy(&tx, job, target);
        let rows = copied.map_err(|source| MergeError::Copy {
            job: job.id.clone(),
            table: target.clone(),
            source,
        })?;
        summary.rows_copied += rows;
        info!("Merged {rows} rows from job {} into {target}", job.id);
    }
    tx.commit()?;
    Ok(())
}

/// Tag the attached source table with the job's geometry in place, then
/// copy every row into the store via a full select.
fn tag_and_copy(tx: &Transaction<'_>, job: &Job, target: &str) -> Result<usize, rusqlite::Error> {
    let quoted = quote_ident(target);
    tx.execute_batch(&format!(
        "ALTER TABLE {SOURCE_ALIAS}.{quoted} ADD COLUMN {GEOMETRY_COLUMN} TEXT"
    ))?;
    tx.execute(
        &format!("UPDATE {SOURCE_ALIAS}.{quoted} SET {GEOMETRY_COLUMN} = ?1"),
        params![job.geometry],
    )?;
    tx.execute(
        &format!("INSERT INTO main.{quoted} SELECT * FROM {SOURCE_ALIAS}.{quoted}"),
        params![],
    )
}

/// The `CREATE TABLE` statement for `table` inside the attached source,
/// or `None` when the source has no such table.
fn source_table_sql(
    tx: &Transaction<'_>,
    table: &str,
) -> Result<Option<String>, rusqlite::Error> {
    tx.query_row(
        &format!(
            "SELECT sql FROM {SOURCE_ALIAS}.sqlite_master WHERE type = 'table' AND name = ?1"
        ),
        params![table],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

fn store_table_exists(tx: &Transaction<'_>, table: &str) -> Result<bool, rusqlite::Error> {
    tx.query_row(
        "SELECT 1 FROM main.sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

/// Double-quote an identifier for direct inclusion in SQL text. Target
/// names come from job manifests, not from a trusted schema.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(quote_ident("Report"), "\"Report\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}

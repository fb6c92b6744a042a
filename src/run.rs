//! Wires the catalog, worker pool, coordinator and merge into one run.

use std::{
    path::PathBuf,
    thread::{self, JoinHandle},
};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::catalog::{Catalog, CatalogError};
use crate::dispatch::{self, DispatchError, WorkerLoop, WorkerReport};
use crate::merge::{self, MergeError, MergeSummary};

/// Default consolidated-store filename inside the collection root.
pub const DEFAULT_STORE_NAME: &str = "consolidated.db";

/// Environment variable overriding the default worker count.
pub const WORKERS_ENV: &str = "SIMBATCH_WORKERS";

/// Errors that end a run with a non-zero exit.
#[derive(Debug, Error)]
pub enum RunError {
    /// The collection failed validation; no job was dispatched.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// The dispatch protocol broke down mid-run.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// The merge aborted; the store may be partially written.
    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// Caller-facing knobs for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Collection root containing one subdirectory per job.
    pub collection: PathBuf,
    /// Consolidated-store path; defaults to the collection root.
    pub output: Option<PathBuf>,
    /// Worker-pool size; resolved via [`worker_count_with_override`].
    pub workers: Option<usize>,
}

/// What a completed run produced.
#[derive(Debug)]
pub struct RunReport {
    /// Where the consolidated store was written.
    pub store: PathBuf,
    /// Jobs dispatched, equal to the catalog size.
    pub jobs: usize,
    /// Jobs whose command exited zero.
    pub succeeded: usize,
    /// Jobs that exited non-zero or could not be started.
    pub failed: usize,
    /// Merge-side counters.
    pub merge: MergeSummary,
}

/// Execute a full batch: scan the collection, dispatch every job to a
/// worker pool, then merge all declared outputs into the store.
///
/// A catalog failure still hands every worker a clean termination before
/// the error surfaces. Failing jobs do not stop dispatch; the merge will
/// report them when their outputs are missing.
pub fn run(options: &RunOptions) -> Result<RunReport, RunError> {
    let workers = worker_count_with_override(options.workers);
    let store = options
        .output
        .clone()
        .unwrap_or_else(|| options.collection.join(DEFAULT_STORE_NAME));
    info!(
        "Running collection {} with {workers} workers",
        options.collection.display()
    );

    let catalog = Catalog::scan(&options.collection);
    let (coordinator, endpoints) = dispatch::wire(workers);
    let handles: Vec<JoinHandle<Result<WorkerReport, DispatchError>>> = endpoints
        .into_iter()
        .map(|endpoint| thread::spawn(move || WorkerLoop::new(endpoint).run()))
        .collect();

    let outcome: Result<(Catalog, usize), RunError> = match catalog {
        Ok(catalog) => {
            let jobs = catalog.jobs().to_vec();
            match coordinator.dispatch(jobs) {
                Ok(report) => Ok((catalog, report.dispatched)),
                Err(err) => Err(err.into()),
            }
        }
        Err(err) => {
            // Workers still get a clean termination handshake before the
            // configuration error surfaces.
            if let Err(abort_err) = coordinator.abort() {
                warn!("Termination handshake incomplete: {abort_err}");
            }
            Err(err.into())
        }
    };

    let mut pool = WorkerReport::default();
    for (worker, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(report)) => {
                pool.succeeded += report.succeeded;
                pool.failed += report.failed;
            }
            Ok(Err(err)) => error!("Worker {worker} failed: {err}"),
            Err(_) => error!("Worker {worker} panicked"),
        }
    }

    let (catalog, dispatched) = outcome?;
    info!(
        "Dispatch finished: {dispatched} jobs, {} succeeded, {} failed",
        pool.succeeded, pool.failed
    );
    let merge = merge::merge(&catalog, &store)?;
    Ok(RunReport {
        store,
        jobs: dispatched,
        succeeded: pool.succeeded,
        failed: pool.failed,
        merge,
    })
}

/// Resolve the worker-pool size: an explicit override wins, then the
/// `SIMBATCH_WORKERS` environment variable, then available parallelism
/// minus one, never below one.
pub fn worker_count_with_override(override_count: Option<usize>) -> usize {
    if let Some(count) = override_count {
        if count >= 1 {
            return count;
        }
    }
    if let Ok(value) = std::env::var(WORKERS_ENV) {
        if let Ok(parsed) = value.trim().parse::<usize>() {
            if parsed >= 1 {
                return parsed;
            }
        }
    }
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins() {
        assert_eq!(worker_count_with_override(Some(7)), 7);
    }

    #[test]
    fn resolved_count_is_at_least_one() {
        assert!(worker_count_with_override(None) >= 1);
    }
}

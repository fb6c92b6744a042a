//! Scans a collection directory into an immutable, ordered set of jobs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::job::{Job, JobError};

/// Optional collection-level metadata filename at the collection root.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Errors raised while building a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The collection root is missing or not a directory.
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),
    /// The collection root could not be enumerated.
    #[error("Could not scan collection {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A job subdirectory failed validation.
    #[error(transparent)]
    Job(#[from] JobError),
    /// `metadata.json` exists but could not be read.
    #[error("Could not read collection metadata {path}: {source}")]
    ReadMetadata {
        path: PathBuf,
        source: std::io::Error,
    },
    /// `metadata.json` exists but is not parseable JSON.
    #[error("Collection metadata {path} is invalid: {source}")]
    Metadata {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Immutable, ordered set of jobs found under one collection root.
///
/// Construction is all-or-nothing: one invalid job subdirectory fails the
/// whole catalog, so dispatch never starts on a partial collection.
#[derive(Debug)]
pub struct Catalog {
    root: PathBuf,
    jobs: Vec<Job>,
    metadata: Option<serde_json::Value>,
}

impl Catalog {
    /// Scan the immediate subdirectories of `root` into jobs, in name
    /// order, and load `metadata.json` if one is present.
    pub fn scan(root: &Path) -> Result<Self, CatalogError> {
        if !root.is_dir() {
            return Err(CatalogError::NotADirectory(root.to_path_buf()));
        }
        let entries = fs::read_dir(root).map_err(|source| CatalogError::Scan {
            path: root.to_path_buf(),
            source,
        })?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Scan {
                path: root.to_path_buf(),
                source,
            })?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        // Name order makes catalog (and therefore dispatch) order stable
        // across platforms and reruns.
        dirs.sort();

        let mut jobs = Vec::with_capacity(dirs.len());
        for dir in &dirs {
            jobs.push(Job::from_dir(dir)?);
        }
        let metadata = load_metadata(root)?;
        info!("Found {} jobs in {}", jobs.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            jobs,
            metadata,
        })
    }

    /// Collection root this catalog was scanned from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Jobs in dispatch order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Number of jobs in the catalog.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the collection holds no jobs at all.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Collection-level metadata document, if one was present.
    pub fn metadata(&self) -> Option<&serde_json::Value> {
        self.metadata.as_ref()
    }
}

fn load_metadata(root: &Path) -> Result<Option<serde_json::Value>, CatalogError> {
    let path = root.join(METADATA_FILE_NAME);
    if !path.is_file() {
        return Ok(None);
    }
    let text = fs::read_to_string(&path).map_err(|source| CatalogError::ReadMetadata {
        path: path.clone(),
        source,
    })?;
    let value = serde_json::from_str(&text).map_err(|source| CatalogError::Metadata {
        path: path.clone(),
        source,
    })?;
    Ok(Some(value))
}

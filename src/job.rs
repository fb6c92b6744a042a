//! Validated in-memory form of one simulation job directory.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::manifest::{self, Manifest, ManifestError, OutputDecl};

/// Errors raised while constructing a job from its directory.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job path does not point at a directory.
    #[error("Job directory {0} not found")]
    NotADirectory(PathBuf),
    /// The job directory exists but could not be resolved to an absolute path.
    #[error("Could not resolve job directory {path}: {source}")]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The manifest inside the directory is missing or malformed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// One unit of work: a directory holding a manifest, a shell command and
/// everything the command needs to run.
///
/// Constructed once by the catalog and immutable afterwards; workers
/// receive clones.
#[derive(Debug, Clone)]
pub struct Job {
    /// Identifier derived from the directory name; unique within a run.
    pub id: String,
    /// Absolute directory the command runs in and outputs land under.
    pub dir: PathBuf,
    /// Shell command, opaque to the scheduler.
    pub command: String,
    /// Provenance tag copied onto every merged output row.
    pub geometry: String,
    /// Declared result artifacts, in manifest order.
    pub outputs: Vec<OutputDecl>,
}

impl Job {
    /// Build a job from its directory, reading and validating its manifest.
    pub fn from_dir(dir: &Path) -> Result<Self, JobError> {
        if !dir.is_dir() {
            return Err(JobError::NotADirectory(dir.to_path_buf()));
        }
        let dir = dir.canonicalize().map_err(|source| JobError::Resolve {
            path: dir.to_path_buf(),
            source,
        })?;
        let id = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());
        let manifest = Manifest::load(&dir.join(manifest::MANIFEST_FILE_NAME))?;
        Ok(Self {
            id,
            dir,
            command: manifest.command,
            geometry: manifest.geometry,
            outputs: manifest.outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn job_id_comes_from_directory_name() {
        let root = tempdir().unwrap();
        let dir = root.path().join("sim_042");
        fs::create_dir(&dir).unwrap();
        fs::write(
            dir.join(manifest::MANIFEST_FILE_NAME),
            r#"{"command": "true", "geometry": "POINT(0 0)", "outputs": []}"#,
        )
        .unwrap();

        let job = Job::from_dir(&dir).unwrap();
        assert_eq!(job.id, "sim_042");
        assert!(job.dir.is_absolute());
        assert_eq!(job.command, "true");
    }

    #[test]
    fn missing_directory_is_rejected() {
        let root = tempdir().unwrap();
        let err = Job::from_dir(&root.path().join("absent")).unwrap_err();
        assert!(matches!(err, JobError::NotADirectory(_)));
    }

    #[test]
    fn missing_manifest_is_rejected() {
        let root = tempdir().unwrap();
        let dir = root.path().join("bare");
        fs::create_dir(&dir).unwrap();
        let err = Job::from_dir(&dir).unwrap_err();
        assert!(matches!(
            err,
            JobError::Manifest(ManifestError::Read { .. })
        ));
    }
}

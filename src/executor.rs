//! Executes a single job's command and captures its output streams.

use std::{
    fs::{self, File},
    path::PathBuf,
    process::Command,
};

use thiserror::Error;
use tracing::{error, warn};

use crate::job::Job;

/// Filename capturing the job command's standard output.
pub const STDOUT_CAPTURE: &str = ".stdout";
/// Filename capturing the job command's standard error.
pub const STDERR_CAPTURE: &str = ".stderr";
/// Marker file written into the job directory after a successful run.
pub const OK_MARKER: &str = ".ok";

/// Errors raised while setting up or starting a job's process.
///
/// A non-zero exit status is not an error here; it is the `Ok(false)`
/// return of [`execute`].
#[derive(Debug, Error)]
pub enum ExecError {
    /// A capture file could not be created inside the job directory.
    #[error("Could not create capture file {path}: {source}")]
    CreateCapture {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The shell itself could not be started.
    #[error("Could not run shell for job {job}: {source}")]
    Spawn {
        job: String,
        source: std::io::Error,
    },
    /// The success marker could not be written after a zero exit.
    #[error("Could not write success marker {path}: {source}")]
    WriteMarker {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Run `job`'s command exactly once via `sh -c` inside its directory.
///
/// Stdout and stderr are truncated into fixed capture files each run.
/// Returns `Ok(false)` when the command exits non-zero; the exit status
/// is authoritative, so declared outputs that are missing afterwards are
/// logged as warnings only. No retry, no backoff, no timeout.
pub fn execute(job: &Job) -> Result<bool, ExecError> {
    let stdout_path = job.dir.join(STDOUT_CAPTURE);
    let stderr_path = job.dir.join(STDERR_CAPTURE);
    let marker_path = job.dir.join(OK_MARKER);
    let stdout = File::create(&stdout_path).map_err(|source| ExecError::CreateCapture {
        path: stdout_path.clone(),
        source,
    })?;
    let stderr = File::create(&stderr_path).map_err(|source| ExecError::CreateCapture {
        path: stderr_path.clone(),
        source,
    })?;
    // A marker from an earlier run must not outlive a failing rerun.
    let _ = fs::remove_file(&marker_path);

    let status = Command::new("sh")
        .arg("-c")
        .arg(&job.command)
        .current_dir(&job.dir)
        .stdout(stdout)
        .stderr(stderr)
        .status()
        .map_err(|source| ExecError::Spawn {
            job: job.id.clone(),
            source,
        })?;

    let succeeded = status.success();
    if succeeded {
        File::create(&marker_path).map_err(|source| ExecError::WriteMarker {
            path: marker_path.clone(),
            source,
        })?;
    } else {
        error!(
            "Job {} failed with {status}; see {} and {}",
            job.id,
            stdout_path.display(),
            stderr_path.display()
        );
    }

    for output in &job.outputs {
        let path = job.dir.join(&output.path);
        if !path.exists() {
            warn!(
                "Job {} finished but declared output {} was not generated",
                job.id,
                path.display()
            );
        }
    }

    Ok(succeeded)
}

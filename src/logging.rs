//! Logging setup for the application.
//!
//! Initializes a global tracing subscriber that writes to both stdout and
//! a per-run log file inside the collection root. Files are timestamped
//! and kept to a bounded count to avoid unbounded growth. When the file
//! side cannot be set up, logging degrades to stdout only instead of
//! aborting the run.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
    time::SystemTime,
};

use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*};

/// Maximum number of log files to retain.
const MAX_LOG_FILES: usize = 10;
const LOG_FILE_PREFIX: &str = "simbatch";

/// Directory under the collection root that receives run logs.
pub const LOG_DIR_NAME: &str = ".simbatch_logs";

/// Environment variable controlling the log filter.
pub const LOG_FILTER_ENV: &str = "SIMBATCH_LOG";

static INIT: OnceLock<()> = OnceLock::new();
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Errors that may occur while setting up the log file.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The collection root is missing, so there is nowhere to log into.
    #[error("No log directory available under {0}")]
    NoLogDir(PathBuf),
    /// Failed to create or access the log directory.
    #[error("Failed to prepare log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to enumerate existing log files for pruning.
    #[error("Failed to read log directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to remove an obsolete log file.
    #[error("Failed to remove old log file {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to format a timestamp for the log filename.
    #[error("Failed to format log filename time: {0}")]
    FormatTime(time::error::Format),
    /// Failed to set the global tracing subscriber.
    #[error("Failed to install global tracing subscriber: {0}")]
    SetGlobal(tracing::subscriber::SetGlobalDefaultError),
    /// Failed to create the initial log file for this run.
    #[error("Failed to create log file at {path}: {source}")]
    CreateLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Initialize tracing to write to stdout and a per-run log file under
/// `collection`.
///
/// Subsequent calls are no-ops. When the log file cannot be prepared
/// (for example, the collection path is wrong), the subscriber is still
/// installed with the stdout layer so the run reports its errors.
pub fn init(collection: &Path) -> Result<(), LoggingError> {
    if INIT.get().is_some() {
        return Ok(());
    }

    let timer = build_timer();
    let stdout_layer = fmt::layer()
        .with_timer(timer.clone())
        .with_writer(std::io::stdout);
    let registry = Registry::default()
        .with(build_env_filter())
        .with(stdout_layer);

    match build_file_writer(collection) {
        Ok((file_writer, guard, log_path)) => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(file_writer);
            tracing::subscriber::set_global_default(registry.with(file_layer))
                .map_err(LoggingError::SetGlobal)?;
            let _ = LOG_GUARD.set(guard);
            let _ = INIT.set(());
            tracing::info!("Logging initialized; log file at {}", log_path.display());
        }
        Err(err) => {
            tracing::subscriber::set_global_default(registry).map_err(LoggingError::SetGlobal)?;
            let _ = INIT.set(());
            tracing::warn!("File logging disabled: {err}");
        }
    }
    Ok(())
}

/// Prepare the per-run log file and its non-blocking writer.
fn build_file_writer(
    collection: &Path,
) -> Result<
    (
        tracing_appender::non_blocking::NonBlocking,
        WorkerGuard,
        PathBuf,
    ),
    LoggingError,
> {
    if !collection.is_dir() {
        return Err(LoggingError::NoLogDir(collection.to_path_buf()));
    }
    let log_dir = collection.join(LOG_DIR_NAME);
    fs::create_dir_all(&log_dir).map_err(|source| LoggingError::CreateDir {
        path: log_dir.clone(),
        source,
    })?;
    let log_file_name = format_log_file_name(now_local_or_utc())?;
    let log_path = log_dir.join(&log_file_name);
    ensure_file_exists(&log_path)?;

    let file_appender = rolling::never(&log_dir, log_file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    prune_old_logs(&log_dir, MAX_LOG_FILES)?;
    Ok((file_writer, guard, log_path))
}

fn ensure_file_exists(path: &Path) -> Result<(), LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
        .map_err(|source| LoggingError::CreateLogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn prune_old_logs(dir: &Path, max_files: usize) -> Result<(), LoggingError> {
    let mut entries = fs::read_dir(dir)
        .map_err(|source| LoggingError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_file()).unwrap_or(false))
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("log"))
        .map(|entry| {
            let modified = entry
                .metadata()
                .and_then(|meta| meta.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, entry.path())
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|(modified, _)| *modified);
    while entries.len() > max_files {
        if let Some((_, path)) = entries.first() {
            fs::remove_file(path).map_err(|source| LoggingError::RemoveFile {
                path: path.to_path_buf(),
                source,
            })?;
        }
        entries.remove(0);
    }
    Ok(())
}

fn format_log_file_name(now: OffsetDateTime) -> Result<String, LoggingError> {
    const NAME_FORMAT: &[FormatItem<'_>] =
        format_description!("[year]-[month]-[day]_[hour]-[minute]-[second]");
    let name = now.format(NAME_FORMAT).map_err(LoggingError::FormatTime)?;
    Ok(format!("{LOG_FILE_PREFIX}_{name}.log"))
}

fn build_timer() -> fmt::time::OffsetTime<time::format_description::BorrowedFormatItem<'static>> {
    const DISPLAY_FORMAT: &[FormatItem<'static>] =
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    fmt::time::OffsetTime::new(offset, DISPLAY_FORMAT.into())
}

fn now_local_or_utc() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

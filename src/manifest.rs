//! Parsing and normalization of per-job `simulation.json` manifests.
//!
//! The manifest format has drifted over time: `type` was once spelled
//! `"sqlite"` and `targets` was once a single table name rather than a
//! list. Every historical shape is normalized here, so the rest of the
//! crate only ever sees the canonical forms.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Manifest filename expected inside every job directory.
pub const MANIFEST_FILE_NAME: &str = "simulation.json";

/// Errors raised while reading or normalizing a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file could not be read at all.
    #[error("Required manifest {path} could not be read: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The manifest is not valid JSON or is missing required fields.
    #[error("Manifest {path} is invalid: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The `command` field is present but blank.
    #[error("Manifest {path}: field \"command\" must not be empty")]
    EmptyCommand { path: PathBuf },
    /// An output declares a `type` this crate cannot merge.
    #[error("Manifest {path}: output {output} has unsupported type \"{kind}\"")]
    UnsupportedKind {
        path: PathBuf,
        output: PathBuf,
        kind: String,
    },
    /// A database output declares no target tables.
    #[error("Manifest {path}: output {output} declares no target tables")]
    NoTargets { path: PathBuf, output: PathBuf },
}

/// Validated manifest contents in canonical shape.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Shell command executing the simulation.
    pub command: String,
    /// Opaque provenance tag attached to every merged output row.
    pub geometry: String,
    /// Declared result artifacts, in manifest order.
    pub outputs: Vec<OutputDecl>,
}

/// Canonical form of one declared output artifact.
#[derive(Debug, Clone)]
pub struct OutputDecl {
    /// Output file path relative to the job directory.
    pub path: PathBuf,
    /// What kind of artifact the path points at.
    pub kind: OutputKind,
    /// Tables inside the artifact to merge; never empty.
    pub targets: Vec<String>,
}

/// Kinds of output artifacts a job may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// SQLite database whose target tables feed the consolidated store.
    Database,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    command: String,
    geometry: String,
    outputs: Vec<RawOutput>,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    path: PathBuf,
    #[serde(rename = "type")]
    kind: String,
    targets: RawTargets,
}

/// `targets` as written: a single name (legacy) or a sequence of names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTargets {
    One(String),
    Many(Vec<String>),
}

impl Manifest {
    /// Read and normalize the manifest at `path`.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawManifest =
            serde_json::from_str(&text).map_err(|source| ManifestError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if raw.command.trim().is_empty() {
            return Err(ManifestError::EmptyCommand {
                path: path.to_path_buf(),
            });
        }
        let mut outputs = Vec::with_capacity(raw.outputs.len());
        for output in raw.outputs {
            outputs.push(normalize_output(path, output)?);
        }
        Ok(Self {
            command: raw.command,
            geometry: raw.geometry,
            outputs,
        })
    }
}

fn normalize_output(manifest: &Path, raw: RawOutput) -> Result<OutputDecl, ManifestError> {
    let kind = match raw.kind.as_str() {
        // "sqlite" is the legacy spelling of the database kind.
        "database" | "sqlite" => OutputKind::Database,
        _ => {
            return Err(ManifestError::UnsupportedKind {
                path: manifest.to_path_buf(),
                output: raw.path,
                kind: raw.kind,
            });
        }
    };
    let targets = match raw.targets {
        RawTargets::One(name) => vec![name],
        RawTargets::Many(names) => names,
    };
    if targets.is_empty() {
        return Err(ManifestError::NoTargets {
            path: manifest.to_path_buf(),
            output: raw.path,
        });
    }
    Ok(OutputDecl {
        path: raw.path,
        kind,
        targets,
    })
}

//! Engine configuration backends for ctk-runtime.
//!
//! Each supported container engine implements `EngineBackend`: a set of pure
//! transformations over the engine's own configuration document that add or
//! remove a runtime handler entry and set or clear the default runtime.
//! `ConfigFile` provides the read / atomic-write protocol around those
//! transformations so a live engine never observes a half-written file.

pub mod backend;
pub mod containerd;
pub mod crio;
pub mod docker;
pub mod document;
pub mod file;

pub use backend::{select_engine, EngineBackend, SUPPORTED_ENGINES};
pub use containerd::ContainerdBackend;
pub use crio::CrioBackend;
pub use docker::DockerBackend;
pub use document::{ConfigDocument, DocumentError, DocumentFormat};
pub use file::{ConfigFile, Removal, StagedConfig};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` survives power loss.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported container engine '{0}' (supported: docker, containerd, crio)")]
    UnsupportedEngine(String),
    #[error("failed to read engine config: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse engine config: {source}")]
    Parse {
        path: PathBuf,
        source: DocumentError,
    },
    #[error("failed to write engine config: {source}")]
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to render engine config: {source}")]
    Render {
        path: PathBuf,
        source: DocumentError,
    },
    #[error("malformed engine config: '{key}' is not {expected}")]
    Malformed { key: String, expected: &'static str },
    #[error("{engine} config schema version {version} is not supported")]
    UnsupportedSchema { engine: &'static str, version: i64 },
    #[error("{engine} expects a {expected} config document, got {found}")]
    FormatMismatch {
        engine: &'static str,
        expected: DocumentFormat,
        found: DocumentFormat,
    },
}

impl EngineError {
    /// Path of the config file involved, when the error is tied to one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            EngineError::ConfigRead { path, .. }
            | EngineError::Parse { path, .. }
            | EngineError::ConfigWrite { path, .. }
            | EngineError::Render { path, .. } => Some(path),
            _ => None,
        }
    }
}

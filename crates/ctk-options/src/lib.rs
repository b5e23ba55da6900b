//! Options model for ctk-runtime.
//!
//! This crate turns raw, possibly partial input (`RawOptions`, from flags,
//! environment or a TOML options file) into a validated, immutable `Options`
//! value. Sentinel values are resolved against the `EngineDefaults` of the
//! targeted engine, and restart-mode specific requirements such as the host
//! root mount are checked before anything touches the engine configuration.

pub mod file;
pub mod host;
pub mod mode;
pub mod options;

pub use file::{load_raw_options, parse_raw_options_str};
pub use host::translate_host_path;
pub use mode::RestartMode;
pub use options::{
    validate_runtime_name, EngineDefaults, Options, RawOptions, DEFAULT_HOST_ROOT_MOUNT,
    DEFAULT_RESTART_TIMEOUT, DEFAULT_RUNTIME_EXECUTABLE, DEFAULT_RUNTIME_NAME,
    DEFAULT_SET_AS_DEFAULT, RUNTIME_SPECIFIC_DEFAULT,
};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read options file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse options file: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid runtime name '{name}': {reason}")]
    InvalidRuntimeName { name: String, reason: &'static str },
    #[error("unknown restart mode '{0}', expected one of: signal, systemd, none")]
    UnknownRestartMode(String),
    #[error("restart mode 'systemd' requires a host root mount")]
    MissingHostRoot,
    #[error("host root mount '{}' does not exist or is not a directory", .0.display())]
    HostRootNotFound(PathBuf),
    #[error("host root mount '{}' must be an absolute path", .0.display())]
    RelativeHostRoot(PathBuf),
    #[error("{field} must not be empty")]
    EmptyPath { field: &'static str },
    #[error("restart timeout must be greater than zero")]
    ZeroTimeout,
    #[error("runtime executable '{0}' must be a bare file name")]
    InvalidExecutable(String),
}

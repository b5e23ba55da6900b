//! Setup and cleanup orchestration for ctk-runtime.
//!
//! This crate ties the options model, the engine configuration backends and
//! the restart strategies together into the `Orchestrator`: resolve the
//! backend and restart strategy for an engine once, apply the runtime
//! registration (or its removal) to the engine's config file atomically, and
//! then restart the engine. Configuration failures and restart failures are
//! reported as distinct `CoreError` variants.

pub mod orchestrator;

pub use orchestrator::{
    cleanup, setup, validate_options, ConfigChange, Operation, Orchestrator, Report,
};

use ctk_engine::EngineError;
use ctk_options::OptionsError;
use ctk_restart::RestartError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] OptionsError),
    #[error("unsupported container engine '{0}' (supported: docker, containerd, crio)")]
    UnsupportedEngine(String),
    #[error("{engine} config '{}': {source}", .config_path.display())]
    Config {
        engine: &'static str,
        config_path: PathBuf,
        source: EngineError,
    },
    #[error(
        "{engine} config '{}' is in place, but the restart failed: {source}",
        .config_path.display()
    )]
    Restart {
        engine: &'static str,
        config_path: PathBuf,
        source: RestartError,
    },
}

impl CoreError {
    /// True when the configuration on disk is final and only the restart
    /// needs attention.
    pub fn config_committed(&self) -> bool {
        matches!(self, CoreError::Restart { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn restart_error_is_committed() {
        let e = CoreError::Restart {
            engine: "docker",
            config_path: PathBuf::from("/etc/docker/daemon.json"),
            source: RestartError::Timeout {
                socket: PathBuf::from("/var/run/docker.sock"),
                waited: Duration::from_secs(1),
            },
        };
        assert!(e.config_committed());
        let msg = e.to_string();
        assert!(msg.contains("/etc/docker/daemon.json"));
        assert!(msg.contains("restart failed"));
    }

    #[test]
    fn config_error_is_not_committed() {
        let e = CoreError::Config {
            engine: "docker",
            config_path: PathBuf::from("/etc/docker/daemon.json"),
            source: EngineError::Malformed {
                key: "runtimes".to_owned(),
                expected: "an object",
            },
        };
        assert!(!e.config_committed());
        let msg = e.to_string();
        assert!(msg.starts_with("docker config '/etc/docker/daemon.json'"), "{msg}");
        assert!(msg.contains("'runtimes' is not an object"), "{msg}");
    }

    #[test]
    fn invalid_configuration_display() {
        let e = CoreError::from(OptionsError::MissingHostRoot);
        assert!(e.to_string().starts_with("invalid configuration"));
    }
}

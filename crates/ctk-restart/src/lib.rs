//! Restart strategies for ctk-runtime.
//!
//! After the engine configuration has been committed, a `Restarter` makes the
//! engine pick it up: by signalling the running daemon, by asking the host's
//! systemd to restart the unit (reaching it through the host root mount when
//! running inside a container), or by doing nothing and reporting that a
//! manual restart is needed. A restart failure never undoes the config write.

pub mod none;
pub mod signal;
pub mod sys;
pub mod systemd;

pub use none::NoRestart;
pub use signal::SignalRestarter;
pub use systemd::{SystemdRestarter, SYSTEMD_CONTROL_SOCKET};

use ctk_options::{Options, RestartMode};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// What a successful restart step achieved.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestartOutcome {
    /// The engine was told to reload and is answering again.
    Restarted,
    /// Nothing was restarted; the engine still runs the old configuration.
    ManualRestartRequired,
    /// No restart was attempted because cleanup found no config file.
    ///
    /// A setup or cleanup that leaves an existing file unchanged still
    /// restarts the engine.
    Skipped,
}

impl RestartOutcome {
    /// Whether the engine is known to run with the new configuration.
    pub fn is_applied(self) -> bool {
        matches!(self, RestartOutcome::Restarted | RestartOutcome::Skipped)
    }
}

#[derive(Debug, Error)]
pub enum RestartError {
    #[error("engine socket '{}' did not become responsive within {waited:?}", .socket.display())]
    Timeout { socket: PathBuf, waited: Duration },
    #[error("init system control socket '{}' not found; is the host root mounted?", .path.display())]
    InitSystemUnavailable { path: PathBuf },
    #[error("cannot reach engine at '{}': {source}", .socket.display())]
    EngineNotRunning {
        socket: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid pid file '{}': {content:?}", .path.display())]
    InvalidPidFile { path: PathBuf, content: String },
    #[error("failed to signal engine pid {pid}: {source}")]
    SignalFailed { pid: i32, source: std::io::Error },
    #[error("'{command}' failed: {detail}")]
    CommandFailed { command: String, detail: String },
    #[error("restart I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Restarter: Send + Sync {
    fn mode(&self) -> RestartMode;

    fn restart(&self) -> Result<RestartOutcome, RestartError>;
}

pub fn select_restarter(options: &Options) -> Box<dyn Restarter> {
    match options.restart_mode {
        RestartMode::Signal => Box::new(SignalRestarter::new(
            &options.socket_path,
            options.pid_file.clone(),
            options.restart_timeout,
        )),
        RestartMode::Systemd => Box::new(SystemdRestarter::new(&options.host_root, &options.unit)),
        RestartMode::None => Box::new(NoRestart::new(&options.unit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_options::{EngineDefaults, RawOptions};
    use std::path::Path;

    fn options(mode: &str, host_root: &Path) -> Options {
        let defaults = EngineDefaults {
            config_path: PathBuf::from("/etc/docker/daemon.json"),
            socket_path: PathBuf::from("/var/run/docker.sock"),
            restart_mode: RestartMode::Signal,
            unit: "docker".to_owned(),
            pid_file: None,
        };
        RawOptions {
            restart_mode: Some(mode.to_owned()),
            host_root: Some(host_root.to_string_lossy().into_owned()),
            ..RawOptions::default()
        }
        .validate(&defaults, Path::new("/opt/rt"))
        .unwrap()
    }

    #[test]
    fn select_matches_mode() {
        let dir = tempfile::tempdir().unwrap();
        for (name, mode) in [
            ("signal", RestartMode::Signal),
            ("systemd", RestartMode::Systemd),
            ("none", RestartMode::None),
        ] {
            assert_eq!(select_restarter(&options(name, dir.path())).mode(), mode);
        }
    }

    #[test]
    fn outcome_applied() {
        assert!(RestartOutcome::Restarted.is_applied());
        assert!(RestartOutcome::Skipped.is_applied());
        assert!(!RestartOutcome::ManualRestartRequired.is_applied());
    }

    #[test]
    fn timeout_display_names_socket() {
        let e = RestartError::Timeout {
            socket: PathBuf::from("/var/run/docker.sock"),
            waited: Duration::from_secs(30),
        };
        let msg = e.to_string();
        assert!(msg.contains("/var/run/docker.sock"));
        assert!(msg.contains("30s"));
    }
}

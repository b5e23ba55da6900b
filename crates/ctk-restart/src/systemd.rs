use crate::{RestartError, RestartOutcome, Restarter};
use ctk_options::{translate_host_path, RestartMode};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// systemd's private control socket, as seen from the host.
pub const SYSTEMD_CONTROL_SOCKET: &str = "/run/systemd/private";

/// Restarts the engine unit through the host's systemd.
///
/// This process may live in a container whose `/` is not the host's, so the
/// control socket is looked up below the host root mount and `systemctl` is
/// run chrooted into it.
#[derive(Debug, Clone)]
pub struct SystemdRestarter {
    host_root: PathBuf,
    unit: String,
    program: PathBuf,
}

impl SystemdRestarter {
    pub fn new(host_root: &Path, unit: &str) -> Self {
        Self {
            host_root: host_root.to_path_buf(),
            unit: unit.to_owned(),
            program: PathBuf::from("chroot"),
        }
    }

    /// Replace the `chroot` launcher. The host root is still passed as the
    /// first argument.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn control_socket(&self) -> PathBuf {
        translate_host_path(&self.host_root, Path::new(SYSTEMD_CONTROL_SOCKET))
    }

    fn command_line(&self) -> String {
        format!(
            "{} {} systemctl restart {}",
            self.program.display(),
            self.host_root.display(),
            self.unit
        )
    }
}

impl Restarter for SystemdRestarter {
    fn mode(&self) -> RestartMode {
        RestartMode::Systemd
    }

    fn restart(&self) -> Result<RestartOutcome, RestartError> {
        let control = self.control_socket();
        if !control.exists() {
            return Err(RestartError::InitSystemUnavailable { path: control });
        }

        info!("restarting {} via systemd", self.unit);
        let output = Command::new(&self.program)
            .arg(&self.host_root)
            .args(["systemctl", "restart", &self.unit])
            .output()
            .map_err(|e| RestartError::CommandFailed {
                command: self.command_line(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            let detail = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                stderr
            };
            return Err(RestartError::CommandFailed {
                command: self.command_line(),
                detail,
            });
        }
        Ok(RestartOutcome::Restarted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn host_with_systemd() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let control = dir.path().join("run/systemd");
        fs::create_dir_all(&control).unwrap();
        fs::write(control.join("private"), "").unwrap();
        dir
    }

    #[test]
    fn control_socket_is_translated_through_host_root() {
        let r = SystemdRestarter::new(Path::new("/host"), "docker");
        assert_eq!(r.control_socket(), PathBuf::from("/host/run/systemd/private"));
    }

    #[test]
    fn missing_control_socket_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let err = SystemdRestarter::new(dir.path(), "docker")
            .with_program("true")
            .restart()
            .unwrap_err();
        assert!(
            matches!(err, RestartError::InitSystemUnavailable { ref path } if path.starts_with(dir.path()))
        );
    }

    #[test]
    fn successful_command_restarts() {
        let host = host_with_systemd();
        let r = SystemdRestarter::new(host.path(), "containerd").with_program("true");
        assert_eq!(r.restart().unwrap(), RestartOutcome::Restarted);
    }

    #[test]
    fn failing_command_is_reported() {
        let host = host_with_systemd();
        let err = SystemdRestarter::new(host.path(), "crio")
            .with_program("false")
            .restart()
            .unwrap_err();
        match err {
            RestartError::CommandFailed { command, .. } => {
                assert!(command.contains("systemctl restart crio"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_program_is_reported() {
        let host = host_with_systemd();
        let err = SystemdRestarter::new(host.path(), "docker")
            .with_program(host.path().join("no-such-chroot"))
            .restart()
            .unwrap_err();
        assert!(matches!(err, RestartError::CommandFailed { .. }));
    }
}

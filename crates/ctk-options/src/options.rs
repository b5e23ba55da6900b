use crate::mode::RestartMode;
use crate::OptionsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Placeholder meaning "use whatever the targeted engine uses by default".
pub const RUNTIME_SPECIFIC_DEFAULT: &str = "RUNTIME_SPECIFIC_DEFAULT";

pub const DEFAULT_RUNTIME_NAME: &str = "nvidia";
pub const DEFAULT_HOST_ROOT_MOUNT: &str = "/host";
pub const DEFAULT_SET_AS_DEFAULT: bool = true;
pub const DEFAULT_RUNTIME_EXECUTABLE: &str = "nvidia-container-runtime";
pub const DEFAULT_RESTART_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-engine locations and restart behaviour used to resolve sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineDefaults {
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    pub restart_mode: RestartMode,
    /// Service unit restarted in `systemd` mode.
    pub unit: String,
    pub pid_file: Option<PathBuf>,
}

/// Unvalidated input, as collected from flags, environment and options files.
///
/// Every field is optional. A missing value and the literal
/// [`RUNTIME_SPECIFIC_DEFAULT`] are treated the same way.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct RawOptions {
    #[serde(default)]
    pub config: Option<String>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub restart_mode: Option<String>,
    #[serde(default)]
    pub host_root: Option<String>,
    #[serde(default)]
    pub runtime_name: Option<String>,
    #[serde(default)]
    pub set_as_default: Option<bool>,
    #[serde(default)]
    pub restart_timeout_secs: Option<u64>,
    #[serde(default)]
    pub runtime_executable: Option<String>,
    #[serde(default)]
    pub pid_file: Option<String>,
}

/// Validated options for one setup or cleanup run.
///
/// Only [`RawOptions::validate`] constructs this; no field holds a sentinel.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Options {
    pub config_path: PathBuf,
    pub socket_path: PathBuf,
    pub restart_mode: RestartMode,
    pub host_root: PathBuf,
    pub runtime_name: String,
    pub set_as_default: bool,
    pub runtime_dir: PathBuf,
    pub runtime_executable: String,
    pub unit: String,
    pub pid_file: Option<PathBuf>,
    pub restart_timeout: Duration,
}

impl RawOptions {
    /// Overlay `other` on top of `self`: fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: RawOptions) -> RawOptions {
        RawOptions {
            config: other.config.or(self.config),
            socket: other.socket.or(self.socket),
            restart_mode: other.restart_mode.or(self.restart_mode),
            host_root: other.host_root.or(self.host_root),
            runtime_name: other.runtime_name.or(self.runtime_name),
            set_as_default: other.set_as_default.or(self.set_as_default),
            restart_timeout_secs: other.restart_timeout_secs.or(self.restart_timeout_secs),
            runtime_executable: other.runtime_executable.or(self.runtime_executable),
            pid_file: other.pid_file.or(self.pid_file),
        }
    }

    /// Resolve sentinels against `defaults` and check every invariant.
    ///
    /// The only filesystem access is a metadata check of the host root when
    /// the resolved restart mode is `systemd`.
    pub fn validate(
        &self,
        defaults: &EngineDefaults,
        runtime_dir: &Path,
    ) -> Result<Options, OptionsError> {
        let config_path = resolve_path(self.config.as_deref(), &defaults.config_path, "config")?;
        let socket_path = resolve_path(self.socket.as_deref(), &defaults.socket_path, "socket")?;

        let restart_mode = match specified(self.restart_mode.as_deref()) {
            Some(mode) => mode.parse()?,
            None => defaults.restart_mode,
        };

        let runtime_name = specified(self.runtime_name.as_deref())
            .unwrap_or(DEFAULT_RUNTIME_NAME)
            .trim()
            .to_owned();
        validate_runtime_name(&runtime_name)?;

        let host_root = PathBuf::from(
            specified(self.host_root.as_deref())
                .unwrap_or(DEFAULT_HOST_ROOT_MOUNT)
                .trim(),
        );
        if restart_mode == RestartMode::Systemd {
            if host_root.as_os_str().is_empty() {
                return Err(OptionsError::MissingHostRoot);
            }
            if !host_root.is_absolute() {
                return Err(OptionsError::RelativeHostRoot(host_root));
            }
            if !host_root.is_dir() {
                return Err(OptionsError::HostRootNotFound(host_root));
            }
        }

        let runtime_executable = specified(self.runtime_executable.as_deref())
            .unwrap_or(DEFAULT_RUNTIME_EXECUTABLE)
            .trim()
            .to_owned();
        if runtime_executable.is_empty() || runtime_executable.contains('/') {
            return Err(OptionsError::InvalidExecutable(runtime_executable));
        }

        let restart_timeout = match self.restart_timeout_secs {
            Some(0) => return Err(OptionsError::ZeroTimeout),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_RESTART_TIMEOUT,
        };

        let pid_file = match specified(self.pid_file.as_deref()) {
            Some(p) if p.trim().is_empty() => {
                return Err(OptionsError::EmptyPath { field: "pid_file" })
            }
            Some(p) => Some(PathBuf::from(p.trim())),
            None => defaults.pid_file.clone(),
        };

        let options = Options {
            config_path,
            socket_path,
            restart_mode,
            host_root,
            runtime_name,
            set_as_default: self.set_as_default.unwrap_or(DEFAULT_SET_AS_DEFAULT),
            runtime_dir: runtime_dir.to_path_buf(),
            runtime_executable,
            unit: defaults.unit.clone(),
            pid_file,
            restart_timeout,
        };
        debug!("validated options: {options:?}");
        Ok(options)
    }
}

impl Options {
    /// Absolute path of the runtime handler the engine is pointed at.
    pub fn handler_path(&self) -> PathBuf {
        self.runtime_dir.join(&self.runtime_executable)
    }
}

/// A runtime handler name must be usable as a map key and a file name.
pub fn validate_runtime_name(name: &str) -> Result<(), OptionsError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.contains(['/', '\\']) {
        "must not contain path separators"
    } else if name.chars().any(char::is_whitespace) {
        "must not contain whitespace"
    } else if name == RUNTIME_SPECIFIC_DEFAULT {
        "is a reserved placeholder"
    } else {
        return Ok(());
    };
    Err(OptionsError::InvalidRuntimeName {
        name: name.to_owned(),
        reason,
    })
}

fn specified(value: Option<&str>) -> Option<&str> {
    value.filter(|v| v.trim() != RUNTIME_SPECIFIC_DEFAULT)
}

fn resolve_path(
    value: Option<&str>,
    default: &Path,
    field: &'static str,
) -> Result<PathBuf, OptionsError> {
    match specified(value) {
        Some(v) if v.trim().is_empty() => Err(OptionsError::EmptyPath { field }),
        Some(v) => Ok(PathBuf::from(v.trim())),
        None => Ok(default.to_path_buf()),
    }
}

use crate::OptionsError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the engine is made to pick up a changed configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    /// Send `SIGHUP` to the running engine and wait for its socket.
    Signal,
    /// Ask the host's init system to restart the engine unit.
    Systemd,
    /// Leave the restart to the administrator.
    None,
}

impl RestartMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RestartMode::Signal => "signal",
            RestartMode::Systemd => "systemd",
            RestartMode::None => "none",
        }
    }
}

impl fmt::Display for RestartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestartMode {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "signal" => Ok(RestartMode::Signal),
            "systemd" | "init-system" => Ok(RestartMode::Systemd),
            "none" => Ok(RestartMode::None),
            _ => Err(OptionsError::UnknownRestartMode(s.to_owned())),
        }
    }
}

use crate::{RestartError, RestartOutcome, Restarter};
use ctk_options::RestartMode;
use tracing::warn;

/// Leaves the engine alone; the administrator restarts it.
#[derive(Debug, Clone)]
pub struct NoRestart {
    unit: String,
}

impl NoRestart {
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_owned(),
        }
    }
}

impl Restarter for NoRestart {
    fn mode(&self) -> RestartMode {
        RestartMode::None
    }

    fn restart(&self) -> Result<RestartOutcome, RestartError> {
        warn!(
            "restart mode is 'none': {} must be restarted manually to load the new configuration",
            self.unit
        );
        Ok(RestartOutcome::ManualRestartRequired)
    }
}

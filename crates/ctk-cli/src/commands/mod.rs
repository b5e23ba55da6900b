pub mod cleanup;
pub mod completions;
pub mod man_pages;
pub mod setup;

use clap::builder::BoolishValueParser;
use clap::Args;
use console::Style;
use ctk_core::{validate_options, ConfigChange, CoreError, Report};
use ctk_options::{load_raw_options, Options, RawOptions};
use ctk_restart::RestartOutcome;
use std::path::PathBuf;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_INVALID_INPUT: u8 = 2;
pub const EXIT_CONFIG_ERROR: u8 = 3;
pub const EXIT_RESTART_ERROR: u8 = 4;

const DEFAULT_TOOLKIT_ROOT: &str = "/usr/local/nvidia/toolkit";

/// A command error together with the exit code it maps to.
#[derive(Debug)]
pub struct Failure {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl Failure {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            hint: None,
        }
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Failure::new(EXIT_FAILURE, message)
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        let code = match &e {
            CoreError::InvalidConfiguration(_) | CoreError::UnsupportedEngine(_) => {
                EXIT_INVALID_INPUT
            }
            CoreError::Config { .. } => EXIT_CONFIG_ERROR,
            CoreError::Restart { .. } => EXIT_RESTART_ERROR,
        };
        let hint = match &e {
            CoreError::Restart { engine, .. } => Some(format!(
                "the new configuration takes effect once {engine} is restarted"
            )),
            CoreError::UnsupportedEngine(_) => {
                Some("supported engines: docker, containerd, crio".to_owned())
            }
            _ => None,
        };
        Failure {
            code,
            message: e.to_string(),
            hint,
        }
    }
}

/// Flags shared by `setup` and `cleanup`.
///
/// Each flag can also be given through its environment variable. Values
/// from `--options-file` are used for anything not set either way.
#[derive(Debug, Clone, Default, Args)]
pub struct RuntimeArgs {
    /// Engine config file [default: engine specific].
    #[arg(long, env = "RUNTIME_CONFIG")]
    pub config: Option<String>,

    /// Engine API socket [default: engine specific].
    #[arg(long, env = "RUNTIME_SOCKET")]
    pub socket: Option<String>,

    /// How to restart the engine: signal, systemd or none [default: engine specific].
    #[arg(long, env = "RUNTIME_RESTART_MODE")]
    pub restart_mode: Option<String>,

    /// Where the host's root filesystem is mounted [default: /host].
    #[arg(long, env = "HOST_ROOT_MOUNT")]
    pub host_root: Option<String>,

    /// Name to register the runtime handler under [default: nvidia].
    #[arg(
        long,
        env = "NVIDIA_RUNTIME_NAME",
        visible_aliases = ["nvidia-runtime-name", "runtime-class"]
    )]
    pub runtime_name: Option<String>,

    /// Make the runtime handler the engine's default [default: true].
    #[arg(
        long,
        env = "NVIDIA_RUNTIME_SET_AS_DEFAULT",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub set_as_default: Option<bool>,

    /// Seconds to wait for the engine to come back after a restart [default: 30].
    #[arg(long, env = "RUNTIME_RESTART_TIMEOUT")]
    pub restart_timeout: Option<u64>,

    /// Engine pid file used to find the process to signal.
    #[arg(long)]
    pub pid_file: Option<String>,

    /// Runtime handler executable inside the toolkit directory.
    #[arg(long)]
    pub runtime_executable: Option<String>,

    /// TOML file with defaults for any of the flags above.
    #[arg(long)]
    pub options_file: Option<PathBuf>,

    #[arg(long, env = "TOOLKIT_ROOT", default_value = DEFAULT_TOOLKIT_ROOT, hide = true)]
    pub toolkit_root: PathBuf,
}

impl RuntimeArgs {
    fn flag_options(&self) -> RawOptions {
        RawOptions {
            config: self.config.clone(),
            socket: self.socket.clone(),
            restart_mode: self.restart_mode.clone(),
            host_root: self.host_root.clone(),
            runtime_name: self.runtime_name.clone(),
            set_as_default: self.set_as_default,
            restart_timeout_secs: self.restart_timeout,
            runtime_executable: self.runtime_executable.clone(),
            pid_file: self.pid_file.clone(),
        }
    }

    /// Options file values overlaid with flags, validated for `engine`.
    pub fn resolve(&self, engine: &str) -> Result<Options, Failure> {
        let base = match &self.options_file {
            Some(path) => {
                debug!("loading options from {}", path.display());
                load_raw_options(path).map_err(|e| {
                    Failure::new(
                        EXIT_INVALID_INPUT,
                        format!("options file {}: {e}", path.display()),
                    )
                })?
            }
            None => RawOptions::default(),
        };
        let raw = base.merge(self.flag_options());
        Ok(validate_options(&raw, engine, &self.toolkit_root)?)
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn print_report(report: &Report, json: bool) -> Result<u8, Failure> {
    if json {
        println!("{}", json_pretty(report)?);
        return Ok(EXIT_SUCCESS);
    }
    println!(
        "{} {}: runtime '{}' in {}",
        colorize_change(report.change),
        report.engine,
        report.runtime_name,
        report.config_path.display()
    );
    println!("  restart: {}", colorize_restart(report.restart));
    Ok(EXIT_SUCCESS)
}

pub fn colorize_change(change: ConfigChange) -> String {
    match change {
        ConfigChange::Updated => Style::new().green().apply_to("updated").to_string(),
        ConfigChange::Removed => Style::new().green().apply_to("removed").to_string(),
        ConfigChange::Unchanged => Style::new().dim().apply_to("unchanged").to_string(),
        ConfigChange::NothingToClean => {
            Style::new().dim().apply_to("nothing to clean").to_string()
        }
    }
}

pub fn colorize_restart(outcome: RestartOutcome) -> String {
    match outcome {
        RestartOutcome::Restarted => Style::new().cyan().apply_to("restarted").to_string(),
        RestartOutcome::ManualRestartRequired => Style::new()
            .yellow()
            .bold()
            .apply_to("manual restart required")
            .to_string(),
        RestartOutcome::Skipped => Style::new().dim().apply_to("skipped").to_string(),
    }
}

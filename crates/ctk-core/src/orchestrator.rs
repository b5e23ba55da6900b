use crate::CoreError;
use ctk_engine::{
    select_engine, ConfigDocument, ConfigFile, EngineBackend, EngineError, Removal,
};
use ctk_options::{Options, RawOptions};
use ctk_restart::{select_restarter, RestartOutcome, Restarter};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Setup,
    Cleanup,
}

/// What happened to the engine config file.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigChange {
    /// New content was written.
    Updated,
    /// The document already had the desired content; nothing was written.
    Unchanged,
    /// Cleanup left nothing behind, so the file was deleted.
    Removed,
    /// Cleanup found no config file at all.
    NothingToClean,
}

/// Result of a successful setup or cleanup run.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Report {
    pub operation: Operation,
    pub engine: String,
    pub runtime_name: String,
    pub config_path: PathBuf,
    pub change: ConfigChange,
    pub restart: RestartOutcome,
}

/// Drives one setup or cleanup run against a single engine.
///
/// The engine backend and restart strategy are resolved once, at
/// construction. A run is strictly sequential: load the config, transform it,
/// commit it atomically, then restart. A failed restart never rolls the
/// config back.
///
/// Concurrent runs against the same config file are not coordinated here;
/// callers that may overlap must serialize them.
pub struct Orchestrator {
    options: Options,
    backend: Box<dyn EngineBackend>,
    restarter: Box<dyn Restarter>,
}

impl Orchestrator {
    /// Resolve `engine` and the restart strategy for `options`.
    ///
    /// `options` must have been validated against the same engine's defaults.
    pub fn new(options: Options, engine: &str) -> Result<Self, CoreError> {
        let backend = resolve_engine(engine)?;
        let restarter = select_restarter(&options);
        debug!(
            "resolved engine {} with restart mode {}",
            backend.name(),
            restarter.mode()
        );
        Ok(Self {
            options,
            backend,
            restarter,
        })
    }

    /// Replace the restart strategy chosen from the options.
    #[must_use]
    pub fn with_restarter(mut self, restarter: Box<dyn Restarter>) -> Self {
        self.restarter = restarter;
        self
    }

    #[inline]
    pub fn engine(&self) -> &'static str {
        self.backend.name()
    }

    #[inline]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Register the runtime handler (and optionally make it the default),
    /// then restart the engine.
    pub fn setup(&self) -> Result<Report, CoreError> {
        let name = &self.options.runtime_name;
        let handler = self.options.handler_path();
        let file = self.config_file();
        info!(
            "configuring {} runtime '{name}' ({}) in {}",
            self.engine(),
            handler.display(),
            file.path().display()
        );

        let original = file.load().map_err(|e| self.config_error(e))?;
        let mut doc = original
            .clone()
            .unwrap_or_else(|| ConfigDocument::empty(self.backend.format()));

        self.backend
            .add_runtime(&mut doc, name, &handler)
            .map_err(|e| self.config_error(e))?;
        if self.options.set_as_default {
            self.backend
                .set_default(&mut doc, name)
                .map_err(|e| self.config_error(e))?;
        }

        let change = if original.as_ref() == Some(&doc) {
            info!("{} already up to date", file.path().display());
            ConfigChange::Unchanged
        } else {
            file.save(&doc).map_err(|e| self.config_error(e))?;
            ConfigChange::Updated
        };

        let restart = self.restart(file.path())?;
        Ok(self.report(Operation::Setup, file.path(), change, restart))
    }

    /// Remove the runtime handler and any default pointing at it, then
    /// restart the engine.
    ///
    /// Safe to run whatever state a previous setup left behind.
    pub fn cleanup(&self) -> Result<Report, CoreError> {
        let name = &self.options.runtime_name;
        let file = self.config_file();
        info!(
            "removing {} runtime '{name}' from {}",
            self.engine(),
            file.path().display()
        );

        let Some(original) = file.load().map_err(|e| self.config_error(e))? else {
            info!(
                "{} does not exist, nothing to clean up",
                file.path().display()
            );
            return Ok(self.report(
                Operation::Cleanup,
                file.path(),
                ConfigChange::NothingToClean,
                RestartOutcome::Skipped,
            ));
        };

        let mut doc = original.clone();
        self.backend
            .unset_default(&mut doc, name)
            .map_err(|e| self.config_error(e))?;
        self.backend
            .remove_runtime(&mut doc, name)
            .map_err(|e| self.config_error(e))?;

        let change = if doc == original {
            info!("runtime '{name}' not present in {}", file.path().display());
            ConfigChange::Unchanged
        } else if self.backend.is_empty(&doc) {
            match file.remove(&doc).map_err(|e| self.config_error(e))? {
                Removal::Emptied => ConfigChange::Updated,
                Removal::Deleted | Removal::Missing => ConfigChange::Removed,
            }
        } else {
            file.save(&doc).map_err(|e| self.config_error(e))?;
            ConfigChange::Updated
        };

        // Restart even when unchanged: an earlier run may have written the
        // file and then failed to restart.
        let restart = self.restart(file.path())?;
        Ok(self.report(Operation::Cleanup, file.path(), change, restart))
    }

    fn config_file(&self) -> ConfigFile {
        ConfigFile::new(&self.options.config_path, self.backend.format())
    }

    fn restart(&self, config_path: &Path) -> Result<RestartOutcome, CoreError> {
        self.restarter
            .restart()
            .map_err(|source| CoreError::Restart {
                engine: self.engine(),
                config_path: config_path.to_path_buf(),
                source,
            })
    }

    fn config_error(&self, source: EngineError) -> CoreError {
        CoreError::Config {
            engine: self.engine(),
            config_path: self.options.config_path.clone(),
            source,
        }
    }

    fn report(
        &self,
        operation: Operation,
        config_path: &Path,
        change: ConfigChange,
        restart: RestartOutcome,
    ) -> Report {
        Report {
            operation,
            engine: self.engine().to_owned(),
            runtime_name: self.options.runtime_name.clone(),
            config_path: config_path.to_path_buf(),
            change,
            restart,
        }
    }
}

/// Validate raw input against the defaults of `engine`.
///
/// `runtime_dir` is where the runtime handler is installed; it comes from the
/// caller's environment rather than from user input.
pub fn validate_options(
    raw: &RawOptions,
    engine: &str,
    runtime_dir: &Path,
) -> Result<Options, CoreError> {
    let backend = resolve_engine(engine)?;
    Ok(raw.validate(&backend.defaults(), runtime_dir)?)
}

pub fn setup(options: &Options, engine: &str) -> Result<Report, CoreError> {
    Orchestrator::new(options.clone(), engine)?.setup()
}

pub fn cleanup(options: &Options, engine: &str) -> Result<Report, CoreError> {
    Orchestrator::new(options.clone(), engine)?.cleanup()
}

fn resolve_engine(engine: &str) -> Result<Box<dyn EngineBackend>, CoreError> {
    select_engine(engine).map_err(|_| CoreError::UnsupportedEngine(engine.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctk_options::RestartMode;
    use ctk_restart::RestartError;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingRestarter {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Restarter for CountingRestarter {
        fn mode(&self) -> RestartMode {
            RestartMode::Signal
        }

        fn restart(&self) -> Result<RestartOutcome, RestartError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RestartError::CommandFailed {
                    command: "test".to_owned(),
                    detail: "boom".to_owned(),
                })
            } else {
                Ok(RestartOutcome::Restarted)
            }
        }
    }

    fn orchestrator(config: &Path, fail: bool) -> (Orchestrator, Arc<AtomicUsize>) {
        let raw = RawOptions {
            config: Some(config.to_string_lossy().into_owned()),
            restart_mode: Some("none".to_owned()),
            ..RawOptions::default()
        };
        let options = validate_options(&raw, "docker", Path::new("/opt/rt")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::new(options, "docker")
            .unwrap()
            .with_restarter(Box::new(CountingRestarter {
                calls: Arc::clone(&calls),
                fail,
            }));
        (orch, calls)
    }

    #[test]
    fn setup_restarts_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let (orch, calls) = orchestrator(&path, false);
        let report = orch.setup().unwrap();
        assert_eq!(report.change, ConfigChange::Updated);
        assert_eq!(report.restart, RestartOutcome::Restarted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(path.exists());
    }

    #[test]
    fn second_setup_is_unchanged_but_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let (orch, calls) = orchestrator(&path, false);
        orch.setup().unwrap();
        let before = fs::read(&path).unwrap();
        let report = orch.setup().unwrap();
        assert_eq!(report.change, ConfigChange::Unchanged);
        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleanup_without_config_skips_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let (orch, calls) = orchestrator(&path, false);
        let report = orch.cleanup().unwrap();
        assert_eq!(report.change, ConfigChange::NothingToClean);
        assert_eq!(report.restart, RestartOutcome::Skipped);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!path.exists());
    }

    #[test]
    fn restart_failure_keeps_written_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let (orch, _) = orchestrator(&path, true);
        let err = orch.setup().unwrap_err();
        assert!(err.config_committed());
        assert!(fs::read_to_string(&path).unwrap().contains("\"nvidia\""));
    }

    #[test]
    fn config_error_happens_before_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, r#"{"runtimes": 42}"#).unwrap();
        let (orch, calls) = orchestrator(&path, false);
        let err = orch.setup().unwrap_err();
        match &err {
            CoreError::Config {
                engine, config_path, ..
            } => {
                assert_eq!(*engine, "docker");
                assert_eq!(config_path, &path);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains(&*path.to_string_lossy()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"runtimes": 42}"#);
    }

    #[test]
    fn report_serializes_snake_case() {
        let report = Report {
            operation: Operation::Cleanup,
            engine: "docker".to_owned(),
            runtime_name: "nvidia".to_owned(),
            config_path: PathBuf::from("/etc/docker/daemon.json"),
            change: ConfigChange::NothingToClean,
            restart: RestartOutcome::Skipped,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "cleanup");
        assert_eq!(json["change"], "nothing_to_clean");
        assert_eq!(json["restart"], "skipped");
    }
}

use crate::backend::EngineBackend;
use crate::document::{json_object_mut, remove_json_key, ConfigDocument, DocumentFormat};
use crate::EngineError;
use ctk_options::{EngineDefaults, RestartMode};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

const RUNTIMES_KEY: &str = "runtimes";
const DEFAULT_RUNTIME_KEY: &str = "default-runtime";

/// Docker daemon, configured through `daemon.json`.
///
/// ```json
/// {
///     "default-runtime": "nvidia",
///     "runtimes": {
///         "nvidia": { "path": "/usr/bin/nvidia-container-runtime", "args": [] }
///     }
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerBackend;

impl EngineBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn defaults(&self) -> EngineDefaults {
        EngineDefaults {
            config_path: PathBuf::from("/etc/docker/daemon.json"),
            socket_path: PathBuf::from("/var/run/docker.sock"),
            restart_mode: RestartMode::Signal,
            unit: "docker".to_owned(),
            pid_file: Some(PathBuf::from("/var/run/docker.pid")),
        }
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    fn add_runtime(
        &self,
        doc: &mut ConfigDocument,
        name: &str,
        handler: &Path,
    ) -> Result<(), EngineError> {
        let root = doc.json_mut(self.name())?;
        let runtimes = json_object_mut(root, RUNTIMES_KEY)?;
        debug!("docker: registering runtime {name} -> {}", handler.display());
        runtimes.insert(
            name.to_owned(),
            json!({
                "path": handler.to_string_lossy(),
                "args": [],
            }),
        );
        Ok(())
    }

    fn remove_runtime(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.json_mut(self.name())?;
        let Some(value) = root.get_mut(RUNTIMES_KEY) else {
            return Ok(());
        };
        let runtimes = value.as_object_mut().ok_or_else(|| EngineError::Malformed {
            key: RUNTIMES_KEY.to_owned(),
            expected: "an object",
        })?;
        if remove_json_key(runtimes, name).is_some() {
            debug!("docker: removed runtime {name}");
        }
        if runtimes.is_empty() {
            remove_json_key(root, RUNTIMES_KEY);
        }
        Ok(())
    }

    fn set_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.json_mut(self.name())?;
        root.insert(DEFAULT_RUNTIME_KEY.to_owned(), Value::String(name.to_owned()));
        Ok(())
    }

    fn unset_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.json_mut(self.name())?;
        if root.get(DEFAULT_RUNTIME_KEY).and_then(Value::as_str) == Some(name) {
            remove_json_key(root, DEFAULT_RUNTIME_KEY);
        }
        Ok(())
    }
}

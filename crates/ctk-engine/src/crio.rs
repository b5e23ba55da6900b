use crate::backend::EngineBackend;
use crate::document::{
    prune_empty_tables, toml_table_get_mut, toml_table_mut, ConfigDocument, DocumentFormat,
};
use crate::EngineError;
use ctk_options::{EngineDefaults, RestartMode};
use std::path::{Path, PathBuf};
use toml_edit::{value, Item, Table};
use tracing::debug;

const RUNTIME_PATH: &[&str] = &["crio", "runtime"];
const RUNTIMES_PATH: &[&str] = &["crio", "runtime", "runtimes"];
const DEFAULT_RUNTIME_KEY: &str = "default_runtime";

/// CRI-O, configured through `crio.conf`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrioBackend;

impl EngineBackend for CrioBackend {
    fn name(&self) -> &'static str {
        "crio"
    }

    fn defaults(&self) -> EngineDefaults {
        EngineDefaults {
            config_path: PathBuf::from("/etc/crio/crio.conf"),
            socket_path: PathBuf::from("/var/run/crio/crio.sock"),
            restart_mode: RestartMode::Systemd,
            unit: "crio".to_owned(),
            pid_file: None,
        }
    }

    fn format(&self) -> DocumentFormat {
        DocumentFormat::Toml
    }

    fn add_runtime(
        &self,
        doc: &mut ConfigDocument,
        name: &str,
        handler: &Path,
    ) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        let runtimes = toml_table_mut(root, RUNTIMES_PATH)?;
        let mut entry = Table::new();
        entry.insert("runtime_path", value(handler.to_string_lossy().into_owned()));
        entry.insert("runtime_type", value("oci"));
        debug!("crio: registering runtime {name} -> {}", handler.display());
        runtimes.insert(name, Item::Table(entry));
        Ok(())
    }

    fn remove_runtime(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        let Some(runtimes) = toml_table_get_mut(root, RUNTIMES_PATH)? else {
            return Ok(());
        };
        if runtimes.remove(name).is_some() {
            debug!("crio: removed runtime {name}");
        }
        prune_empty_tables(root, RUNTIMES_PATH);
        Ok(())
    }

    fn set_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        toml_table_mut(root, RUNTIME_PATH)?.insert(DEFAULT_RUNTIME_KEY, value(name));
        Ok(())
    }

    fn unset_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        let Some(runtime) = toml_table_get_mut(root, RUNTIME_PATH)? else {
            return Ok(());
        };
        if runtime.get(DEFAULT_RUNTIME_KEY).and_then(Item::as_str) == Some(name) {
            runtime.remove(DEFAULT_RUNTIME_KEY);
            prune_empty_tables(root, RUNTIME_PATH);
        }
        Ok(())
    }
}

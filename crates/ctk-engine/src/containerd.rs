use crate::backend::EngineBackend;
use crate::document::{
    detached_copy, prune_empty_tables, toml_table_get_mut, toml_table_mut, ConfigDocument,
    DocumentFormat,
};
use crate::EngineError;
use ctk_options::{EngineDefaults, RestartMode};
use std::path::{Path, PathBuf};
use toml_edit::{value, Item, Table};
use tracing::debug;

const VERSION_KEY: &str = "version";
const RUNTIMES_KEY: &str = "runtimes";
const DEFAULT_RUNTIME_KEY: &str = "default_runtime_name";
const RUNC_RUNTIME_TYPE: &str = "io.containerd.runc.v2";
/// Schema written into documents this tool creates from scratch.
const NEW_DOCUMENT_VERSION: i64 = 2;

/// containerd, configured through `config.toml`.
///
/// The CRI plugin section moved between config schema versions, so every
/// operation first works out which one the document uses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerdBackend;

impl ContainerdBackend {
    /// Path of the table holding `runtimes` and `default_runtime_name`.
    fn cri_path(root: &Table) -> Result<&'static [&'static str], EngineError> {
        let version = match root.get(VERSION_KEY) {
            Some(item) => item.as_integer().ok_or_else(|| EngineError::Malformed {
                key: VERSION_KEY.to_owned(),
                expected: "an integer",
            })?,
            None if root.is_empty() => NEW_DOCUMENT_VERSION,
            None => 1,
        };
        match version {
            1 => Ok(&["plugins", "cri", "containerd"]),
            2 => Ok(&["plugins", "io.containerd.grpc.v1.cri", "containerd"]),
            3 => Ok(&["plugins", "io.containerd.cri.v1.runtime", "containerd"]),
            other => Err(EngineError::UnsupportedSchema {
                engine: "containerd",
                version: other,
            }),
        }
    }

    fn runtimes_path(cri: &[&'static str]) -> Vec<&'static str> {
        let mut path = cri.to_vec();
        path.push(RUNTIMES_KEY);
        path
    }
}

impl EngineBackend for ContainerdBackend {
    fn name(&self) -> &'static str {
        "containerd"
    }

    fn defaults(&self) -> EngineDefaults {
        EngineDefaults {
            config_path: PathBuf::from("/etc/containerd/config.toml"),
            socket_path: PathBuf::from("/run/containerd/containerd.sock"),
            restart_mode: RestartMode::Signal,
            unit: "containerd".to_owned(),
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
        if root.is_empty() {
            root.insert(VERSION_KEY, value(NEW_DOCUMENT_VERSION));
        }
        let path = Self::runtimes_path(Self::cri_path(root)?);
        let runtimes = toml_table_mut(root, &path)?;

        // Start from runc's settings so cgroup driver and friends match.
        let mut entry = runtimes
            .get("runc")
            .and_then(Item::as_table_like)
            .map_or_else(Table::new, detached_copy);
        entry.insert("runtime_type", value(RUNC_RUNTIME_TYPE));
        let options = toml_table_mut(&mut entry, &["options"]).map_err(|_| {
            EngineError::Malformed {
                key: format!("{}.runc.options", path.join(".")),
                expected: "a table",
            }
        })?;
        options.insert(
            "BinaryName",
            value(handler.to_string_lossy().into_owned()),
        );

        debug!("containerd: registering runtime {name} -> {}", handler.display());
        runtimes.insert(name, Item::Table(entry));
        Ok(())
    }

    fn remove_runtime(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        let path = Self::runtimes_path(Self::cri_path(root)?);
        let Some(runtimes) = toml_table_get_mut(root, &path)? else {
            return Ok(());
        };
        if runtimes.remove(name).is_some() {
            debug!("containerd: removed runtime {name}");
        }
        prune_empty_tables(root, &path);
        Ok(())
    }

    fn set_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        if root.is_empty() {
            root.insert(VERSION_KEY, value(NEW_DOCUMENT_VERSION));
        }
        let path = Self::cri_path(root)?;
        toml_table_mut(root, path)?.insert(DEFAULT_RUNTIME_KEY, value(name));
        Ok(())
    }

    fn unset_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError> {
        let root = doc.toml_mut(self.name())?;
        let path = Self::cri_path(root)?;
        let Some(cri) = toml_table_get_mut(root, path)? else {
            return Ok(());
        };
        if cri.get(DEFAULT_RUNTIME_KEY).and_then(Item::as_str) == Some(name) {
            cri.remove(DEFAULT_RUNTIME_KEY);
            prune_empty_tables(root, path);
        }
        Ok(())
    }

    /// A document that only records its schema version carries no settings.
    fn is_empty(&self, doc: &ConfigDocument) -> bool {
        match doc {
            ConfigDocument::Toml(root) => root.iter().all(|(k, _)| k == VERSION_KEY),
            ConfigDocument::Json(map) => map.is_empty(),
        }
    }
}

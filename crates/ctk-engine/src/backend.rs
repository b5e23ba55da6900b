use crate::document::{ConfigDocument, DocumentFormat};
use crate::EngineError;
use ctk_options::EngineDefaults;
use std::path::Path;

/// Engines that [`select_engine`] knows about.
pub const SUPPORTED_ENGINES: &[&str] = &["docker", "containerd", "crio"];

/// Per-engine view of a configuration document.
///
/// Implementations only transform the in-memory document; reading and
/// writing the file is done by [`ConfigFile`](crate::ConfigFile). Every
/// operation is idempotent and leaves keys it does not own untouched.
pub trait EngineBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Paths, socket and restart behaviour used when options leave them unset.
    fn defaults(&self) -> EngineDefaults;

    fn format(&self) -> DocumentFormat;

    /// Insert or overwrite the runtime entry `name` pointing at `handler`.
    fn add_runtime(
        &self,
        doc: &mut ConfigDocument,
        name: &str,
        handler: &Path,
    ) -> Result<(), EngineError>;

    /// Delete the runtime entry `name`; absent entries are not an error.
    fn remove_runtime(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError>;

    fn set_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError>;

    /// Clear the default runtime, but only if it currently is `name`.
    fn unset_default(&self, doc: &mut ConfigDocument, name: &str) -> Result<(), EngineError>;

    /// Whether the document holds nothing worth keeping on disk.
    fn is_empty(&self, doc: &ConfigDocument) -> bool {
        doc.is_empty()
    }
}

pub fn select_engine(name: &str) -> Result<Box<dyn EngineBackend>, EngineError> {
    match name.trim().to_ascii_lowercase().as_str() {
        "docker" => Ok(Box::new(crate::docker::DockerBackend)),
        "containerd" => Ok(Box::new(crate::containerd::ContainerdBackend)),
        "crio" | "cri-o" => Ok(Box::new(crate::crio::CrioBackend)),
        _ => Err(EngineError::UnsupportedEngine(name.to_owned())),
    }
}

use crate::document::{ConfigDocument, DocumentFormat};
use crate::{fsync_dir, EngineError};
use std::fs;
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Mode given to config files this tool creates.
const NEW_FILE_MODE: u32 = 0o644;

/// An engine configuration file on disk.
///
/// Writes never modify the file in place: the new content is staged in a
/// temporary file next to it (same filesystem), synced, given the original's
/// permissions and ownership, and then renamed over it. Readers see either
/// the old or the new document, never a mix.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
    format: DocumentFormat,
}

/// How [`ConfigFile::remove`] dropped a config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Deleted,
    /// The path is a symlink; its target now holds the emptied document.
    Emptied,
    /// Nothing was there to delete.
    Missing,
}

/// New content written and synced, but not yet visible at the destination.
#[derive(Debug)]
pub struct StagedConfig {
    tmp: NamedTempFile,
    dest: PathBuf,
    dir: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>, format: DocumentFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read and parse the file. A missing file is `Ok(None)`.
    pub fn load(&self) -> Result<Option<ConfigDocument>, EngineError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} does not exist", self.path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(EngineError::ConfigRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        ConfigDocument::parse(self.format, &content)
            .map(Some)
            .map_err(|source| EngineError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Write `doc` to a temporary file beside the destination.
    ///
    /// Nothing at [`path`](Self::path) changes until [`StagedConfig::commit`].
    pub fn stage(&self, doc: &ConfigDocument) -> Result<StagedConfig, EngineError> {
        let content = doc.render().map_err(|source| EngineError::Render {
            path: self.path.clone(),
            source,
        })?;
        let write_err = |source| EngineError::ConfigWrite {
            path: self.path.clone(),
            source,
        };

        // Follow a symlinked config so the link itself survives the rename.
        let dest = fs::canonicalize(&self.path).unwrap_or_else(|_| self.path.clone());
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let file_name = dest
            .file_name()
            .map_or_else(|| "config".into(), |n| n.to_string_lossy());
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(write_err)?;
        tmp.write_all(content.as_bytes()).map_err(write_err)?;

        match fs::metadata(&dest) {
            Ok(meta) => {
                tmp.as_file()
                    .set_permissions(meta.permissions())
                    .map_err(write_err)?;
                let current = tmp.as_file().metadata().map_err(write_err)?;
                if current.uid() != meta.uid() || current.gid() != meta.gid() {
                    std::os::unix::fs::fchown(tmp.as_file(), Some(meta.uid()), Some(meta.gid()))
                        .map_err(write_err)?;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tmp.as_file()
                    .set_permissions(fs::Permissions::from_mode(NEW_FILE_MODE))
                    .map_err(write_err)?;
            }
            Err(e) => return Err(write_err(e)),
        }
        tmp.as_file().sync_all().map_err(write_err)?;

        Ok(StagedConfig { tmp, dest, dir })
    }

    /// Stage and commit in one step.
    pub fn save(&self, doc: &ConfigDocument) -> Result<(), EngineError> {
        self.stage(doc)?.commit()
    }

    /// Whether the configured path is itself a symlink.
    pub fn is_symlink(&self) -> bool {
        fs::symlink_metadata(&self.path).is_ok_and(|meta| meta.file_type().is_symlink())
    }

    /// Drop the config from disk.
    ///
    /// A regular file is deleted. A symlinked config keeps its link, and
    /// `emptied` is written through to the target instead.
    pub fn remove(&self, emptied: &ConfigDocument) -> Result<Removal, EngineError> {
        if self.is_symlink() {
            debug!("{} is a symlink, emptying its target", self.path.display());
            self.save(emptied)?;
            return Ok(Removal::Emptied);
        }
        let write_err = |source| EngineError::ConfigWrite {
            path: self.path.clone(),
            source,
        };
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Removal::Missing),
            Err(e) => return Err(write_err(e)),
        }
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fsync_dir(dir).map_err(write_err)?;
        }
        info!("removed {}", self.path.display());
        Ok(Removal::Deleted)
    }
}

impl StagedConfig {
    /// Location of the staged content.
    pub fn temp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Atomically replace the destination with the staged content.
    pub fn commit(self) -> Result<(), EngineError> {
        let StagedConfig { tmp, dest, dir } = self;
        tmp.persist(&dest).map_err(|e| EngineError::ConfigWrite {
            path: dest.clone(),
            source: e.error,
        })?;
        fsync_dir(&dir).map_err(|source| EngineError::ConfigWrite {
            path: dest.clone(),
            source,
        })?;
        info!("wrote {}", dest.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docker_doc(s: &str) -> ConfigDocument {
        ConfigDocument::parse(DocumentFormat::Json, s).unwrap()
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::new(dir.path().join("daemon.json"), DocumentFormat::Json);
        assert!(file.load().unwrap().is_none());
    }

    #[test]
    fn load_invalid_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, "{not json").unwrap();
        let err = ConfigFile::new(&path, DocumentFormat::Json)
            .load()
            .unwrap_err();
        assert!(matches!(err, EngineError::Parse { ref path, .. } if path.ends_with("daemon.json")));
    }

    #[test]
    fn save_creates_parent_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/docker/daemon.json");
        let file = ConfigFile::new(&path, DocumentFormat::Json);
        file.save(&docker_doc(r#"{"debug": true}"#)).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n    \"debug\": true\n}\n"
        );
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, NEW_FILE_MODE);
    }

    #[test]
    fn save_preserves_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        ConfigFile::new(&path, DocumentFormat::Json)
            .save(&docker_doc(r#"{"debug": true}"#))
            .unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn staged_write_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, "{\"debug\": false}").unwrap();
        let file = ConfigFile::new(&path, DocumentFormat::Json);

        let staged = file.stage(&docker_doc(r#"{"debug": true}"#)).unwrap();
        assert!(staged.temp_path().starts_with(dir.path()));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"debug\": false}");

        staged.commit().unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "{\n    \"debug\": true\n}\n"
        );
    }

    #[test]
    fn dropped_stage_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        let file = ConfigFile::new(&path, DocumentFormat::Json);
        let staged = file.stage(&docker_doc("{}")).unwrap();
        let tmp = staged.temp_path().to_path_buf();
        drop(staged);
        assert!(!tmp.exists());
        assert!(!path.exists());
    }

    #[test]
    fn symlinked_config_keeps_link() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.json");
        let link = dir.path().join("daemon.json");
        fs::write(&target, "{}").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        ConfigFile::new(&link, DocumentFormat::Json)
            .save(&docker_doc(r#"{"debug": true}"#))
            .unwrap();
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert!(fs::read_to_string(&target).unwrap().contains("debug"));
    }

    #[test]
    fn remove_reports_whether_file_existed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, "{}").unwrap();
        let file = ConfigFile::new(&path, DocumentFormat::Json);
        let emptied = ConfigDocument::empty(DocumentFormat::Json);
        assert_eq!(file.remove(&emptied).unwrap(), Removal::Deleted);
        assert!(!path.exists());
        assert_eq!(file.remove(&emptied).unwrap(), Removal::Missing);
    }

    #[test]
    fn remove_through_symlink_empties_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.json");
        let link = dir.path().join("daemon.json");
        fs::write(&target, r#"{"default-runtime": "nvidia"}"#).unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let file = ConfigFile::new(&link, DocumentFormat::Json);
        assert!(file.is_symlink());
        let removal = file
            .remove(&ConfigDocument::empty(DocumentFormat::Json))
            .unwrap();
        assert_eq!(removal, Removal::Emptied);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "{}\n");
    }

    #[test]
    fn remove_fails_when_directory_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.json");
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        let file = ConfigFile::new(&path, DocumentFormat::Json);
        let result = file.remove(&ConfigDocument::empty(DocumentFormat::Json));
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();
        // root ignores directory permissions
        if path.exists() {
            let err = result.unwrap_err();
            assert!(matches!(err, EngineError::ConfigWrite { .. }));
        }
    }
}

use crate::options::RawOptions;
use crate::OptionsError;
use std::fs;
use std::path::Path;

/// Parse a TOML options file.
///
/// Keys mirror the long flag names (`runtime-name`, `restart-mode`, ...).
/// Unknown keys are rejected so typos do not silently fall back to defaults.
pub fn load_raw_options(path: &Path) -> Result<RawOptions, OptionsError> {
    let content = fs::read_to_string(path)?;
    parse_raw_options_str(&content)
}

pub fn parse_raw_options_str(content: &str) -> Result<RawOptions, OptionsError> {
    Ok(toml::from_str(content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_keys() {
        let raw = parse_raw_options_str(
            r#"
config = "/etc/docker/daemon.json"
restart-mode = "none"
runtime-name = "nvidia-experimental"
set-as-default = false
restart-timeout-secs = 10
"#,
        )
        .unwrap();
        assert_eq!(raw.config.as_deref(), Some("/etc/docker/daemon.json"));
        assert_eq!(raw.restart_mode.as_deref(), Some("none"));
        assert_eq!(raw.runtime_name.as_deref(), Some("nvidia-experimental"));
        assert_eq!(raw.set_as_default, Some(false));
        assert_eq!(raw.restart_timeout_secs, Some(10));
        assert!(raw.socket.is_none());
    }

    #[test]
    fn empty_file_yields_defaults() {
        assert_eq!(parse_raw_options_str("").unwrap(), RawOptions::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_raw_options_str("runtime_nmae = \"x\"").unwrap_err();
        assert!(matches!(err, OptionsError::ParseToml(_)));
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctk.toml");
        fs::write(&path, "host-root = \"/host\"\n").unwrap();
        let raw = load_raw_options(&path).unwrap();
        assert_eq!(raw.host_root.as_deref(), Some("/host"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_raw_options(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, OptionsError::Io(_)));
    }
}

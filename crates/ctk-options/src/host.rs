use std::path::{Component, Path, PathBuf};

/// Map a path as seen by the host into this process's filesystem view.
///
/// `path` is interpreted relative to the host's `/`; the result lives under
/// `host_root`. Parent components are dropped so the result can never escape
/// `host_root`.
pub fn translate_host_path(host_root: &Path, path: &Path) -> PathBuf {
    let mut out = host_root.to_path_buf();
    for component in path.components() {
        if let Component::Normal(part) = component {
            out.push(part);
        }
    }
    out
}

//! Host-independent handling of manifest paths.

use std::path::{Path, PathBuf};

/// Rebuild a manifest path using the host's separator.
///
/// Manifests may be authored on Windows or Unix, so both `\` and `/` are
/// treated as separators. Empty and `.` segments are dropped.
pub fn normalize_separators(raw: &str) -> PathBuf {
    raw.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect()
}

/// Forward-slash rendering of a relative path, used for archive entry names
/// and log output.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

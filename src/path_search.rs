//! Executable lookup over the directories of a `PATH`-style variable.

use std::path::{Path, PathBuf};

/// Split a `PATH`-style value into its directories, skipping empty entries.
pub(crate) fn search_dirs(path_var: Option<&str>) -> Vec<PathBuf> {
    path_var
        .map(|value| {
            std::env::split_paths(value)
                .filter(|dir| !dir.as_os_str().is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Locate `name` in `dirs`, honouring `PATHEXT`-style suffixes on Windows.
pub(crate) fn find_executable(name: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter().find_map(|dir| candidate_in(dir, name))
}

#[cfg(windows)]
fn candidate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    [".exe", ".bat", ".cmd"]
        .iter()
        .map(|ext| dir.join(format!("{name}{ext}")))
        .find(|path| is_executable(path))
}

#[cfg(not(windows))]
fn candidate_in(dir: &Path, name: &str) -> Option<PathBuf> {
    let path = dir.join(name);
    is_executable(&path).then_some(path)
}

/// Whether `path` is a regular file the current user may run.
#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

/// Whether `path` is a regular file with a runnable extension.
#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "exe" | "bat" | "cmd"))
}

//! Discovery of installed `docker-credential-*` helpers.

use std::path::{Path, PathBuf};

use super::helper::HELPER_PREFIX;
use crate::path_search::is_executable;

/// Lists the credential helper executables found in `dirs`.
///
/// Names keep the `docker-credential-` prefix, drop any Windows executable
/// extension, and are returned sorted without duplicates.
#[must_use]
pub fn discover_helpers(dirs: &[PathBuf]) -> Vec<String> {
    let mut helpers: Vec<String> = dirs
        .iter()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flatten()
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_executable(path))
        .filter_map(|path| helper_name(&path))
        .collect();
    helpers.sort();
    helpers.dedup();
    helpers
}

fn helper_name(path: &Path) -> Option<String> {
    let name = if cfg!(windows) {
        path.file_stem()
    } else {
        path.file_name()
    }?
    .to_str()?;
    let suffix = name.strip_prefix(HELPER_PREFIX)?;
    (!suffix.is_empty()).then(|| name.to_owned())
}

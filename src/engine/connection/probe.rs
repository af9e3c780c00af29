//! Host inspection used while choosing an engine target.
//!
//! The decision tree in [`super::EngineResolver`] only needs four facts about
//! the machine it runs on. Gathering them behind [`HostProbe`] keeps the tree
//! itself pure and lets tests drive every branch without touching the
//! filesystem or spawning `podman`.

use std::io;
use std::path::{Path, PathBuf};

use super::podman_machine::{self, PodmanConnection};
use crate::BoxFuture;
use crate::path_search::{find_executable, search_dirs};

/// Operating system family, as far as engine discovery is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Linux, where Podman can run natively as a child service.
    Linux,
    /// macOS, where Podman runs inside a machine reached over SSH.
    MacOs,
    /// Windows, where Podman runs inside a machine reached over SSH.
    Windows,
    /// Any other operating system.
    Other,
}

impl Platform {
    /// Returns the platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

/// Facts about the local host consulted by the engine decision tree.
#[cfg_attr(test, mockall::automock)]
pub trait HostProbe {
    /// Reports whether a local socket (or named pipe) exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error when existence cannot be determined,
    /// for example because a parent directory is not searchable.
    fn socket_exists(&self, path: &Path) -> io::Result<bool>;

    /// Locates the `podman` executable.
    fn find_podman(&self) -> Option<PathBuf>;

    /// Resolves to the default Podman system connection, if one is
    /// configured.
    fn podman_default_connection(
        &self,
        podman: PathBuf,
    ) -> BoxFuture<'_, Option<PodmanConnection>>;

    /// Returns the operating system family.
    fn platform(&self) -> Platform;
}

/// [`HostProbe`] backed by the real filesystem and `podman` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    search_path: Vec<PathBuf>,
}

impl SystemProbe {
    /// Creates a probe that searches the given `PATH` value for executables.
    #[must_use]
    pub fn new(path_var: Option<&str>) -> Self {
        Self {
            search_path: search_dirs(path_var),
        }
    }

    /// Creates a probe from a `mockable::Env`.
    #[must_use]
    pub fn from_env<E: mockable::Env>(env: &E) -> Self {
        Self::new(env.string("PATH").as_deref())
    }
}

impl HostProbe for SystemProbe {
    fn socket_exists(&self, path: &Path) -> io::Result<bool> {
        match std::fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn find_podman(&self) -> Option<PathBuf> {
        find_executable("podman", &self.search_path)
    }

    fn podman_default_connection(
        &self,
        podman: PathBuf,
    ) -> BoxFuture<'_, Option<PodmanConnection>> {
        Box::pin(async move { podman_machine::query_default_connection(&podman).await })
    }

    fn platform(&self) -> Platform {
        Platform::current()
    }
}

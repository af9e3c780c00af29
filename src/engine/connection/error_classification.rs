//! Turning transport failures into errors that name the socket at fault.
//!
//! Every engine this crate talks to is eventually a local socket: the
//! configured one, the one a spawned Podman service listens on, or the one an
//! SSH tunnel exposes. Bollard buries the interesting `io::Error` inside its
//! own error chain, so failures are unwrapped here and reported against the
//! socket path.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::HostScheme;
use crate::error::EngineError;

/// The filesystem path behind a local socket host, if it has one.
pub(super) fn local_socket_path(host: &str) -> Option<PathBuf> {
    match HostScheme::classify(host).ok()? {
        HostScheme::Unix => host.strip_prefix("unix://").map(PathBuf::from),
        HostScheme::Npipe => host.strip_prefix("npipe://").map(PathBuf::from),
        HostScheme::BarePath => Some(PathBuf::from(host)),
        HostScheme::Tcp | HostScheme::Http | HostScheme::Ssh => None,
    }
}

fn socket_error(kind: ErrorKind, path: &Path, message: &str) -> EngineError {
    match kind {
        ErrorKind::NotFound => EngineError::SocketNotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => EngineError::PermissionDenied {
            path: path.to_path_buf(),
        },
        // A socket file with nobody behind it: a stopped engine, a Podman
        // service that died, or a tunnel that has been closed.
        ErrorKind::ConnectionRefused => EngineError::ConnectionFailed {
            message: format!("nothing is listening on {}", path.display()),
        },
        _ => EngineError::ConnectionFailed {
            message: message.to_owned(),
        },
    }
}

/// The kind of the innermost `io::Error` in `error`'s source chain.
fn io_error_kind(error: &(dyn std::error::Error + 'static)) -> Option<ErrorKind> {
    std::iter::successors(Some(error), |cause| cause.source())
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .last()
        .map(std::io::Error::kind)
}

/// Classify a failure to reach the engine at `host`.
///
/// Network hosts keep Bollard's message; local sockets are reported as
/// missing, unreadable or abandoned.
pub(super) fn classify_connection_error(error: &bollard::errors::Error, host: &str) -> EngineError {
    let message = error.to_string();
    let Some(path) = local_socket_path(host) else {
        return EngineError::ConnectionFailed { message };
    };
    if matches!(error, bollard::errors::Error::SocketNotFoundError(_)) {
        return EngineError::SocketNotFound { path };
    }
    let direct = if let bollard::errors::Error::IOError { err } = error {
        Some(err.kind())
    } else {
        None
    };
    io_error_kind(error).or(direct).map_or_else(
        || EngineError::ConnectionFailed {
            message: message.clone(),
        },
        |kind| socket_error(kind, &path, &message),
    )
}

/// Classify a failed existence check on a local socket path.
pub(super) fn classify_socket_stat_error(error: &std::io::Error, path: &Path) -> EngineError {
    socket_error(
        error.kind(),
        path,
        &format!("cannot stat {}: {error}", path.display()),
    )
}

/// The default socket is missing and there is no Podman to fall back on.
pub(super) fn podman_not_found(socket: &Path) -> EngineError {
    EngineError::NoEngineAvailable {
        reason: format!(
            "{} does not exist and podman not found on PATH",
            socket.display()
        ),
    }
}

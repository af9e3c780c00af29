//! Discovery of the default Podman machine connection.
//!
//! On hosts where Podman runs inside a virtual machine (macOS, Windows) the
//! engine is reachable over SSH. `podman system connection list` reports the
//! connection URI and the SSH identity that Podman itself uses.

use std::path::Path;

use serde::Deserialize;
use tokio::process::Command;

/// A named Podman system connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PodmanConnection {
    /// Connection name, for example `podman-machine-default`.
    #[serde(rename = "Name")]
    pub name: String,

    /// Engine URI, usually `ssh://user@host:port/path/to/podman.sock`.
    #[serde(rename = "URI")]
    pub uri: String,

    /// Path of the SSH private key used for this connection.
    #[serde(rename = "Identity", default)]
    pub identity: String,

    /// Whether this is the default connection.
    #[serde(rename = "Default", default)]
    pub is_default: bool,
}

/// Pick the default connection out of the JSON connection list.
pub(super) fn parse_default_connection(
    json: &[u8],
) -> Result<Option<PodmanConnection>, serde_json::Error> {
    let connections: Vec<PodmanConnection> = serde_json::from_slice(json)?;
    Ok(connections.into_iter().find(|conn| conn.is_default))
}

/// Ask `podman` for its default system connection.
///
/// Any failure yields `None`; the caller then reports that no engine is
/// available.
pub(super) async fn query_default_connection(podman: &Path) -> Option<PodmanConnection> {
    let output = match Command::new(podman)
        .args(["system", "connection", "list", "--format=json"])
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(error) => {
            tracing::debug!(%error, podman = %podman.display(), "cannot list podman connections");
            return None;
        }
    };

    if !output.status.success() {
        tracing::debug!(
            status = %output.status,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "podman connection list failed"
        );
        return None;
    }

    match parse_default_connection(&output.stdout) {
        Ok(connection) => connection,
        Err(error) => {
            tracing::debug!(%error, "cannot decode podman connection list");
            None
        }
    }
}

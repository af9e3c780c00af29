//! Local socket forwarding over an established SSH session.
//!
//! A Unix listener is bound inside a private temporary directory. Every
//! connection accepted on it gets its own SSH channel to the remote engine
//! endpoint, so the engine client can treat the tunnel as an ordinary local
//! socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use super::session::{self, Session};
use super::target::RemoteEndpoint;
use crate::error::SshError;

/// A running SSH tunnel to a remote engine.
///
/// Dropping the tunnel stops accepting new connections; [`SshTunnel::close`]
/// additionally disconnects the SSH session and removes the local socket.
pub struct SshTunnel {
    session: Arc<Session>,
    socket_dir: Mutex<Option<TempDir>>,
    local_host: String,
    remote_host: String,
    accept_task: JoinHandle<()>,
    closed: AtomicBool,
}

impl SshTunnel {
    pub(super) fn start(
        session: Session,
        endpoint: RemoteEndpoint,
        remote_host: String,
    ) -> Result<Self, SshError> {
        let setup_failed = |error: std::io::Error| SshError::TunnelSetupFailed {
            message: error.to_string(),
        };
        let socket_dir = tempfile::Builder::new()
            .prefix("func-ssh-")
            .tempdir()
            .map_err(setup_failed)?;
        let socket_path = socket_dir.path().join("tunnel.sock");
        let listener = UnixListener::bind(&socket_path).map_err(setup_failed)?;

        let session = Arc::new(session);
        let accept_task = tokio::spawn(accept_loop(listener, Arc::clone(&session), endpoint));
        let local_host = format!("unix://{}", socket_path.display());
        tracing::debug!(%local_host, %remote_host, "ssh tunnel listening");

        Ok(Self {
            session,
            socket_dir: Mutex::new(Some(socket_dir)),
            local_host,
            remote_host,
            accept_task,
            closed: AtomicBool::new(false),
        })
    }

    /// The local `unix://` host that reaches the remote engine.
    #[must_use]
    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    /// The engine host as seen from the remote machine.
    #[must_use]
    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    /// Disconnect and remove the local socket. Only the first call acts.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.accept_task.abort();
        session::disconnect(&self.session).await;

        let socket_dir = self
            .socket_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = socket_dir {
            if let Err(error) = dir.close() {
                tracing::warn!(%error, "cannot remove ssh tunnel socket directory");
            }
        }
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: UnixListener, session: Arc<Session>, endpoint: RemoteEndpoint) {
    loop {
        let local = match listener.accept().await {
            Ok((stream, _)) => stream,
            Err(error) => {
                tracing::warn!(%error, "ssh tunnel stopped accepting connections");
                return;
            }
        };
        let connection_session = Arc::clone(&session);
        let connection_endpoint = endpoint.clone();
        tokio::spawn(async move {
            if let Err(error) = forward(&connection_session, &connection_endpoint, local).await {
                tracing::debug!(%error, "ssh tunnel connection ended with an error");
            }
        });
    }
}

async fn forward(
    session: &Session,
    endpoint: &RemoteEndpoint,
    mut local: UnixStream,
) -> Result<(), SshError> {
    let channel_failed = |error: russh::Error| SshError::ChannelFailed {
        message: error.to_string(),
    };
    let channel = match endpoint {
        RemoteEndpoint::Unix(path) => session
            .channel_open_direct_streamlocal(path.as_str())
            .await
            .map_err(channel_failed)?,
        RemoteEndpoint::Tcp { host, port } => session
            .channel_open_direct_tcpip(host.as_str(), u32::from(*port), "127.0.0.1", 0)
            .await
            .map_err(channel_failed)?,
    };

    let mut remote = channel.into_stream();
    tokio::io::copy_bidirectional(&mut local, &mut remote)
        .await
        .map_err(|error| SshError::ChannelFailed {
            message: error.to_string(),
        })?;
    Ok(())
}

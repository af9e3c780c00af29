//! SSH session establishment and authentication.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{ChannelMsg, Disconnect};
use tokio::net::TcpStream;

use super::SshConfig;
use super::host_key::HostKeyVerifier;
use super::target::SshTarget;
use crate::error::SshError;

/// Time allowed for the TCP connection to the SSH server.
pub(super) const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Standard private key names tried when no identity is configured.
const DEFAULT_KEY_NAMES: &[&str] = &[
    "id_rsa",
    "id_dsa",
    "id_ecdsa",
    "id_ecdsa_sk",
    "id_ed25519",
    "id_ed25519_sk",
];

/// Client-side handshake callbacks.
pub(super) struct ClientHandler {
    host: String,
    port: u16,
    verifier: Arc<HostKeyVerifier>,
    rejection: Arc<Mutex<Option<SshError>>>,
}

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        let verifier = Arc::clone(&self.verifier);
        let host = self.host.clone();
        let port = self.port;
        let presented = key.clone();
        let verdict = off_runtime("host key confirmation", move || {
            verifier.verify(&host, port, &presented)
        })
        .await;
        match verdict {
            Ok(()) => Ok(true),
            Err(error) => {
                *self
                    .rejection
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(error);
                Ok(false)
            }
        }
    }
}

/// An authenticated SSH session.
pub(super) type Session = Handle<ClientHandler>;

/// Run a callback that may block on the terminal away from the async workers.
async fn off_runtime<T, F>(what: &'static str, callback: F) -> Result<T, SshError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SshError> + Send + 'static,
{
    tokio::task::spawn_blocking(callback)
        .await
        .unwrap_or_else(|error| {
            Err(SshError::PromptFailed {
                what,
                message: error.to_string(),
            })
        })
}

/// Dial, verify the server key and authenticate.
///
/// Only the TCP connect is bounded by the connect timeout; the key exchange
/// may wait on the host key prompt for as long as the user needs.
pub(super) async fn open(target: &SshTarget, config: &SshConfig) -> Result<Session, SshError> {
    let host_label = format!("{}:{}", target.host, target.port);
    let connect_failed = |message: String| SshError::ConnectFailed {
        host: host_label.clone(),
        message,
    };

    let dialing = TcpStream::connect((target.host.as_str(), target.port));
    let stream = match tokio::time::timeout(config.connect_timeout, dialing).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(error)) => return Err(connect_failed(error.to_string())),
        Err(_) => {
            return Err(connect_failed(format!(
                "connection timed out after {}ms",
                config.connect_timeout.as_millis()
            )));
        }
    };
    if let Err(error) = stream.set_nodelay(true) {
        tracing::debug!(%error, "cannot disable Nagle on ssh connection");
    }

    let rejection = Arc::new(Mutex::new(None));
    let handler = ClientHandler {
        host: target.host.clone(),
        port: target.port,
        verifier: config.host_key_verifier(),
        rejection: Arc::clone(&rejection),
    };
    let handshake = client::connect_stream(Arc::new(client::Config::default()), stream, handler);
    let mut session = match handshake.await {
        Ok(session) => session,
        Err(error) => {
            let rejected = rejection
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Err(rejected.unwrap_or_else(|| connect_failed(error.to_string())));
        }
    };

    let user = target
        .user
        .clone()
        .or_else(|| config.default_user.clone())
        .unwrap_or_default();
    authenticate(&mut session, &user, target, config).await?;
    tracing::debug!(host = %host_label, %user, "ssh session established");
    Ok(session)
}

async fn authenticate(
    session: &mut Session,
    user: &str,
    target: &SshTarget,
    config: &SshConfig,
) -> Result<(), SshError> {
    let auth_failed = |error: russh::Error| SshError::ConnectFailed {
        host: format!("{}:{}", target.host, target.port),
        message: error.to_string(),
    };

    if let Some(password) = target.password.as_deref() {
        let result = session
            .authenticate_password(user, password)
            .await
            .map_err(auth_failed)?;
        if result.success() {
            return Ok(());
        }
    }

    let identity_config = config.clone();
    let (keys, load_error) =
        match off_runtime("passphrase", move || load_identities(&identity_config)).await {
            Ok(keys) => (keys, None),
            Err(error) => {
                tracing::debug!(%error, "ssh identity unusable, trying password");
                (Vec::new(), Some(error))
            }
        };
    for key in keys {
        let hash = session
            .best_supported_rsa_hash()
            .await
            .map_err(auth_failed)?
            .flatten();
        let result = session
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
            .await
            .map_err(auth_failed)?;
        if result.success() {
            return Ok(());
        }
    }

    let prompt = Arc::clone(&config.password_prompt);
    if let Ok(password) = off_runtime("password", move || prompt.secret()).await {
        let result = session
            .authenticate_password(user, password)
            .await
            .map_err(auth_failed)?;
        if result.success() {
            return Ok(());
        }
    }

    Err(load_error.unwrap_or_else(|| SshError::AuthenticationFailed {
        user: user.to_owned(),
        host: target.host.clone(),
    }))
}

/// Private keys to offer: the configured identity, or the single standard
/// key found in `~/.ssh`.
fn load_identities(config: &SshConfig) -> Result<Vec<PrivateKey>, SshError> {
    if let Some(identity) = config.identity.as_deref() {
        return load_identity(identity, config).map(|key| vec![key]);
    }

    let defaults = default_identity_paths(config.home.as_deref());
    match defaults.as_slice() {
        [only] => load_identity(only, config).map(|key| vec![key]),
        _ => Ok(Vec::new()),
    }
}

fn default_identity_paths(home: Option<&Path>) -> Vec<PathBuf> {
    let Some(ssh_dir) = home.map(|dir| dir.join(".ssh")) else {
        return Vec::new();
    };
    DEFAULT_KEY_NAMES
        .iter()
        .map(|name| ssh_dir.join(name))
        .filter(|path| path.is_file())
        .collect()
}

/// Load one private key, asking for a passphrase only if the key needs one.
pub(super) fn load_identity(path: &Path, config: &SshConfig) -> Result<PrivateKey, SshError> {
    let load_failed = |error: russh::keys::Error| SshError::IdentityLoadFailed {
        path: path.to_path_buf(),
        message: error.to_string(),
    };

    match russh::keys::load_secret_key(path, config.passphrase.as_deref()) {
        Ok(key) => Ok(key),
        Err(russh::keys::Error::KeyIsEncrypted) if config.passphrase.is_none() => {
            let passphrase = config.passphrase_prompt.secret()?;
            russh::keys::load_secret_key(path, Some(&passphrase)).map_err(load_failed)
        }
        Err(error) => Err(load_failed(error)),
    }
}

/// Run `command` remotely and return its standard output.
pub(super) async fn run_command(session: &Session, command: &str) -> Result<String, SshError> {
    let channel_failed = |error: russh::Error| SshError::ChannelFailed {
        message: error.to_string(),
    };
    let mut channel = session
        .channel_open_session()
        .await
        .map_err(channel_failed)?;
    channel.exec(true, command).await.map_err(channel_failed)?;

    let mut stdout = Vec::new();
    let mut exit_code = None;
    while let Some(message) = channel.wait().await {
        match message {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
            _ => {}
        }
    }

    match exit_code {
        Some(0) | None => Ok(String::from_utf8_lossy(&stdout).into_owned()),
        Some(code) => Err(SshError::ChannelFailed {
            message: format!("remote command {command:?} exited with status {code}"),
        }),
    }
}

/// Close the session politely; failures only matter for logging.
pub(super) async fn disconnect(session: &Session) {
    if let Err(error) = session
        .disconnect(Disconnect::ByApplication, "", "English")
        .await
    {
        tracing::debug!(%error, "ssh disconnect failed");
    }
}

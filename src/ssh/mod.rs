//! Engine access through SSH.
//!
//! An `ssh://` engine host names a machine whose container engine is reached
//! through an SSH session. [`open_tunnel`] authenticates, discovers the
//! engine's own `DOCKER_HOST` on the remote side (unless the URL already
//! carries a socket path) and exposes it as a local Unix socket.
//!
//! Authentication tries, in order: a password embedded in the URL, the
//! configured identity file (or the single standard key under `~/.ssh`), and
//! finally the interactive password prompt. Server keys are checked against
//! `~/.ssh/known_hosts`; unknown keys are put to the host key prompt.

mod host_key;
mod prompt;
mod session;
mod target;
#[cfg(test)]
mod test_keys;
#[cfg(test)]
mod test_server;
mod tunnel;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use host_key::{HostKeyPolicy, HostKeyVerifier};
pub use prompt::{
    HostKeyDecision, HostKeyPrompt, NoPrompt, PresentedKey, SecretPrompt, TerminalHostKeyPrompt,
    TerminalSecretPrompt,
};
pub use target::{DEFAULT_REMOTE_DOCKER_HOST, DEFAULT_SSH_PORT, RemoteEndpoint, SshTarget};
pub use tunnel::SshTunnel;

use crate::error::SshError;

/// Environment variable naming the private key used for engine SSH hosts.
pub const IDENTITY_ENV: &str = "DOCKER_HOST_SSH_IDENTITY";

/// Environment variable holding the passphrase for [`IDENTITY_ENV`].
pub const IDENTITY_PASSPHRASE_ENV: &str = "DOCKER_HOST_SSH_IDENTITY_PASSPHRASE";

/// Settings and callbacks for one SSH connection attempt.
#[derive(Clone)]
pub struct SshConfig {
    identity: Option<PathBuf>,
    passphrase: Option<String>,
    default_user: Option<String>,
    home: Option<PathBuf>,
    known_hosts: Option<PathBuf>,
    host_key_policy: HostKeyPolicy,
    connect_timeout: Duration,
    password_prompt: Arc<dyn SecretPrompt>,
    passphrase_prompt: Arc<dyn SecretPrompt>,
    host_key_prompt: Arc<dyn HostKeyPrompt>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            identity: None,
            passphrase: None,
            default_user: None,
            home: None,
            known_hosts: None,
            host_key_policy: HostKeyPolicy::Verify,
            connect_timeout: session::CONNECT_TIMEOUT,
            password_prompt: Arc::new(NoPrompt),
            passphrase_prompt: Arc::new(NoPrompt),
            host_key_prompt: Arc::new(NoPrompt),
        }
    }
}

impl SshConfig {
    /// Reads identity, passphrase, user and home directory from `env`.
    ///
    /// Prompts start out non-interactive; see [`SshConfig::interactive`].
    #[must_use]
    pub fn from_env<E: mockable::Env>(env: &E) -> Self {
        let non_empty = |name: &str| env.string(name).filter(|value| !value.is_empty());
        let home = non_empty("HOME").map(PathBuf::from).or_else(dirs::home_dir);
        Self {
            identity: non_empty(IDENTITY_ENV).map(PathBuf::from),
            passphrase: non_empty(IDENTITY_PASSPHRASE_ENV),
            default_user: non_empty("USER").or_else(|| non_empty("USERNAME")),
            known_hosts: home.as_ref().map(|dir| dir.join(".ssh").join("known_hosts")),
            home,
            ..Self::default()
        }
    }

    /// Installs terminal prompts for passwords, passphrases and host keys.
    #[must_use]
    pub fn interactive(self) -> Self {
        self.with_password_prompt(Arc::new(TerminalSecretPrompt::password()))
            .with_passphrase_prompt(Arc::new(TerminalSecretPrompt::passphrase()))
            .with_host_key_prompt(Arc::new(TerminalHostKeyPrompt::new()))
    }

    /// Sets the identity file.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<PathBuf>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the identity passphrase.
    #[must_use]
    pub fn with_passphrase(mut self, passphrase: Option<String>) -> Self {
        self.passphrase = passphrase;
        self
    }

    /// Sets the home directory searched for standard keys.
    #[must_use]
    pub fn with_home(mut self, home: Option<PathBuf>) -> Self {
        self.home = home;
        self
    }

    /// Sets the login name used when the URL has none.
    #[must_use]
    pub fn with_default_user(mut self, user: Option<String>) -> Self {
        self.default_user = user;
        self
    }

    /// Sets the `known_hosts` file.
    #[must_use]
    pub fn with_known_hosts(mut self, known_hosts: Option<PathBuf>) -> Self {
        self.known_hosts = known_hosts;
        self
    }

    /// Sets how server keys are checked.
    #[must_use]
    pub const fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Sets how long to wait for the TCP connection to the SSH server.
    ///
    /// The key exchange and authentication that follow are not bounded, so
    /// the user may take as long as needed to answer the prompts.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the password prompt.
    #[must_use]
    pub fn with_password_prompt(mut self, prompt: Arc<dyn SecretPrompt>) -> Self {
        self.password_prompt = prompt;
        self
    }

    /// Sets the passphrase prompt.
    #[must_use]
    pub fn with_passphrase_prompt(mut self, prompt: Arc<dyn SecretPrompt>) -> Self {
        self.passphrase_prompt = prompt;
        self
    }

    /// Sets the host key prompt.
    #[must_use]
    pub fn with_host_key_prompt(mut self, prompt: Arc<dyn HostKeyPrompt>) -> Self {
        self.host_key_prompt = prompt;
        self
    }

    /// The configured identity file, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&std::path::Path> {
        self.identity.as_deref()
    }

    /// The host key policy in force.
    #[must_use]
    pub const fn host_key_policy(&self) -> HostKeyPolicy {
        self.host_key_policy
    }

    fn host_key_verifier(&self) -> Arc<HostKeyVerifier> {
        Arc::new(HostKeyVerifier::new(
            self.known_hosts.clone(),
            self.host_key_policy,
            Arc::clone(&self.host_key_prompt),
        ))
    }
}

/// Connect to `url` and expose the remote engine on a local socket.
///
/// # Errors
///
/// Returns an [`SshError`] distinguishing URL, network, host key,
/// authentication and forwarding failures.
pub async fn open_tunnel(url: &str, config: &SshConfig) -> Result<SshTunnel, SshError> {
    let target = SshTarget::parse(url)?;
    let ssh = session::open(&target, config).await?;

    let (remote_host, endpoint) = match remote_endpoint(&ssh, &target).await {
        Ok(resolved) => resolved,
        Err(error) => {
            session::disconnect(&ssh).await;
            return Err(error);
        }
    };
    SshTunnel::start(ssh, endpoint, remote_host)
}

async fn remote_endpoint(
    ssh: &session::Session,
    target: &SshTarget,
) -> Result<(String, RemoteEndpoint), SshError> {
    let remote_host = match target.socket_path.as_deref() {
        Some(path) => format!("unix://{path}"),
        None => {
            let printed = session::run_command(ssh, "echo $DOCKER_HOST").await?;
            let value = printed.trim();
            if value.is_empty() {
                DEFAULT_REMOTE_DOCKER_HOST.to_owned()
            } else {
                value.to_owned()
            }
        }
    };
    let endpoint = RemoteEndpoint::from_docker_host(&remote_host)?;
    Ok((remote_host, endpoint))
}

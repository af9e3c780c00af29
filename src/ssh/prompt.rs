//! Interactive callbacks consulted while establishing an SSH session.
//!
//! Each terminal prompt asks at most once per instance and replays the
//! answer afterwards, so that several authentication attempts in one
//! connection do not re-prompt the user.

use std::sync::{Mutex, PoisonError};

use crate::error::SshError;
use crate::terminal;

/// Supplies a secret (password or key passphrase) on demand.
#[cfg_attr(test, mockall::automock)]
pub trait SecretPrompt: Send + Sync {
    /// Returns the secret, prompting the user if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::PromptFailed`] if no secret can be obtained.
    fn secret(&self) -> Result<String, SshError>;
}

/// The user's verdict on a host key that is not in `known_hosts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyDecision {
    /// Accept the key for this session.
    Trust,
    /// Refuse the key.
    Reject,
    /// Nobody could be asked.
    Undecided,
}

/// Details of a server key presented for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedKey {
    /// `host:port` as dialled.
    pub host_port: String,
    /// Key algorithm, for example `ssh-ed25519`.
    pub algorithm: String,
    /// `SHA256:` fingerprint of the key.
    pub fingerprint: String,
    /// The key in OpenSSH public key format.
    pub openssh: String,
}

/// Decides whether an unknown server key may be trusted.
#[cfg_attr(test, mockall::automock)]
pub trait HostKeyPrompt: Send + Sync {
    /// Asks whether `key` should be trusted.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::PromptFailed`] if the question cannot be asked.
    fn confirm(&self, key: &PresentedKey) -> Result<HostKeyDecision, SshError>;
}

/// Prompt that never has an answer; used for non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl SecretPrompt for NoPrompt {
    fn secret(&self) -> Result<String, SshError> {
        Err(SshError::PromptFailed {
            what: "secret",
            message: String::from("no interactive terminal available"),
        })
    }
}

impl HostKeyPrompt for NoPrompt {
    fn confirm(&self, _key: &PresentedKey) -> Result<HostKeyDecision, SshError> {
        Ok(HostKeyDecision::Undecided)
    }
}

/// Terminal prompt for a password or key passphrase.
#[derive(Debug)]
pub struct TerminalSecretPrompt {
    what: &'static str,
    label: &'static str,
    cached: Mutex<Option<String>>,
}

impl TerminalSecretPrompt {
    /// Prompt for the SSH login password.
    #[must_use]
    pub const fn password() -> Self {
        Self {
            what: "password",
            label: "please enter password: ",
            cached: Mutex::new(None),
        }
    }

    /// Prompt for the passphrase protecting a private key.
    #[must_use]
    pub const fn passphrase() -> Self {
        Self {
            what: "passphrase",
            label: "please enter passphrase to private key: ",
            cached: Mutex::new(None),
        }
    }
}

impl SecretPrompt for TerminalSecretPrompt {
    fn secret(&self) -> Result<String, SshError> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(secret) = cached.as_ref() {
            return Ok(secret.clone());
        }
        let secret = terminal::read_secret(self.label).map_err(|error| SshError::PromptFailed {
            what: self.what,
            message: error.to_string(),
        })?;
        *cached = Some(secret.clone());
        Ok(secret)
    }
}

/// Terminal prompt asking whether to trust an unknown host key.
///
/// A key accepted once is accepted again without asking.
#[derive(Debug, Default)]
pub struct TerminalHostKeyPrompt {
    trusted: Mutex<Option<String>>,
}

impl TerminalHostKeyPrompt {
    /// Creates a prompt with no remembered key.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            trusted: Mutex::new(None),
        }
    }
}

impl HostKeyPrompt for TerminalHostKeyPrompt {
    fn confirm(&self, key: &PresentedKey) -> Result<HostKeyDecision, SshError> {
        let mut trusted = self.trusted.lock().unwrap_or_else(PoisonError::into_inner);
        if trusted.as_deref() == Some(key.openssh.as_str()) {
            return Ok(HostKeyDecision::Trust);
        }

        let prompt_failed = |error: std::io::Error| SshError::PromptFailed {
            what: "host key confirmation",
            message: error.to_string(),
        };
        terminal::notice(&format!(
            "The authenticity of host {} cannot be established.\n{} key fingerprint is {}",
            key.host_port, key.algorithm, key.fingerprint
        ))
        .map_err(prompt_failed)?;
        let accepted = terminal::confirm("Are you sure you want to continue connecting")
            .map_err(prompt_failed)?;
        if !accepted {
            return Ok(HostKeyDecision::Reject);
        }

        terminal::notice(&format!(
            "To avoid this in future add following line into your ~/.ssh/known_hosts:\n{} {}",
            key.host_port, key.openssh
        ))
        .map_err(prompt_failed)?;
        *trusted = Some(key.openssh.clone());
        Ok(HostKeyDecision::Trust)
    }
}

//! Server host key verification against `known_hosts`.

use std::path::PathBuf;
use std::sync::Arc;

use russh::keys::{HashAlg, PublicKey};

use super::prompt::{HostKeyDecision, HostKeyPrompt, PresentedKey};
use crate::error::SshError;

/// How strictly server keys are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Consult `known_hosts`, then the interactive prompt.
    Verify,
    /// Accept any key. Reserved for connections the local Podman CLI itself
    /// configured.
    TrustAny,
}

/// Decides whether a server key presented during the handshake is acceptable.
pub struct HostKeyVerifier {
    known_hosts: Option<PathBuf>,
    policy: HostKeyPolicy,
    prompt: Arc<dyn HostKeyPrompt>,
}

impl HostKeyVerifier {
    /// Creates a verifier reading the given `known_hosts` file.
    #[must_use]
    pub fn new(
        known_hosts: Option<PathBuf>,
        policy: HostKeyPolicy,
        prompt: Arc<dyn HostKeyPrompt>,
    ) -> Self {
        Self {
            known_hosts,
            policy,
            prompt,
        }
    }

    /// Checks `key` as presented by `host:port`.
    ///
    /// A key listed for the host is accepted. A different key listed for the
    /// host is a hard failure. An unlisted key is put to the prompt.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::HostKeyMismatch`], [`SshError::HostKeyRejected`] or
    /// [`SshError::UnknownHostKey`] when the key is not trusted.
    pub fn verify(&self, host: &str, port: u16, key: &PublicKey) -> Result<(), SshError> {
        if self.policy == HostKeyPolicy::TrustAny {
            tracing::debug!(host, port, "accepting host key without verification");
            return Ok(());
        }

        let host_port = format!("{host}:{port}");
        if let Some(path) = self.known_hosts.as_ref().filter(|path| path.is_file()) {
            match russh::keys::check_known_hosts_path(host, port, key, path) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(russh::keys::Error::KeyChanged { line }) => {
                    return Err(SshError::HostKeyMismatch {
                        host: host_port,
                        line,
                    });
                }
                Err(error) => {
                    tracing::debug!(%error, path = %path.display(), "cannot read known_hosts");
                }
            }
        }

        let presented = PresentedKey {
            host_port: host_port.clone(),
            algorithm: key.algorithm().as_str().to_owned(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
            openssh: key
                .to_openssh()
                .unwrap_or_else(|_| key.algorithm().as_str().to_owned()),
        };
        match self.prompt.confirm(&presented)? {
            HostKeyDecision::Trust => Ok(()),
            HostKeyDecision::Reject => Err(SshError::HostKeyRejected { host: host_port }),
            HostKeyDecision::Undecided => Err(SshError::UnknownHostKey {
                host: host_port,
                fingerprint: presented.fingerprint,
            }),
        }
    }
}

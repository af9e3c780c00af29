//! Client for the `docker-credential-*` helper protocol.
//!
//! A helper is an executable taking the operation name as its only argument
//! and exchanging JSON (or a bare server URL) over stdin and stdout. Failures
//! are reported on stdout with a non-zero exit status; a missing entry is
//! reported with a fixed message that this client turns into `None`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::Credentials;
use super::registry::registry_equals;
use crate::error::CredentialsError;
use crate::path_search::find_executable;

/// Executable name prefix shared by all credential helpers.
pub const HELPER_PREFIX: &str = "docker-credential-";

/// Message helpers print when they hold no entry for a server URL.
const NOT_FOUND_MESSAGE: &str = "credentials not found in native keychain";

/// Wire form of a stored credential.
#[derive(Debug, Serialize, Deserialize)]
struct HelperCredentials {
    #[serde(rename = "ServerURL", default)]
    server_url: String,
    #[serde(rename = "Username")]
    username: String,
    #[serde(rename = "Secret")]
    secret: String,
}

/// One credential helper, identified by the suffix after
/// `docker-credential-`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHelper {
    name: String,
    program: PathBuf,
}

impl CredentialHelper {
    /// Names a helper, resolving its executable through the process `PATH`
    /// when it runs.
    ///
    /// The `docker-credential-` prefix is optional.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let bare = name.strip_prefix(HELPER_PREFIX).unwrap_or(name);
        Self {
            name: bare.to_owned(),
            program: PathBuf::from(format!("{HELPER_PREFIX}{bare}")),
        }
    }

    /// Names a helper and looks its executable up in `dirs` first.
    #[must_use]
    pub fn locate(name: &str, dirs: &[PathBuf]) -> Self {
        let helper = Self::new(name);
        match find_executable(&helper.program_name(), dirs) {
            Some(program) => Self { program, ..helper },
            None => helper,
        }
    }

    /// The helper name without the `docker-credential-` prefix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The helper executable name.
    #[must_use]
    pub fn program_name(&self) -> String {
        format!("{HELPER_PREFIX}{}", self.name)
    }

    /// Lists stored server URLs and their usernames.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Helper`] when the helper fails or prints
    /// something other than a JSON object.
    pub async fn list(&self) -> Result<BTreeMap<String, String>, CredentialsError> {
        let output = match self.run("list", b"").await {
            Ok(output) => output,
            Err(error) if is_not_found(&error) => return Ok(BTreeMap::new()),
            Err(error) => return Err(error),
        };
        if output.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&output).map_err(|error| self.failure("list", error.to_string()))
    }

    /// Fetches the entry stored under exactly `server_url`.
    ///
    /// Returns `Ok(None)` when the helper has no such entry.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Helper`] when the helper fails.
    pub async fn get(&self, server_url: &str) -> Result<Option<Credentials>, CredentialsError> {
        let output = match self.run("get", server_url.as_bytes()).await {
            Ok(output) => output,
            Err(error) if is_not_found(&error) => return Ok(None),
            Err(error) => return Err(error),
        };
        let stored: HelperCredentials = serde_json::from_slice(&output)
            .map_err(|error| self.failure("get", error.to_string()))?;
        Ok(Some(Credentials::new(stored.username, stored.secret)))
    }

    /// Stores `credentials` under `server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Helper`] when the helper fails; see
    /// [`is_unsupported_operation`] for helpers that cannot store.
    pub async fn store(
        &self,
        server_url: &str,
        credentials: &Credentials,
    ) -> Result<(), CredentialsError> {
        let payload = serde_json::to_vec(&HelperCredentials {
            server_url: server_url.to_owned(),
            username: credentials.username.clone(),
            secret: credentials.password.clone(),
        })
        .map_err(|error| self.failure("store", error.to_string()))?;
        self.run("store", &payload).await.map(drop)
    }

    /// Removes the entry stored under `server_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Helper`] when the helper fails.
    pub async fn erase(&self, server_url: &str) -> Result<(), CredentialsError> {
        self.run("erase", server_url.as_bytes()).await.map(drop)
    }

    /// Finds the entry whose server URL names `registry`.
    ///
    /// Helpers index entries by the spelling they were stored under, which
    /// may carry a scheme, path or different Docker Hub alias; the stored key
    /// is returned alongside the credentials.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialsError::Helper`] when listing or fetching fails.
    pub async fn find(
        &self,
        registry: &str,
    ) -> Result<Option<(String, Credentials)>, CredentialsError> {
        let stored = self.list().await?;
        let Some(server_url) = stored.keys().find(|url| registry_equals(url, registry)) else {
            return Ok(None);
        };
        Ok(self
            .get(server_url)
            .await?
            .map(|credentials| (server_url.clone(), credentials)))
    }

    async fn run(&self, operation: &'static str, input: &[u8]) -> Result<Vec<u8>, CredentialsError> {
        tracing::debug!(helper = %self.program_name(), operation, "running credential helper");
        let mut child = Command::new(&self.program)
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| self.failure(operation, error.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .await
                .map_err(|error| self.failure(operation, error.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|error| self.failure(operation, error.to_string()))?;
        if output.status.success() {
            return Ok(output.stdout);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let message = if stdout.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }
        } else {
            stdout
        };
        Err(self.failure(operation, message))
    }

    fn failure(&self, operation: &'static str, message: String) -> CredentialsError {
        CredentialsError::Helper {
            helper: self.program_name(),
            operation,
            message,
        }
    }
}

fn is_not_found(error: &CredentialsError) -> bool {
    matches!(error, CredentialsError::Helper { message, .. } if message == NOT_FOUND_MESSAGE)
}

/// Whether a helper rejected an operation it does not implement, as
/// read-only helpers do for `store`.
#[must_use]
pub fn is_unsupported_operation(error: &CredentialsError) -> bool {
    matches!(error, CredentialsError::Helper { message, .. } if message.contains("not implemented"))
}

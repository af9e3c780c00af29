//! Semantic error types for the funcdock library.
//!
//! This module defines the error hierarchy for funcdock, following the principle
//! of using semantic error enums (via `thiserror`) for conditions the caller might
//! inspect, retry, or present to the user, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while resolving or talking to a container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No engine host could be determined from the environment, the local
    /// socket, or podman.
    #[error("no container engine available: {reason}")]
    NoEngineAvailable {
        /// The missing prerequisite, e.g. "podman not found".
        reason: String,
    },

    /// The engine host URI could not be parsed or uses an unsupported scheme.
    #[error("invalid container engine host '{host}': {reason}")]
    InvalidHost {
        /// The offending host value.
        host: String,
        /// Why the host was rejected.
        reason: String,
    },

    /// Failed to build a client for the container engine.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// The podman service process could not be started.
    #[error("failed to start the podman service: {message}")]
    PodmanStartFailed {
        /// A description of the spawn failure.
        message: String,
    },

    /// The podman service process exited before it became ready.
    #[error("the podman process exited before the service came up ({status}); output: {output:?}")]
    PodmanExited {
        /// The exit status reported by the process.
        status: String,
        /// Combined stdout and stderr captured from the process.
        output: String,
    },

    /// The podman service did not answer a ping within the startup window.
    #[error("the podman service has not come up in {seconds} seconds; output: {output:?}")]
    PodmanStartTimeout {
        /// The startup window in seconds.
        seconds: u64,
        /// Combined stdout and stderr captured from the process.
        output: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

/// Errors that can occur while establishing an SSH tunnel to a remote engine.
#[derive(Debug, Error)]
pub enum SshError {
    /// The `ssh://` URL could not be interpreted.
    #[error("invalid ssh url '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// The TCP connection or SSH handshake failed.
    #[error("failed to connect to ssh server {host}: {message}")]
    ConnectFailed {
        /// The `host:port` being dialled.
        host: String,
        /// A description of the network failure.
        message: String,
    },

    /// The server rejected every authentication method that was tried.
    #[error("ssh authentication failed for {user}@{host}")]
    AuthenticationFailed {
        /// The remote user name.
        user: String,
        /// The remote host.
        host: String,
    },

    /// The server key is not present in `known_hosts` and was not accepted.
    #[error("server key for {host} not found in known_hosts (fingerprint {fingerprint})")]
    UnknownHostKey {
        /// The `host:port` of the server.
        host: String,
        /// The SHA-256 fingerprint of the presented key.
        fingerprint: String,
    },

    /// The server key differs from the one recorded in `known_hosts`.
    #[error("server key for {host} differs from key in known_hosts (line {line})")]
    HostKeyMismatch {
        /// The `host:port` of the server.
        host: String,
        /// The `known_hosts` line holding the recorded key.
        line: usize,
    },

    /// The user declined to trust the presented server key.
    #[error("server key for {host} rejected")]
    HostKeyRejected {
        /// The `host:port` of the server.
        host: String,
    },

    /// The private key identity could not be loaded or decrypted.
    #[error("failed to load ssh identity '{path}': {message}")]
    IdentityLoadFailed {
        /// The path to the identity file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// Reading a secret or a confirmation from the terminal failed.
    #[error("failed to read {what} from terminal: {message}")]
    PromptFailed {
        /// The kind of input being read.
        what: &'static str,
        /// A description of the failure.
        message: String,
    },

    /// The remote engine address cannot be tunnelled.
    #[error("remote container engine host '{host}' is not supported over ssh: {reason}")]
    UnsupportedRemoteHost {
        /// The remote `DOCKER_HOST` value.
        host: String,
        /// Why it cannot be tunnelled.
        reason: String,
    },

    /// An SSH channel operation failed after the session was established.
    #[error("ssh channel error: {message}")]
    ChannelFailed {
        /// A description of the failure.
        message: String,
    },

    /// Setting up the local end of the tunnel failed.
    #[error("failed to set up local tunnel endpoint: {message}")]
    TunnelSetupFailed {
        /// A description of the failure.
        message: String,
    },
}

/// Errors that can occur while resolving registry credentials.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// Every credential source was exhausted without a usable entry.
    #[error("credentials not found for registry '{registry}'")]
    NotFound {
        /// The registry that was queried.
        registry: String,
    },

    /// The registry explicitly rejected the credentials.
    #[error("bad credentials for registry '{registry}'")]
    Unauthorized {
        /// The registry that rejected the credentials.
        registry: String,
    },

    /// The registry could not be reached to verify credentials.
    #[error("failed to reach registry '{registry}': {message}")]
    RegistryUnreachable {
        /// The registry being contacted.
        registry: String,
        /// A description of the transport failure.
        message: String,
    },

    /// The HTTP client used to verify credentials could not be built.
    #[error("failed to build registry HTTP client: {message}")]
    HttpClient {
        /// A description of the failure.
        message: String,
    },

    /// A `docker-credential-*` helper invocation failed.
    #[error("credential helper '{helper}' failed to {operation}: {message}")]
    Helper {
        /// The helper executable name.
        helper: String,
        /// The protocol operation (`list`, `get`, `store`, `erase`).
        operation: &'static str,
        /// A description of the failure, including helper output.
        message: String,
    },

    /// A Docker-style configuration file could not be read or written.
    #[error("failed to access credentials config '{path}': {message}")]
    ConfigFile {
        /// The path to the configuration file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The image reference could not be parsed.
    #[error("cannot parse image reference '{reference}'")]
    InvalidReference {
        /// The offending reference.
        reference: String,
    },

    /// Prompting the user failed or was abandoned.
    #[error("failed to prompt for credentials: {message}")]
    PromptFailed {
        /// A description of the failure.
        message: String,
    },
}

/// Top-level error type for the funcdock library.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the library. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum FuncdockError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred while resolving or using a container engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// An error occurred while tunnelling to a remote engine over SSH.
    #[error(transparent)]
    Ssh(#[from] SshError),

    /// An error occurred while resolving registry credentials.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}

/// A specialised `Result` type for funcdock operations.
pub type Result<T> = std::result::Result<T, FuncdockError>;

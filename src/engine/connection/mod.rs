//! Engine host resolution and container engine connection.
//!
//! [`EngineResolver`] decides how to reach a container engine: an explicit
//! host from the environment, the local default socket, or Podman (a service
//! spawned on Linux, or the default machine connection elsewhere). The chosen
//! host is then connected through Bollard, directly or through an SSH tunnel,
//! and wrapped in an [`EngineHandle`] that owns whatever was started on its
//! behalf.

mod error_classification;
mod handle;
mod health_check;
mod podman_machine;
#[cfg(unix)]
mod podman_service;
mod probe;

use std::path::{Path, PathBuf};
use std::time::Duration;

use bollard::Docker;

pub use handle::{Cleanup, EngineHandle};
pub use podman_machine::PodmanConnection;
pub use probe::{HostProbe, Platform, SystemProbe};

use crate::error::{EngineError, FuncdockError};
#[cfg(unix)]
use crate::ssh::{HostKeyPolicy, SshConfig};

/// Environment variables checked, in order, for an explicit engine host.
const HOST_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Default timeout in seconds for health check operations.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default time allowed for a spawned Podman service to answer pings.
pub const PODMAN_START_TIMEOUT_SECS: u64 = 10;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_HOST: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_HOST: &str = "npipe:////./pipe/docker_engine";

/// Reads engine-related settings from the environment.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use funcdock::engine::HostResolver;
///
/// let env = DefaultEnv::new();
/// let resolver = HostResolver::new(&env);
///
/// if let Some(host) = resolver.resolve_from_env() {
///     println!("Engine host override: {host}");
/// }
/// ```
pub struct HostResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> HostResolver<'a, E> {
    /// Creates a new host resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Returns the first non-empty of `DOCKER_HOST`, `CONTAINER_HOST` and
    /// `PODMAN_HOST`.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        HOST_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default engine host.
    ///
    /// On Unix systems, this is `unix:///var/run/docker.sock`.
    /// On Windows systems, this is `npipe:////./pipe/docker_engine`.
    #[must_use]
    pub const fn default_host() -> &'static str {
        DEFAULT_HOST
    }

    /// Returns client certificate settings when `DOCKER_TLS_VERIFY` asks for
    /// TLS.
    ///
    /// Certificates are read from `DOCKER_CERT_PATH`, or `~/.docker` when that
    /// is unset.
    #[must_use]
    pub fn tls_settings(&self) -> Option<TlsSettings> {
        let verify = self.non_empty("DOCKER_TLS_VERIFY")?;
        if matches!(verify.to_ascii_lowercase().as_str(), "0" | "false" | "no") {
            return None;
        }
        let cert_dir = self
            .non_empty("DOCKER_CERT_PATH")
            .map(PathBuf::from)
            .or_else(|| self.home_dir().map(|home| home.join(".docker")))?;
        Some(TlsSettings::from_cert_dir(&cert_dir))
    }

    fn home_dir(&self) -> Option<PathBuf> {
        self.non_empty("HOME")
            .map(PathBuf::from)
            .or_else(dirs::home_dir)
    }

    fn non_empty(&self, name: &str) -> Option<String> {
        self.env.string(name).filter(|value| !value.is_empty())
    }
}

/// Client certificate files for a TLS-protected `tcp://` engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    /// Certificate authority bundle.
    pub ca: PathBuf,
    /// Client certificate.
    pub cert: PathBuf,
    /// Client private key.
    pub key: PathBuf,
}

impl TlsSettings {
    /// Uses `ca.pem`, `cert.pem` and `key.pem` from `dir`.
    #[must_use]
    pub fn from_cert_dir(dir: &Path) -> Self {
        Self {
            ca: dir.join("ca.pem"),
            cert: dir.join("cert.pem"),
            key: dir.join("key.pem"),
        }
    }
}

/// Classifies engine hosts by scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostScheme {
    /// `unix://` socket.
    Unix,
    /// `npipe://` Windows named pipe.
    Npipe,
    /// `tcp://`, rewritten to HTTP (or HTTPS with TLS settings).
    Tcp,
    /// `http://` or `https://`.
    Http,
    /// `ssh://`, reached through a tunnel.
    Ssh,
    /// Bare path without scheme prefix.
    BarePath,
}

impl HostScheme {
    /// Classify a host string by its scheme prefix.
    fn classify(host: &str) -> Result<Self, EngineError> {
        let scheme = match host.split_once("://") {
            Some(("unix", _)) => Self::Unix,
            Some(("npipe", _)) => Self::Npipe,
            Some(("tcp", _)) => Self::Tcp,
            Some(("http" | "https", _)) => Self::Http,
            Some(("ssh", _)) => Self::Ssh,
            Some((other, _)) => {
                return Err(EngineError::InvalidHost {
                    host: host.to_owned(),
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
            None if host.is_empty() => {
                return Err(EngineError::InvalidHost {
                    host: String::new(),
                    reason: String::from("empty host"),
                });
            }
            None => Self::BarePath,
        };
        Ok(scheme)
    }
}

/// Returns the host downstream tooling may reuse to reach the same engine.
///
/// Network endpoints and named pipes cannot be mounted elsewhere, and on
/// macOS a local socket is a forwarded path into the Podman or Docker VM, so
/// those yield an empty hint. SSH hosts report the remote `DOCKER_HOST`
/// instead; that value only exists once the tunnel is up.
fn remote_host_hint(host: &str, scheme: HostScheme, platform: Platform) -> String {
    match (scheme, platform) {
        (HostScheme::Tcp | HostScheme::Http | HostScheme::Npipe | HostScheme::Ssh, _)
        | (HostScheme::Unix | HostScheme::BarePath, Platform::MacOs) => String::new(),
        (HostScheme::BarePath, _) => {
            let normalized = EngineConnector::normalize_bare_path(host);
            if normalized.starts_with("unix://") {
                normalized
            } else {
                String::new()
            }
        }
        (HostScheme::Unix, _) => host.to_owned(),
    }
}

/// Provides methods to connect to Docker or Podman container engines.
///
/// The connector supports Unix sockets, Windows named pipes, HTTP, and HTTPS
/// endpoints.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the container engine at the specified host.
    ///
    /// Supports the following endpoint formats:
    /// - Unix sockets: `unix:///path/to/socket`
    /// - Windows named pipes: `npipe:////./pipe/name`
    /// - TCP: `tcp://host:port` (treated as HTTP connection)
    /// - HTTP: `http://host:port`
    /// - HTTPS: `https://host:port`
    /// - Bare paths: Paths starting with `\\` or `//` are treated as Windows
    ///   named pipes (e.g., `//./pipe/docker_engine`). All other paths are
    ///   treated as Unix sockets (e.g., `/var/run/docker.sock`). Detection is
    ///   syntax-based, not platform-based.
    ///
    /// `ssh://` hosts need a tunnel and are rejected here; use
    /// [`EngineResolver`] for those.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidHost` for unsupported schemes,
    /// `EngineError::SocketNotFound` or `EngineError::PermissionDenied` when a
    /// local socket cannot be used, and `EngineError::ConnectionFailed`
    /// otherwise.
    pub fn connect(host: &str) -> Result<Docker, FuncdockError> {
        let docker = match HostScheme::classify(host)? {
            HostScheme::Unix | HostScheme::Npipe => Docker::connect_with_socket(
                host,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            HostScheme::Tcp | HostScheme::Http => {
                // Rewrite tcp:// to http:// for Bollard compatibility
                let http_host = if host.starts_with("tcp://") {
                    host.replacen("tcp://", "http://", 1)
                } else {
                    host.to_owned()
                };
                Docker::connect_with_http(
                    &http_host,
                    CONNECTION_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
            HostScheme::BarePath => {
                let socket_uri = Self::normalize_bare_path(host);
                Docker::connect_with_socket(
                    &socket_uri,
                    CONNECTION_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                )
            }
            HostScheme::Ssh => {
                return Err(EngineError::InvalidHost {
                    host: host.to_owned(),
                    reason: String::from("ssh hosts must be reached through a tunnel"),
                }
                .into());
            }
        }
        .map_err(|e| {
            FuncdockError::from(error_classification::classify_connection_error(&e, host))
        })?;

        Ok(docker)
    }

    /// Connect to a `tcp://` or `https://` engine over TLS.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConnectionFailed` if a certificate cannot be
    /// loaded or the client cannot be built.
    pub fn connect_tls(host: &str, tls: &TlsSettings) -> Result<Docker, FuncdockError> {
        let https_host = if host.starts_with("tcp://") {
            host.replacen("tcp://", "https://", 1)
        } else {
            host.to_owned()
        };
        Docker::connect_with_ssl(
            &https_host,
            &tls.key,
            &tls.cert,
            &tls.ca,
            CONNECTION_TIMEOUT_SECS,
            bollard::API_DEFAULT_VERSION,
        )
        .map_err(|e| {
            FuncdockError::from(EngineError::ConnectionFailed {
                message: format!("tls connection to {host}: {e}"),
            })
        })
    }

    /// Normalize a bare socket path to a URI with the appropriate scheme.
    ///
    /// Paths starting with `\\` or `//` are assumed to be Windows named pipe
    /// paths (e.g., `\\.\pipe\docker_engine`) and are prefixed with `npipe://`.
    /// All other paths are assumed to be Unix socket paths and are prefixed
    /// with `unix://`.
    fn normalize_bare_path(path: &str) -> String {
        // Named pipes typically start with \\ or // (e.g., \\.\pipe\docker_engine)
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }
}

/// The outcome of the engine decision tree, before anything is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineTarget {
    /// Connect to an existing engine host.
    Host {
        /// The engine host URI.
        host: String,
        /// SSH identity that overrides the configured one.
        identity: Option<PathBuf>,
        /// Accept the SSH server key without verification.
        trust_host_key: bool,
    },
    /// Start a private `podman system service`.
    SpawnPodman {
        /// The `podman` executable.
        podman: PathBuf,
    },
}

/// A connected engine together with the host downstream tooling should use.
#[derive(Debug)]
pub struct ResolvedEngine {
    /// The connected engine.
    pub handle: EngineHandle,
    /// The engine host as reachable from elsewhere, or empty when the engine
    /// cannot be reused that way.
    pub remote_host: String,
}

/// Decides how to reach a container engine and connects to it.
///
/// Resolution order:
/// 1. `DOCKER_HOST` (then `CONTAINER_HOST`, `PODMAN_HOST`).
/// 2. The caller's default host, when its socket exists.
/// 3. Podman: a service spawned on Linux, or the default machine connection
///    elsewhere.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use funcdock::engine::{EngineResolver, HostResolver, SystemProbe};
///
/// let env = DefaultEnv::new();
/// let probe = SystemProbe::from_env(&env);
/// let resolved = EngineResolver::new(&env, &probe)
///     .resolve(Some(HostResolver::<DefaultEnv>::default_host()))
///     .await?;
/// resolved.handle.close().await;
/// ```
pub struct EngineResolver<'a, E: mockable::Env, P: HostProbe> {
    hosts: HostResolver<'a, E>,
    probe: &'a P,
    #[cfg(unix)]
    ssh: SshConfig,
    podman_start_timeout: Duration,
}

impl<'a, E: mockable::Env, P: HostProbe> EngineResolver<'a, E, P> {
    /// Creates a resolver reading `env` and inspecting the host through
    /// `probe`. SSH settings come from the same environment.
    #[must_use]
    pub fn new(env: &'a E, probe: &'a P) -> Self {
        Self {
            hosts: HostResolver::new(env),
            probe,
            #[cfg(unix)]
            ssh: SshConfig::from_env(env),
            podman_start_timeout: Duration::from_secs(PODMAN_START_TIMEOUT_SECS),
        }
    }

    /// Replaces the SSH settings used for `ssh://` hosts.
    #[cfg(unix)]
    #[must_use]
    pub fn with_ssh_config(mut self, ssh: SshConfig) -> Self {
        self.ssh = ssh;
        self
    }

    /// Sets how long a spawned Podman service may take to answer pings.
    #[must_use]
    pub const fn with_podman_start_timeout(mut self, timeout: Duration) -> Self {
        self.podman_start_timeout = timeout;
        self
    }

    /// Runs the decision tree without connecting to anything.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoEngineAvailable` when no host can be found,
    /// and `EngineError::PermissionDenied` or `EngineError::ConnectionFailed`
    /// when the default socket cannot be inspected.
    pub async fn select_target(
        &self,
        default_host: Option<&str>,
    ) -> Result<EngineTarget, EngineError> {
        if let Some(host) = self.hosts.resolve_from_env() {
            tracing::debug!(%host, "using engine host from environment");
            return Ok(EngineTarget::Host {
                host,
                identity: None,
                trust_host_key: false,
            });
        }

        let Some(default) = default_host.filter(|host| !host.is_empty()) else {
            return Err(EngineError::NoEngineAvailable {
                reason: String::from("no engine host configured"),
            });
        };

        let Some(socket) = error_classification::local_socket_path(default) else {
            tracing::debug!(host = default, "default host is not a local socket");
            return Ok(EngineTarget::Host {
                host: default.to_owned(),
                identity: None,
                trust_host_key: false,
            });
        };

        match self.probe.socket_exists(&socket) {
            Ok(true) => {
                tracing::debug!(host = default, "using default engine socket");
                return Ok(EngineTarget::Host {
                    host: default.to_owned(),
                    identity: None,
                    trust_host_key: false,
                });
            }
            Ok(false) => {}
            Err(error) => {
                return Err(error_classification::classify_socket_stat_error(
                    &error, &socket,
                ));
            }
        }

        let Some(podman) = self.probe.find_podman() else {
            return Err(error_classification::podman_not_found(&socket));
        };

        if self.probe.platform() == Platform::Linux {
            tracing::debug!(
                podman = %podman.display(),
                "default socket missing, spawning podman service"
            );
            return Ok(EngineTarget::SpawnPodman { podman });
        }

        let connection = self
            .probe
            .podman_default_connection(podman)
            .await
            .ok_or_else(|| EngineError::NoEngineAvailable {
                reason: String::from("podman has no default system connection"),
            })?;
        tracing::debug!(
            connection = %connection.name,
            host = %connection.uri,
            "using default podman machine connection"
        );
        Ok(EngineTarget::Host {
            host: connection.uri,
            identity: Some(connection.identity)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
            trust_host_key: true,
        })
    }

    /// Resolves and connects to a container engine.
    ///
    /// The returned handle owns any tunnel or service started for it; call
    /// [`EngineHandle::close`] to release them.
    ///
    /// # Errors
    ///
    /// Returns the decision tree errors of [`Self::select_target`], Podman
    /// start-up failures, SSH failures, and `EngineError::ConnectionFailed`.
    pub async fn resolve(
        &self,
        default_host: Option<&str>,
    ) -> Result<ResolvedEngine, FuncdockError> {
        match self.select_target(default_host).await? {
            EngineTarget::Host {
                host,
                identity,
                trust_host_key,
            } => self.connect_host(&host, identity, trust_host_key).await,
            EngineTarget::SpawnPodman { podman } => {
                #[cfg(unix)]
                {
                    self.spawn_podman(&podman).await
                }
                #[cfg(not(unix))]
                {
                    Err(EngineError::PodmanStartFailed {
                        message: format!(
                            "cannot run {} as a service on this platform",
                            podman.display()
                        ),
                    }
                    .into())
                }
            }
        }
    }

    async fn connect_host(
        &self,
        host: &str,
        identity: Option<PathBuf>,
        trust_host_key: bool,
    ) -> Result<ResolvedEngine, FuncdockError> {
        let scheme = HostScheme::classify(host)?;
        if scheme == HostScheme::Ssh {
            #[cfg(unix)]
            {
                return self.connect_ssh(host, identity, trust_host_key).await;
            }
            #[cfg(not(unix))]
            {
                let _ = (identity, trust_host_key);
                return Err(EngineError::InvalidHost {
                    host: host.to_owned(),
                    reason: String::from("ssh hosts are only supported on unix platforms"),
                }
                .into());
            }
        }

        let client = match (scheme, self.hosts.tls_settings()) {
            (HostScheme::Tcp | HostScheme::Http, Some(tls)) => {
                EngineConnector::connect_tls(host, &tls)?
            }
            _ => EngineConnector::connect(host)?,
        };
        Ok(ResolvedEngine {
            remote_host: remote_host_hint(host, scheme, self.probe.platform()),
            handle: EngineHandle::new(client, host),
        })
    }

    #[cfg(unix)]
    async fn connect_ssh(
        &self,
        host: &str,
        identity: Option<PathBuf>,
        trust_host_key: bool,
    ) -> Result<ResolvedEngine, FuncdockError> {
        let mut config = self.ssh.clone();
        if identity.is_some() {
            config = config.with_identity(identity);
        }
        if trust_host_key {
            config = config.with_host_key_policy(HostKeyPolicy::TrustAny);
        }

        let tunnel = crate::ssh::open_tunnel(host, &config).await?;
        let client = match EngineConnector::connect(tunnel.local_host()) {
            Ok(client) => client,
            Err(error) => {
                tunnel.close().await;
                return Err(error);
            }
        };
        let remote_host = tunnel.remote_host().to_owned();
        tracing::info!(%host, %remote_host, "ssh tunnel to engine established");

        let cleanup: Cleanup = Box::new(move || {
            Box::pin(async move {
                tunnel.close().await;
            })
        });
        Ok(ResolvedEngine {
            handle: EngineHandle::with_cleanup(client, host, cleanup),
            remote_host,
        })
    }

    #[cfg(unix)]
    async fn spawn_podman(&self, podman: &Path) -> Result<ResolvedEngine, FuncdockError> {
        let podman_service::StartedService {
            client,
            host,
            service,
        } = podman_service::start(podman, self.podman_start_timeout).await?;
        tracing::info!(%host, "podman service ready");

        let cleanup: Cleanup = Box::new(move || {
            Box::pin(async move {
                service.stop().await;
            })
        });
        Ok(ResolvedEngine {
            handle: EngineHandle::with_cleanup(client, host.clone(), cleanup),
            remote_host: host,
        })
    }
}

//! Parsing of `ssh://` engine hosts and of the remote `DOCKER_HOST`.

use reqwest::Url;

use crate::error::SshError;

/// Port used when an `ssh://` URL does not name one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Engine host used when the remote shell does not export `DOCKER_HOST`.
pub const DEFAULT_REMOTE_DOCKER_HOST: &str = "unix:///var/run/docker.sock";

/// The pieces of an `ssh://[user[:password]@]host[:port][/socket/path]` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    /// Login name, if the URL carries one.
    pub user: Option<String>,
    /// Password embedded in the URL.
    pub password: Option<String>,
    /// Host name or address, without IPv6 brackets.
    pub host: String,
    /// TCP port of the SSH server.
    pub port: u16,
    /// Remote engine socket path given in the URL.
    pub socket_path: Option<String>,
}

impl SshTarget {
    /// Parses an `ssh://` engine host.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::InvalidUrl`] when the value is not an `ssh` URL
    /// with a host.
    pub fn parse(url: &str) -> Result<Self, SshError> {
        let invalid = |reason: &str| SshError::InvalidUrl {
            url: url.to_owned(),
            reason: reason.to_owned(),
        };
        let parsed = Url::parse(url).map_err(|error| invalid(&error.to_string()))?;
        if parsed.scheme() != "ssh" {
            return Err(invalid("scheme must be ssh"));
        }
        let host = parsed
            .host_str()
            .map(|value| value.trim_start_matches('[').trim_end_matches(']'))
            .filter(|value| !value.is_empty())
            .ok_or_else(|| invalid("missing host"))?
            .to_owned();

        Ok(Self {
            user: Some(parsed.username())
                .filter(|name| !name.is_empty())
                .map(str::to_owned),
            password: parsed.password().map(str::to_owned),
            host,
            port: parsed.port().unwrap_or(DEFAULT_SSH_PORT),
            socket_path: Some(parsed.path())
                .filter(|path| !path.is_empty() && *path != "/")
                .map(str::to_owned),
        })
    }
}

/// Where the engine listens on the far side of the SSH connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEndpoint {
    /// A Unix domain socket path.
    Unix(String),
    /// A TCP address.
    Tcp {
        /// Host as seen from the SSH server.
        host: String,
        /// Port as seen from the SSH server.
        port: u16,
    },
}

impl RemoteEndpoint {
    /// Interprets a remote `DOCKER_HOST` value.
    ///
    /// # Errors
    ///
    /// Returns [`SshError::UnsupportedRemoteHost`] for named pipes, unknown
    /// schemes and unparsable values.
    pub fn from_docker_host(value: &str) -> Result<Self, SshError> {
        let unsupported = |reason: &str| SshError::UnsupportedRemoteHost {
            host: value.to_owned(),
            reason: reason.to_owned(),
        };
        let parsed = Url::parse(value).map_err(|error| unsupported(&error.to_string()))?;
        match parsed.scheme() {
            "unix" => Ok(Self::Unix(parsed.path().to_owned())),
            "tcp" | "fd" => {
                let host = parsed
                    .host_str()
                    .ok_or_else(|| unsupported("missing host"))?
                    .to_owned();
                let port = parsed.port().ok_or_else(|| unsupported("missing port"))?;
                Ok(Self::Tcp { host, port })
            }
            "npipe" => Err(unsupported(
                "named pipes cannot be forwarded over an SSH channel",
            )),
            other => Err(unsupported(&format!("unsupported scheme {other}"))),
        }
    }
}

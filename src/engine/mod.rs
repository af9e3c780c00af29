//! Container engine connection and management.
//!
//! This module decides how to reach a Docker or Podman engine and returns a
//! live client. The host is resolved through an ordered decision tree:
//!
//! 1. `DOCKER_HOST` (then `CONTAINER_HOST`, `PODMAN_HOST`) environment
//!    variables
//! 2. The caller's default host, when its socket exists
//!    (`/var/run/docker.sock` on Unix)
//! 3. On Linux, a private `podman system service` started for the handle
//! 4. Elsewhere, Podman's default machine connection over SSH
//!
//! The resulting [`EngineHandle`] dereferences to a Bollard client and owns
//! any tunnel or service opened on its behalf until it is closed.

mod connection;

pub use connection::{
    Cleanup, EngineConnector, EngineHandle, EngineResolver, EngineTarget,
    HEALTH_CHECK_TIMEOUT_SECS, HostProbe, HostResolver, PODMAN_START_TIMEOUT_SECS, Platform,
    PodmanConnection, ResolvedEngine, SystemProbe, TlsSettings,
};

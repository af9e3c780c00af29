//! Engine health check.
//!
//! A resolved engine is only worth handing out once it answers a ping; the
//! check is bounded so that a wedged socket or tunnel fails fast.

use std::time::Duration;

use bollard::Docker;

use super::error_classification::classify_connection_error;
use super::{EngineConnector, EngineHandle};
use crate::error::{EngineError, FuncdockError};

impl EngineConnector {
    /// Ping `docker` and wait at most `timeout_secs` for the answer.
    ///
    /// Transport failures on a local socket are reported as
    /// `SocketNotFound` or `PermissionDenied` for `host`; anything else the
    /// engine answers is a failed health check.
    pub(super) async fn ping_with_timeout(
        docker: &Docker,
        host: &str,
        timeout_secs: u64,
    ) -> Result<(), FuncdockError> {
        let timeout = Duration::from_secs(timeout_secs);

        tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| {
                FuncdockError::from(EngineError::HealthCheckTimeout {
                    seconds: timeout_secs,
                })
            })?
            .map_err(|e| {
                let classified = match classify_connection_error(&e, host) {
                    EngineError::ConnectionFailed { message } => {
                        EngineError::HealthCheckFailed { message }
                    }
                    other => other,
                };
                FuncdockError::from(classified)
            })?;
        Ok(())
    }

    /// Verify the container engine is responsive.
    ///
    /// Sends a ping request to the engine and waits up to `timeout_secs` for
    /// a response. This confirms the engine is operational, not just that
    /// the socket is reachable.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::HealthCheckFailed` if the engine does not
    /// respond correctly.
    ///
    /// Returns `EngineError::HealthCheckTimeout` if the check times out.
    pub async fn health_check_async(
        handle: &EngineHandle,
        timeout_secs: u64,
    ) -> Result<(), FuncdockError> {
        Self::ping_with_timeout(handle.client(), handle.host(), timeout_secs).await
    }
}

//! Engine client handle with an attached teardown action.

use std::fmt;
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

use bollard::Docker;

use crate::BoxFuture;

/// Deferred teardown for whatever transport backs an [`EngineHandle`].
pub type Cleanup = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A connected engine client plus the resources that keep it reachable.
///
/// All Docker API operations pass straight through to the wrapped
/// [`bollard::Docker`] client via [`Deref`]. Closing the handle tears down
/// any spawned Podman service or SSH tunnel exactly once; further calls to
/// [`EngineHandle::close`] do nothing. API calls issued after `close` fail with
/// connection errors because the transport is gone.
pub struct EngineHandle {
    client: Docker,
    host: String,
    cleanup: Mutex<Option<Cleanup>>,
}

impl EngineHandle {
    /// Wraps a client that owns no extra resources.
    #[must_use]
    pub fn new(client: Docker, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            cleanup: Mutex::new(None),
        }
    }

    /// Wraps a client whose transport must be released on close.
    #[must_use]
    pub fn with_cleanup(client: Docker, host: impl Into<String>, cleanup: Cleanup) -> Self {
        Self {
            client,
            host: host.into(),
            cleanup: Mutex::new(Some(cleanup)),
        }
    }

    /// The host URI the client is connected to.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The underlying Bollard client.
    #[must_use]
    pub const fn client(&self) -> &Docker {
        &self.client
    }

    /// Reports whether teardown is still outstanding.
    #[must_use]
    pub fn has_pending_cleanup(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Releases the transport. Safe to call any number of times.
    ///
    /// Teardown failures are logged rather than returned; once this resolves
    /// the spawned service or tunnel is gone as far as it can be made so.
    pub async fn close(&self) {
        let cleanup = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleanup) = cleanup {
            tracing::debug!(host = %self.host, "closing engine transport");
            cleanup().await;
        }
    }
}

impl Deref for EngineHandle {
    type Target = Docker;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("host", &self.host)
            .field("pending_cleanup", &self.has_pending_cleanup())
            .finish_non_exhaustive()
    }
}

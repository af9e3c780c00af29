//! Ad-hoc `podman system service` lifecycle.
//!
//! When no engine socket exists on Linux but `podman` is installed, a private
//! API service is started on a socket inside a fresh temporary directory. The
//! service runs in its own process group so that teardown reaches any helper
//! processes it forks. Its combined stdout and stderr are buffered so that
//! start-up failures can be reported with the service's own diagnostics.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bollard::Docker;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;

use super::EngineConnector;
use crate::error::{EngineError, FuncdockError};

/// Interval between readiness pings.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Time allowed for buffered output to be collected after the service exits.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Grace period between SIGTERM and SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

type OutputBuffer = Arc<Mutex<Vec<u8>>>;

/// A running Podman API service owned by this process.
pub(super) struct PodmanService {
    process_group: Pid,
    exit: watch::Receiver<Option<String>>,
    output: OutputBuffer,
    socket_dir: Mutex<Option<TempDir>>,
    stopped: AtomicBool,
}

/// A started service together with a client bound to its socket.
pub(super) struct StartedService {
    pub(super) client: Docker,
    pub(super) host: String,
    pub(super) service: PodmanService,
}

/// Start `podman system service` and wait until it answers pings.
///
/// Readiness, early exit and `start_timeout` race each other; whichever
/// happens first decides the outcome. On any failure the service has already
/// been torn down when this returns.
pub(super) async fn start(
    podman: &Path,
    start_timeout: Duration,
) -> Result<StartedService, FuncdockError> {
    launch(podman, start_timeout, READY_POLL_INTERVAL).await
}

async fn launch(
    podman: &Path,
    start_timeout: Duration,
    poll_interval: Duration,
) -> Result<StartedService, FuncdockError> {
    let socket_dir = tempfile::Builder::new()
        .prefix("func-podman-")
        .tempdir()
        .map_err(|error| EngineError::PodmanStartFailed {
            message: format!("cannot create socket directory: {error}"),
        })?;
    let host = format!("unix://{}", socket_dir.path().join("podman.sock").display());

    let mut child = Command::new(podman)
        .args(["system", "service", host.as_str(), "--time=0"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|error| EngineError::PodmanStartFailed {
            message: format!("cannot run {}: {error}", podman.display()),
        })?;

    let process_group = child
        .id()
        .and_then(|pid| i32::try_from(pid).ok())
        .map(Pid::from_raw)
        .ok_or_else(|| EngineError::PodmanStartFailed {
            message: String::from("podman exited before its process id was known"),
        })?;

    let output: OutputBuffer = Arc::default();
    let mut drains = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        drains.push(tokio::spawn(drain(stdout, Arc::clone(&output))));
    }
    if let Some(stderr) = child.stderr.take() {
        drains.push(tokio::spawn(drain(stderr, Arc::clone(&output))));
    }

    let (exit_tx, exit) = watch::channel(None);
    tokio::spawn(async move {
        let status = match child.wait().await {
            Ok(status) => describe_exit(status),
            Err(error) => format!("wait failed: {error}"),
        };
        // Pipes may be inherited by grandchildren, so do not wait for EOF forever.
        let flushed = tokio::time::timeout(DRAIN_GRACE, async {
            for handle in drains {
                if handle.await.is_err() {
                    break;
                }
            }
        })
        .await;
        if flushed.is_err() {
            tracing::debug!("podman output still open after exit");
        }
        exit_tx.send_replace(Some(status));
    });

    let service = PodmanService {
        process_group,
        exit,
        output,
        socket_dir: Mutex::new(Some(socket_dir)),
        stopped: AtomicBool::new(false),
    };
    tracing::debug!(%host, pid = %process_group, "started podman service");

    match service.wait_ready(&host, start_timeout, poll_interval).await {
        Ok(client) => Ok(StartedService {
            client,
            host,
            service,
        }),
        Err(error) => {
            service.stop().await;
            Err(error.into())
        }
    }
}

impl PodmanService {
    /// Ping `host` every `poll_interval` until it answers, the service
    /// exits or `start_timeout` runs out.
    ///
    /// The client is rebuilt on every attempt because the socket does not
    /// exist until the service has bound it.
    async fn wait_ready(
        &self,
        host: &str,
        start_timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Docker, EngineError> {
        let mut exit = self.exit.clone();
        let readiness = async {
            loop {
                if let Ok(client) = EngineConnector::connect(host)
                    && client.ping().await.is_ok()
                {
                    return client;
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        tokio::select! {
            client = readiness => Ok(client),
            exited = exit.wait_for(Option::is_some) => {
                let status = exited
                    .ok()
                    .and_then(|status| status.clone())
                    .unwrap_or_else(|| String::from("unknown status"));
                Err(EngineError::PodmanExited {
                    status,
                    output: self.captured_output(),
                })
            }
            () = tokio::time::sleep(start_timeout) => {
                Err(EngineError::PodmanStartTimeout {
                    seconds: start_timeout.as_secs(),
                    output: self.captured_output(),
                })
            }
        }
    }

    /// Terminate the process group and remove the socket directory.
    ///
    /// Only the first call does anything.
    pub(super) async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        signal_group(self.process_group, Signal::SIGTERM);
        let mut exit = self.exit.clone();
        if tokio::time::timeout(TERMINATE_GRACE, exit.wait_for(Option::is_some))
            .await
            .is_err()
        {
            tracing::debug!(pid = %self.process_group, "podman ignored SIGTERM");
            signal_group(self.process_group, Signal::SIGKILL);
        }

        let socket_dir = self
            .socket_dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = socket_dir {
            let path = dir.path().to_path_buf();
            if let Err(error) = dir.close() {
                tracing::warn!(
                    %error,
                    path = %path.display(),
                    "cannot remove podman socket directory"
                );
            }
        }
    }

    fn captured_output(&self) -> String {
        let output = self.output.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&output).trim().to_owned()
    }
}

impl Drop for PodmanService {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            signal_group(self.process_group, Signal::SIGKILL);
        }
    }
}

async fn drain<R: AsyncRead + Unpin>(mut reader: R, output: OutputBuffer) {
    let mut chunk = [0_u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => {
                let Some(bytes) = chunk.get(..read) else {
                    break;
                };
                output
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .extend_from_slice(bytes);
            }
        }
    }
}

fn signal_group(process_group: Pid, signal: Signal) {
    if let Err(errno) = killpg(process_group, signal) {
        tracing::debug!(%errno, ?signal, pid = %process_group, "cannot signal podman service");
    }
}

fn describe_exit(status: ExitStatus) -> String {
    status.code().map_or_else(
        || format!("terminated by {status}"),
        |code| format!("exit code {code}"),
    )
}

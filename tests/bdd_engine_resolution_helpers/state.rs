//! Shared behavioural-test state for engine-resolution scenarios.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use funcdock::BoxFuture;
use funcdock::engine::{EngineTarget, HostProbe, Platform, PodmanConnection};
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// Step result type for engine-resolution BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Default host used when a scenario does not set one.
pub const DEFAULT_SOCKET_HOST: &str = "unix:///var/run/docker.sock";

/// What the decision tree produced.
#[derive(Clone)]
pub enum ResolutionOutcome {
    /// A target was selected.
    Selected(EngineTarget),
    /// The tree failed with the given message.
    Failed(String),
}

/// Host facts served to the resolver in place of the real machine.
#[derive(Clone)]
pub struct ScriptedProbe {
    pub(crate) socket_exists: bool,
    pub(crate) podman: Option<PathBuf>,
    pub(crate) connection: Option<PodmanConnection>,
    pub(crate) platform: Platform,
}

impl HostProbe for ScriptedProbe {
    fn socket_exists(&self, _path: &Path) -> io::Result<bool> {
        Ok(self.socket_exists)
    }

    fn find_podman(&self) -> Option<PathBuf> {
        self.podman.clone()
    }

    fn podman_default_connection(
        &self,
        _podman: PathBuf,
    ) -> BoxFuture<'_, Option<PodmanConnection>> {
        let connection = self.connection.clone();
        Box::pin(async move { connection })
    }

    fn platform(&self) -> Platform {
        self.platform
    }
}

/// Shared scenario state for engine-resolution behavioural tests.
#[derive(Default, ScenarioState)]
pub struct EngineResolutionState {
    /// Environment variables served through `MockEnv`.
    pub(crate) env_vars: Slot<HashMap<String, String>>,
    /// The caller's default host.
    pub(crate) default_host: Slot<String>,
    /// Whether the default socket exists.
    pub(crate) socket_exists: Slot<bool>,
    /// Path reported for the `podman` executable.
    pub(crate) podman: Slot<PathBuf>,
    /// Default Podman system connection.
    pub(crate) connection: Slot<PodmanConnection>,
    /// Reported platform.
    pub(crate) platform: Slot<Platform>,
    /// Result of the decision tree.
    pub(crate) outcome: Slot<ResolutionOutcome>,
}

impl EngineResolutionState {
    /// Records an environment variable for the scenario.
    pub(crate) fn set_env(&self, key: &str, value: &str) {
        let mut vars = self.env_vars.get().unwrap_or_default();
        vars.insert(String::from(key), String::from(value));
        self.env_vars.set(vars);
    }

    /// Builds the probe described by the given steps.
    pub(crate) fn probe(&self) -> ScriptedProbe {
        ScriptedProbe {
            socket_exists: self.socket_exists.get().unwrap_or(false),
            podman: self.podman.get(),
            connection: self.connection.get(),
            platform: self.platform.get().unwrap_or(Platform::Linux),
        }
    }
}

/// Fixture providing a fresh engine-resolution state.
#[fixture]
pub fn engine_resolution_state() -> EngineResolutionState {
    EngineResolutionState::default()
}

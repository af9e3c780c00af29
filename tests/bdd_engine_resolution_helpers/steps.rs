//! Given/when step definitions for engine-resolution behavioural scenarios.

use std::path::PathBuf;

use funcdock::engine::{EngineResolver, Platform, PodmanConnection};
use mockable::MockEnv;
use rstest_bdd_macros::{given, when};

use super::state::{DEFAULT_SOCKET_HOST, EngineResolutionState, ResolutionOutcome, StepResult};

#[given("DOCKER_HOST is set to {value}")]
fn docker_host_is_set_to(engine_resolution_state: &EngineResolutionState, value: String) {
    engine_resolution_state.set_env("DOCKER_HOST", &value);
}

#[given("DOCKER_HOST is empty")]
fn docker_host_is_empty(engine_resolution_state: &EngineResolutionState) {
    engine_resolution_state.set_env("DOCKER_HOST", "");
}

#[given("CONTAINER_HOST is set to {value}")]
fn container_host_is_set_to(engine_resolution_state: &EngineResolutionState, value: String) {
    engine_resolution_state.set_env("CONTAINER_HOST", &value);
}

#[given("the default socket exists")]
fn default_socket_exists(engine_resolution_state: &EngineResolutionState) {
    engine_resolution_state.socket_exists.set(true);
}

#[given("the default host is {host}")]
fn default_host_is(engine_resolution_state: &EngineResolutionState, host: String) {
    engine_resolution_state.default_host.set(host);
}

#[given("the platform is {platform}")]
fn platform_is(engine_resolution_state: &EngineResolutionState, platform: String) -> StepResult<()> {
    let parsed = match platform.as_str() {
        "linux" => Platform::Linux,
        "macos" => Platform::MacOs,
        "windows" => Platform::Windows,
        other => return Err(format!("unknown platform '{other}'")),
    };
    engine_resolution_state.platform.set(parsed);
    Ok(())
}

#[given("podman is installed")]
fn podman_is_installed(engine_resolution_state: &EngineResolutionState) {
    engine_resolution_state
        .podman
        .set(PathBuf::from("/usr/bin/podman"));
}

#[given("the default podman connection is {uri}")]
fn default_podman_connection_is(engine_resolution_state: &EngineResolutionState, uri: String) {
    engine_resolution_state.connection.set(PodmanConnection {
        name: String::from("podman-machine-default"),
        uri,
        identity: String::from("/home/user/.ssh/podman-machine-default"),
        is_default: true,
    });
}

#[when("the engine target is selected")]
fn engine_target_is_selected(engine_resolution_state: &EngineResolutionState) -> StepResult<()> {
    let vars = engine_resolution_state.env_vars.get().unwrap_or_default();
    let mut env = MockEnv::new();
    env.expect_string()
        .returning(move |key| vars.get(key).cloned());

    let probe = engine_resolution_state.probe();
    let default_host = engine_resolution_state
        .default_host
        .get()
        .unwrap_or_else(|| String::from(DEFAULT_SOCKET_HOST));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|error| format!("failed to create tokio runtime for scenario: {error}"))?;
    let selected =
        runtime.block_on(EngineResolver::new(&env, &probe).select_target(Some(&default_host)));
    let outcome = match selected {
        Ok(target) => ResolutionOutcome::Selected(target),
        Err(error) => ResolutionOutcome::Failed(error.to_string()),
    };
    engine_resolution_state.outcome.set(outcome);
    Ok(())
}

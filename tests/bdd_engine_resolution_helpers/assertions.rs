//! Then-step assertions for engine-resolution behavioural scenarios.

use funcdock::engine::EngineTarget;
use rstest_bdd_macros::then;

use super::state::{EngineResolutionState, ResolutionOutcome, StepResult};

fn selected_target(state: &EngineResolutionState) -> StepResult<EngineTarget> {
    match state.outcome.get() {
        Some(ResolutionOutcome::Selected(target)) => Ok(target),
        Some(ResolutionOutcome::Failed(message)) => {
            Err(format!("expected a target, resolution failed: {message}"))
        }
        None => Err(String::from("resolution outcome should be set")),
    }
}

#[then("the engine host is {expected}")]
fn engine_host_is(engine_resolution_state: &EngineResolutionState, expected: String) -> StepResult<()> {
    match selected_target(engine_resolution_state)? {
        EngineTarget::Host { host, .. } if host == expected => Ok(()),
        other => Err(format!("expected host {expected}, got {other:?}")),
    }
}

#[then("a podman service is spawned")]
fn podman_service_is_spawned(engine_resolution_state: &EngineResolutionState) -> StepResult<()> {
    match selected_target(engine_resolution_state)? {
        EngineTarget::SpawnPodman { .. } => Ok(()),
        other => Err(format!("expected a podman service, got {other:?}")),
    }
}

#[then("the host key is trusted")]
fn host_key_is_trusted(engine_resolution_state: &EngineResolutionState) -> StepResult<()> {
    match selected_target(engine_resolution_state)? {
        EngineTarget::Host {
            trust_host_key: true,
            identity: Some(_),
            ..
        } => Ok(()),
        other => Err(format!(
            "expected a trusted host key with an identity, got {other:?}"
        )),
    }
}

#[then("no engine is available")]
fn no_engine_is_available(engine_resolution_state: &EngineResolutionState) -> StepResult<()> {
    match engine_resolution_state.outcome.get() {
        Some(ResolutionOutcome::Failed(message)) if message.contains("no container engine") => {
            Ok(())
        }
        Some(ResolutionOutcome::Failed(message)) => {
            Err(format!("expected NoEngineAvailable, got: {message}"))
        }
        Some(ResolutionOutcome::Selected(target)) => {
            Err(format!("expected no engine, got {target:?}"))
        }
        None => Err(String::from("resolution outcome should be set")),
    }
}

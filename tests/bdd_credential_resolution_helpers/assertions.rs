//! Then-step assertions for credential-resolution behavioural scenarios.

use ortho_config::serde_json::{self, Value};
use rstest_bdd_macros::then;

use super::fakes::helper_entries;
use super::state::{CredentialResolutionState, FailureKind, ResolutionOutcome, StepResult};

fn expect_failure(state: &CredentialResolutionState, expected: FailureKind) -> StepResult<()> {
    match state.outcome.get() {
        Some(ResolutionOutcome::Failed { kind, .. }) if kind == expected => Ok(()),
        Some(ResolutionOutcome::Failed { kind, message }) => {
            Err(format!("expected {expected:?}, got {kind:?}: {message}"))
        }
        Some(ResolutionOutcome::Resolved(credentials)) => Err(format!(
            "expected {expected:?}, resolved {}",
            credentials.username
        )),
        None => Err(String::from("resolution outcome should be set")),
    }
}

#[then("the resolved user is {user}")]
fn resolved_user_is(
    credential_resolution_state: &CredentialResolutionState,
    user: String,
) -> StepResult<()> {
    match credential_resolution_state.outcome.get() {
        Some(ResolutionOutcome::Resolved(credentials)) if credentials.username == user => Ok(()),
        Some(ResolutionOutcome::Resolved(credentials)) => Err(format!(
            "expected user {user}, got {}",
            credentials.username
        )),
        Some(ResolutionOutcome::Failed { message, .. }) => {
            Err(format!("expected user {user}, resolution failed: {message}"))
        }
        None => Err(String::from("resolution outcome should be set")),
    }
}

#[then("the resolution is anonymous")]
fn resolution_is_anonymous(credential_resolution_state: &CredentialResolutionState) -> StepResult<()> {
    match credential_resolution_state.outcome.get() {
        Some(ResolutionOutcome::Resolved(credentials)) if credentials.is_anonymous() => Ok(()),
        Some(ResolutionOutcome::Resolved(credentials)) => Err(format!(
            "expected anonymous access, resolved {}",
            credentials.username
        )),
        Some(ResolutionOutcome::Failed { message, .. }) => {
            Err(format!("expected anonymous access, resolution failed: {message}"))
        }
        None => Err(String::from("resolution outcome should be set")),
    }
}

#[then("the user was prompted {count} times")]
fn user_was_prompted(
    credential_resolution_state: &CredentialResolutionState,
    count: String,
) -> StepResult<()> {
    let expected = count
        .parse::<usize>()
        .map_err(|error| format!("invalid count '{count}': {error}"))?;
    let asked = credential_resolution_state.asked.get().unwrap_or_default();
    if asked == expected {
        Ok(())
    } else {
        Err(format!("expected {expected} prompts, got {asked}"))
    }
}

#[then("resolution fails as unauthorized")]
fn resolution_fails_unauthorized(
    credential_resolution_state: &CredentialResolutionState,
) -> StepResult<()> {
    expect_failure(credential_resolution_state, FailureKind::Unauthorized)
}

#[then("resolution fails as not found")]
fn resolution_fails_not_found(
    credential_resolution_state: &CredentialResolutionState,
) -> StepResult<()> {
    expect_failure(credential_resolution_state, FailureKind::NotFound)
}

#[then("helper {name} holds {user} for {registry}")]
fn helper_holds(
    credential_resolution_state: &CredentialResolutionState,
    name: String,
    user: String,
    registry: String,
) -> StepResult<()> {
    let bin = credential_resolution_state.workspace()?.bin();
    let entries = helper_entries(&bin, &name)?;
    if entries.contains(&(registry.clone(), user.clone())) {
        Ok(())
    } else {
        Err(format!(
            "expected {name} to hold {user} for {registry}, got {entries:?}"
        ))
    }
}

#[then("the function auth file uses credsStore {name}")]
fn function_auth_file_uses_store(
    credential_resolution_state: &CredentialResolutionState,
    name: String,
) -> StepResult<()> {
    let path = credential_resolution_state.workspace()?.auth_file();
    let text = std::fs::read_to_string(&path)
        .map_err(|error| format!("failed to read {path}: {error}"))?;
    let value: Value = serde_json::from_str(&text)
        .map_err(|error| format!("failed to parse {path}: {error}"))?;
    match value.pointer("/credsStore").and_then(Value::as_str) {
        Some(store) if store == name => Ok(()),
        other => Err(format!("expected credsStore {name}, got {other:?}")),
    }
}

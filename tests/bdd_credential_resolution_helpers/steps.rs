//! Given/when step definitions for credential-resolution behavioural scenarios.

use std::sync::Arc;

use funcdock::credentials::{
    Credentials, CredentialsResolver, DEFAULT_PROMPT_ATTEMPTS, encode_auth,
};
use funcdock::error::CredentialsError;
use ortho_config::serde_json::{Map, Value, json};
use rstest_bdd_macros::{given, when};

use super::fakes::{AllowListVerifier, FixedChooser, ScriptedPrompt, install_helper};
use super::state::{
    CredentialResolutionState, FailureKind, ResolutionOutcome, StepResult, edit_json,
    parse_credentials,
};

fn insert_into(object: &mut Map<String, Value>, table: &str, key: &str, value: Value) {
    let entry = object
        .entry(table)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(map) = entry.as_object_mut() {
        map.insert(String::from(key), value);
    }
}

#[given("the function auth file holds {credentials} for {registry}")]
fn function_auth_file_holds(
    credential_resolution_state: &CredentialResolutionState,
    credentials: String,
    registry: String,
) -> StepResult<()> {
    let login = parse_credentials(&credentials)?;
    let path = credential_resolution_state.workspace()?.auth_file();
    edit_json(&path, |object| {
        insert_into(object, "auths", &registry, json!({ "auth": encode_auth(&login) }));
    })
}

#[given("the Docker config holds {credentials} for {registry}")]
fn docker_config_holds(
    credential_resolution_state: &CredentialResolutionState,
    credentials: String,
    registry: String,
) -> StepResult<()> {
    let login = parse_credentials(&credentials)?;
    let path = credential_resolution_state.workspace()?.docker_config();
    edit_json(&path, |object| {
        insert_into(object, "auths", &registry, json!({ "auth": encode_auth(&login) }));
    })
}

#[given("the Docker config uses {helper} for {registry}")]
fn docker_config_uses_helper(
    credential_resolution_state: &CredentialResolutionState,
    helper: String,
    registry: String,
) -> StepResult<()> {
    let path = credential_resolution_state.workspace()?.docker_config();
    edit_json(&path, |object| {
        insert_into(object, "credHelpers", &registry, Value::String(helper));
    })
}

#[given("a credential helper {name} holds {credentials} for {registry}")]
fn credential_helper_holds(
    credential_resolution_state: &CredentialResolutionState,
    name: String,
    credentials: String,
    registry: String,
) -> StepResult<()> {
    let login = parse_credentials(&credentials)?;
    let bin = credential_resolution_state.workspace()?.bin();
    install_helper(&bin, &name, &[(registry, login)])
}

#[given("a credential helper {name} holds nothing")]
fn credential_helper_holds_nothing(
    credential_resolution_state: &CredentialResolutionState,
    name: String,
) -> StepResult<()> {
    let bin = credential_resolution_state.workspace()?.bin();
    install_helper(&bin, &name, &[])
}

#[given("the registry accepts {credentials}")]
fn registry_accepts(
    credential_resolution_state: &CredentialResolutionState,
    credentials: String,
) -> StepResult<()> {
    let login = parse_credentials(&credentials)?;
    CredentialResolutionState::push(&credential_resolution_state.accepted, login);
    Ok(())
}

#[given("the registry allows anonymous access")]
fn registry_allows_anonymous(credential_resolution_state: &CredentialResolutionState) {
    CredentialResolutionState::push(
        &credential_resolution_state.accepted,
        Credentials::anonymous(),
    );
}

#[given("the user answers {credentials}")]
fn user_answers(
    credential_resolution_state: &CredentialResolutionState,
    credentials: String,
) -> StepResult<()> {
    let login = parse_credentials(&credentials)?;
    CredentialResolutionState::push(&credential_resolution_state.answers, login);
    Ok(())
}

#[given("the user chooses to save with {helper}")]
fn user_chooses_store(credential_resolution_state: &CredentialResolutionState, helper: String) {
    credential_resolution_state.store_choice.set(helper);
}

#[given("prompt attempts are limited to {attempts}")]
fn prompt_attempts_limited(
    credential_resolution_state: &CredentialResolutionState,
    attempts: String,
) -> StepResult<()> {
    let parsed = attempts
        .parse::<u32>()
        .map_err(|error| format!("invalid attempt count '{attempts}': {error}"))?;
    credential_resolution_state.prompt_attempts.set(parsed);
    Ok(())
}

#[when("credentials for {registry} are resolved")]
fn credentials_are_resolved(
    credential_resolution_state: &CredentialResolutionState,
    registry: String,
) -> StepResult<()> {
    let workspace = credential_resolution_state.workspace()?;
    let prompt = Arc::new(ScriptedPrompt::new(
        credential_resolution_state.answers.get().unwrap_or_default(),
    ));
    let resolver = CredentialsResolver::new(Arc::new(AllowListVerifier::new(
        credential_resolution_state.accepted.get().unwrap_or_default(),
    )))
    .with_auth_file(workspace.auth_file())
    .with_docker_config(workspace.docker_config())
    .with_search_dirs(vec![workspace.bin()])
    .with_prompt(prompt.clone())
    .with_store_chooser(Arc::new(FixedChooser(
        credential_resolution_state.store_choice.get(),
    )))
    .with_prompt_attempts(
        credential_resolution_state
            .prompt_attempts
            .get()
            .unwrap_or(DEFAULT_PROMPT_ATTEMPTS),
    );

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|error| format!("failed to create tokio runtime for scenario: {error}"))?;
    let result = runtime.block_on(resolver.resolve(&registry));

    credential_resolution_state.asked.set(prompt.asked());
    let outcome = match result {
        Ok(credentials) => ResolutionOutcome::Resolved(credentials),
        Err(error) => ResolutionOutcome::Failed {
            kind: match error {
                CredentialsError::NotFound { .. } => FailureKind::NotFound,
                CredentialsError::Unauthorized { .. } => FailureKind::Unauthorized,
                _ => FailureKind::Other,
            },
            message: error.to_string(),
        },
    };
    credential_resolution_state.outcome.set(outcome);
    Ok(())
}

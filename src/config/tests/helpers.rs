//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        default_host = "unix:///run/user/1000/podman/podman.sock"
        config_dir = "/home/user/.config/func"

        [engine]
        health_check_timeout_secs = 5
        podman_start_timeout_secs = 30

        [credentials]
        prompt_attempts = 1
        verify_tls = false
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r#"
        default_host = "unix:///tmp/docker.sock"
    "#;

    toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = ortho_config::serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.default_host.is_none(), "default_host should be None");
    assert!(config.config_dir.is_none(), "config_dir should be None");
    assert_eq!(config.engine.health_check_timeout_secs, 10);
    assert_eq!(config.engine.podman_start_timeout_secs, 10);
    assert_eq!(config.credentials.prompt_attempts, 3);
    assert!(config.credentials.verify_tls, "verify_tls should be true");
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    use ortho_config::serde_json::json;

    let mut composer = create_composer_with_defaults()?;
    composer.push_file(
        json!({
            "default_host": "unix:///from/file.sock",
            "config_dir": "/from/file"
        }),
        None,
    );
    composer.push_environment(json!({
        "default_host": "unix:///from/env.sock"
    }));

    Ok(composer)
}

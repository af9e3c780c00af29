//! Configuration data types for funcdock.

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::credentials::DEFAULT_PROMPT_ATTEMPTS;
use crate::engine::{HEALTH_CHECK_TIMEOUT_SECS, PODMAN_START_TIMEOUT_SECS};
use crate::error::ConfigError;

/// Container engine connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds to wait for the engine to answer a ping.
    pub health_check_timeout_secs: u64,

    /// Seconds to wait for a spawned `podman system service` to become ready.
    pub podman_start_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            health_check_timeout_secs: HEALTH_CHECK_TIMEOUT_SECS,
            podman_start_timeout_secs: PODMAN_START_TIMEOUT_SECS,
        }
    }
}

/// Registry credential settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// How many times to ask for credentials the registry rejects.
    pub prompt_attempts: u32,

    /// Verify registry TLS certificates when checking credentials.
    pub verify_tls: bool,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            prompt_attempts: DEFAULT_PROMPT_ATTEMPTS,
            verify_tls: true,
        }
    }
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `FUNCDOCK_CONFIG_PATH` environment variable
/// 2. `.funcdock.toml` in the current working directory
/// 3. `.funcdock.toml` in the home directory
/// 4. `~/.config/funcdock/config.toml` (XDG default)
#[derive(Debug, Clone, Default, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "FUNCDOCK",
    post_merge_hook,
    discovery(
        app_name = "funcdock",
        env_var = "FUNCDOCK_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".funcdock.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Engine host tried when no `DOCKER_HOST` override is set; the platform
    /// default socket when absent.
    pub default_host: Option<String>,

    /// Directory holding the function-local `auth.json`.
    pub config_dir: Option<Utf8PathBuf>,

    /// Container engine settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub engine: EngineConfig,

    /// Registry credential settings.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub credentials: CredentialsConfig,
}

impl AppConfig {
    /// Rejects zero timeouts and attempt counts.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero_field = [
            (
                "engine.health_check_timeout_secs",
                self.engine.health_check_timeout_secs == 0,
            ),
            (
                "engine.podman_start_timeout_secs",
                self.engine.podman_start_timeout_secs == 0,
            ),
            (
                "credentials.prompt_attempts",
                self.credentials.prompt_attempts == 0,
            ),
        ]
        .into_iter()
        .find_map(|(field, is_zero)| is_zero.then_some(field));

        zero_field.map_or(Ok(()), |field| {
            Err(ConfigError::InvalidValue {
                field: field.to_owned(),
                reason: String::from("must be greater than zero"),
            })
        })
    }
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // An empty host means "use the platform default".
        if self
            .default_host
            .as_deref()
            .is_some_and(|host| host.trim().is_empty())
        {
            self.default_host = None;
        }
        Ok(())
    }
}

//! Configuration loading with layered precedence.
//!
//! Layers, lowest to highest: application defaults, configuration file,
//! `FUNCDOCK_*` environment variables, command-line arguments.
//!
//! The layers are pushed into a `MergeComposer` by hand rather than through
//! `OrthoConfig::load()` because the `Cli` owns subcommand dispatch, and
//! because typed environment values must fail fast. Figment's environment
//! provider drops values it cannot parse, so `FUNCDOCK_CREDENTIALS_VERIFY_TLS=maybe`
//! would silently fall back to the default.
//!
//! Environment variables are read through [`mockable::Env`] so the layer can
//! be tested without mutating the process environment.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use mockable::{DefaultEnv, Env};
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// Accepted verbatim.
    String,
    /// `true` or `false`.
    Bool,
    /// Unsigned integer.
    Unsigned,
}

/// Maps one environment variable onto a configuration path.
struct EnvVarSpec {
    env_var: &'static str,
    path: &'static [&'static str],
    var_type: EnvVarType,
}

const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "FUNCDOCK_DEFAULT_HOST",
        path: &["default_host"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "FUNCDOCK_CONFIG_DIR",
        path: &["config_dir"],
        var_type: EnvVarType::String,
    },
    EnvVarSpec {
        env_var: "FUNCDOCK_ENGINE_HEALTH_CHECK_TIMEOUT_SECS",
        path: &["engine", "health_check_timeout_secs"],
        var_type: EnvVarType::Unsigned,
    },
    EnvVarSpec {
        env_var: "FUNCDOCK_ENGINE_PODMAN_START_TIMEOUT_SECS",
        path: &["engine", "podman_start_timeout_secs"],
        var_type: EnvVarType::Unsigned,
    },
    EnvVarSpec {
        env_var: "FUNCDOCK_CREDENTIALS_PROMPT_ATTEMPTS",
        path: &["credentials", "prompt_attempts"],
        var_type: EnvVarType::Unsigned,
    },
    EnvVarSpec {
        env_var: "FUNCDOCK_CREDENTIALS_VERIFY_TLS",
        path: &["credentials", "verify_tls"],
        var_type: EnvVarType::Bool,
    },
];

/// Names of the `FUNCDOCK_*` variables the loader reads.
///
/// Tests use this to clear the environment without duplicating the table.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load configuration from defaults, the discovered file, the process
/// environment and `cli`.
///
/// # Errors
///
/// Returns `ConfigError` when an explicit `--config` path does not exist, a
/// configuration file is malformed, a typed environment value cannot be
/// parsed, or the merged values fail validation.
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    load_config_with_env(cli, &DefaultEnv::new())
}

/// [`load_config`] with an explicit environment source.
///
/// # Errors
///
/// As [`load_config`].
pub fn load_config_with_env<E: Env>(cli: &Cli, env: &E) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    if let Some(path) = config_file_path(cli)? {
        let value = read_config_file(&path)?;
        composer.push_file(value, Some(path));
    }

    let env_values = collect_env_vars(env)?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

/// The explicit `--config` path, or the first discovered candidate.
fn config_file_path(cli: &Cli) -> Result<Option<Utf8PathBuf>> {
    if let Some(path) = cli.config.as_ref() {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.clone().into_std_path_buf(),
            }
            .into());
        }
        return Ok(Some(path.clone()));
    }

    let discovery = ConfigDiscovery::builder("funcdock")
        .env_var("FUNCDOCK_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".funcdock.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|candidate| candidate.exists())
        .find_map(|candidate| Utf8PathBuf::try_from(candidate).ok()))
}

/// Read a TOML file through a capability handle on its parent directory.
fn read_config_file(path: &Utf8Path) -> Result<Value> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;
    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    toml::from_str::<Value>(&content).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        }
        .into()
    })
}

/// Collect the `FUNCDOCK_*` variables into a JSON layer, or `Null` when none
/// are set.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for unparseable typed values.
fn collect_env_vars<E: Env>(env: &E) -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Some(raw_value) = env.string(spec.env_var) else {
            continue;
        };
        let json_value = parse_env_value(spec, raw_value)?;
        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

fn parse_env_value(spec: &EnvVarSpec, raw_value: String) -> Result<Value> {
    let invalid = |expected: &str, raw: &str| ConfigError::InvalidValue {
        field: spec.env_var.to_owned(),
        reason: format!("expected {expected}, got '{raw}'"),
    };
    match spec.var_type {
        EnvVarType::String => Ok(Value::String(raw_value)),
        EnvVarType::Bool => raw_value
            .trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|_| invalid("bool (true/false)", &raw_value).into()),
        EnvVarType::Unsigned => raw_value
            .trim()
            .parse::<u64>()
            .map(|number| Value::Number(number.into()))
            .map_err(|_| invalid("unsigned integer", &raw_value).into()),
    }
}

/// Insert `value` at a nested `path`, creating intermediate objects.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }
    current.insert(field.to_owned(), value);
}

fn build_cli_overrides(cli: &Cli) -> Value {
    let mut overrides = Map::new();

    if let Some(host) = cli.default_host.as_ref() {
        overrides.insert("default_host".to_owned(), Value::String(host.clone()));
    }
    if let Some(dir) = cli.config_dir.as_ref() {
        overrides.insert("config_dir".to_owned(), Value::String(dir.to_string()));
    }

    if overrides.is_empty() {
        Value::Null
    } else {
        Value::Object(overrides)
    }
}

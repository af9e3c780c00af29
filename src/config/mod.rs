//! Configuration system for funcdock.
//!
//! This module provides the configuration structures and CLI definitions for the
//! funcdock application. Configuration loading and precedence merging is handled
//! by the `ortho_config` crate. Precedence: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/funcdock/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! default_host = "unix:///run/user/1000/podman/podman.sock"
//! config_dir = "/home/user/.config/func"
//!
//! [engine]
//! health_check_timeout_secs = 10
//! podman_start_timeout_secs = 20
//!
//! [credentials]
//! prompt_attempts = 3
//! verify_tls = true
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, CredentialsArgs};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{AppConfig, CredentialsConfig, EngineConfig};

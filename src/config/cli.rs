//! Command-line argument definitions for funcdock.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for funcdock.
#[derive(Debug, Parser)]
#[command(name = "funcdock")]
#[command(
    author,
    version,
    about = "Container engine connection and registry credential resolution for function builds"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Engine host tried when `DOCKER_HOST` is unset.
    #[arg(long, global = true)]
    pub default_host: Option<String>,

    /// Directory holding the function-local `auth.json`.
    #[arg(long, global = true)]
    pub config_dir: Option<Utf8PathBuf>,

    /// Log debug detail to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the container engine and check that it answers.
    Engine,

    /// Resolve verified registry credentials, prompting when needed.
    Credentials(CredentialsArgs),

    /// List the credential helpers found on `PATH`.
    Helpers,
}

/// Arguments for the `credentials` subcommand.
#[derive(Debug, Parser)]
pub struct CredentialsArgs {
    /// Registry host (`quay.io`) or image reference (`quay.io/org/func:latest`).
    #[arg(required = true)]
    pub target: String,
}

impl CredentialsArgs {
    /// Whether `target` names an image rather than a bare registry.
    #[must_use]
    pub fn is_image(&self) -> bool {
        self.target.contains('/')
    }
}

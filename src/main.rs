//! `funcdock` application entry point.
//!
//! This binary resolves the container engine and registry credentials a
//! function build would use, and reports what it found. It uses `eyre` for
//! opaque error handling at the application boundary, converting
//! domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/funcdock/config.toml` or path from `FUNCDOCK_CONFIG_PATH`)
//! 3. Environment variables (`FUNCDOCK_*`)
//! 4. Command-line arguments
//!
//! Logs go to stderr and are filtered by `RUST_LOG`; `--verbose` lowers the
//! default level to `debug`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use funcdock::config::{AppConfig, Cli, Commands, CredentialsArgs, load_config};
use funcdock::credentials::{
    CredentialsResolver, RegistryVerifier, TerminalCredentialsPrompt, TerminalStoreChooser,
};
use funcdock::engine::{EngineConnector, EngineResolver, HostResolver, SystemProbe};
use funcdock::error::{EngineError, FuncdockError, Result as FuncdockResult};
use mockable::DefaultEnv;
use tracing_subscriber::EnvFilter;

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, then dispatches
/// to the appropriate subcommand handler.
#[tokio::main]
async fn main() -> EyreResult<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).await.map_err(Report::from)
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "funcdock=debug" } else { "funcdock=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig) -> FuncdockResult<()> {
    let env = DefaultEnv::new();
    match &cli.command {
        Commands::Engine => check_engine(config, &env).await,
        Commands::Credentials(args) => resolve_credentials(config, &env, args).await,
        Commands::Helpers => list_helpers(config, &env),
    }
}

/// Resolve the engine, ping it and print what answered.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn check_engine(config: &AppConfig, env: &DefaultEnv) -> FuncdockResult<()> {
    let probe = SystemProbe::from_env(env);
    let base = EngineResolver::new(env, &probe).with_podman_start_timeout(Duration::from_secs(
        config.engine.podman_start_timeout_secs,
    ));
    #[cfg(unix)]
    let resolver = base.with_ssh_config(funcdock::ssh::SshConfig::from_env(env).interactive());
    #[cfg(not(unix))]
    let resolver = base;

    let default_host = config
        .default_host
        .as_deref()
        .unwrap_or_else(|| HostResolver::<DefaultEnv>::default_host());
    let resolved = resolver.resolve(Some(default_host)).await?;

    let outcome = async {
        EngineConnector::health_check_async(
            &resolved.handle,
            config.engine.health_check_timeout_secs,
        )
        .await?;
        resolved.handle.version().await.map_err(|e| {
            FuncdockError::from(EngineError::HealthCheckFailed {
                message: e.to_string(),
            })
        })
    }
    .await;
    let host = resolved.handle.host().to_owned();
    resolved.handle.close().await;
    let version = outcome?;

    println!("Engine host: {host}");
    println!(
        "Engine version: {}",
        version.version.as_deref().unwrap_or("unknown")
    );
    if resolved.remote_host.is_empty() {
        println!("Remote host: (not reusable)");
    } else {
        println!("Remote host: {}", resolved.remote_host);
    }
    Ok(())
}

fn credentials_resolver(
    config: &AppConfig,
    env: &DefaultEnv,
) -> FuncdockResult<CredentialsResolver> {
    let verifier = RegistryVerifier::new(config.credentials.verify_tls)?;
    Ok(
        CredentialsResolver::from_env(env, config.config_dir.as_deref(), Arc::new(verifier))
            .with_prompt(Arc::new(TerminalCredentialsPrompt))
            .with_store_chooser(Arc::new(TerminalStoreChooser))
            .with_prompt_attempts(config.credentials.prompt_attempts),
    )
}

/// Resolve verified credentials and print the username they belong to.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn resolve_credentials(
    config: &AppConfig,
    env: &DefaultEnv,
    args: &CredentialsArgs,
) -> FuncdockResult<()> {
    let resolver = credentials_resolver(config, env)?;
    let credentials = if args.is_image() {
        resolver.resolve_image(&args.target).await?
    } else {
        resolver.resolve(&args.target).await?
    };
    if credentials.is_anonymous() {
        println!("{} accepts anonymous access", args.target);
    } else {
        println!("Logged in to {} as {}", args.target, credentials.username);
    }
    Ok(())
}

/// Print the credential helpers found on `PATH`.
#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn list_helpers(config: &AppConfig, env: &DefaultEnv) -> FuncdockResult<()> {
    let helpers = credentials_resolver(config, env)?.available_helpers();
    if helpers.is_empty() {
        println!("No credential helpers found.");
    }
    for helper in helpers {
        println!("{helper}");
    }
    Ok(())
}

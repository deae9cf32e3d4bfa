//! `converge` application entry point.
//!
//! This binary runs scenario files and ad-hoc convergence checks from the
//! shell. It uses `eyre` for opaque error handling at the application
//! boundary, converting domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/converge/config.toml` or path from `CONVERGE_CONFIG_PATH`)
//! 3. Environment variables (`CONVERGE_*`)
//! 4. Command-line arguments

use std::time::Duration;

use clap::Parser;
use converge::api::{
    CommandOutcome, RetryRequest, WaitRequest, retry_command, run_scenario, wait_for_command,
};
use converge::command::{ShellResolver, ShellSession};
use converge::config::{AppConfig, Cli, Commands, RetryArgs, ScenarioFile, WaitArgs, load_config};
use converge::error::{CommandError, Result as HarnessResult};
use converge::scenario::Settings;
use eyre::{Report, Result as EyreResult};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when neither `RUST_LOG` nor `log_filter` is set.
const DEFAULT_LOG_FILTER: &str = "info";

/// Application entry point.
///
/// Loads configuration with layered precedence via `OrthoConfig`, installs
/// the log subscriber, then dispatches to the appropriate subcommand handler.
///
/// Uses `eyre::Result` as the return type so an aborted scenario exits
/// non-zero with the failing step, outcome kind, and deadline on stderr.
fn main() -> EyreResult<()> {
    // Parse CLI first (for subcommand dispatch and global options).
    let cli = Cli::parse();

    // Load configuration with layered precedence: defaults < file < env < CLI.
    let config = load_config(&cli).map_err(Report::from)?;
    init_tracing(config.log_filter.as_deref());

    let outcome = run(&cli, &config).map_err(Report::from)?;
    match outcome {
        CommandOutcome::Success => info!("converged"),
        CommandOutcome::SuccessWithCleanupFailures { count } => {
            warn!(count, "converged, but some cleanups failed; remote state may remain");
        }
    }
    Ok(())
}

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// the configured filter.
fn init_tracing(configured: Option<&str>) {
    let fallback = configured.unwrap_or(DEFAULT_LOG_FILTER);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
fn run(cli: &Cli, config: &AppConfig) -> HarnessResult<CommandOutcome> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| CommandError::RuntimeCreationFailed {
            message: error.to_string(),
        })?;

    let env = mockable::DefaultEnv::new();
    let program = ShellResolver::new(&env).resolve(config.shell.program.as_deref());
    let session = ShellSession::system(program);
    let settings = Settings::from_config(config);

    match &cli.command {
        Commands::Run(args) => {
            let scenario = ScenarioFile::load(&args.scenario)?;
            runtime.block_on(run_scenario(&scenario, settings, session))
        }
        Commands::Wait(args) => {
            runtime.block_on(wait_for_command(&wait_request(args), settings, session))
        }
        Commands::Retry(args) => {
            runtime.block_on(retry_command(&retry_request(args), &settings, &session))
        }
    }
}

fn wait_request(args: &WaitArgs) -> WaitRequest {
    WaitRequest {
        script: args.script(),
        expect: args.expect.clone(),
        fail_pattern: args.fail_pattern.clone(),
        interval: args.interval.map(Duration::from_secs),
        timeout: args.timeout.map(Duration::from_secs),
    }
}

fn retry_request(args: &RetryArgs) -> RetryRequest {
    RetryRequest {
        script: args.script(),
        attempts: args.attempts,
        delay: args.delay.map(Duration::from_secs),
    }
}

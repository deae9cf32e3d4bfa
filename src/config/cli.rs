//! Command-line argument definitions for converge.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for converge.
#[derive(Debug, Parser)]
#[command(name = "converge")]
#[command(
    author,
    version,
    about = "Assert that a remote system converges to a target state within a deadline"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Log filter used when `RUST_LOG` is unset (e.g. `converge=debug`).
    #[arg(long, global = true)]
    pub log_filter: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a scenario file.
    Run(RunArgs),

    /// Poll a shell command until it reports the expected state.
    Wait(WaitArgs),

    /// Re-issue a shell command until it succeeds.
    Retry(RetryArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Path to the scenario TOML file.
    #[arg(required = true)]
    pub scenario: Utf8PathBuf,
}

/// Arguments for the `wait` subcommand.
#[derive(Debug, Parser)]
pub struct WaitArgs {
    /// Seconds between probes; defaults to `convergence.poll_interval_secs`.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Deadline in seconds; defaults to `convergence.timeout_secs`.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Text stdout must contain for the wait to succeed.
    #[arg(long)]
    pub expect: Option<String>,

    /// Text in the output of a successful run that fails the wait immediately.
    #[arg(long)]
    pub fail_pattern: Option<String>,

    /// Command to probe.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

/// Arguments for the `retry` subcommand.
#[derive(Debug, Parser)]
pub struct RetryArgs {
    /// Maximum attempts; defaults to `retry.max_attempts`.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub attempts: Option<u32>,

    /// Seconds between attempts; defaults to `retry.delay_secs`.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub delay: Option<u64>,

    /// Command to run.
    #[arg(required = true, trailing_var_arg = true)]
    pub command: Vec<String>,
}

impl WaitArgs {
    /// Join the trailing command words into a single shell script.
    #[must_use]
    pub fn script(&self) -> String {
        self.command.join(" ")
    }
}

impl RetryArgs {
    /// Join the trailing command words into a single shell script.
    #[must_use]
    pub fn script(&self) -> String {
        self.command.join(" ")
    }
}

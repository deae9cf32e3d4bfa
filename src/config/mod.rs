//! Configuration system for converge.
//!
//! This module provides the configuration structures, CLI definitions and the
//! typed scenario file format. Configuration loading and precedence merging
//! is handled by the `ortho_config` crate: CLI flags override environment
//! variables, which override configuration files, which override defaults.
//!
//! The configuration file is expected at `~/.config/converge/config.toml` by
//! default.
//!
//! # Example Configuration
//!
//! ```toml
//! log_filter = "converge=debug"
//!
//! [convergence]
//! timeout_secs = 300
//! poll_interval_secs = 2
//! resubscribe_delay_secs = 1
//! scenario_timeout_secs = 3600
//!
//! [retry]
//! max_attempts = 5
//! delay_secs = 20
//!
//! [cleanup]
//! enabled = true
//! timeout_secs = 120
//!
//! [shell]
//! program = "/bin/bash"
//! ```

mod cli;
mod loader;
mod scenario;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, RetryArgs, RunArgs, WaitArgs};
pub use loader::{env_var_names, load_config};
pub use scenario::{ProbeFile, ScenarioFile, StepFile};
pub use types::{AppConfig, CleanupConfig, ConvergenceConfig, RetryConfig, ShellConfig};

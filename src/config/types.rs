//! Configuration data types for converge.

use ortho_config::{OrthoConfig, OrthoResult, PostMergeContext, PostMergeHook};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Convergence deadlines and cadences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConvergenceConfig {
    /// Default deadline for a single step's convergence wait, in seconds.
    pub timeout_secs: u64,

    /// Default interval between probes, in seconds.
    pub poll_interval_secs: u64,

    /// Delay before re-subscribing after a transient watch error, in seconds.
    pub resubscribe_delay_secs: u64,

    /// Deadline for a whole scenario when its file sets none, in seconds.
    pub scenario_timeout_secs: u64,
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_secs: 2,
            resubscribe_delay_secs: 1,
            scenario_timeout_secs: 3600,
        }
    }
}

/// Re-issue policy for remote-mutating actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay between attempts, in seconds.
    pub delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay_secs: 20,
        }
    }
}

/// Teardown behaviour at the end of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Run registered cleanups. Disable to inspect remote state after a run.
    pub enabled: bool,

    /// Upper bound for each cleanup action, in seconds.
    pub timeout_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 120,
        }
    }
}

/// Shell used to run probe and action commands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShellConfig {
    /// Shell program. Falls back to `SHELL`, then `/bin/sh`.
    pub program: Option<String>,
}

/// Root application configuration.
///
/// This structure is loaded from configuration files, environment variables,
/// and command-line arguments with layered precedence. The precedence order
/// (lowest to highest) is: defaults, configuration file, environment variables,
/// command-line arguments.
///
/// Configuration files are discovered in this order:
/// 1. Path specified via `CONVERGE_CONFIG_PATH` environment variable
/// 2. `.converge.toml` in the current working directory
/// 3. `.converge.toml` in the home directory
/// 4. `~/.config/converge/config.toml` (XDG default)
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(
    prefix = "CONVERGE",
    post_merge_hook,
    discovery(
        app_name = "converge",
        env_var = "CONVERGE_CONFIG_PATH",
        config_file_name = "config.toml",
        dotfile_name = ".converge.toml",
        config_cli_long = "config",
        config_cli_visible = true,
    )
)]
pub struct AppConfig {
    /// Log filter directive used when `RUST_LOG` is unset, e.g. `converge=debug`.
    pub log_filter: Option<String>,

    /// Convergence deadlines and cadences.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub convergence: ConvergenceConfig,

    /// Action retry policy.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub retry: RetryConfig,

    /// Cleanup behaviour.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub cleanup: CleanupConfig,

    /// Shell selection.
    #[serde(default)]
    #[ortho_config(skip_cli)]
    pub shell: ShellConfig,
}

impl AppConfig {
    /// Validate cross-field constraints after loading.
    ///
    /// Every duration must be non-zero, at least one attempt must be allowed,
    /// and the poll interval may not exceed the step deadline.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> crate::error::Result<()> {
        let durations = [
            ("convergence.timeout_secs", self.convergence.timeout_secs),
            (
                "convergence.poll_interval_secs",
                self.convergence.poll_interval_secs,
            ),
            (
                "convergence.resubscribe_delay_secs",
                self.convergence.resubscribe_delay_secs,
            ),
            (
                "convergence.scenario_timeout_secs",
                self.convergence.scenario_timeout_secs,
            ),
            ("cleanup.timeout_secs", self.cleanup.timeout_secs),
        ];
        if let Some((field, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(invalid(field, "must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.convergence.poll_interval_secs > self.convergence.timeout_secs {
            return Err(invalid(
                "convergence.poll_interval_secs",
                "must not exceed convergence.timeout_secs",
            ));
        }
        if self.shell.program.as_deref().is_some_and(str::is_empty) {
            return Err(invalid("shell.program", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> crate::error::HarnessError {
    ConfigError::InvalidValue {
        field: String::from(field),
        reason: String::from(reason),
    }
    .into()
}

impl PostMergeHook for AppConfig {
    fn post_merge(&mut self, _ctx: &PostMergeContext) -> OrthoResult<()> {
        // Blank values from the environment mean "unset".
        if self
            .log_filter
            .as_deref()
            .is_some_and(|filter| filter.trim().is_empty())
        {
            self.log_filter = None;
        }
        Ok(())
    }
}

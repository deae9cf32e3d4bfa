//! Semantic error types for the converge harness.
//!
//! This module defines the error hierarchy for converge, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or retry, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! Observation and action errors are resolved inside the component that owns
//! them: a wait loop folds [`ObservationError`] into a verdict, and the retry
//! executor folds [`ActionError`] into a [`RetryError`]. A pipeline only ever
//! surfaces [`ScenarioError`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors raised while observing remote state.
///
/// The distinction matters: a transient error keeps a wait loop going, a
/// terminal error ends it immediately.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// The observation failed for a reason that may clear up on its own,
    /// such as a network hiccup or a resource that does not exist yet.
    #[error("transient observation error: {message}")]
    Transient {
        /// A description of the failure.
        message: String,
    },

    /// The observation failed conclusively.
    #[error("terminal observation error: {message}")]
    Terminal {
        /// A description of the failure.
        message: String,
    },
}

impl ObservationError {
    /// Build a transient observation error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Build a terminal observation error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Returns whether a wait loop should keep observing after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Errors raised by a remote-mutating action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The action may succeed if re-issued, for example when a resource is
    /// not yet schedulable or the remote answered with a 5xx.
    #[error("{message}")]
    Retryable {
        /// A description of the failure.
        message: String,
    },

    /// The action will not succeed if re-issued, for example a malformed
    /// request or an authentication failure.
    #[error("{message}")]
    Terminal {
        /// A description of the failure.
        message: String,
    },
}

impl ActionError {
    /// Build a retryable action error.
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Retryable {
            message: message.into(),
        }
    }

    /// Build a terminal action error.
    #[must_use]
    pub fn terminal(message: impl Into<String>) -> Self {
        Self::Terminal {
            message: message.into(),
        }
    }

    /// Returns whether the retry executor may re-issue the action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Errors returned by the retry executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// The action reported a terminal error; no further attempts were made.
    #[error("action failed terminally on attempt {attempt}: {source}")]
    Terminal {
        /// The one-based attempt that failed.
        attempt: u32,
        /// The error reported by the action.
        source: ActionError,
    },

    /// Every permitted attempt failed with a retryable error.
    #[error("action failed after {attempts} attempts: {source}")]
    Exhausted {
        /// The number of attempts made.
        attempts: u32,
        /// The error reported by the final attempt, unchanged.
        source: ActionError,
    },

    /// The surrounding deadline elapsed before the action settled.
    #[error("action timed out after {}", crate::engine::format_duration(*.after))]
    TimedOut {
        /// The deadline that elapsed.
        after: Duration,
    },
}

impl RetryError {
    /// Return the last error reported by the action, if any.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ActionError> {
        match self {
            Self::Terminal { source, .. } | Self::Exhausted { source, .. } => Some(source),
            Self::TimedOut { .. } => None,
        }
    }
}

/// A failed teardown action.
///
/// Cleanup failures are collected and reported; they never change a
/// scenario's pass or fail result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cleanup '{label}' failed: {message}")]
pub struct CleanupError {
    /// The label the cleanup was registered under.
    pub label: String,
    /// A description of the failure.
    pub message: String,
}

/// The kind of non-satisfied outcome that aborted a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortKind {
    /// The step's action failed.
    ActionFailed,
    /// The convergence wait reported a conclusive failure.
    Failed,
    /// The convergence wait exceeded its deadline.
    TimedOut,
}

impl std::fmt::Display for AbortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::ActionFailed => "action failed",
            Self::Failed => "failed",
            Self::TimedOut => "timed out",
        };
        f.write_str(text)
    }
}

/// Errors surfaced by an orchestration pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    /// A step did not reach a satisfied outcome.
    #[error("scenario '{scenario}' aborted at step {index} '{step}': {kind}: {reason}")]
    Aborted {
        /// The scenario name.
        scenario: String,
        /// The zero-based index of the failing step.
        index: usize,
        /// The label of the failing step.
        step: String,
        /// What kind of outcome aborted the step.
        kind: AbortKind,
        /// A human-readable reason, including the deadline for timeouts.
        reason: String,
    },

    /// The scenario definition was rejected before any step ran.
    #[error("invalid scenario '{scenario}': {reason}")]
    Invalid {
        /// The scenario name.
        scenario: String,
        /// Why the definition was rejected.
        reason: String,
    },
}

/// Errors that can occur at the shell command boundary.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The shell could not be spawned.
    #[error("failed to spawn '{program}': {message}")]
    SpawnFailed {
        /// The program that failed to start.
        program: String,
        /// A description of the failure.
        message: String,
    },

    /// The scenario file could not be read or parsed.
    #[error("failed to load scenario '{path}': {message}")]
    ScenarioLoad {
        /// The path to the scenario file.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },

    /// The tokio runtime could not be created.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the failure.
        message: String,
    },
}

/// Top-level error type for the converge harness.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the application. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable error
/// reporting.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A scenario aborted or was rejected.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// An action failed after retry handling.
    #[error(transparent)]
    Retry(#[from] RetryError),

    /// An error occurred at the command boundary.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// A specialised `Result` type for converge operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

//! Orchestration API for converge commands.
//!
//! This module provides public orchestration functions for each converge
//! command: [`run_scenario`], [`wait_for_command`], and [`retry_command`].
//! These functions contain the business logic behind the CLI binary, making
//! it available to both the CLI adapter and library embedders.
//!
//! All functions accept library-owned types (not clap types) and return
//! [`crate::error::Result<CommandOutcome>`]. They do not print to
//! stdout/stderr or call `std::process::exit`.

use std::time::Duration;

use tracing::info;

use crate::command::{CommandRunner, ShellSession};
use crate::config::{ScenarioFile, StepFile};
use crate::engine::{RetryExecutor, RetryPolicy};
use crate::error::{CleanupError, ConfigError, Result as HarnessResult};
use crate::scenario::{Pipeline, ScenarioContext, Settings, Step};

/// Scenario name used for the single-step pipeline behind `converge wait`.
const WAIT_SCENARIO: &str = "wait";

/// Outcome of a converge command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command completed successfully.
    Success,
    /// Every step converged but some cleanups failed. Cleanup failures never
    /// turn a pass into a fail; they are surfaced for the operator.
    SuccessWithCleanupFailures {
        /// Number of failed cleanups.
        count: usize,
    },
}

impl CommandOutcome {
    const fn from_cleanup_errors(errors: &[CleanupError]) -> Self {
        if errors.is_empty() {
            Self::Success
        } else {
            Self::SuccessWithCleanupFailures {
                count: errors.len(),
            }
        }
    }
}

/// Parameters for `converge wait`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitRequest {
    /// Shell script to probe.
    pub script: String,
    /// Text stdout must contain.
    pub expect: Option<String>,
    /// Text in the output that fails the wait immediately.
    pub fail_pattern: Option<String>,
    /// Interval override; defaults to the configured poll interval.
    pub interval: Option<Duration>,
    /// Deadline override; defaults to the configured step deadline.
    pub timeout: Option<Duration>,
}

/// Parameters for `converge retry`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryRequest {
    /// Shell script to run.
    pub script: String,
    /// Attempt limit override.
    pub attempts: Option<u32>,
    /// Delay override.
    pub delay: Option<Duration>,
}

/// Run a scenario file against a shell session.
///
/// The file's `timeout_secs`, when present, replaces the configured scenario
/// deadline.
///
/// # Errors
///
/// Returns `ScenarioError::Aborted` naming the first step that did not
/// converge. Registered cleanups have already run when the error returns.
pub async fn run_scenario<R: CommandRunner>(
    scenario: &ScenarioFile,
    mut settings: Settings,
    session: ShellSession<R>,
) -> HarnessResult<CommandOutcome> {
    if let Some(secs) = scenario.timeout_secs {
        settings.scenario_timeout = Duration::from_secs(secs);
    }
    let context = ScenarioContext::new(scenario.name.as_str(), settings, session);

    let report = build_pipeline(scenario, &context).run().await;
    let cleanup_errors = report.into_result()?;
    info!(scenario = %scenario.name, "scenario passed");
    Ok(CommandOutcome::from_cleanup_errors(&cleanup_errors))
}

/// Translate a validated scenario file into a pipeline over `context`.
#[must_use]
pub fn build_pipeline<'a, R: CommandRunner>(
    scenario: &ScenarioFile,
    context: &'a ScenarioContext<ShellSession<R>>,
) -> Pipeline<'a> {
    scenario
        .steps
        .iter()
        .fold(context.pipeline(), |pipeline, file| {
            pipeline.step(build_step(file, context))
        })
}

fn build_step<'a, R: CommandRunner>(
    file: &StepFile,
    context: &'a ScenarioContext<ShellSession<R>>,
) -> Step<'a> {
    let session = context.remote();
    let probe = session
        .probe(file.probe.command.as_str())
        .expecting(file.probe.expect.clone())
        .failing_on(file.probe.fail_pattern.clone());

    let mut plan = context.poll(probe);
    if let Some(secs) = file.probe.interval_secs {
        plan = plan.with_interval(Duration::from_secs(secs));
    }
    if let Some(secs) = file.probe.timeout_secs {
        plan = plan.with_timeout(Duration::from_secs(secs));
    }

    let mut step = Step::new(file.label.as_str(), plan);
    if let Some(action) = file.action.as_deref() {
        step = step.with_action(session.action(action));
        if file.retry {
            step = step.with_retry(context.settings().retry);
        }
    }
    if let Some(cleanup) = file.cleanup.as_deref() {
        step = step.with_cleanup(file.label.as_str(), session.action(cleanup));
    }
    step
}

/// Poll a shell command until it reports the expected state.
///
/// Runs as a one-step scenario named `wait`, so failures carry the same
/// trail as scenario files.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for a zero interval or timeout, and
/// `ScenarioError::Aborted` when the command reports the fail pattern or the
/// deadline elapses.
pub async fn wait_for_command<R: CommandRunner>(
    request: &WaitRequest,
    mut settings: Settings,
    session: ShellSession<R>,
) -> HarnessResult<CommandOutcome> {
    require_positive("interval", request.interval)?;
    require_positive("timeout", request.timeout)?;
    let timeout = request.timeout.unwrap_or(settings.step_timeout);
    let interval = request.interval.unwrap_or(settings.poll_interval);
    // The step deadline binds; the scenario deadline only backs it up.
    settings.scenario_timeout = timeout.saturating_add(interval);
    let context = ScenarioContext::new(WAIT_SCENARIO, settings, session);

    let probe = context
        .remote()
        .probe(request.script.as_str())
        .expecting(request.expect.clone())
        .failing_on(request.fail_pattern.clone());
    let plan = context
        .poll(probe)
        .with_interval(interval)
        .with_timeout(timeout);

    let report = context
        .pipeline()
        .step(Step::new(request.script.as_str(), plan))
        .run()
        .await;
    report.into_result()?;
    Ok(CommandOutcome::Success)
}

/// Re-issue a shell command until it succeeds.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` for zero attempts,
/// `RetryError::Terminal` when the command cannot succeed (exit 126
/// or 127, or the shell cannot be spawned), or `RetryError::Exhausted`
/// carrying the final failure once every attempt has been used.
pub async fn retry_command<R: CommandRunner>(
    request: &RetryRequest,
    settings: &Settings,
    session: &ShellSession<R>,
) -> HarnessResult<CommandOutcome> {
    if request.attempts == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: String::from("attempts"),
            reason: String::from("must be at least 1"),
        }
        .into());
    }
    let policy = RetryPolicy::new(
        request.attempts.unwrap_or(settings.retry.max_attempts()),
        request.delay.unwrap_or(settings.retry.delay()),
    );
    RetryExecutor::new(policy)
        .run(&session.action(request.script.as_str()))
        .await?;
    Ok(CommandOutcome::Success)
}

/// Reject a zero duration override before it reaches a wait loop.
fn require_positive(field: &str, value: Option<Duration>) -> Result<(), ConfigError> {
    if value == Some(Duration::ZERO) {
        return Err(ConfigError::InvalidValue {
            field: String::from(field),
            reason: String::from("must be greater than zero"),
        });
    }
    Ok(())
}

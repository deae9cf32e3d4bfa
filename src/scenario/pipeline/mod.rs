//! The orchestration pipeline state machine.
//!
//! ```text
//! Idle -> Running(step) -> Completed
//!                       -> Aborted(step, kind, reason)
//! ```
//!
//! Steps run strictly one after another. The first step that does not reach
//! a satisfied outcome aborts the scenario; every cleanup registered up to
//! that point still runs before the pipeline returns.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, info, warn};

use super::step::Step;
use crate::engine::{CleanupRegistry, Deadline, Outcome, RetryExecutor, RetryPolicy, format_duration};
use crate::error::{AbortKind, CleanupError, RetryError, ScenarioError};

/// Where a pipeline is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    /// No step has started.
    Idle,
    /// The step at this zero-based index is running.
    Running {
        /// Index of the running step.
        step: usize,
    },
    /// Every step reached a satisfied outcome.
    Completed,
    /// A step did not reach a satisfied outcome.
    Aborted {
        /// Index of the failing step.
        step: usize,
        /// Label of the failing step.
        label: String,
        /// The kind of outcome that aborted the step.
        kind: AbortKind,
        /// Human-readable reason.
        reason: String,
    },
}

/// The result of a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step converged.
    Satisfied,
    /// The step aborted the scenario.
    Aborted {
        /// The kind of outcome that aborted the step.
        kind: AbortKind,
        /// Human-readable reason.
        reason: String,
    },
    /// The step never started because an earlier step aborted.
    NotReached,
}

/// A line of the scenario's failure trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// The step label.
    pub label: String,
    /// How the step ended.
    pub status: StepStatus,
    /// Wall-clock time spent in the step.
    pub elapsed: Duration,
}

/// Everything a finished pipeline reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    scenario: String,
    state: PipelineState,
    steps: Vec<StepRecord>,
    cleanup_errors: Vec<CleanupError>,
}

impl ScenarioReport {
    /// Return the scenario name.
    #[must_use]
    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    /// Return the final pipeline state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Return one record per declared step, in order.
    #[must_use]
    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    /// Return the cleanup failures, in the order the cleanups ran.
    #[must_use]
    pub fn cleanup_errors(&self) -> &[CleanupError] {
        &self.cleanup_errors
    }

    /// Returns whether every step converged.
    ///
    /// Cleanup failures do not affect the result.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.state, PipelineState::Completed)
    }

    /// Convert the report into the scenario's pass or fail result.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Aborted`] naming the failing step when the
    /// pipeline aborted.
    pub fn into_result(self) -> Result<Vec<CleanupError>, ScenarioError> {
        match self.state {
            PipelineState::Aborted {
                step,
                label,
                kind,
                reason,
            } => Err(ScenarioError::Aborted {
                scenario: self.scenario,
                index: step,
                step: label,
                kind,
                reason,
            }),
            PipelineState::Idle | PipelineState::Running { .. } | PipelineState::Completed => {
                Ok(self.cleanup_errors)
            }
        }
    }
}

/// Runs a scenario's steps in order under a global deadline.
///
/// The pipeline exclusively owns its steps and its [`CleanupRegistry`].
pub struct Pipeline<'a> {
    name: String,
    timeout: Duration,
    steps: Vec<Step<'a>>,
    cleanups: CleanupRegistry<'a>,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    /// Create an empty pipeline whose steps must all finish within `timeout`.
    #[must_use]
    pub fn new(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            timeout,
            steps: Vec::new(),
            cleanups: CleanupRegistry::new(),
            state: PipelineState::Idle,
        }
    }

    /// Configure cleanup execution and the per-cleanup bound.
    #[must_use]
    pub fn with_cleanup(mut self, enabled: bool, action_timeout: Duration) -> Self {
        self.cleanups = std::mem::take(&mut self.cleanups)
            .enabled(enabled)
            .with_action_timeout(action_timeout);
        self
    }

    /// Append a step.
    #[must_use]
    pub fn step(mut self, step: Step<'a>) -> Self {
        self.push(step);
        self
    }

    /// Append a step in place.
    pub fn push(&mut self, step: Step<'a>) {
        self.steps.push(step);
    }

    /// Return the scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the current state.
    #[must_use]
    pub const fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Return the number of declared steps.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns whether no steps are declared.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step, then every registered cleanup.
    pub async fn run(mut self) -> ScenarioReport {
        let deadline = Deadline::starting_now(self.timeout);
        let steps = std::mem::take(&mut self.steps);
        let mut records = Vec::with_capacity(steps.len());
        info!(
            scenario = %self.name,
            steps = steps.len(),
            deadline = %format_duration(self.timeout),
            "scenario started"
        );

        let mut pending = steps.into_iter().enumerate();
        for (index, step) in pending.by_ref() {
            self.state = PipelineState::Running { step: index };
            let label = step.label.clone();
            let started = Instant::now();
            info!(scenario = %self.name, step = index, %label, "step started");

            let result = self.run_step(step, &deadline).await;
            let elapsed = started.elapsed();
            match result {
                Ok(()) => {
                    info!(scenario = %self.name, step = index, %label, ?elapsed, "step satisfied");
                    records.push(StepRecord {
                        label,
                        status: StepStatus::Satisfied,
                        elapsed,
                    });
                }
                Err((kind, reason)) => {
                    error!(scenario = %self.name, step = index, %label, %kind, %reason, "step aborted scenario");
                    records.push(StepRecord {
                        label: label.clone(),
                        status: StepStatus::Aborted {
                            kind,
                            reason: reason.clone(),
                        },
                        elapsed,
                    });
                    self.state = PipelineState::Aborted {
                        step: index,
                        label,
                        kind,
                        reason,
                    };
                    break;
                }
            }
        }

        records.extend(pending.map(|(_, step)| StepRecord {
            label: step.label,
            status: StepStatus::NotReached,
            elapsed: Duration::ZERO,
        }));
        if !matches!(self.state, PipelineState::Aborted { .. }) {
            self.state = PipelineState::Completed;
        }

        let cleanup_errors = self.cleanups.run_all().await;
        if !cleanup_errors.is_empty() {
            warn!(
                scenario = %self.name,
                failures = cleanup_errors.len(),
                "some cleanups failed; scenario result is unchanged"
            );
        }
        info!(scenario = %self.name, state = ?self.state, "scenario finished");

        ScenarioReport {
            scenario: self.name,
            state: self.state,
            steps: records,
            cleanup_errors,
        }
    }

    async fn run_step(
        &mut self,
        step: Step<'a>,
        deadline: &Deadline,
    ) -> Result<(), (AbortKind, String)> {
        if deadline.is_expired() {
            return Err((
                AbortKind::TimedOut,
                format!(
                    "scenario deadline of {} expired before the step started",
                    format_duration(deadline.duration())
                ),
            ));
        }

        if let Some(action) = step.action.as_deref() {
            let executor = RetryExecutor::new(step.retry.unwrap_or_else(RetryPolicy::once));
            executor
                .run_within(action, deadline)
                .await
                .map_err(|error| match error {
                    RetryError::TimedOut { .. } => (AbortKind::TimedOut, error.to_string()),
                    RetryError::Terminal { .. } | RetryError::Exhausted { .. } => {
                        (AbortKind::ActionFailed, error.to_string())
                    }
                })?;
        }
        for (label, cleanup) in step.cleanups {
            self.cleanups.register_boxed(label, cleanup);
        }

        let budget = deadline.remaining();
        let configured = step.convergence.timeout();
        match step.convergence.converge(budget).await {
            Outcome::Satisfied => Ok(()),
            Outcome::Failed { reason } => Err((AbortKind::Failed, reason)),
            Outcome::TimedOut { .. } => Err((
                AbortKind::TimedOut,
                timeout_reason(configured, budget, deadline),
            )),
        }
    }
}

/// Describe a timed-out wait by its configured deadline, naming the scenario
/// deadline as well when that cut the wait short.
fn timeout_reason(configured: Duration, budget: Duration, scenario: &Deadline) -> String {
    if budget < configured {
        format!(
            "no terminal result before the scenario deadline of {} expired (step deadline {})",
            format_duration(scenario.duration()),
            format_duration(configured)
        )
    } else {
        Outcome::TimedOut { after: configured }.to_string()
    }
}

impl std::fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("steps", &self.steps)
            .field("cleanups", &self.cleanups)
            .field("state", &self.state)
            .finish()
    }
}

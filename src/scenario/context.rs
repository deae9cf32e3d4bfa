//! The explicit context shared by every step of a scenario.

use std::time::Duration;

use crate::config::AppConfig;
use crate::engine::{Condition, EventSource, Probe, RetryPolicy, WatchTarget, WorkerFuture};

use super::pipeline::Pipeline;
use super::step::{PollPlan, WatchPlan, WorkerPlan};

/// Tuned defaults applied to the steps of a scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Default convergence deadline for a single step.
    pub step_timeout: Duration,
    /// Default interval between probes.
    pub poll_interval: Duration,
    /// Delay before re-subscribing after a transient watch error.
    pub resubscribe_delay: Duration,
    /// Deadline for the whole scenario.
    pub scenario_timeout: Duration,
    /// Policy for steps whose action is retried.
    pub retry: RetryPolicy,
    /// Whether registered cleanups run at the end of the scenario.
    pub cleanup_enabled: bool,
    /// Upper bound for each cleanup action.
    pub cleanup_timeout: Duration,
}

impl Settings {
    /// Derive scenario settings from the loaded configuration.
    #[must_use]
    pub const fn from_config(config: &AppConfig) -> Self {
        Self {
            step_timeout: Duration::from_secs(config.convergence.timeout_secs),
            poll_interval: Duration::from_secs(config.convergence.poll_interval_secs),
            resubscribe_delay: Duration::from_secs(config.convergence.resubscribe_delay_secs),
            scenario_timeout: Duration::from_secs(config.convergence.scenario_timeout_secs),
            retry: RetryPolicy::new(
                config.retry.max_attempts,
                Duration::from_secs(config.retry.delay_secs),
            ),
            cleanup_enabled: config.cleanup.enabled,
            cleanup_timeout: Duration::from_secs(config.cleanup.timeout_secs),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Shared, read-mostly state for one scenario run.
///
/// `R` is the handle to the remote system (an API client, a shell session).
/// Probes and actions borrow it for the duration of the pipeline; nothing
/// mutates it concurrently, so no locking is involved.
#[derive(Debug)]
pub struct ScenarioContext<R> {
    name: String,
    settings: Settings,
    remote: R,
}

impl<R> ScenarioContext<R> {
    /// Create a context for the scenario called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: Settings, remote: R) -> Self {
        Self {
            name: name.into(),
            settings,
            remote,
        }
    }

    /// Return the scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the scenario settings.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Return the remote handle.
    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Start an empty pipeline governed by this context's deadline and
    /// cleanup settings.
    #[must_use]
    pub fn pipeline<'a>(&self) -> Pipeline<'a> {
        Pipeline::new(self.name.as_str(), self.settings.scenario_timeout)
            .with_cleanup(self.settings.cleanup_enabled, self.settings.cleanup_timeout)
    }

    /// Plan a poll of `probe` using the default interval and step deadline.
    #[must_use]
    pub fn poll<'a>(&self, probe: impl Probe + 'a) -> PollPlan<'a> {
        PollPlan::new(probe, self.settings.poll_interval, self.settings.step_timeout)
    }

    /// Plan a watch of `target` using the default step deadline.
    #[must_use]
    pub fn watch<'a, T>(
        &self,
        source: impl EventSource<T> + 'a,
        target: WatchTarget,
        condition: Condition<T>,
    ) -> WatchPlan<'a, T> {
        WatchPlan::new(source, target, condition, self.settings.step_timeout)
            .with_resubscribe_delay(self.settings.resubscribe_delay)
    }

    /// Plan a background worker raced against the default step deadline.
    #[must_use]
    pub fn worker<'a, F>(&self, spawn: F) -> WorkerPlan<'a>
    where
        F: Fn() -> WorkerFuture + Send + Sync + 'a,
    {
        WorkerPlan::new(spawn, self.settings.step_timeout)
    }
}

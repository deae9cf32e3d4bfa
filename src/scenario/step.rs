//! Steps and the convergence plans that back them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::engine::{
    Action, Condition, Deadline, EventSource, EventWatcher, Outcome, PollLoop, PollSpec, Probe,
    RetryPolicy, WatchSpec, WatchTarget, WorkerFuture, race_worker,
};

/// Boxed future type returned by [`Converge::converge`].
pub type OutcomeFuture<'a> = Pin<Box<dyn Future<Output = Outcome> + Send + 'a>>;

/// A convergence wait that can back a step.
///
/// Each call is a fresh attempt with a fresh deadline: the plan's own timeout
/// capped at `budget`, the time the scenario has left.
pub trait Converge: Send + Sync {
    /// Run one convergence attempt.
    fn converge(&self, budget: Duration) -> OutcomeFuture<'_>;

    /// Return the configured deadline, before any scenario cap.
    fn timeout(&self) -> Duration;
}

/// Poll a probe at a fixed interval.
pub struct PollPlan<'a> {
    probe: Box<dyn Probe + 'a>,
    interval: Duration,
    timeout: Duration,
}

impl<'a> PollPlan<'a> {
    /// Plan a poll of `probe` every `interval` for at most `timeout`.
    #[must_use]
    pub fn new(probe: impl Probe + 'a, interval: Duration, timeout: Duration) -> Self {
        Self {
            probe: Box::new(probe),
            interval,
            timeout,
        }
    }

    /// Override the interval between probes.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the convergence deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Converge for PollPlan<'_> {
    fn converge(&self, budget: Duration) -> OutcomeFuture<'_> {
        Box::pin(async move {
            let spec = PollSpec::new(self.probe.as_ref(), self.interval, self.timeout.min(budget));
            PollLoop::run(&spec).await
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Watch a remote resource's event stream.
pub struct WatchPlan<'a, T> {
    source: Box<dyn EventSource<T> + 'a>,
    target: WatchTarget,
    condition: Condition<T>,
    timeout: Duration,
    deletion_is_success: bool,
    resubscribe_delay: Option<Duration>,
}

impl<'a, T> WatchPlan<'a, T> {
    /// Plan a watch of `target` until `condition` holds, for at most `timeout`.
    #[must_use]
    pub fn new(
        source: impl EventSource<T> + 'a,
        target: WatchTarget,
        condition: Condition<T>,
        timeout: Duration,
    ) -> Self {
        Self {
            source: Box::new(source),
            target,
            condition,
            timeout,
            deletion_is_success: false,
            resubscribe_delay: None,
        }
    }

    /// Treat deletion of the target as success.
    #[must_use]
    pub const fn deletion_is_success(mut self, deletion_is_success: bool) -> Self {
        self.deletion_is_success = deletion_is_success;
        self
    }

    /// Set the delay before re-subscribing after a transient error.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = Some(delay);
        self
    }

    /// Override the convergence deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl<T: Send> Converge for WatchPlan<'_, T> {
    fn converge(&self, budget: Duration) -> OutcomeFuture<'_> {
        Box::pin(async move {
            let mut spec = WatchSpec::new(
                self.source.as_ref(),
                self.target.clone(),
                self.condition.clone(),
                self.timeout.min(budget),
            )
            .deletion_is_success(self.deletion_is_success);
            if let Some(delay) = self.resubscribe_delay {
                spec = spec.with_resubscribe_delay(delay);
            }
            EventWatcher::run(&spec).await
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

type SpawnWorker<'a> = dyn Fn() -> WorkerFuture + Send + Sync + 'a;

/// Race a freshly spawned background worker against the deadline.
pub struct WorkerPlan<'a> {
    spawn: Box<SpawnWorker<'a>>,
    timeout: Duration,
}

impl<'a> WorkerPlan<'a> {
    /// Plan a worker produced by `spawn`, raced for at most `timeout`.
    #[must_use]
    pub fn new<F>(spawn: F, timeout: Duration) -> Self
    where
        F: Fn() -> WorkerFuture + Send + Sync + 'a,
    {
        Self {
            spawn: Box::new(spawn),
            timeout,
        }
    }
}

impl Converge for WorkerPlan<'_> {
    fn converge(&self, budget: Duration) -> OutcomeFuture<'_> {
        let worker = (self.spawn)();
        let deadline = Deadline::starting_now(self.timeout.min(budget));
        Box::pin(async move { race_worker(worker, &deadline).await })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A named unit of a scenario.
///
/// A step optionally performs a remote-mutating action, then waits for the
/// remote system to converge. Cleanups attached to the step are registered
/// once its action has succeeded (or immediately when it has none).
pub struct Step<'a> {
    pub(super) label: String,
    pub(super) action: Option<Box<dyn Action + 'a>>,
    pub(super) retry: Option<RetryPolicy>,
    pub(super) convergence: Box<dyn Converge + 'a>,
    pub(super) cleanups: Vec<(String, Box<dyn Action + 'a>)>,
}

impl<'a> Step<'a> {
    /// Create a step that only waits for `convergence`.
    #[must_use]
    pub fn new(label: impl Into<String>, convergence: impl Converge + 'a) -> Self {
        Self {
            label: label.into(),
            action: None,
            retry: None,
            convergence: Box::new(convergence),
            cleanups: Vec::new(),
        }
    }

    /// Perform `action` before waiting.
    #[must_use]
    pub fn with_action(mut self, action: impl Action + 'a) -> Self {
        self.action = Some(Box::new(action));
        self
    }

    /// Re-issue the action under `policy` instead of running it once.
    #[must_use]
    pub const fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Attach a teardown action released at the end of the scenario.
    #[must_use]
    pub fn with_cleanup(mut self, label: impl Into<String>, action: impl Action + 'a) -> Self {
        self.cleanups.push((label.into(), Box::new(action)));
        self
    }

    /// Return the step label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("label", &self.label)
            .field("has_action", &self.action.is_some())
            .field("retry", &self.retry)
            .field("cleanups", &self.cleanups.len())
            .finish_non_exhaustive()
    }
}

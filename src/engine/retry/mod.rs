//! Bounded re-issue of remote-mutating actions.
//!
//! Unlike [`super::PollLoop`], which only re-observes, the retry executor
//! re-issues an action that changes remote state ("create this resource"),
//! so it distinguishes errors worth retrying from errors that will recur.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use super::outcome::Deadline;
use crate::error::{ActionError, RetryError};

/// Default number of attempts for a retried action.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
const DEFAULT_DELAY: Duration = Duration::from_secs(20);

/// Boxed future type returned by [`Action::execute`].
pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ActionError>> + Send + 'a>>;

/// A fallible remote-mutating operation.
///
/// Actions report [`ActionError::Retryable`] when re-issuing may help and
/// [`ActionError::Terminal`] when it will not.
pub trait Action: Send + Sync {
    /// Perform the action once.
    fn execute(&self) -> ActionFuture<'_>;
}

impl<A: Action + ?Sized> Action for &A {
    fn execute(&self) -> ActionFuture<'_> {
        (**self).execute()
    }
}

impl<A: Action + ?Sized> Action for Box<A> {
    fn execute(&self) -> ActionFuture<'_> {
        (**self).execute()
    }
}

/// Adapts a closure returning an [`ActionFuture`] into an [`Action`].
pub struct FnAction<'a, F> {
    perform: F,
    _borrow: PhantomData<&'a ()>,
}

impl<'a, F> FnAction<'a, F>
where
    F: Fn() -> ActionFuture<'a> + Send + Sync,
{
    /// Wrap `perform` as an action.
    #[must_use]
    pub const fn new(perform: F) -> Self {
        Self {
            perform,
            _borrow: PhantomData,
        }
    }
}

impl<'a, F> Action for FnAction<'a, F>
where
    F: Fn() -> ActionFuture<'a> + Send + Sync,
{
    fn execute(&self) -> ActionFuture<'_> {
        (self.perform)()
    }
}

/// How often and how far apart an action is re-issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` attempts separated by `delay`.
    ///
    /// A policy always allows at least one attempt.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        let bounded = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            max_attempts: bounded,
            delay,
        }
    }

    /// A policy that runs the action exactly once.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Return the maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Return the delay between attempts.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// Re-issues a fallible action according to a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor for `policy`.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Return the executor's policy.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `action` until it succeeds, fails terminally, or attempts run out.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Terminal`] as soon as the action reports a
    /// terminal error, or [`RetryError::Exhausted`] carrying the final
    /// attempt's error unchanged once every attempt failed.
    pub async fn run(&self, action: &dyn Action) -> Result<(), RetryError> {
        self.run_with(|| action.execute()).await
    }

    /// Like [`Self::run`], but gives up when `deadline` expires.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::TimedOut`] when the deadline elapses first,
    /// otherwise the same errors as [`Self::run`].
    pub async fn run_within(
        &self,
        action: &dyn Action,
        deadline: &Deadline,
    ) -> Result<(), RetryError> {
        tokio::time::timeout(deadline.remaining(), self.run(action))
            .await
            .unwrap_or(Err(RetryError::TimedOut {
                after: deadline.duration(),
            }))
    }

    /// Run an attempt closure under the executor's policy.
    ///
    /// Each call to `attempt` must produce a fresh future; no sleep follows
    /// the final attempt.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn run_with<T, F, Fut>(&self, mut attempt: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ActionError>>,
    {
        let max_attempts = self.policy.max_attempts();
        let mut made: u32 = 0;

        loop {
            made = made.saturating_add(1);
            let error = match attempt().await {
                Ok(value) => {
                    debug!(attempt = made, "action succeeded");
                    return Ok(value);
                }
                Err(error) => error,
            };

            if !error.is_retryable() {
                return Err(RetryError::Terminal {
                    attempt: made,
                    source: error,
                });
            }
            if made >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts: made,
                    source: error,
                });
            }

            warn!(
                attempt = made,
                max_attempts,
                delay_secs = self.policy.delay().as_secs(),
                %error,
                "action failed; retrying"
            );
            sleep(self.policy.delay()).await;
        }
    }
}

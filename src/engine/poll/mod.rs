//! Fixed-interval polling of a read-only probe.
//!
//! This module wraps remote state reads behind a small trait seam so the
//! polling behaviour can be unit-tested without a live cluster.

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use super::outcome::{Deadline, Outcome, Verdict};
use crate::error::ObservationError;

/// Boxed future type returned by [`Probe::probe`].
pub type ProbeFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Verdict, ObservationError>> + Send + 'a>>;

/// A single read-only check of remote state.
///
/// Implementations must be idempotent and free of side effects. Transport
/// failures that may clear up on their own (a network hiccup, a resource that
/// has not been created yet) must be reported as
/// [`ObservationError::Transient`], never as a failed verdict; otherwise the
/// poll loop gives up early.
pub trait Probe: Send + Sync {
    /// Observe the remote state once.
    fn probe(&self) -> ProbeFuture<'_>;
}

impl<P: Probe + ?Sized> Probe for &P {
    fn probe(&self) -> ProbeFuture<'_> {
        (**self).probe()
    }
}

impl<P: Probe + ?Sized> Probe for Box<P> {
    fn probe(&self) -> ProbeFuture<'_> {
        (**self).probe()
    }
}

/// Adapts a closure returning a [`ProbeFuture`] into a [`Probe`].
///
/// ```ignore
/// let probe = FnProbe::new(move || {
///     Box::pin(async move { Ok(Verdict::Satisfied) })
/// });
/// ```
pub struct FnProbe<'a, F> {
    observe: F,
    _borrow: PhantomData<&'a ()>,
}

impl<'a, F> FnProbe<'a, F>
where
    F: Fn() -> ProbeFuture<'a> + Send + Sync,
{
    /// Wrap `observe` as a probe.
    #[must_use]
    pub const fn new(observe: F) -> Self {
        Self {
            observe,
            _borrow: PhantomData,
        }
    }
}

impl<'a, F> Probe for FnProbe<'a, F>
where
    F: Fn() -> ProbeFuture<'a> + Send + Sync,
{
    fn probe(&self) -> ProbeFuture<'_> {
        (self.observe)()
    }
}

/// Parameters for one polling attempt.
///
/// A spec is created per attempt and starts its deadline on construction, so
/// a retried attempt always gets a fresh deadline.
pub struct PollSpec<'a> {
    probe: &'a dyn Probe,
    interval: Duration,
    deadline: Deadline,
}

impl<'a> PollSpec<'a> {
    /// Create a poll spec whose deadline starts now.
    #[must_use]
    pub fn new(probe: &'a dyn Probe, interval: Duration, timeout: Duration) -> Self {
        Self {
            probe,
            interval,
            deadline: Deadline::starting_now(timeout),
        }
    }

    /// Return the interval between probes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Return the attempt deadline.
    #[must_use]
    pub const fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

/// Repeatedly invokes a probe until it is conclusive or the deadline expires.
pub struct PollLoop;

impl PollLoop {
    /// Poll until the probe is satisfied, fails, or the deadline elapses.
    ///
    /// A probe that is satisfied on the first call returns without sleeping.
    /// The deadline is checked before every sleep and each sleep is capped at
    /// the remaining time, so the loop overshoots its deadline by at most the
    /// duration of one probe call. A probe call that itself outlives the
    /// deadline is abandoned and the attempt times out.
    pub async fn run(spec: &PollSpec<'_>) -> Outcome {
        let deadline = spec.deadline();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let Ok(observation) =
                tokio::time::timeout(deadline.remaining(), spec.probe.probe()).await
            else {
                debug!(attempt, "probe call outlived the deadline");
                return deadline.timed_out();
            };

            if let Err(ref error) = observation {
                debug!(attempt, %error, "probe reported an observation error");
            }
            if let Some(outcome) = Verdict::from_observation(observation).into_outcome() {
                debug!(attempt, %outcome, "poll loop reached a terminal outcome");
                return outcome;
            }

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                debug!(attempt, "poll deadline expired while pending");
                return deadline.timed_out();
            }
            debug!(attempt, "probe pending; sleeping before next poll");
            sleep(spec.interval().min(remaining)).await;
        }
    }
}

//! Event-stream watching of a single remote resource.
//!
//! A watch subscribes to a change-event stream (in the style of a Kubernetes
//! watch) and evaluates a [`Condition`] against every event payload. Watching
//! sees short-lived intermediate states that a poll could miss and puts less
//! read load on the remote system; polling remains the fallback when no event
//! stream exists for the observed quantity.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::outcome::{Condition, Deadline, Outcome, Verdict};
use crate::error::ObservationError;

/// Default delay before re-subscribing after a transient subscription error.
const DEFAULT_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// A change event delivered by a watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent<T> {
    /// The resource was created.
    Added(T),
    /// The resource changed.
    Modified(T),
    /// The resource was removed; the payload is its last known state.
    Deleted(T),
    /// A progress marker carrying no resource state.
    Bookmark,
    /// The stream reported a transport or server error.
    Error(String),
}

/// How the watched resource is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Select a single resource by name.
    Name(String),
    /// Select resources by label selector, e.g. `app=rancher-logging`.
    Labels(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "metadata.name={name}"),
            Self::Labels(selector) => f.write_str(selector),
        }
    }
}

/// Identifies the remote resource a watch subscribes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    kind: String,
    namespace: Option<String>,
    selector: Selector,
}

impl WatchTarget {
    /// Target a named resource of `kind`.
    #[must_use]
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            selector: Selector::Name(name.into()),
        }
    }

    /// Target resources of `kind` matching a label selector.
    #[must_use]
    pub fn labelled(kind: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            selector: Selector::Labels(selector.into()),
        }
    }

    /// Scope the target to a namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Return the resource kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Return the namespace, if the target is namespaced.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Return the selector.
    #[must_use]
    pub const fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{namespace} ({})", self.kind, self.selector),
            None => write!(f, "{} ({})", self.kind, self.selector),
        }
    }
}

/// Boxed stream of watch events.
pub type EventStream<'a, T> = Pin<Box<dyn Stream<Item = WatchEvent<T>> + Send + 'a>>;

/// Boxed future type returned by [`EventSource::subscribe`].
pub type SubscribeFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<EventStream<'a, T>, ObservationError>> + Send + 'a>>;

/// A remote system exposing a watch/subscribe primitive.
///
/// Dropping the returned stream cancels the subscription.
pub trait EventSource<T>: Send + Sync {
    /// Open a change-event subscription for `target`.
    fn subscribe(&self, target: &WatchTarget) -> SubscribeFuture<'_, T>;
}

impl<T, S: EventSource<T> + ?Sized> EventSource<T> for &S {
    fn subscribe(&self, target: &WatchTarget) -> SubscribeFuture<'_, T> {
        (**self).subscribe(target)
    }
}

impl<T, S: EventSource<T> + ?Sized> EventSource<T> for Box<S> {
    fn subscribe(&self, target: &WatchTarget) -> SubscribeFuture<'_, T> {
        (**self).subscribe(target)
    }
}

/// Parameters for one watch attempt.
///
/// Like [`super::PollSpec`], a watch spec starts its deadline on construction.
pub struct WatchSpec<'a, T> {
    source: &'a dyn EventSource<T>,
    target: WatchTarget,
    condition: Condition<T>,
    deadline: Deadline,
    deletion_is_success: bool,
    resubscribe_delay: Duration,
}

impl<'a, T> WatchSpec<'a, T> {
    /// Create a watch spec whose deadline starts now.
    #[must_use]
    pub fn new(
        source: &'a dyn EventSource<T>,
        target: WatchTarget,
        condition: Condition<T>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            target,
            condition,
            deadline: Deadline::starting_now(timeout),
            deletion_is_success: false,
            resubscribe_delay: DEFAULT_RESUBSCRIBE_DELAY,
        }
    }

    /// Treat deletion of the watched resource as the success criterion.
    ///
    /// Uninstall flows wait for exactly this.
    #[must_use]
    pub const fn deletion_is_success(mut self, deletion_is_success: bool) -> Self {
        self.deletion_is_success = deletion_is_success;
        self
    }

    /// Set the delay before re-subscribing after a transient error.
    #[must_use]
    pub const fn with_resubscribe_delay(mut self, delay: Duration) -> Self {
        self.resubscribe_delay = delay;
        self
    }

    /// Return the watched resource.
    #[must_use]
    pub const fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Return the attempt deadline.
    #[must_use]
    pub const fn deadline(&self) -> &Deadline {
        &self.deadline
    }
}

/// Drives a watch subscription until the condition is conclusive.
pub struct EventWatcher;

impl EventWatcher {
    /// Watch the target until the condition is satisfied, fails, or the
    /// deadline elapses.
    ///
    /// - A satisfied or failed condition ends the watch immediately.
    /// - An error event fails the watch immediately, surfacing its message.
    /// - A deletion that the condition does not decide succeeds only when the
    ///   spec treats deletion as success, and fails otherwise.
    /// - A stream that closes without a conclusive event times out.
    ///
    /// Transient subscription errors are retried until the deadline; terminal
    /// ones fail the watch.
    pub async fn run<T: Send>(spec: &WatchSpec<'_, T>) -> Outcome {
        let deadline = spec.deadline();

        loop {
            let Ok(subscription) =
                tokio::time::timeout(deadline.remaining(), spec.source.subscribe(&spec.target))
                    .await
            else {
                return deadline.timed_out();
            };

            match subscription {
                Ok(mut stream) => return Self::consume(spec, &mut stream).await,
                Err(ObservationError::Terminal { message }) => {
                    return Outcome::Failed { reason: message };
                }
                Err(ObservationError::Transient { message }) => {
                    warn!(target_resource = %spec.target, %message, "watch subscription failed; resubscribing");
                    let remaining = deadline.remaining();
                    if remaining.is_zero() {
                        return deadline.timed_out();
                    }
                    sleep(spec.resubscribe_delay.min(remaining)).await;
                }
            }
        }
    }

    async fn consume<T: Send>(spec: &WatchSpec<'_, T>, stream: &mut EventStream<'_, T>) -> Outcome {
        let deadline = spec.deadline();

        loop {
            let Ok(next) = tokio::time::timeout(deadline.remaining(), stream.next()).await else {
                debug!(target_resource = %spec.target, "watch deadline expired");
                return deadline.timed_out();
            };
            let Some(event) = next else {
                debug!(target_resource = %spec.target, "watch stream closed without a conclusive event");
                return deadline.timed_out();
            };
            if let Some(outcome) = Self::evaluate(spec, event) {
                debug!(target_resource = %spec.target, %outcome, "watch reached a terminal outcome");
                return outcome;
            }
        }
    }

    fn evaluate<T>(spec: &WatchSpec<'_, T>, event: WatchEvent<T>) -> Option<Outcome> {
        match event {
            WatchEvent::Added(payload) | WatchEvent::Modified(payload) => {
                spec.condition.evaluate(&payload).into_outcome()
            }
            WatchEvent::Deleted(payload) => match spec.condition.evaluate(&payload) {
                Verdict::Pending if spec.deletion_is_success => Some(Outcome::Satisfied),
                Verdict::Pending => Some(Outcome::Failed {
                    reason: format!(
                        "{} was deleted before '{}' held",
                        spec.target,
                        spec.condition.name()
                    ),
                }),
                conclusive => conclusive.into_outcome(),
            },
            WatchEvent::Error(message) => Some(Outcome::Failed {
                reason: format!("watch on {} reported an error: {message}", spec.target),
            }),
            WatchEvent::Bookmark => None,
        }
    }
}

#[cfg(test)]
mod tests;

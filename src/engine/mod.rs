//! Convergence engine.
//!
//! The engine repeatedly observes an eventually-consistent remote system and
//! decides, under a deadline, whether the observed state reached a target
//! condition, failed conclusively, or must be observed again. Two observation
//! strategies are provided:
//!
//! 1. [`PollLoop`] invokes a [`Probe`] on a fixed interval.
//! 2. [`EventWatcher`] evaluates a [`Condition`] against every event from an
//!    [`EventSource`] subscription.
//!
//! Remote-mutating actions are re-issued by [`RetryExecutor`], and teardown
//! actions are collected by [`CleanupRegistry`]. The engine has no knowledge
//! of what the probes and actions talk to; they are injected behind the
//! [`Probe`], [`EventSource`] and [`Action`] trait seams.

mod cleanup;
mod outcome;
mod poll;
mod retry;
mod watch;
mod worker;

pub use cleanup::CleanupRegistry;
pub use outcome::{Condition, Deadline, Outcome, Verdict, format_duration};
pub use poll::{FnProbe, PollLoop, PollSpec, Probe, ProbeFuture};
pub use retry::{Action, ActionFuture, FnAction, RetryExecutor, RetryPolicy};
pub use watch::{
    EventSource, EventStream, EventWatcher, Selector, SubscribeFuture, WatchEvent, WatchSpec,
    WatchTarget,
};
pub use worker::{WorkerFuture, race_worker};

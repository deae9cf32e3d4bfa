//! Racing a background worker against a deadline.
//!
//! Some steps hand a long wait to a spawned task, for example awaiting a
//! deployment rollout while the scenario deadline keeps running. The worker
//! reports through a channel of capacity one and the caller selects between
//! that channel and a timer. When the timer wins the worker is detached, never
//! joined, so the caller is not held past its deadline.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::debug;

use super::outcome::{Deadline, Outcome, Verdict};

/// Boxed future run by [`race_worker`] on a spawned task.
pub type WorkerFuture = Pin<Box<dyn Future<Output = Verdict> + Send + 'static>>;

/// Run `worker` on a background task and wait for it until `deadline`.
///
/// A worker that finishes with a pending verdict, or that exits without
/// reporting (for example by panicking), fails the race.
#[expect(
    clippy::integer_division_remainder_used,
    reason = "false positive triggered inside tokio::select! expansion"
)]
pub async fn race_worker(worker: WorkerFuture, deadline: &Deadline) -> Outcome {
    let (sender, mut receiver) = mpsc::channel::<Verdict>(1);
    let handle = tokio::spawn(async move {
        let verdict = worker.await;
        if sender.send(verdict).await.is_err() {
            debug!("worker finished after its deadline; result discarded");
        }
    });

    tokio::select! {
        received = receiver.recv() => match received {
            Some(verdict) => verdict.into_outcome().unwrap_or_else(|| Outcome::Failed {
                reason: String::from("worker finished without a conclusive result"),
            }),
            None => Outcome::Failed {
                reason: String::from("worker exited without reporting a result"),
            },
        },
        () = sleep(deadline.remaining()) => {
            debug!("worker deadline expired; detaching worker");
            drop(handle);
            deadline.timed_out()
        }
    }
}

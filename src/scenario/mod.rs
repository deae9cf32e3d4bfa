//! Scenario definition and orchestration.
//!
//! A scenario is an ordered list of [`Step`]s run by a [`Pipeline`] under a
//! global deadline. Each step may perform a remote-mutating action, then
//! waits for the remote system to converge. Teardown actions registered by
//! the steps always run when the pipeline finishes, whatever its result.
//!
//! Shared resources (the remote handle, tuned defaults) live in a
//! [`ScenarioContext`] that is constructed once and lent to every probe and
//! action by reference.

mod context;
mod pipeline;
mod step;

pub use context::{ScenarioContext, Settings};
pub use pipeline::{Pipeline, PipelineState, ScenarioReport, StepRecord, StepStatus};
pub use step::{Converge, OutcomeFuture, PollPlan, Step, WatchPlan, WorkerPlan};

//! Scenario state for convergence behavioural tests.

use std::time::Duration;

use converge::engine::Outcome;
use converge::error::ScenarioError;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

#[derive(Default, ScenarioState)]
pub(crate) struct ConvergenceState {
    /// Pending polls before the probe converges; `None` never converges.
    pub(crate) converge_after: Slot<Option<usize>>,
    pub(crate) interval: Slot<Duration>,
    pub(crate) deadline: Slot<Duration>,
    pub(crate) events: Slot<Vec<String>>,
    pub(crate) probe_calls: Slot<usize>,
    pub(crate) outcome: Slot<Outcome>,
    pub(crate) abort: Slot<ScenarioError>,
    pub(crate) cleanups: Slot<Vec<String>>,
}

#[fixture]
pub(crate) fn convergence_state() -> ConvergenceState {
    let state = ConvergenceState::default();
    state.converge_after.set(None);
    state.interval.set(Duration::from_secs(2));
    state.deadline.set(Duration::from_secs(300));
    state
}

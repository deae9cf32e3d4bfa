//! Assertion helpers for convergence behavioural tests.

use std::time::Duration;

use converge::engine::Outcome;
use converge::error::{AbortKind, ScenarioError};
use rstest_bdd_macros::then;

use super::StepResult;
use super::state::ConvergenceState;

fn outcome(convergence_state: &ConvergenceState) -> StepResult<Outcome> {
    convergence_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

#[then("the outcome is satisfied")]
fn outcome_is_satisfied(convergence_state: &ConvergenceState) -> StepResult<()> {
    match outcome(convergence_state)? {
        Outcome::Satisfied => Ok(()),
        other => Err(format!("expected Satisfied, got {other:?}")),
    }
}

#[then("the outcome is timed out after {secs} seconds")]
fn outcome_is_timed_out(convergence_state: &ConvergenceState, secs: u64) -> StepResult<()> {
    match outcome(convergence_state)? {
        Outcome::TimedOut { after } if after == Duration::from_secs(secs) => Ok(()),
        other => Err(format!("expected TimedOut after {secs}s, got {other:?}")),
    }
}

#[then("the outcome is failed with reason {reason}")]
fn outcome_is_failed(convergence_state: &ConvergenceState, reason: String) -> StepResult<()> {
    match outcome(convergence_state)? {
        Outcome::Failed { reason: actual } if actual == reason => Ok(()),
        other => Err(format!("expected Failed with '{reason}', got {other:?}")),
    }
}

#[then("the probe ran {count} times")]
fn probe_ran(convergence_state: &ConvergenceState, count: usize) -> StepResult<()> {
    let calls = convergence_state.probe_calls.get().unwrap_or(0);
    if calls == count {
        Ok(())
    } else {
        Err(format!("expected {count} probe calls, got {calls}"))
    }
}

#[then("the scenario aborts at step {label} because it timed out")]
fn scenario_aborts_on_timeout(convergence_state: &ConvergenceState, label: String) -> StepResult<()> {
    let abort = convergence_state
        .abort
        .get()
        .ok_or_else(|| String::from("scenario should have aborted"))?;

    match &abort {
        ScenarioError::Aborted {
            step,
            kind: AbortKind::TimedOut,
            ..
        } if *step == label => Ok(()),
        other => Err(format!("expected timeout at '{label}', got {other}")),
    }
}

#[then("the cleanups ran as {order}")]
fn cleanups_ran_in_order(convergence_state: &ConvergenceState, order: String) -> StepResult<()> {
    let expected: Vec<String> = order.split(',').map(|s| String::from(s.trim())).collect();
    let actual = convergence_state.cleanups.get().unwrap_or_default();
    if actual == expected {
        Ok(())
    } else {
        Err(format!("expected cleanups {expected:?}, got {actual:?}"))
    }
}

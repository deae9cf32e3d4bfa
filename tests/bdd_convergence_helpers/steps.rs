//! Given/when steps for convergence scenarios.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use converge::engine::{
    Action, ActionFuture, Condition, EventSource, EventStream, EventWatcher, FnAction, FnProbe,
    PollLoop, PollSpec, SubscribeFuture, Verdict, WatchEvent, WatchSpec, WatchTarget,
};
use converge::scenario::{Pipeline, PollPlan, Step};
use futures_util::stream;
use rstest_bdd_macros::{given, when};
use tokio::runtime::Runtime;

use super::StepResult;
use super::state::ConvergenceState;

type Journal = Arc<Mutex<Vec<String>>>;

/// Replays a fixed list of app states on every subscription.
struct ReplaySource {
    states: Vec<String>,
}

impl EventSource<String> for ReplaySource {
    fn subscribe(&self, _target: &WatchTarget) -> SubscribeFuture<'_, String> {
        let events: Vec<WatchEvent<String>> =
            self.states.iter().cloned().map(WatchEvent::Modified).collect();
        let replay: EventStream<'_, String> = Box::pin(stream::iter(events));
        Box::pin(async move { Ok(replay) })
    }
}

fn paused_runtime() -> StepResult<Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|e| format!("failed to create runtime: {e}"))
}

fn recorded(journal: &Journal, entry: &'static str) -> impl Action + 'static {
    let log = Arc::clone(journal);
    FnAction::new(move || -> ActionFuture<'static> {
        if let Ok(mut entries) = log.lock() {
            entries.push(String::from(entry));
        }
        Box::pin(async { Ok(()) })
    })
}

#[given("a probe that converges after {polls} polls")]
fn given_probe_converges_after(convergence_state: &ConvergenceState, polls: usize) {
    convergence_state.converge_after.set(Some(polls));
}

#[given("a probe that never converges")]
fn given_probe_never_converges(convergence_state: &ConvergenceState) {
    convergence_state.converge_after.set(None);
}

#[given("a poll interval of {secs} seconds")]
fn given_poll_interval(convergence_state: &ConvergenceState, secs: u64) {
    convergence_state.interval.set(Duration::from_secs(secs));
}

#[given("a deadline of {secs} seconds")]
fn given_deadline(convergence_state: &ConvergenceState, secs: u64) {
    convergence_state.deadline.set(Duration::from_secs(secs));
}

#[given("a watch stream emitting {states}")]
fn given_watch_stream(convergence_state: &ConvergenceState, states: String) {
    let parsed = states.split(',').map(|s| String::from(s.trim())).collect();
    convergence_state.events.set(parsed);
}

#[given("a backup scenario whose backup never completes")]
fn given_backup_scenario(convergence_state: &ConvergenceState) {
    // The scenario is assembled in the `when` step because its steps borrow
    // the journal for the lifetime of the pipeline.
    convergence_state.deadline.set(Duration::from_secs(180));
}

#[when("the poll loop runs")]
fn when_poll_loop_runs(convergence_state: &ConvergenceState) -> StepResult<()> {
    let converge_after = convergence_state.converge_after.get().flatten();
    let interval = convergence_state
        .interval
        .get()
        .ok_or_else(|| String::from("interval should be configured"))?;
    let deadline = convergence_state
        .deadline
        .get()
        .ok_or_else(|| String::from("deadline should be configured"))?;

    let calls = AtomicUsize::new(0);
    let probe = FnProbe::new(|| {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        let verdict = if converge_after.is_some_and(|pending| call >= pending) {
            Verdict::Satisfied
        } else {
            Verdict::Pending
        };
        Box::pin(async move { Ok(verdict) })
    });

    let runtime = paused_runtime()?;
    let outcome = runtime.block_on(async {
        let spec = PollSpec::new(&probe, interval, deadline);
        PollLoop::run(&spec).await
    });

    convergence_state.outcome.set(outcome);
    convergence_state.probe_calls.set(calls.load(Ordering::SeqCst));
    Ok(())
}

#[when("the watcher runs")]
fn when_watcher_runs(convergence_state: &ConvergenceState) -> StepResult<()> {
    let states = convergence_state
        .events
        .get()
        .ok_or_else(|| String::from("events should be configured"))?;
    let deadline = convergence_state
        .deadline
        .get()
        .ok_or_else(|| String::from("deadline should be configured"))?;

    let source = ReplaySource { states };
    let condition = Condition::new("app is deployed", |state: &String| match state.as_str() {
        "deployed" => Verdict::Satisfied,
        "failed" => Verdict::Failed(String::from("app entered failed state")),
        _ => Verdict::Pending,
    });
    let target = WatchTarget::named("apps", "rancher-logging").in_namespace("cattle-logging-system");

    let runtime = paused_runtime()?;
    let outcome = runtime.block_on(async {
        let spec = WatchSpec::new(&source, target, condition, deadline);
        EventWatcher::run(&spec).await
    });

    convergence_state.outcome.set(outcome);
    Ok(())
}

#[when("the scenario runs")]
fn when_scenario_runs(convergence_state: &ConvergenceState) -> StepResult<()> {
    let backup_deadline = convergence_state
        .deadline
        .get()
        .ok_or_else(|| String::from("deadline should be configured"))?;
    let journal: Journal = Arc::new(Mutex::new(Vec::new()));

    let deployed = FnProbe::new(|| Box::pin(async { Ok(Verdict::Satisfied) }));
    let in_progress = FnProbe::new(|| Box::pin(async { Ok(Verdict::Pending) }));
    let restored = FnProbe::new(|| Box::pin(async { Ok(Verdict::Satisfied) }));
    let interval = Duration::from_secs(5);

    let pipeline = Pipeline::new("backup-restore", Duration::from_secs(3600))
        .step(
            Step::new(
                "install chart",
                PollPlan::new(deployed, interval, Duration::from_secs(300)),
            )
            .with_action(recorded(&journal, "install chart"))
            .with_cleanup("uninstall chart", recorded(&journal, "uninstall chart")),
        )
        .step(
            Step::new(
                "wait for backup",
                PollPlan::new(in_progress, interval, backup_deadline),
            )
            .with_action(recorded(&journal, "create backup"))
            .with_cleanup("delete backup", recorded(&journal, "delete backup")),
        )
        .step(Step::new(
            "restore",
            PollPlan::new(restored, interval, Duration::from_secs(300)),
        ));

    let runtime = paused_runtime()?;
    let report = runtime.block_on(pipeline.run());
    if let Err(abort) = report.into_result() {
        convergence_state.abort.set(abort);
    }

    let entries = journal.lock().map(|log| log.clone()).unwrap_or_default();
    let cleanups = entries
        .into_iter()
        .filter(|entry| entry == "delete backup" || entry == "uninstall chart")
        .collect();
    convergence_state.cleanups.set(cleanups);
    Ok(())
}

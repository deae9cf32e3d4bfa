//! Unit tests for event-stream watching.

use std::collections::VecDeque;
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

use futures_util::stream;
use rstest::{fixture, rstest};
use tokio::time::Instant;

use super::*;

/// What one call to [`ScriptedSource::subscribe`] hands back.
enum Subscription {
    /// A stream that yields these events, then closes.
    Events(Vec<WatchEvent<String>>),
    /// A stream that never yields.
    Silent,
    /// The subscription itself fails.
    Refused(ObservationError),
}

/// An event source that replays scripted subscriptions in order.
struct ScriptedSource {
    subscriptions: Mutex<VecDeque<Subscription>>,
    calls: AtomicUsize,
    kinds: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn new(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            subscriptions: Mutex::new(subscriptions.into_iter().collect()),
            calls: AtomicUsize::new(0),
            kinds: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn kinds(&self) -> Vec<String> {
        self.kinds.lock().map(|kinds| kinds.clone()).unwrap_or_default()
    }
}

impl EventSource<String> for ScriptedSource {
    fn subscribe(&self, target: &WatchTarget) -> SubscribeFuture<'_, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut kinds) = self.kinds.lock() {
            kinds.push(String::from(target.kind()));
        }
        let next = self
            .subscriptions
            .lock()
            .ok()
            .and_then(|mut pending| pending.pop_front());
        Box::pin(async move {
            match next {
                Some(Subscription::Events(events)) => Ok(event_stream(events)),
                Some(Subscription::Silent) => {
                    let silent: EventStream<'_, String> = Box::pin(stream::pending());
                    Ok(silent)
                }
                Some(Subscription::Refused(error)) => Err(error),
                None => Err(ObservationError::terminal("no subscription scripted")),
            }
        })
    }
}

type RuntimeFixture = std::io::Result<tokio::runtime::Runtime>;
type TestResult = Result<(), Box<dyn std::error::Error>>;

#[fixture]
fn paused_runtime() -> RuntimeFixture {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
}

#[fixture]
fn logging_app() -> WatchTarget {
    WatchTarget::named("apps", "rancher-logging").in_namespace("cattle-logging-system")
}

/// Condition mirroring a chart app summary: `deployed` succeeds, `failed`
/// fails, anything else is still converging.
#[fixture]
fn deployed() -> Condition<String> {
    Condition::new("app is deployed", |state: &String| match state.as_str() {
        "deployed" => Verdict::Satisfied,
        "failed" => Verdict::Failed(String::from("app entered failed state")),
        _ => Verdict::Pending,
    })
}

fn event_stream<'a>(events: Vec<WatchEvent<String>>) -> EventStream<'a, String> {
    Box::pin(stream::iter(events))
}

fn modified(state: &str) -> WatchEvent<String> {
    WatchEvent::Modified(String::from(state))
}

fn source_with_events(events: Vec<WatchEvent<String>>) -> ScriptedSource {
    ScriptedSource::new([Subscription::Events(events)])
}

fn run_watch(
    runtime: &tokio::runtime::Runtime,
    source: &ScriptedSource,
    target: WatchTarget,
    condition: Condition<String>,
    timeout: Duration,
    deletion_is_success: bool,
) -> (Outcome, Duration) {
    runtime.block_on(async {
        let start = Instant::now();
        let spec = WatchSpec::new(source, target, condition, timeout)
            .deletion_is_success(deletion_is_success);
        let outcome = EventWatcher::run(&spec).await;
        (outcome, start.elapsed())
    })
}

#[rstest]
fn failed_state_ends_watch_on_third_event(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![
        modified("pending"),
        modified("pending"),
        modified("failed"),
        modified("deployed"),
    ]);

    let (outcome, elapsed) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(300),
        false,
    );

    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: String::from("app entered failed state")
        }
    );
    assert_eq!(elapsed, Duration::ZERO);
    assert_eq!(source.calls(), 1);
    Ok(())
}

#[rstest]
#[case::added(WatchEvent::Added(String::from("deployed")))]
#[case::modified(WatchEvent::Modified(String::from("deployed")))]
fn satisfied_condition_ends_watch(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
    #[case] event: WatchEvent<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![WatchEvent::Bookmark, event]);

    let (outcome, _) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(60),
        false,
    );

    assert_eq!(outcome, Outcome::Satisfied);
    Ok(())
}

#[rstest]
fn error_event_fails_without_waiting_for_deadline(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![
        modified("pending-upgrade"),
        WatchEvent::Error(String::from("too old resource version")),
        modified("deployed"),
    ]);

    let (outcome, elapsed) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(3600),
        false,
    );

    let Outcome::Failed { reason } = outcome else {
        return Err(format!("expected Failed, got {outcome:?}").into());
    };
    assert!(reason.contains("too old resource version"), "reason: {reason}");
    assert_eq!(elapsed, Duration::ZERO);
    Ok(())
}

#[rstest]
#[case::deletion_is_success(true, true)]
#[case::deletion_is_failure(false, false)]
fn deletion_policy_decides_outcome(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
    #[case] deletion_is_success: bool,
    #[case] expect_satisfied: bool,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![
        modified("uninstalling"),
        WatchEvent::Deleted(String::from("uninstalling")),
    ]);

    let (outcome, _) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(300),
        deletion_is_success,
    );

    assert_eq!(outcome.is_satisfied(), expect_satisfied);
    if let Outcome::Failed { reason } = outcome {
        assert!(reason.contains("was deleted"), "reason: {reason}");
    }
    Ok(())
}

#[rstest]
fn condition_decides_deleted_payload_first(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![WatchEvent::Deleted(String::from("failed"))]);

    let (outcome, _) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(300),
        true,
    );

    assert!(matches!(outcome, Outcome::Failed { .. }));
    Ok(())
}

#[rstest]
fn closed_stream_times_out_before_deadline(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = source_with_events(vec![modified("pending-install")]);

    let (outcome, elapsed) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(300),
        false,
    );

    assert_eq!(
        outcome,
        Outcome::TimedOut {
            after: Duration::from_secs(300)
        }
    );
    assert!(elapsed < Duration::from_secs(300));
    Ok(())
}

#[rstest]
fn silent_stream_times_out_at_deadline(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = ScriptedSource::new([Subscription::Silent]);

    let (outcome, elapsed) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(90),
        false,
    );

    assert!(outcome.is_timed_out());
    assert_eq!(elapsed, Duration::from_secs(90));
    assert_eq!(source.calls(), 1);
    Ok(())
}

#[rstest]
fn transient_subscription_errors_resubscribe(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = ScriptedSource::new([
        Subscription::Refused(ObservationError::transient("connection refused")),
        Subscription::Refused(ObservationError::transient("connection refused")),
        Subscription::Events(vec![modified("deployed")]),
    ]);

    let (outcome, elapsed) = runtime.block_on(async {
        let start = Instant::now();
        let spec = WatchSpec::new(&source, logging_app, deployed, Duration::from_secs(60))
            .with_resubscribe_delay(Duration::from_secs(5));
        let outcome = EventWatcher::run(&spec).await;
        (outcome, start.elapsed())
    });

    assert_eq!(outcome, Outcome::Satisfied);
    assert_eq!(elapsed, Duration::from_secs(10));
    assert_eq!(source.calls(), 3);
    assert_eq!(source.kinds(), ["apps", "apps", "apps"]);
    Ok(())
}

#[rstest]
fn terminal_subscription_error_fails(
    paused_runtime: RuntimeFixture,
    logging_app: WatchTarget,
    deployed: Condition<String>,
) -> TestResult {
    let runtime = paused_runtime?;
    let source = ScriptedSource::new([Subscription::Refused(ObservationError::terminal(
        "apps is forbidden",
    ))]);

    let (outcome, _) = run_watch(
        &runtime,
        &source,
        logging_app,
        deployed,
        Duration::from_secs(60),
        false,
    );

    assert_eq!(
        outcome,
        Outcome::Failed {
            reason: String::from("apps is forbidden")
        }
    );
    Ok(())
}

#[rstest]
#[case::named(
    WatchTarget::named("apps", "rancher-monitoring").in_namespace("cattle-monitoring-system"),
    "apps/cattle-monitoring-system (metadata.name=rancher-monitoring)"
)]
#[case::labelled(
    WatchTarget::labelled("deployments", "app=rancher-backup"),
    "deployments (app=rancher-backup)"
)]
fn watch_target_displays_selector(#[case] target: WatchTarget, #[case] expected: &str) {
    assert_eq!(target.to_string(), expected);
}

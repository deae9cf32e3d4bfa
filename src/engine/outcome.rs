//! Verdicts, outcomes, deadlines, and conditions shared by both wait loops.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::ObservationError;

/// The result of evaluating a target condition against one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The target condition does not hold yet.
    Pending,
    /// The target condition holds.
    Satisfied,
    /// The observed state can no longer reach the target condition.
    Failed(String),
}

impl Verdict {
    /// Fold an observation result into a verdict.
    ///
    /// Transient observation errors become [`Verdict::Pending`] so the wait
    /// loop keeps observing; terminal errors become [`Verdict::Failed`].
    #[must_use]
    pub fn from_observation(result: Result<Self, ObservationError>) -> Self {
        match result {
            Ok(verdict) => verdict,
            Err(ObservationError::Transient { .. }) => Self::Pending,
            Err(ObservationError::Terminal { message }) => Self::Failed(message),
        }
    }

    /// Convert a conclusive verdict into an outcome.
    ///
    /// Returns `None` while the verdict is still pending.
    #[must_use]
    pub fn into_outcome(self) -> Option<Outcome> {
        match self {
            Self::Pending => None,
            Self::Satisfied => Some(Outcome::Satisfied),
            Self::Failed(reason) => Some(Outcome::Failed { reason }),
        }
    }
}

/// Terminal result of a single convergence attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The target condition was observed.
    Satisfied,
    /// The remote state failed conclusively.
    Failed {
        /// Why the state can no longer converge.
        reason: String,
    },
    /// The deadline elapsed without a conclusive observation.
    TimedOut {
        /// The configured deadline.
        after: Duration,
    },
}

impl Outcome {
    /// Returns whether the attempt reached its target condition.
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied)
    }

    /// Returns whether the attempt exceeded its deadline.
    #[must_use]
    pub const fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Satisfied => f.write_str("satisfied"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::TimedOut { after } => write!(
                f,
                "no terminal result within {}",
                format_duration(*after)
            ),
        }
    }
}

/// Render a duration the way deadlines appear in configuration.
///
/// Whole seconds print as `300s`; anything finer prints in milliseconds.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// A wall-clock bound on a convergence attempt.
///
/// Remaining time decreases monotonically from the moment the deadline is
/// started. A deadline is never reset; a new attempt starts a new deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    duration: Duration,
    started: Instant,
}

impl Deadline {
    /// Start a deadline of `duration` at the current instant.
    #[must_use]
    pub fn starting_now(duration: Duration) -> Self {
        Self {
            duration,
            started: Instant::now(),
        }
    }

    /// Return the configured duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }

    /// Return the time elapsed since the deadline started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Return the time left before the deadline expires.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.duration.saturating_sub(self.elapsed())
    }

    /// Returns whether the deadline has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Return the timed-out outcome for this deadline.
    #[must_use]
    pub const fn timed_out(&self) -> Outcome {
        Outcome::TimedOut {
            after: self.duration,
        }
    }
}

type Predicate<T> = dyn Fn(&T) -> Verdict + Send + Sync;

/// A named predicate over an observed remote snapshot.
///
/// Conditions are immutable and evaluated repeatedly; cloning shares the
/// predicate.
pub struct Condition<T> {
    name: String,
    predicate: Arc<Predicate<T>>,
}

impl<T> Condition<T> {
    /// Create a condition from a name and a predicate.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&T) -> Verdict + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Return the condition name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the condition against one snapshot.
    #[must_use]
    pub fn evaluate(&self, snapshot: &T) -> Verdict {
        (self.predicate)(snapshot)
    }
}

impl<T> Clone for Condition<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Condition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::transient(Err(ObservationError::transient("connection reset")), Verdict::Pending)]
    #[case::terminal(
        Err(ObservationError::terminal("forbidden")),
        Verdict::Failed(String::from("forbidden"))
    )]
    #[case::passthrough(Ok(Verdict::Satisfied), Verdict::Satisfied)]
    fn observation_errors_fold_into_verdicts(
        #[case] result: Result<Verdict, ObservationError>,
        #[case] expected: Verdict,
    ) {
        assert_eq!(Verdict::from_observation(result), expected);
    }

    #[rstest]
    fn pending_verdict_has_no_outcome() {
        assert_eq!(Verdict::Pending.into_outcome(), None);
        assert_eq!(
            Verdict::Failed(String::from("crashloop")).into_outcome(),
            Some(Outcome::Failed {
                reason: String::from("crashloop")
            })
        );
    }

    #[rstest]
    #[case(Duration::from_secs(300), "300s")]
    #[case(Duration::from_millis(1500), "1500ms")]
    #[case(Duration::ZERO, "0s")]
    fn durations_render_compactly(#[case] duration: Duration, #[case] expected: &str) {
        assert_eq!(format_duration(duration), expected);
    }

    #[rstest]
    fn timed_out_outcome_reports_configured_deadline() {
        let outcome = Outcome::TimedOut {
            after: Duration::from_secs(180),
        };
        assert!(outcome.is_timed_out());
        assert_eq!(outcome.to_string(), "no terminal result within 180s");
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_remaining_time_decreases_to_zero() {
        let deadline = Deadline::starting_now(Duration::from_secs(10));
        assert_eq!(deadline.remaining(), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deadline.remaining(), Duration::from_secs(6));
        assert!(!deadline.is_expired());

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(deadline.remaining(), Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(
            deadline.timed_out(),
            Outcome::TimedOut {
                after: Duration::from_secs(10)
            }
        );
    }

    #[rstest]
    fn condition_evaluates_predicate_by_name() {
        let condition = Condition::new("state is active", |state: &&str| match *state {
            "active" => Verdict::Satisfied,
            "error" => Verdict::Failed(String::from("cluster entered error state")),
            _ => Verdict::Pending,
        });

        assert_eq!(condition.name(), "state is active");
        assert_eq!(condition.evaluate(&"provisioning"), Verdict::Pending);
        assert_eq!(condition.clone().evaluate(&"active"), Verdict::Satisfied);
        assert!(matches!(condition.evaluate(&"error"), Verdict::Failed(_)));
    }
}

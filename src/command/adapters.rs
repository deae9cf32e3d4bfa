//! Probe and action adapters over shell commands.

use tracing::debug;

use super::{CommandOutput, CommandRunner, ShellSession};
use crate::engine::{Action, ActionFuture, Probe, ProbeFuture, Verdict};
use crate::error::{ActionError, ObservationError};

/// Exit codes that will recur if a command is re-issued: 126 (not
/// executable) and 127 (not found).
pub const DEFAULT_TERMINAL_EXIT_CODES: [i32; 2] = [126, 127];

/// A read-only shell probe.
///
/// Classification of one run:
/// - a non-zero exit is transient, so the poll loop keeps going, even when
///   its error output happens to contain the fail pattern
/// - exit 0 with output mentioning the fail pattern is a conclusive failure
/// - exit 0 is otherwise satisfied when stdout contains the expected text, or when no
///   text is expected; otherwise it is still pending
/// - a shell that cannot be spawned is terminal
pub struct CommandProbe<'a, R> {
    session: &'a ShellSession<R>,
    script: String,
    expect: Option<String>,
    fail_pattern: Option<String>,
}

impl<'a, R: CommandRunner> CommandProbe<'a, R> {
    /// Probe `script` in `session`.
    #[must_use]
    pub fn new(session: &'a ShellSession<R>, script: impl Into<String>) -> Self {
        Self {
            session,
            script: script.into(),
            expect: None,
            fail_pattern: None,
        }
    }

    /// Require stdout to contain `text`.
    #[must_use]
    pub fn expecting(mut self, text: Option<String>) -> Self {
        self.expect = text;
        self
    }

    /// Treat output containing `pattern` as a conclusive failure.
    #[must_use]
    pub fn failing_on(mut self, pattern: Option<String>) -> Self {
        self.fail_pattern = pattern;
        self
    }

    fn classify(&self, output: &CommandOutput) -> Result<Verdict, ObservationError> {
        if !output.success() {
            return Err(ObservationError::transient(failure_message(
                &self.script,
                output,
            )));
        }
        if let Some(pattern) = self
            .fail_pattern
            .as_deref()
            .filter(|pattern| output.mentions(pattern))
        {
            return Ok(Verdict::Failed(format!(
                "'{}' output matched fail pattern '{pattern}'",
                self.script
            )));
        }
        let converged = self
            .expect
            .as_deref()
            .is_none_or(|text| output.stdout.contains(text));
        Ok(if converged {
            Verdict::Satisfied
        } else {
            Verdict::Pending
        })
    }
}

impl<R: CommandRunner> Probe for CommandProbe<'_, R> {
    fn probe(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let output = self
                .session
                .run(&self.script)
                .await
                .map_err(|error| ObservationError::terminal(error.to_string()))?;
            let verdict = self.classify(&output);
            debug!(script = %self.script, status = %output.status(), ?verdict, "probe ran");
            verdict
        })
    }
}

/// A remote-mutating shell action.
///
/// Exit 0 succeeds. Exit codes listed as terminal, and shells that cannot be
/// spawned, are terminal errors; every other failure is retryable.
pub struct CommandAction<'a, R> {
    session: &'a ShellSession<R>,
    script: String,
    terminal_exit_codes: Vec<i32>,
}

impl<'a, R: CommandRunner> CommandAction<'a, R> {
    /// Run `script` in `session`.
    #[must_use]
    pub fn new(session: &'a ShellSession<R>, script: impl Into<String>) -> Self {
        Self {
            session,
            script: script.into(),
            terminal_exit_codes: DEFAULT_TERMINAL_EXIT_CODES.to_vec(),
        }
    }

    /// Replace the exit codes treated as terminal.
    #[must_use]
    pub fn with_terminal_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.terminal_exit_codes = codes.into_iter().collect();
        self
    }

    fn classify(&self, output: &CommandOutput) -> Result<(), ActionError> {
        if output.success() {
            return Ok(());
        }
        let message = failure_message(&self.script, output);
        let terminal = output
            .code
            .is_some_and(|code| self.terminal_exit_codes.contains(&code));
        Err(if terminal {
            ActionError::terminal(message)
        } else {
            ActionError::retryable(message)
        })
    }
}

impl<R: CommandRunner> Action for CommandAction<'_, R> {
    fn execute(&self) -> ActionFuture<'_> {
        Box::pin(async move {
            let output = self
                .session
                .run(&self.script)
                .await
                .map_err(|error| ActionError::terminal(error.to_string()))?;
            debug!(script = %self.script, status = %output.status(), "action ran");
            self.classify(&output)
        })
    }
}

/// Summarise a failed run with its status and the last line of stderr.
fn failure_message(script: &str, output: &CommandOutput) -> String {
    match output.stderr.lines().rev().find(|line| !line.trim().is_empty()) {
        Some(line) => format!("'{script}' failed with {}: {}", output.status(), line.trim()),
        None => format!("'{script}' failed with {}", output.status()),
    }
}

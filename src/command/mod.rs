//! Shell command boundary.
//!
//! Scenarios loaded from files observe and mutate remote state by running
//! shell commands (`kubectl`, `helm`, `aws`). This module wraps process
//! execution behind the [`CommandRunner`] trait seam so probe and action
//! classification can be tested without spawning anything, and resolves the
//! shell through [`mockable::Env`] the way the configuration layer resolves
//! everything else.

mod adapters;


use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::error::CommandError;

pub use adapters::{CommandAction, CommandProbe, DEFAULT_TERMINAL_EXIT_CODES};

/// Environment variable consulted when no shell is configured.
const SHELL_ENV_VAR: &str = "SHELL";

/// Shell used when neither configuration nor the environment names one.
const DEFAULT_SHELL: &str = "/bin/sh";

/// Boxed future type returned by [`CommandRunner::run`].
pub type RunCommandFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, CommandError>> + Send + 'a>>;

/// A script to run as `<program> -c <script>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    /// Shell program.
    pub program: String,
    /// Script passed to the shell.
    pub script: String,
}

impl ShellCommand {
    /// Create a command running `script` under `program`.
    #[must_use]
    pub fn new(program: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
        }
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output, lossily decoded.
    pub stdout: String,
    /// Captured standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns whether the command exited with status 0.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Describe how the command finished, e.g. `exit status 2`.
    #[must_use]
    pub fn status(&self) -> String {
        self.code.map_or_else(
            || String::from("terminated by signal"),
            |code| format!("exit status {code}"),
        )
    }

    /// Returns whether `needle` appears in stdout or stderr.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Runs shell commands to completion.
pub trait CommandRunner: Send + Sync {
    /// Run `command` and capture its output.
    ///
    /// A command that starts and exits non-zero is an `Ok` output; only a
    /// failure to start the shell is an error.
    fn run(&self, command: &ShellCommand) -> RunCommandFuture<'_>;
}

/// Runs commands as local child processes via `tokio::process`.
///
/// Children are killed when the returned future is dropped, so a deadline
/// that cancels a probe also ends the process it started.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command: &ShellCommand) -> RunCommandFuture<'_> {
        let ShellCommand { program, script } = command.clone();
        Box::pin(async move {
            debug!(program = %program, script = %script, "running shell command");
            let output = Command::new(&program)
                .arg("-c")
                .arg(&script)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|error| CommandError::SpawnFailed {
                    program: program.clone(),
                    message: error.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Resolves the shell program from configuration and the environment.
///
/// # Example
///
/// ```ignore
/// use converge::command::ShellResolver;
/// use mockable::DefaultEnv;
///
/// let env = DefaultEnv::new();
/// let resolver = ShellResolver::new(&env);
/// let program = resolver.resolve(Some("/bin/bash"));
/// assert_eq!(program, "/bin/bash");
/// ```
pub struct ShellResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> ShellResolver<'a, E> {
    /// Creates a new shell resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolve the shell program.
    ///
    /// Checks, in order:
    /// 1. the configured program (`[shell] program`)
    /// 2. the `SHELL` environment variable
    /// 3. `/bin/sh`
    ///
    /// Empty values are skipped.
    #[must_use]
    pub fn resolve(&self, configured: Option<&str>) -> String {
        configured
            .filter(|program| !program.is_empty())
            .map(String::from)
            .or_else(|| {
                self.env
                    .string(SHELL_ENV_VAR)
                    .filter(|program| !program.is_empty())
            })
            .unwrap_or_else(|| String::from(Self::default_shell()))
    }

    /// Returns the fallback shell.
    #[must_use]
    pub const fn default_shell() -> &'static str {
        DEFAULT_SHELL
    }
}

/// A resolved shell paired with the runner that executes it.
///
/// Scenarios built from files use a session as their remote handle; probes
/// and actions borrow it for the lifetime of the pipeline.
#[derive(Debug, Clone)]
pub struct ShellSession<R = SystemCommandRunner> {
    program: String,
    runner: R,
}

impl ShellSession {
    /// Create a session that spawns real processes under `program`.
    #[must_use]
    pub fn system(program: impl Into<String>) -> Self {
        Self::new(program, SystemCommandRunner)
    }
}

impl<R: CommandRunner> ShellSession<R> {
    /// Create a session running commands under `program` via `runner`.
    #[must_use]
    pub fn new(program: impl Into<String>, runner: R) -> Self {
        Self {
            program: program.into(),
            runner,
        }
    }

    /// Return the shell program.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `script` under this session's shell.
    pub fn run(&self, script: &str) -> RunCommandFuture<'_> {
        self.runner
            .run(&ShellCommand::new(self.program.as_str(), script))
    }

    /// Plan a read-only probe of `script`.
    #[must_use]
    pub fn probe(&self, script: impl Into<String>) -> CommandProbe<'_, R> {
        CommandProbe::new(self, script)
    }

    /// Plan a remote-mutating action running `script`.
    #[must_use]
    pub fn action(&self, script: impl Into<String>) -> CommandAction<'_, R> {
        CommandAction::new(self, script)
    }
}

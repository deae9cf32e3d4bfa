//! Deferred teardown of remote state created by a scenario.

use std::time::Duration;

use tracing::{info, warn};

use super::outcome::format_duration;
use super::retry::Action;
use crate::error::CleanupError;

struct Registered<'a> {
    label: String,
    action: Box<dyn Action + 'a>,
}

/// An ordered list of teardown actions, released in reverse order.
///
/// The registry is owned by a single pipeline. Every registered action runs
/// when [`CleanupRegistry::run_all`] is called, whether or not the scenario
/// succeeded and whether or not earlier cleanups failed.
pub struct CleanupRegistry<'a> {
    entries: Vec<Registered<'a>>,
    enabled: bool,
    action_timeout: Option<Duration>,
}

impl<'a> CleanupRegistry<'a> {
    /// Create an empty, enabled registry with no per-action timeout.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            enabled: true,
            action_timeout: None,
        }
    }

    /// Bound every cleanup action by `timeout`.
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout: Duration) -> Self {
        self.action_timeout = Some(timeout);
        self
    }

    /// Enable or disable cleanup execution.
    ///
    /// A disabled registry still accepts registrations so the skipped
    /// teardown can be reported.
    #[must_use]
    pub const fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Register a teardown action under a human-readable label.
    pub fn register(&mut self, label: impl Into<String>, action: impl Action + 'a) {
        self.register_boxed(label, Box::new(action));
    }

    /// Register an already boxed teardown action.
    pub fn register_boxed(&mut self, label: impl Into<String>, action: Box<dyn Action + 'a>) {
        self.entries.push(Registered {
            label: label.into(),
            action,
        });
    }

    /// Return the number of pending cleanups.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no cleanups are pending.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every registered action in reverse registration order.
    ///
    /// A failing action does not prevent later ones from running; every
    /// failure is collected and returned. The registry is empty afterwards.
    pub async fn run_all(&mut self) -> Vec<CleanupError> {
        if !self.enabled {
            for entry in self.entries.drain(..).rev() {
                info!(label = %entry.label, "cleanup disabled; leaving remote state in place");
            }
            return Vec::new();
        }

        let mut errors = Vec::new();
        while let Some(entry) = self.entries.pop() {
            info!(label = %entry.label, "running cleanup");
            if let Err(message) = self.run_one(entry.action.as_ref()).await {
                warn!(label = %entry.label, %message, "cleanup failed");
                errors.push(CleanupError {
                    label: entry.label,
                    message,
                });
            }
        }
        errors
    }

    async fn run_one(&self, action: &dyn Action) -> Result<(), String> {
        let Some(timeout) = self.action_timeout else {
            return action.execute().await.map_err(|error| error.to_string());
        };
        match tokio::time::timeout(timeout, action.execute()).await {
            Ok(result) => result.map_err(|error| error.to_string()),
            Err(_) => Err(format!("timed out after {}", format_duration(timeout))),
        }
    }
}

impl Default for CleanupRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CleanupRegistry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let labels: Vec<&str> = self.entries.iter().map(|entry| entry.label.as_str()).collect();
        f.debug_struct("CleanupRegistry")
            .field("labels", &labels)
            .field("enabled", &self.enabled)
            .field("action_timeout", &self.action_timeout)
            .finish()
    }
}

//! Typed scenario file format.
//!
//! A scenario file declares an ordered list of steps, each with an optional
//! shell action, optional cleanup, and a shell probe polled until the remote
//! system converges:
//!
//! ```toml
//! name = "backup-restore"
//! timeout_secs = 1800
//!
//! [[steps]]
//! label = "install chart"
//! action = "helm install rancher-backup rancher-charts/rancher-backup -n cattle-resources-system"
//! retry = true
//! cleanup = "helm uninstall rancher-backup -n cattle-resources-system"
//!
//! [steps.probe]
//! command = "helm status rancher-backup -n cattle-resources-system -o json"
//! expect = "\"status\":\"deployed\""
//! fail_pattern = "\"status\":\"failed\""
//! interval_secs = 2
//! timeout_secs = 300
//! ```
//!
//! Files are parsed once into these structs and validated before any step
//! runs; the engine never sees raw TOML.

use std::collections::HashSet;

use camino::Utf8Path;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::toml;
use serde::{Deserialize, Serialize};

use crate::error::{CommandError, ScenarioError};

/// A complete scenario definition.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Scenario name used in logs and failure reports.
    pub name: String,

    /// Global scenario deadline in seconds; defaults to
    /// `convergence.scenario_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Steps, run in declaration order.
    #[serde(default)]
    pub steps: Vec<StepFile>,
}

/// One step of a scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StepFile {
    /// Unique step label.
    pub label: String,

    /// Shell command that mutates remote state before the wait.
    #[serde(default)]
    pub action: Option<String>,

    /// Re-issue the action under the configured retry policy.
    #[serde(default)]
    pub retry: bool,

    /// Shell command that releases what the action created.
    #[serde(default)]
    pub cleanup: Option<String>,

    /// The convergence probe.
    pub probe: ProbeFile,
}

/// A shell probe polled until it converges.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeFile {
    /// Shell command observing remote state. It must not mutate anything.
    pub command: String,

    /// Text stdout must contain; without it, exit status 0 suffices.
    #[serde(default)]
    pub expect: Option<String>,

    /// Text in stdout or stderr of a successful run that means the state can
    /// no longer converge. Failed runs stay transient whatever they print.
    #[serde(default)]
    pub fail_pattern: Option<String>,

    /// Seconds between probes; defaults to `convergence.poll_interval_secs`.
    #[serde(default)]
    pub interval_secs: Option<u64>,

    /// Step deadline in seconds; defaults to `convergence.timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl ScenarioFile {
    /// Parse a scenario from TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns the parser's message when the text is not a valid scenario.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Read, parse and validate the scenario file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::ScenarioLoad`] when the file cannot be read or
    /// parsed, or fails validation.
    pub fn load(path: &Utf8Path) -> crate::error::Result<Self> {
        let load_error = |message: String| CommandError::ScenarioLoad {
            path: path.as_std_path().to_path_buf(),
            message,
        };

        let parent = path
            .parent()
            .filter(|dir| !dir.as_str().is_empty())
            .unwrap_or_else(|| Utf8Path::new("."));
        let file_name = path.file_name().unwrap_or(path.as_str());
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|e| load_error(format!("failed to open directory {parent}: {e}")))?;
        let content = dir
            .read_to_string(file_name)
            .map_err(|e| load_error(format!("failed to read file: {e}")))?;

        let scenario = Self::from_toml(&content).map_err(load_error)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check the definition before any step runs.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError::Invalid`] when the name is blank, no steps
    /// are declared, a label is blank or repeated, a command is blank, or a
    /// duration is zero.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        let invalid = |reason: String| ScenarioError::Invalid {
            scenario: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid(String::from("scenario name must not be empty")));
        }
        if self.steps.is_empty() {
            return Err(invalid(String::from("at least one step is required")));
        }
        if self.timeout_secs == Some(0) {
            return Err(invalid(String::from("timeout_secs must be greater than zero")));
        }

        let mut labels = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.label.trim().is_empty() {
                return Err(invalid(format!("step {index} has an empty label")));
            }
            if !labels.insert(step.label.as_str()) {
                return Err(invalid(format!("duplicate step label '{}'", step.label)));
            }
            step.validate().map_err(|reason| {
                invalid(format!("step '{}': {reason}", step.label))
            })?;
        }
        Ok(())
    }
}

impl StepFile {
    fn validate(&self) -> Result<(), String> {
        let commands = [
            ("action", self.action.as_deref()),
            ("cleanup", self.cleanup.as_deref()),
            ("probe.command", Some(self.probe.command.as_str())),
        ];
        if let Some((field, _)) = commands
            .iter()
            .find(|(_, command)| command.is_some_and(|text| text.trim().is_empty()))
        {
            return Err(format!("{field} must not be empty"));
        }
        if self.retry && self.action.is_none() {
            return Err(String::from("retry requires an action"));
        }
        if self.probe.interval_secs == Some(0) || self.probe.timeout_secs == Some(0) {
            return Err(String::from("probe durations must be greater than zero"));
        }
        Ok(())
    }
}

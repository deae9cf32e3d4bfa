//! Shared fixtures and helper functions for config tests.

use std::sync::Arc;

use ortho_config::MergeComposer;
use ortho_config::serde_json::{self, json};
use rstest::fixture;

use crate::config::AppConfig;

/// Fixture providing an `AppConfig` parsed from a full TOML example.
#[fixture]
pub fn app_config_from_full_toml() -> AppConfig {
    let toml = r#"
        log_filter = "converge=debug"

        [convergence]
        timeout_secs = 600
        poll_interval_secs = 5
        resubscribe_delay_secs = 3
        scenario_timeout_secs = 7200

        [retry]
        max_attempts = 3
        delay_secs = 10

        [cleanup]
        enabled = false
        timeout_secs = 60

        [shell]
        program = "/bin/bash"
    "#;

    ortho_config::toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Fixture providing an `AppConfig` parsed from a minimal TOML example.
#[fixture]
pub fn app_config_from_partial_toml() -> AppConfig {
    let toml = r"
        [retry]
        max_attempts = 2
    ";

    ortho_config::toml::from_str(toml).expect("TOML parsing should succeed")
}

/// Helper: Creates a `MergeComposer` with defaults layer already pushed.
pub fn create_composer_with_defaults() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = MergeComposer::new();
    let defaults = serde_json::to_value(AppConfig::default())?;
    composer.push_defaults(defaults);
    Ok(composer)
}

/// Helper: Merges layers from a composer into `AppConfig`.
pub fn merge_config(composer: MergeComposer) -> Result<AppConfig, Arc<ortho_config::OrthoError>> {
    AppConfig::merge_from_layers(composer.layers())
}

/// Helper: Asserts that a config has all default values.
pub fn assert_config_has_defaults(config: &AppConfig) {
    assert!(config.log_filter.is_none(), "log_filter should be None");
    assert_eq!(
        config.convergence.timeout_secs, 300,
        "convergence.timeout_secs should be 300"
    );
    assert_eq!(
        config.convergence.poll_interval_secs, 2,
        "convergence.poll_interval_secs should be 2"
    );
    assert_eq!(
        config.convergence.resubscribe_delay_secs, 1,
        "convergence.resubscribe_delay_secs should be 1"
    );
    assert_eq!(
        config.convergence.scenario_timeout_secs, 3600,
        "convergence.scenario_timeout_secs should be 3600"
    );
    assert_eq!(config.retry.max_attempts, 5, "retry.max_attempts should be 5");
    assert_eq!(config.retry.delay_secs, 20, "retry.delay_secs should be 20");
    assert!(config.cleanup.enabled, "cleanup.enabled should be true");
    assert_eq!(
        config.cleanup.timeout_secs, 120,
        "cleanup.timeout_secs should be 120"
    );
    assert!(config.shell.program.is_none(), "shell.program should be None");
}

/// Helper: Creates a `MergeComposer` with defaults, file, and env layers for
/// testing layer precedence.
pub fn create_composer_with_file_and_env() -> Result<MergeComposer, serde_json::Error> {
    let mut composer = create_composer_with_defaults()?;

    composer.push_file(
        json!({
            "log_filter": "warn",
            "retry": { "max_attempts": 3, "delay_secs": 30 }
        }),
        None,
    );

    composer.push_environment(json!({
        "log_filter": "converge=debug"
    }));

    Ok(composer)
}

//! Configuration loading with layered precedence.
//!
//! This module provides functions to load configuration with the precedence order
//! (lowest to highest): application defaults, configuration file, environment
//! variables, command-line arguments.
//!
//! # Architecture Note: Why Manual Layer Composition?
//!
//! The `OrthoConfig` derive macro provides `load()` and `compose_layers()` methods
//! that handle discovery, environment variables, and CLI parsing automatically.
//! However, this loader uses `MergeComposer` manually because:
//!
//! 1. **Subcommand separation**: The CLI (`Cli` struct) handles subcommand dispatch
//!    via clap's `#[command(subcommand)]`, while `AppConfig` holds configuration
//!    values. `OrthoConfig`'s `load()` expects to own the entire CLI parsing.
//!
//! 2. **Environment variable validation**: `OrthoConfig`'s environment layer uses
//!    Figment, which silently ignores unparseable values. This loader returns
//!    errors for invalid typed values instead.
//!
//! 3. **Custom discovery integration**: The `Cli` struct already accepts `--config`
//!    via clap, so discovery must honour that path before falling back to XDG paths.
//!
//! # Environment Variable Handling
//!
//! Typed variables fail fast: `CONVERGE_RETRY_MAX_ATTEMPTS=many` or
//! `CONVERGE_CLEANUP_ENABLED=maybe` is an error, not a silent fallback to the
//! default. String variables such as `CONVERGE_SHELL_PROGRAM` are always
//! accepted.

use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use ortho_config::discovery::ConfigDiscovery;
use ortho_config::serde_json::{self, Map, Value};
use ortho_config::{MergeComposer, toml};
use tracing::debug;

use crate::config::{AppConfig, Cli};
use crate::error::{ConfigError, Result};

// ============================================================================
// Environment Variable Mapping Table
// ============================================================================

/// The type of value expected from an environment variable.
#[derive(Clone, Copy)]
enum EnvVarType {
    /// String value (always accepted).
    String,
    /// Boolean value (`true`/`false`). Invalid values return an error.
    Bool,
    /// Unsigned integer. Invalid values return an error.
    U64,
}

/// Mapping for a single environment variable.
struct EnvVarSpec {
    /// The environment variable name (e.g., `CONVERGE_RETRY_DELAY_SECS`).
    env_var: &'static str,
    /// The JSON path segments (e.g., `["retry", "delay_secs"]`).
    path: &'static [&'static str],
    /// The expected value type.
    var_type: EnvVarType,
}

/// Table of all environment variables and their JSON paths.
const ENV_VAR_SPECS: &[EnvVarSpec] = &[
    EnvVarSpec {
        env_var: "CONVERGE_LOG_FILTER",
        path: &["log_filter"],
        var_type: EnvVarType::String,
    },
    // Convergence fields
    EnvVarSpec {
        env_var: "CONVERGE_CONVERGENCE_TIMEOUT_SECS",
        path: &["convergence", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "CONVERGE_CONVERGENCE_POLL_INTERVAL_SECS",
        path: &["convergence", "poll_interval_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "CONVERGE_CONVERGENCE_RESUBSCRIBE_DELAY_SECS",
        path: &["convergence", "resubscribe_delay_secs"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "CONVERGE_CONVERGENCE_SCENARIO_TIMEOUT_SECS",
        path: &["convergence", "scenario_timeout_secs"],
        var_type: EnvVarType::U64,
    },
    // Retry fields
    EnvVarSpec {
        env_var: "CONVERGE_RETRY_MAX_ATTEMPTS",
        path: &["retry", "max_attempts"],
        var_type: EnvVarType::U64,
    },
    EnvVarSpec {
        env_var: "CONVERGE_RETRY_DELAY_SECS",
        path: &["retry", "delay_secs"],
        var_type: EnvVarType::U64,
    },
    // Cleanup fields
    EnvVarSpec {
        env_var: "CONVERGE_CLEANUP_ENABLED",
        path: &["cleanup", "enabled"],
        var_type: EnvVarType::Bool,
    },
    EnvVarSpec {
        env_var: "CONVERGE_CLEANUP_TIMEOUT_SECS",
        path: &["cleanup", "timeout_secs"],
        var_type: EnvVarType::U64,
    },
    // Shell fields
    EnvVarSpec {
        env_var: "CONVERGE_SHELL_PROGRAM",
        path: &["shell", "program"],
        var_type: EnvVarType::String,
    },
];

/// Returns the list of environment variable names recognised by the config loader.
///
/// Tests use this to clear every `CONVERGE_*` variable without keeping a
/// second, hard-coded list in sync with the loader.
#[must_use]
pub fn env_var_names() -> Vec<&'static str> {
    ENV_VAR_SPECS.iter().map(|spec| spec.env_var).collect()
}

/// Load a configuration file and push it to the composer.
///
/// Uses `cap_std::fs_utf8` for capability-oriented filesystem access: the
/// parent directory is opened first and the file is read relative to it.
fn load_config_file(path: &Utf8PathBuf, composer: &mut MergeComposer) -> Result<()> {
    let current_dir = Utf8PathBuf::from(".");
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| current_dir.as_ref());
    let file_name = path.file_name().unwrap_or(path.as_str());

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|e| {
        ConfigError::ParseError {
            message: format!("failed to open directory {parent}: {e}"),
        }
    })?;

    let content = dir
        .read_to_string(file_name)
        .map_err(|e| ConfigError::ParseError {
            message: format!("failed to read {path}: {e}"),
        })?;

    let value =
        toml::from_str::<serde_json::Value>(&content).map_err(|e| ConfigError::ParseError {
            message: format!("failed to parse {path}: {e}"),
        })?;

    debug!(%path, "loaded configuration file");
    composer.push_file(value, Some(path.clone()));
    Ok(())
}

/// Load configuration with full layer precedence.
///
/// This function loads configuration from all available sources:
/// 1. Application defaults defined in the struct
/// 2. Configuration file (discovered via XDG paths or `CONVERGE_CONFIG_PATH`)
/// 3. Environment variables prefixed with `CONVERGE_`
/// 4. Command-line arguments (from the provided `Cli`)
///
/// Later sources override earlier ones. The merged configuration is
/// validated before it is returned.
///
/// # Errors
///
/// Returns `ConfigError` if configuration loading fails due to:
/// - An explicit `--config` path that does not exist
/// - Malformed configuration files
/// - Invalid typed environment variable values (e.g., non-numeric
///   `CONVERGE_RETRY_MAX_ATTEMPTS`)
/// - Values rejected by [`AppConfig::validate`]
pub fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut composer = MergeComposer::new();

    // Layer 1: Defaults (serialised from AppConfig::default()).
    let defaults =
        serde_json::to_value(AppConfig::default()).map_err(|e| ConfigError::ParseError {
            message: format!("failed to serialise defaults: {e}"),
        })?;
    composer.push_defaults(defaults);

    // Layer 2: Configuration file.
    if let Some(ref path) = resolve_config_path(cli)? {
        load_config_file(path, &mut composer)?;
    }

    // Layer 3: Environment variables.
    let env_values = collect_env_vars()?;
    if !env_values.is_null() {
        composer.push_environment(env_values);
    }

    // Layer 4: CLI overrides.
    let cli_overrides = build_cli_overrides(cli);
    if !cli_overrides.is_null() {
        composer.push_cli(cli_overrides);
    }

    let config =
        AppConfig::merge_from_layers(composer.layers()).map_err(ConfigError::OrthoConfig)?;
    config.validate()?;
    Ok(config)
}

/// Use the CLI-provided path, or discover one via `CONVERGE_CONFIG_PATH`,
/// dotfiles and XDG paths.
fn resolve_config_path(cli: &Cli) -> Result<Option<Utf8PathBuf>> {
    if let Some(path) = cli.config.clone() {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::FileNotFound {
            path: path.into_std_path_buf(),
        }
        .into());
    }

    let discovery = ConfigDiscovery::builder("converge")
        .env_var("CONVERGE_CONFIG_PATH")
        .config_file_name("config.toml")
        .dotfile_name(".converge.toml")
        .build();
    Ok(discovery
        .candidates()
        .into_iter()
        .filter(|p| p.exists())
        .find_map(|p| Utf8PathBuf::try_from(p).ok()))
}

/// Collect environment variables with the `CONVERGE_` prefix into a JSON value.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` if a typed environment variable (bool, u64)
/// has an unparseable value.
fn collect_env_vars() -> Result<Value> {
    let mut root = Map::new();

    for spec in ENV_VAR_SPECS {
        let Ok(raw_value) = std::env::var(spec.env_var) else {
            continue;
        };

        let json_value = match spec.var_type {
            EnvVarType::String => Value::String(raw_value),
            EnvVarType::Bool => match raw_value.parse::<bool>() {
                Ok(b) => Value::Bool(b),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected bool (true/false), got '{raw_value}'"),
                    }
                    .into());
                }
            },
            EnvVarType::U64 => match raw_value.parse::<u64>() {
                Ok(n) => Value::Number(n.into()),
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        field: spec.env_var.to_owned(),
                        reason: format!("expected unsigned integer, got '{raw_value}'"),
                    }
                    .into());
                }
            },
        };

        insert_at_path(&mut root, spec.path, json_value);
    }

    if root.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(Value::Object(root))
    }
}

/// Insert a value at a nested path in a JSON map.
///
/// For a path like `["retry", "delay_secs"]`, this creates the intermediate
/// `retry` object if needed and inserts `delay_secs` within it.
fn insert_at_path(root: &mut Map<String, Value>, path: &[&str], value: Value) {
    let Some((&field, parents)) = path.split_last() else {
        return;
    };

    let mut current = root;
    for &segment in parents {
        let entry = current
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(obj) = entry.as_object_mut() else {
            return;
        };
        current = obj;
    }

    current.insert(field.to_owned(), value);
}

/// Build a JSON value containing CLI overrides.
fn build_cli_overrides(cli: &Cli) -> serde_json::Value {
    let mut overrides = serde_json::Map::new();

    if let Some(ref filter) = cli.log_filter {
        overrides.insert(
            "log_filter".to_owned(),
            serde_json::Value::String(filter.clone()),
        );
    }

    if overrides.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::Value::Object(overrides)
    }
}

//! Convergence engine for end-to-end tests against eventually consistent
//! systems.
//!
//! `converge` asserts that a remote system (a Kubernetes cluster, an object
//! store, a Helm release) reaches a target state within a deadline. Tests
//! describe *what* must become true; the engine decides how to observe it,
//! when to give up, and what to tear down afterwards.
//!
//! # Architecture
//!
//! Every wait ends in exactly one typed outcome: satisfied, failed, or timed
//! out. Read-only observation (probes, watches) is kept separate from
//! remote-mutating actions, which alone may be retried. A scenario runs its
//! steps in order under a global deadline, aborts on the first step that does
//! not converge, and always runs registered cleanups in reverse order.
//!
//! # Modules
//!
//! - [`api`]: Orchestration functions behind the CLI subcommands
//! - [`command`]: Shell command boundary (runner, shell resolution, probes, actions)
//! - [`config`]: Configuration system with layered precedence (CLI > env > file > defaults)
//! - [`engine`]: Poll loop, event watcher, retry executor, cleanup registry
//! - [`error`]: Semantic error types for the application
//! - [`scenario`]: Scenario context, steps, and the orchestration pipeline

pub mod api;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod scenario;

//! Claw Core: domain logic for Workflow Claw.
//!
//! Workflows are directed graphs of steps. Each step hands a prompt to an
//! agent CLI (Codex, Claude Code, Gemini, ...) running in a pseudo-terminal
//! inside a registered project folder, then routes on the JSON result the
//! agent prints. This crate holds:
//!
//! - the SQLite stores for folders, providers, workflows, runs and settings
//! - the secret vault protecting provider credentials
//! - the agent CLI adapter and its invocation templates
//! - project context: rules, skills, `MEMORY.md` and the per-goal PRD
//! - the execution engine
//!
//! It has no terminal UI dependency; `claw-cli` is the command-line front
//! end.

pub mod agent_cli;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod resource_lock;
pub mod rules;
pub mod skills;
pub mod state;
pub mod store;
pub mod template;
pub mod vault;
pub mod workflow;

// Convenience re-exports
pub use config::ClawConfig;
pub use db::Database;
pub use error::ClawError;
pub use state::{AppState, AppStateInner};

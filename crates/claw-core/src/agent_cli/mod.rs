//! Agent CLI invocation.
//!
//! A provider is an external agent CLI (codex, claude, opencode, ...). This
//! module turns a provider configuration plus a rendered prompt into a
//! process spawned under a pseudo-terminal and normalizes whatever happens
//! into a [`CliRunResult`]. Resolution and spawn failures never surface as
//! errors: they come back as a result whose stdout is the structured fail
//! body, so the engine routes them like any agent-reported failure.

pub mod command;
mod fake;
mod runner;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

pub use runner::CliRunner;

/// Exit code reported for invocations that never produced a process.
pub const EXIT_NOT_RUN: i32 = 127;

/// One agent CLI invocation.
#[derive(Debug, Clone, Default)]
pub struct CliRequest {
    pub cli_command: String,
    pub template: String,
    /// Decrypted provider variables, applied last.
    pub env: HashMap<String, String>,
    pub prompt: String,
    pub model: Option<String>,
    pub cwd: PathBuf,
    pub step_name: String,
    pub prd_path: String,
    pub memory_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CliRunResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CliRunResult {
    /// A result that never reached the agent: stdout carries the canonical
    /// fail body with `message` as its summary.
    pub fn failure(message: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: result_body("fail", &message.into()),
            stderr: stderr.into(),
            exit_code: Some(EXIT_NOT_RUN),
        }
    }

    pub(crate) fn completed(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// The structured step result as an agent would print it.
pub(crate) fn result_body(status: &str, summary: &str) -> String {
    serde_json::json!({
        "status": status,
        "summary": summary,
        "files_modified": [],
        "checks": [],
        "next_actions": [],
    })
    .to_string()
}

/// Runs agent CLI invocations.
///
/// Output chunks are pushed to `chunks` as they arrive; the returned result
/// carries the full accumulated output once the process has exited.
#[async_trait]
pub trait AgentCli: Send + Sync {
    async fn run(
        &self,
        request: CliRequest,
        chunks: Option<mpsc::Sender<String>>,
    ) -> CliRunResult;
}

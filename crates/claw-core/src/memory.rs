//! Project memory: the `MEMORY.md` (or `CLAUDE.md`) context document.
//!
//! When a project has neither file, the first step to run asks its provider
//! to summarize the codebase and stores the answer as `MEMORY.md`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::agent_cli::{AgentCli, CliRequest};
use crate::error::ClawError;
use crate::models::Provider;
use crate::resource_lock::PathLocks;

const MEMORY_FILE: &str = "MEMORY.md";
const CLAUDE_FILE: &str = "CLAUDE.md";
const MAX_FILE_BYTES: u64 = 200_000;
const MAX_TOTAL_BYTES: usize = 2_000_000;

/// Step name the memory generation runs under.
pub const MEMORY_STEP_NAME: &str = "memory-generator";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Path relative to the project root.
    pub path: String,
    pub content: String,
}

/// The memory document in use: `MEMORY.md`, else `CLAUDE.md`, else the
/// `MEMORY.md` that would be generated.
pub fn memory_path(root: &Path) -> PathBuf {
    let memory = root.join(MEMORY_FILE);
    if memory.exists() {
        return memory;
    }
    let claude = root.join(CLAUDE_FILE);
    if claude.exists() {
        return claude;
    }
    memory
}

pub fn has_memory(root: &Path) -> bool {
    root.join(MEMORY_FILE).exists() || root.join(CLAUDE_FILE).exists()
}

/// Current memory text, empty when there is none.
pub fn load_memory_text(root: &Path) -> String {
    std::fs::read_to_string(memory_path(root)).unwrap_or_default()
}

/// Collect the project's text files, honouring `.gitignore`.
pub fn scan_project(root: &Path) -> Vec<ScannedFile> {
    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|entry| entry.file_name() != ".git")
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut files = Vec::new();
    let mut total = 0usize;

    for entry in walker.flatten() {
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if total >= MAX_TOTAL_BYTES {
            break;
        }

        let path = entry.path();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(u64::MAX);
        if size > MAX_FILE_BYTES {
            continue;
        }
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => continue,
        };
        if bytes.contains(&0) {
            continue;
        }

        total += bytes.len();
        files.push(ScannedFile {
            path: path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string(),
            content: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }

    files
}

pub fn build_memory_prompt(files: &[ScannedFile]) -> String {
    let body = files
        .iter()
        .map(|f| format!("# {}\n\n{}", f.path, f.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "You are analyzing a codebase to produce a concise MEMORY.md for future LLM agents.\n\nSummarize architecture, conventions, key paths, commands, and guidelines. Keep it concise.\n\n{}",
        body
    )
}

/// Generate `MEMORY.md` with `provider` unless a memory document exists.
///
/// Concurrent callers for the same project generate it once.
pub async fn ensure_memory(
    cli: &dyn AgentCli,
    locks: &PathLocks,
    provider: &Provider,
    provider_env: &HashMap<String, String>,
    root: &Path,
) -> Result<(), ClawError> {
    if has_memory(root) {
        return Ok(());
    }

    let target = root.join(MEMORY_FILE);
    locks
        .with_lock(&target, || generate_memory(cli, provider, provider_env, root, &target))
        .await
}

async fn generate_memory(
    cli: &dyn AgentCli,
    provider: &Provider,
    provider_env: &HashMap<String, String>,
    root: &Path,
    target: &Path,
) -> Result<(), ClawError> {
    // Another branch may have written it while we waited for the lock.
    if has_memory(root) {
        return Ok(());
    }

    let scan_root = root.to_path_buf();
    let files = tokio::task::spawn_blocking(move || scan_project(&scan_root))
        .await
        .map_err(|e| ClawError::Internal(format!("Project scan failed: {}", e)))?;
    tracing::info!(
        "[Memory] Generating {} from {} files",
        target.display(),
        files.len()
    );

    let request = CliRequest {
        cli_command: provider.cli_command.clone(),
        template: provider.template.clone(),
        env: provider_env.clone(),
        prompt: build_memory_prompt(&files),
        model: provider.default_model.clone(),
        cwd: root.to_path_buf(),
        step_name: MEMORY_STEP_NAME.to_string(),
        prd_path: root.join("PRDs").to_string_lossy().to_string(),
        memory_path: target.to_string_lossy().to_string(),
    };
    let result = cli.run(request, None).await;
    tokio::fs::write(target, result.stdout).await?;
    Ok(())
}

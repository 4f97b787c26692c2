//! The PRD document a run accumulates its step reports in.

use std::path::{Path, PathBuf};

use heck::ToKebabCase;

use super::output::StepOutput;
use crate::error::ClawError;
use crate::resource_lock::PathLocks;

const SECTION_HEADER: &str = "## Agent Updates";
const MAX_SLUG_CHARS: usize = 60;

/// `<prd_dir>/<YYYY-MM-DD>_<goal-slug>.md`.
pub fn prd_path(prd_dir: &Path, goal: &str, date: chrono::NaiveDate) -> PathBuf {
    prd_dir.join(format!("{}_{}.md", date.format("%Y-%m-%d"), goal_slug(goal)))
}

/// Lowercase ASCII kebab-case slug of the goal, at most 60 characters.
pub fn goal_slug(goal: &str) -> String {
    let ascii: String = goal
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    let slug: String = ascii.to_kebab_case().chars().take(MAX_SLUG_CHARS).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "workflow".to_string()
    } else {
        slug
    }
}

/// Create the PRD with its goal header unless it already exists. Runs
/// under the same path lock as the appends.
pub async fn ensure_prd(locks: &PathLocks, path: &Path, goal: &str) -> Result<(), ClawError> {
    locks.with_lock(path, || create_prd(path, goal)).await
}

async fn create_prd(path: &Path, goal: &str) -> Result<(), ClawError> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, format!("# PRD\n\nGoal: {}\n", goal)).await?;
    tracing::info!("[PRD] Created {}", path.display());
    Ok(())
}

pub fn format_entry(step_name: &str, output: &StepOutput) -> String {
    format!(
        "\n### {}\n- Status: {}\n- Summary: {}\n- Files: {}\n- Checks: {}\n- Next: {}\n",
        step_name,
        output.status.as_str(),
        output.summary,
        join_or_none(&output.files_modified),
        join_or_none(&output.checks),
        join_or_none(&output.next_actions),
    )
}

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Append a step report under `## Agent Updates`, serialized per path.
pub async fn append_agent_update(
    locks: &PathLocks,
    path: &Path,
    step_name: &str,
    output: &StepOutput,
) -> Result<(), ClawError> {
    let entry = format_entry(step_name, output);
    locks
        .with_lock(path, || append_entry(path, entry))
        .await
}

async fn append_entry(path: &Path, entry: String) -> Result<(), ClawError> {
    let mut prd = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if !prd.contains(SECTION_HEADER) {
        prd = format!("{}\n\n{}\n", prd.trim(), SECTION_HEADER);
    }
    tokio::fs::write(path, format!("{}\n{}", prd.trim(), entry)).await?;
    Ok(())
}

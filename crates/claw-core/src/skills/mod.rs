//! Skill runner.
//!
//! A skill is an executable file under a project's `skills/` directory. It
//! is run once per invocation with no arguments: the request goes in as one
//! JSON document on stdin and the response comes back as JSON on stdout.
//!
//! ```text
//! skills/
//!   lint-report      # chmod +x, reads {"goal", "step", "prd", "memory"}
//!   changed-files
//! ```
//!
//! Every failure (missing file, spawn error, non-zero exit, bad JSON) is
//! folded into a `fail` [`SkillExecution`]; callers never see an error.

use std::path::Path;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillStatus {
    Success,
    Fail,
}

/// Outcome of one skill invocation, as embedded in the step prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillExecution {
    pub name: String,
    pub status: SkillStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SkillExecution {
    fn success(name: &str, output: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            status: SkillStatus::Success,
            output: Some(output),
            error: None,
        }
    }

    fn fail(name: &str, error: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: SkillStatus::Fail,
            output: None,
            error: Some(error.into()),
        }
    }
}

/// Run the skill `name` from `skills_dir` with `input` on stdin.
///
/// With `fake` set an existing skill is reported as a success with an empty
/// object and nothing is spawned.
pub async fn run_skill(
    skills_dir: &Path,
    name: &str,
    input: &serde_json::Value,
    fake: bool,
) -> SkillExecution {
    let skill_path = skills_dir.join(name);
    if !skill_path.exists() {
        tracing::warn!("[SkillRunner] Skill not found: {}", name);
        return SkillExecution::fail(name, format!("Skill not found: {}", name));
    }

    if fake {
        return SkillExecution::success(name, serde_json::json!({}));
    }

    let mut child = match Command::new(&skill_path)
        .current_dir(skills_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::error!("[SkillRunner] Failed to spawn skill '{}': {}", name, e);
            return SkillExecution::fail(name, format!("Failed to start skill '{}': {}", name, e));
        }
    };

    // Stdin is fed while stdout and stderr are drained, so a skill that
    // answers as it reads never fills a pipe.
    let stdin = child.stdin.take();
    let payload = input.to_string();
    let feed = async move {
        let Some(mut stdin) = stdin else {
            return;
        };
        // A skill that ignores its input may exit before reading it.
        if let Err(e) = stdin.write_all(payload.as_bytes()).await {
            tracing::debug!("[SkillRunner] Skill '{}' closed stdin early: {}", name, e);
        }
    };
    let ((), output) = tokio::join!(feed, child.wait_with_output());

    let output = match output {
        Ok(output) => output,
        Err(e) => return SkillExecution::fail(name, format!("Skill '{}' failed: {}", name, e)),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        tracing::warn!(
            "[SkillRunner] Skill '{}' exited with {:?}",
            name,
            output.status.code()
        );
        if stderr.is_empty() {
            return SkillExecution::fail(name, "Skill failed");
        }
        return SkillExecution::fail(name, stderr);
    }

    match serde_json::from_slice::<serde_json::Value>(&output.stdout) {
        Ok(value) => SkillExecution::success(name, value),
        Err(_) => SkillExecution::fail(name, "Invalid JSON from skill"),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_skill(dir: &Path, name: &str, script: &str) {
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_missing_skill_is_not_spawned() {
        let dir = tempfile::tempdir().unwrap();
        let result = run_skill(dir.path(), "ghost", &serde_json::json!({}), false).await;
        assert_eq!(result.status, SkillStatus::Fail);
        assert_eq!(result.error.as_deref(), Some("Skill not found: ghost"));
    }

    #[tokio::test]
    async fn test_skill_echoes_input_as_json() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "echo-input", "#!/bin/sh\ncat\n");

        let input = serde_json::json!({"goal": "ship", "prd": "# PRD"});
        let result = run_skill(dir.path(), "echo-input", &input, false).await;
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.output, Some(input));
    }

    #[tokio::test]
    async fn test_non_zero_exit_uses_stderr() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "broken", "#!/bin/sh\necho 'lint exploded' >&2\nexit 3\n");
        write_skill(dir.path(), "silent", "#!/bin/sh\nexit 1\n");

        let broken = run_skill(dir.path(), "broken", &serde_json::json!({}), false).await;
        assert_eq!(broken.status, SkillStatus::Fail);
        assert_eq!(broken.error.as_deref(), Some("lint exploded\n"));

        let silent = run_skill(dir.path(), "silent", &serde_json::json!({}), false).await;
        assert_eq!(silent.error.as_deref(), Some("Skill failed"));
    }

    #[tokio::test]
    async fn test_invalid_json_output() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "chatty", "#!/bin/sh\necho 'not json'\n");

        let result = run_skill(dir.path(), "chatty", &serde_json::json!({}), false).await;
        assert_eq!(result.status, SkillStatus::Fail);
        assert_eq!(result.error.as_deref(), Some("Invalid JSON from skill"));
    }

    #[tokio::test]
    async fn test_large_input_with_streaming_skill() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "echo-input", "#!/bin/sh\ncat\n");

        let input = serde_json::json!({"prd": "x".repeat(300_000)});
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            run_skill(dir.path(), "echo-input", &input, false),
        )
        .await
        .expect("skill stalled on a large input");
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.output, Some(input));
    }

    #[tokio::test]
    async fn test_fake_mode_skips_process() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "never-run", "#!/bin/sh\nexit 9\n");

        let result = run_skill(dir.path(), "never-run", &serde_json::json!({}), true).await;
        assert_eq!(result.status, SkillStatus::Success);
        assert_eq!(result.output, Some(serde_json::json!({})));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(SkillExecution::fail("x", "boom")).unwrap();
        assert_eq!(value, serde_json::json!({"name": "x", "status": "fail", "error": "boom"}));
    }
}

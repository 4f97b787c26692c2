use serde::{Deserialize, Serialize};

use super::now_timestamp;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    NeedsInput,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::NeedsInput => "needs_input",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "success" => Self::Success,
            "failed" => Self::Failed,
            "needs_input" => Self::NeedsInput,
            _ => Self::Running,
        }
    }
}

/// One execution of a workflow against a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub goal: String,
    pub status: RunStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
}

impl Run {
    pub fn new(workflow_id: String, goal: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            goal,
            status: RunStatus::Running,
            started_at: now_timestamp(),
            ended_at: None,
        }
    }
}

/// One physical invocation of a step within a run.
///
/// `status` is `running` until the agent finishes, then the status the
/// agent reported (`success`, `fail` or `needs_input`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRun {
    pub id: String,
    pub run_id: String,
    pub step_id: String,
    pub status: String,
    pub iteration: u32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
}

impl StepRun {
    pub fn new(run_id: String, step_id: String, iteration: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            run_id,
            step_id,
            status: "running".to_string(),
            iteration,
            stdout: None,
            stderr: None,
            summary: None,
            created_at: now_timestamp(),
        }
    }
}

use serde::{Deserialize, Serialize};

use super::now_timestamp;

/// How a step fans out to several `next`/`support` targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Targets run one after another, in edge order.
    #[default]
    Sequential,
    /// Targets run concurrently and are all awaited.
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "parallel" => Self::Parallel,
            _ => Self::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub folder_id: String,
    pub execution_mode: ExecutionMode,
    pub created_at: String,
    pub updated_at: String,
}

impl Workflow {
    pub fn new(
        name: String,
        description: Option<String>,
        folder_id: String,
        execution_mode: ExecutionMode,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            description,
            folder_id,
            execution_mode,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// A node of the workflow graph, bound to a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    pub workflow_id: String,
    pub name: String,
    pub description: String,
    pub provider_id: String,
    /// Overrides the provider's default model.
    pub model: Option<String>,
    pub max_iterations: u32,
    /// Skill executables run, in order, before the agent is invoked.
    #[serde(default)]
    pub skills: Vec<String>,
    pub success_criteria: Option<String>,
    pub failure_criteria: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Step {
    pub fn new(
        workflow_id: String,
        name: String,
        description: String,
        provider_id: String,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            name,
            description,
            provider_id,
            model: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            skills: Vec::new(),
            success_criteria: None,
            failure_criteria: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    /// Ordinary successor.
    Next,
    /// Sub-task executed and awaited before `next` successors.
    Support,
    /// Run the target, then re-run the source with the next iteration.
    Callback,
    /// Taken only when the source reports `fail`.
    Failure,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Support => "support",
            Self::Callback => "callback",
            Self::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "next" => Some(Self::Next),
            "support" => Some(Self::Support),
            "callback" => Some(Self::Callback),
            "failure" => Some(Self::Failure),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub workflow_id: String,
    pub from_step_id: String,
    pub to_step_id: String,
    #[serde(rename = "type")]
    pub edge_type: EdgeType,
    pub created_at: String,
}

impl Edge {
    pub fn new(
        workflow_id: String,
        from_step_id: String,
        to_step_id: String,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            from_step_id,
            to_step_id,
            edge_type,
            created_at: now_timestamp(),
        }
    }
}

//! YAML schema for importing workflow graphs.
//!
//! Steps are referenced by name, providers by name and the folder by path:
//!
//! ```yaml
//! name: "Feature Flow"
//! description: "Plan, build and review"
//! folder: /home/me/projects/app
//! mode: sequential        # sequential | parallel
//!
//! steps:
//!   - name: plan
//!     description: "Write the implementation plan into the PRD"
//!     provider: codex
//!   - name: build
//!     description: "Implement the plan"
//!     provider: claude
//!     model: sonnet
//!     max_iterations: 3
//!     skills: [changed-files]
//!     success_criteria: "cargo test passes"
//!   - name: review
//!     description: "Review the change"
//!     provider: codex
//!
//! edges:
//!   - { from: plan, to: build, type: next }
//!   - { from: build, to: review, type: callback }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ClawError;
use crate::models::{
    Edge, EdgeType, ExecutionMode, Folder, Step, Workflow, DEFAULT_MAX_ITERATIONS,
};
use crate::store::{FolderStore, ProviderStore, WorkflowStore};

/// Top-level workflow definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Project folder path; registered on import when unknown.
    pub folder: String,

    #[serde(default)]
    pub mode: ExecutionMode,

    pub steps: Vec<StepDefinition>,

    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Provider name.
    pub provider: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default)]
    pub skills: Vec<String>,

    #[serde(default)]
    pub success_criteria: Option<String>,

    #[serde(default)]
    pub failure_criteria: Option<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default = "default_edge_type")]
    pub edge_type: EdgeType,
}

fn default_edge_type() -> EdgeType {
    EdgeType::Next
}

impl WorkflowDefinition {
    /// Parse and validate a workflow definition from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let definition: Self = serde_yaml::from_str(yaml)
            .map_err(|e| format!("Failed to parse workflow YAML: {}", e))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Load a workflow definition from a file path.
    pub fn from_file(path: &str) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read workflow file '{}': {}", path, e))?;
        Self::from_yaml(&content)
    }

    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Workflow name is empty".to_string());
        }
        if self.steps.is_empty() {
            return Err(format!("Workflow '{}' has no steps", self.name));
        }

        let mut names = HashSet::new();
        for step in &self.steps {
            if !names.insert(step.name.as_str()) {
                return Err(format!("Duplicate step name '{}'", step.name));
            }
            if step.max_iterations == 0 {
                return Err(format!("Step '{}' must allow at least one iteration", step.name));
            }
        }

        for edge in &self.edges {
            for end in [&edge.from, &edge.to] {
                if !names.contains(end.as_str()) {
                    return Err(format!(
                        "Edge {} -> {} references unknown step '{}'",
                        edge.from, edge.to, end
                    ));
                }
            }
        }
        Ok(())
    }

    /// Store the definition as a new workflow and return it.
    ///
    /// Every provider must already exist; nothing is written otherwise.
    pub async fn import(
        &self,
        workflows: &WorkflowStore,
        folders: &FolderStore,
        providers: &ProviderStore,
    ) -> Result<Workflow, ClawError> {
        let mut provider_ids: HashMap<&str, String> = HashMap::new();
        for step in &self.steps {
            if provider_ids.contains_key(step.provider.as_str()) {
                continue;
            }
            let provider = providers.get_by_name(&step.provider).await?.ok_or_else(|| {
                ClawError::Configuration(format!(
                    "Provider '{}' used by step '{}' not found",
                    step.provider, step.name
                ))
            })?;
            provider_ids.insert(step.provider.as_str(), provider.id);
        }

        let folder = resolve_folder(folders, &self.folder).await?;
        let workflow = Workflow::new(
            self.name.clone(),
            self.description.clone(),
            folder.id.clone(),
            self.mode,
        );
        workflows.save(&workflow).await?;

        let mut step_ids: HashMap<&str, String> = HashMap::new();
        for def in &self.steps {
            let mut step = Step::new(
                workflow.id.clone(),
                def.name.clone(),
                def.description.clone(),
                provider_ids[def.provider.as_str()].clone(),
            );
            step.model = def.model.clone();
            step.max_iterations = def.max_iterations;
            step.skills = def.skills.clone();
            step.success_criteria = def.success_criteria.clone();
            step.failure_criteria = def.failure_criteria.clone();
            workflows.save_step(&step).await?;
            step_ids.insert(def.name.as_str(), step.id);
        }

        for def in &self.edges {
            let edge = Edge::new(
                workflow.id.clone(),
                step_ids[def.from.as_str()].clone(),
                step_ids[def.to.as_str()].clone(),
                def.edge_type,
            );
            workflows.save_edge(&edge).await?;
        }

        tracing::info!(
            "[Workflow] Imported '{}' ({} steps, {} edges)",
            workflow.name,
            self.steps.len(),
            self.edges.len()
        );
        Ok(workflow)
    }
}

async fn resolve_folder(folders: &FolderStore, path: &str) -> Result<Folder, ClawError> {
    let path = Path::new(path)
        .canonicalize()
        .map_err(|e| ClawError::NotFound(format!("Folder {}: {}", path, e)))?
        .to_string_lossy()
        .to_string();
    if let Some(folder) = folders.get_by_path(&path).await? {
        return Ok(folder);
    }
    let folder = Folder::new(path, None);
    folders.save(&folder).await?;
    Ok(folder)
}

//! `claw workflow`: import and inspect step graphs.

use claw_core::models::Workflow;
use claw_core::state::AppState;
use claw_core::workflow::WorkflowDefinition;

use super::print_json;

/// Import a YAML workflow definition.
pub async fn import(state: &AppState, file: &str) -> Result<Workflow, String> {
    let definition = WorkflowDefinition::from_file(file)?;
    let workflow = definition
        .import(&state.workflow_store, &state.folder_store, &state.provider_store)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "workflow": workflow,
        "steps": definition.steps.len(),
        "edges": definition.edges.len(),
    }));
    Ok(workflow)
}

pub async fn list(state: &AppState) -> Result<(), String> {
    let workflows = state.workflow_store.list().await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "workflows": workflows }));
    Ok(())
}

pub async fn show(state: &AppState, id: &str) -> Result<(), String> {
    let workflow = state
        .workflow_store
        .get(id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Workflow {} not found", id))?;
    let steps = state
        .workflow_store
        .list_steps(id)
        .await
        .map_err(|e| e.to_string())?;
    let edges = state
        .workflow_store
        .list_edges(id)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({
        "workflow": workflow,
        "steps": steps,
        "edges": edges,
    }));
    Ok(())
}

pub async fn delete(state: &AppState, id: &str) -> Result<(), String> {
    if state
        .workflow_store
        .get(id)
        .await
        .map_err(|e| e.to_string())?
        .is_none()
    {
        return Err(format!("Workflow {} not found", id));
    }
    state
        .workflow_store
        .delete(id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "workflow": id, "deleted": true }));
    Ok(())
}

//! `claw runs`: inspect workflow runs and their step runs.

use std::collections::HashMap;

use claw_core::models::Run;
use claw_core::state::AppState;

use super::print_json;

/// Print a run with its step runs; step names are resolved for reading.
pub async fn print_run(state: &AppState, run_id: &str) -> Result<Run, String> {
    let run = state
        .run_store
        .get(run_id)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Run {} not found", run_id))?;
    let step_runs = state
        .run_store
        .list_step_runs(run_id)
        .await
        .map_err(|e| e.to_string())?;
    let step_names: HashMap<String, String> = state
        .workflow_store
        .list_steps(&run.workflow_id)
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|s| (s.id, s.name))
        .collect();

    let step_runs: Vec<serde_json::Value> = step_runs
        .iter()
        .map(|s| {
            let mut value = serde_json::to_value(s).unwrap_or_default();
            value["stepName"] = serde_json::json!(step_names.get(&s.step_id));
            value
        })
        .collect();

    print_json(&serde_json::json!({ "run": run, "stepRuns": step_runs }));
    Ok(run)
}

pub async fn show(state: &AppState, run_id: &str) -> Result<(), String> {
    print_run(state, run_id).await.map(|_| ())
}

pub async fn list(state: &AppState, workflow_id: &str) -> Result<(), String> {
    let runs = state
        .run_store
        .list_by_workflow(workflow_id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "runs": runs }));
    Ok(())
}

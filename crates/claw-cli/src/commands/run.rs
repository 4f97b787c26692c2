//! `claw run`: execute a stored workflow against a goal.

use claw_core::models::Run;
use claw_core::state::AppState;

use super::unlock_vault;

pub async fn run(
    state: &AppState,
    workflow_id: &str,
    goal: &str,
    passphrase: Option<&str>,
) -> Result<Run, String> {
    if goal.trim().is_empty() {
        return Err("Goal must not be empty".to_string());
    }
    unlock_vault(state, passphrase).await?;

    let run_id = state
        .executor()
        .execute_workflow(workflow_id, goal)
        .await
        .map_err(|e| e.to_string())?;

    let run = super::runs::print_run(state, &run_id).await?;
    tracing::info!("Run {} finished with status {}", run.id, run.status.as_str());
    Ok(run)
}

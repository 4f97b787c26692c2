use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ClawError;
use crate::models::{now_timestamp, Run, RunStatus, StepRun};

const STEP_RUN_COLUMNS: &str =
    "id, run_id, step_id, status, iteration, stdout, stderr, summary, created_at";

/// Runs and their step runs.
#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn insert(&self, run: &Run) -> Result<(), ClawError> {
        let r = run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO runs (id, workflow_id, status, goal, started_at, ended_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        r.id,
                        r.workflow_id,
                        r.status.as_str(),
                        r.goal,
                        r.started_at,
                        r.ended_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Run>, ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT id, workflow_id, goal, status, started_at, ended_at FROM runs WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok(row_to_run(row)),
                )
                .optional()
            })
            .await
    }

    /// Runs of a workflow, newest first.
    pub async fn list_by_workflow(&self, workflow_id: &str) -> Result<Vec<Run>, ClawError> {
        let workflow_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, workflow_id, goal, status, started_at, ended_at FROM runs
                     WHERE workflow_id = ?1 ORDER BY started_at DESC, rowid DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], |row| Ok(row_to_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Move a running run to a terminal status and stamp its end time.
    ///
    /// Terminal statuses are final: the update only applies while the run is
    /// still `running`. Returns whether the row changed.
    pub async fn finish(&self, id: &str, status: RunStatus) -> Result<bool, ClawError> {
        let id = id.to_string();
        let now = now_timestamp();
        self.db
            .with_conn_async(move |conn| {
                let changed = conn.execute(
                    "UPDATE runs SET status = ?1, ended_at = ?2 WHERE id = ?3 AND status = 'running'",
                    rusqlite::params![status.as_str(), now, id],
                )?;
                Ok(changed > 0)
            })
            .await
    }

    pub async fn insert_step_run(&self, step_run: &StepRun) -> Result<(), ClawError> {
        let s = step_run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO step_runs (id, run_id, step_id, status, iteration, stdout, stderr, summary, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        s.id,
                        s.run_id,
                        s.step_id,
                        s.status,
                        s.iteration,
                        s.stdout,
                        s.stderr,
                        s.summary,
                        s.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Replace the captured stdout of an in-flight step run.
    pub async fn update_step_run_stdout(&self, id: &str, stdout: &str) -> Result<(), ClawError> {
        let id = id.to_string();
        let stdout = stdout.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE step_runs SET stdout = ?1 WHERE id = ?2",
                    rusqlite::params![stdout, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn finish_step_run(
        &self,
        id: &str,
        status: &str,
        stdout: &str,
        stderr: &str,
        summary: &str,
    ) -> Result<(), ClawError> {
        let id = id.to_string();
        let status = status.to_string();
        let stdout = stdout.to_string();
        let stderr = stderr.to_string();
        let summary = summary.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE step_runs SET status = ?1, stdout = ?2, stderr = ?3, summary = ?4 WHERE id = ?5",
                    rusqlite::params![status, stdout, stderr, summary, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get_step_run(&self, id: &str) -> Result<Option<StepRun>, ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM step_runs WHERE id = ?1", STEP_RUN_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_step_run(row)),
                )
                .optional()
            })
            .await
    }

    /// Step runs of a run, in creation order.
    pub async fn list_step_runs(&self, run_id: &str) -> Result<Vec<StepRun>, ClawError> {
        let run_id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM step_runs WHERE run_id = ?1 ORDER BY rowid",
                    STEP_RUN_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_step_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_run(row: &Row<'_>) -> Run {
    Run {
        id: row.get(0).unwrap_or_default(),
        workflow_id: row.get(1).unwrap_or_default(),
        goal: row.get(2).unwrap_or_default(),
        status: RunStatus::from_str(&row.get::<_, String>(3).unwrap_or_default()),
        started_at: row.get(4).unwrap_or_default(),
        ended_at: row.get(5).unwrap_or_default(),
    }
}

fn row_to_step_run(row: &Row<'_>) -> StepRun {
    let iteration: i64 = row.get(4).unwrap_or(1);
    StepRun {
        id: row.get(0).unwrap_or_default(),
        run_id: row.get(1).unwrap_or_default(),
        step_id: row.get(2).unwrap_or_default(),
        status: row.get(3).unwrap_or_default(),
        iteration: u32::try_from(iteration).unwrap_or(1),
        stdout: row.get(5).unwrap_or_default(),
        stderr: row.get(6).unwrap_or_default(),
        summary: row.get(7).unwrap_or_default(),
        created_at: row.get(8).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExecutionMode, Folder, Workflow};
    use crate::store::{FolderStore, WorkflowStore};

    async fn seeded_run(db: &Database) -> Run {
        let folder = Folder::new("/tmp/runs".to_string(), None);
        FolderStore::new(db.clone()).save(&folder).await.unwrap();
        let workflow = Workflow::new("W".to_string(), None, folder.id, ExecutionMode::Sequential);
        WorkflowStore::new(db.clone()).save(&workflow).await.unwrap();
        let run = Run::new(workflow.id, "goal".to_string());
        RunStore::new(db.clone()).insert(&run).await.unwrap();
        run
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let db = Database::open_in_memory().unwrap();
        let run = seeded_run(&db).await;
        let store = RunStore::new(db);

        assert!(store.finish(&run.id, RunStatus::NeedsInput).await.unwrap());
        assert!(!store.finish(&run.id, RunStatus::Success).await.unwrap());

        let loaded = store.get(&run.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::NeedsInput);
        assert!(loaded.ended_at.is_some());
    }

    #[tokio::test]
    async fn test_step_run_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let run = seeded_run(&db).await;
        let store = RunStore::new(db);

        let step_run = StepRun::new(run.id.clone(), "step-a".to_string(), 2);
        store.insert_step_run(&step_run).await.unwrap();
        store.update_step_run_stdout(&step_run.id, "partial").await.unwrap();
        assert_eq!(
            store.get_step_run(&step_run.id).await.unwrap().unwrap().stdout.as_deref(),
            Some("partial")
        );

        store
            .finish_step_run(&step_run.id, "success", "full", "", "done")
            .await
            .unwrap();
        let rows = store.list_step_runs(&run.id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "success");
        assert_eq!(rows[0].iteration, 2);
        assert_eq!(rows[0].summary.as_deref(), Some("done"));
    }
}

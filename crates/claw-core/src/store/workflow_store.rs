use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ClawError;
use crate::models::{Edge, EdgeType, ExecutionMode, Step, Workflow};

const WORKFLOW_COLUMNS: &str =
    "id, name, description, folder_id, execution_mode, created_at, updated_at";
const STEP_COLUMNS: &str = "id, workflow_id, name, description, provider_id, model, max_iterations, \
     skills_json, success_criteria, failure_criteria, created_at, updated_at";
const EDGE_COLUMNS: &str = "id, workflow_id, from_step_id, to_step_id, type, created_at";

/// Workflows together with their steps and edges.
///
/// Steps and edges keep the order they were saved in (`position`), which is
/// the declaration order the engine relies on for fan-out and callbacks.
#[derive(Clone)]
pub struct WorkflowStore {
    db: Database,
}

impl WorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, workflow: &Workflow) -> Result<(), ClawError> {
        let w = workflow.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, name, description, folder_id, execution_mode, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       description = excluded.description,
                       folder_id = excluded.folder_id,
                       execution_mode = excluded.execution_mode,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        w.id,
                        w.name,
                        w.description,
                        w.folder_id,
                        w.execution_mode.as_str(),
                        w.created_at,
                        w.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Workflow>, ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM workflows WHERE id = ?1", WORKFLOW_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_workflow(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Workflow>, ClawError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflows ORDER BY created_at",
                    WORKFLOW_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_workflow(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Insert or update a step. New steps are appended after the existing
    /// ones of the same workflow.
    pub async fn save_step(&self, step: &Step) -> Result<(), ClawError> {
        let s = step.clone();
        let skills_json = serde_json::to_string(&s.skills).unwrap_or_else(|_| "[]".to_string());
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO steps (id, workflow_id, name, description, provider_id, model, max_iterations,
                                        skills_json, success_criteria, failure_criteria, position, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             (SELECT COALESCE(MAX(position), -1) + 1 FROM steps WHERE workflow_id = ?2),
                             ?11, ?12)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       description = excluded.description,
                       provider_id = excluded.provider_id,
                       model = excluded.model,
                       max_iterations = excluded.max_iterations,
                       skills_json = excluded.skills_json,
                       success_criteria = excluded.success_criteria,
                       failure_criteria = excluded.failure_criteria,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        s.id,
                        s.workflow_id,
                        s.name,
                        s.description,
                        s.provider_id,
                        s.model,
                        s.max_iterations,
                        skills_json,
                        s.success_criteria,
                        s.failure_criteria,
                        s.created_at,
                        s.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_steps(&self, workflow_id: &str) -> Result<Vec<Step>, ClawError> {
        let workflow_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM steps WHERE workflow_id = ?1 ORDER BY position, rowid",
                    STEP_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], |row| Ok(row_to_step(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Insert an edge after the existing edges of the same workflow.
    pub async fn save_edge(&self, edge: &Edge) -> Result<(), ClawError> {
        let e = edge.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO edges (id, workflow_id, from_step_id, to_step_id, type, position, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5,
                             (SELECT COALESCE(MAX(position), -1) + 1 FROM edges WHERE workflow_id = ?2),
                             ?6)",
                    rusqlite::params![
                        e.id,
                        e.workflow_id,
                        e.from_step_id,
                        e.to_step_id,
                        e.edge_type.as_str(),
                        e.created_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn list_edges(&self, workflow_id: &str) -> Result<Vec<Edge>, ClawError> {
        let workflow_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM edges WHERE workflow_id = ?1 ORDER BY position, rowid",
                    EDGE_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], |row| Ok(row_to_edge(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.into_iter().flatten().collect())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM edges WHERE workflow_id = ?1", rusqlite::params![id])?;
                conn.execute("DELETE FROM steps WHERE workflow_id = ?1", rusqlite::params![id])?;
                conn.execute("DELETE FROM workflows WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

fn row_to_workflow(row: &Row<'_>) -> Workflow {
    Workflow {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        description: row.get(2).unwrap_or_default(),
        folder_id: row.get(3).unwrap_or_default(),
        execution_mode: ExecutionMode::from_str(&row.get::<_, String>(4).unwrap_or_default()),
        created_at: row.get(5).unwrap_or_default(),
        updated_at: row.get(6).unwrap_or_default(),
    }
}

fn row_to_step(row: &Row<'_>) -> Step {
    let skills_json: String = row.get(7).unwrap_or_default();
    let skills: Vec<String> = serde_json::from_str(&skills_json).unwrap_or_default();
    let max_iterations: i64 = row.get(6).unwrap_or(1);

    Step {
        id: row.get(0).unwrap_or_default(),
        workflow_id: row.get(1).unwrap_or_default(),
        name: row.get(2).unwrap_or_default(),
        description: row.get(3).unwrap_or_default(),
        provider_id: row.get(4).unwrap_or_default(),
        model: row.get(5).unwrap_or_default(),
        max_iterations: u32::try_from(max_iterations).unwrap_or(1),
        skills,
        success_criteria: row.get(8).unwrap_or_default(),
        failure_criteria: row.get(9).unwrap_or_default(),
        created_at: row.get(10).unwrap_or_default(),
        updated_at: row.get(11).unwrap_or_default(),
    }
}

fn row_to_edge(row: &Row<'_>) -> Option<Edge> {
    let id: String = row.get(0).unwrap_or_default();
    let type_str: String = row.get(4).unwrap_or_default();
    let Some(edge_type) = EdgeType::parse(&type_str) else {
        tracing::warn!("[WorkflowStore] Skipping edge {} with unknown type '{}'", id, type_str);
        return None;
    };

    Some(Edge {
        id,
        workflow_id: row.get(1).unwrap_or_default(),
        from_step_id: row.get(2).unwrap_or_default(),
        to_step_id: row.get(3).unwrap_or_default(),
        edge_type,
        created_at: row.get(5).unwrap_or_default(),
    })
}

//! Persistence for folders, providers, workflows and their runs.
//!
//! One SQLite connection sits behind a mutex and is shared by every store.
//! File databases run in WAL mode. Async callers hop onto the blocking pool
//! through [`Database::with_conn_async`].

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ClawError;

const FILE_PRAGMAS: &str = "PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;";
const MEMORY_PRAGMAS: &str = "PRAGMA foreign_keys=ON;";

/// Cloneable handle on the shared connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open the database file at `db_path`, creating it and its parent
    /// directory on first use.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, ClawError> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            ClawError::Database(format!("Cannot open {}: {}", path.display(), e))
        })?;
        let db = Self::prepare(conn, FILE_PRAGMAS)?;
        tracing::info!("[Database] Using {}", path.display());
        Ok(db)
    }

    /// A private database that disappears with the handle. Used by tests.
    pub fn open_in_memory() -> Result<Self, ClawError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ClawError::Database(format!("Cannot open in-memory database: {}", e)))?;
        Self::prepare(conn, MEMORY_PRAGMAS)
    }

    fn prepare(conn: Connection, pragmas: &str) -> Result<Self, ClawError> {
        conn.execute_batch(pragmas)
            .map_err(|e| ClawError::Database(format!("Pragma setup failed: {}", e)))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize_tables()?;
        Ok(db)
    }

    /// Run `f` on the connection from the current thread.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ClawError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let guard = self
            .conn
            .lock()
            .map_err(|_| ClawError::Database("Connection mutex poisoned".to_string()))?;
        f(&guard).map_err(ClawError::from)
    }

    /// Run `f` on the connection from the blocking pool.
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, ClawError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        match tokio::task::spawn_blocking(move || db.with_conn(f)).await {
            Ok(result) => result,
            Err(e) => Err(ClawError::Internal(format!("Database task failed: {}", e))),
        }
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), ClawError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS settings (
                    key             TEXT PRIMARY KEY,
                    value           TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS providers (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    cli_command     TEXT NOT NULL,
                    template        TEXT NOT NULL,
                    default_model   TEXT,
                    env_enc         TEXT,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS folders (
                    id              TEXT PRIMARY KEY,
                    path            TEXT NOT NULL UNIQUE,
                    label           TEXT,
                    created_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS workflows (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL,
                    description     TEXT,
                    folder_id       TEXT NOT NULL REFERENCES folders(id),
                    execution_mode  TEXT NOT NULL,
                    created_at      TEXT NOT NULL,
                    updated_at      TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS steps (
                    id                  TEXT PRIMARY KEY,
                    workflow_id         TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    name                TEXT NOT NULL,
                    description         TEXT NOT NULL,
                    provider_id         TEXT NOT NULL,
                    model               TEXT,
                    max_iterations      INTEGER NOT NULL,
                    skills_json         TEXT NOT NULL DEFAULT '[]',
                    success_criteria    TEXT,
                    failure_criteria    TEXT,
                    position            INTEGER NOT NULL DEFAULT 0,
                    created_at          TEXT NOT NULL,
                    updated_at          TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_steps_workflow ON steps(workflow_id);

                CREATE TABLE IF NOT EXISTS edges (
                    id              TEXT PRIMARY KEY,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id) ON DELETE CASCADE,
                    from_step_id    TEXT NOT NULL,
                    to_step_id      TEXT NOT NULL,
                    type            TEXT NOT NULL,
                    position        INTEGER NOT NULL DEFAULT 0,
                    created_at      TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_edges_workflow ON edges(workflow_id);

                CREATE TABLE IF NOT EXISTS runs (
                    id              TEXT PRIMARY KEY,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id),
                    status          TEXT NOT NULL,
                    goal            TEXT NOT NULL,
                    started_at      TEXT NOT NULL,
                    ended_at        TEXT
                );

                CREATE TABLE IF NOT EXISTS step_runs (
                    id              TEXT PRIMARY KEY,
                    run_id          TEXT NOT NULL REFERENCES runs(id),
                    step_id         TEXT NOT NULL,
                    status          TEXT NOT NULL,
                    iteration       INTEGER NOT NULL,
                    stdout          TEXT,
                    stderr          TEXT,
                    summary         TEXT,
                    created_at      TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_step_runs_run ON step_runs(run_id);
                ",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(db: &Database) -> Vec<String> {
        db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
            let names = stmt.query_map([], |row| row.get(0))?;
            names.collect()
        })
        .unwrap()
    }

    #[test]
    fn test_open_creates_parent_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());

        let tables = table_names(&db);
        let expected = [
            "edges", "folders", "providers", "runs", "settings", "step_runs", "steps", "workflows",
        ];
        for table in expected {
            assert!(tables.iter().any(|t| t == table), "missing table {}", table);
        }

        // Reopening keeps the schema idempotent.
        drop(db);
        assert_eq!(table_names(&Database::open(&path).unwrap()), tables);
    }

    #[tokio::test]
    async fn test_sql_errors_surface_as_database_errors() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .with_conn_async(|conn| conn.execute("INSERT INTO nowhere VALUES (1)", []))
            .await
            .unwrap_err();
        assert!(matches!(err, ClawError::Database(_)));
    }
}

use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ClawError;
use crate::models::Folder;

#[derive(Clone)]
pub struct FolderStore {
    db: Database,
}

impl FolderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, folder: &Folder) -> Result<(), ClawError> {
        let f = folder.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO folders (id, path, label, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                       path = excluded.path,
                       label = excluded.label",
                    rusqlite::params![f.id, f.path, f.label, f.created_at],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Folder>, ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT id, path, label, created_at FROM folders WHERE id = ?1",
                    rusqlite::params![id],
                    |row| Ok(row_to_folder(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn get_by_path(&self, path: &str) -> Result<Option<Folder>, ClawError> {
        let path = path.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT id, path, label, created_at FROM folders WHERE path = ?1",
                    rusqlite::params![path],
                    |row| Ok(row_to_folder(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Folder>, ClawError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, path, label, created_at FROM folders ORDER BY created_at",
                )?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_folder(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_folder(row: &Row<'_>) -> Folder {
    Folder {
        id: row.get(0).unwrap_or_default(),
        path: row.get(1).unwrap_or_default(),
        label: row.get(2).unwrap_or_default(),
        created_at: row.get(3).unwrap_or_default(),
    }
}

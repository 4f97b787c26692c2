use rusqlite::{OptionalExtension, Row};

use crate::db::Database;
use crate::error::ClawError;
use crate::models::{now_timestamp, Provider};

const PROVIDER_COLUMNS: &str =
    "id, name, cli_command, template, default_model, env_enc, created_at, updated_at";

#[derive(Clone)]
pub struct ProviderStore {
    db: Database,
}

impl ProviderStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn save(&self, provider: &Provider) -> Result<(), ClawError> {
        let p = provider.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO providers (id, name, cli_command, template, default_model, env_enc, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                       name = excluded.name,
                       cli_command = excluded.cli_command,
                       template = excluded.template,
                       default_model = excluded.default_model,
                       env_enc = excluded.env_enc,
                       updated_at = excluded.updated_at",
                    rusqlite::params![
                        p.id,
                        p.name,
                        p.cli_command,
                        p.template,
                        p.default_model,
                        p.env_enc,
                        p.created_at,
                        p.updated_at,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Provider>, ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM providers WHERE id = ?1", PROVIDER_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_provider(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Provider>, ClawError> {
        let name = name.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {} FROM providers WHERE name = ?1 ORDER BY created_at LIMIT 1",
                        PROVIDER_COLUMNS
                    ),
                    rusqlite::params![name],
                    |row| Ok(row_to_provider(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Provider>, ClawError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM providers ORDER BY created_at",
                    PROVIDER_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_provider(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn update_env(&self, id: &str, env_enc: Option<String>) -> Result<(), ClawError> {
        let id = id.to_string();
        let now = now_timestamp();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE providers SET env_enc = ?1, updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![env_enc, now, id],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), ClawError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute("DELETE FROM providers WHERE id = ?1", rusqlite::params![id])?;
                Ok(())
            })
            .await
    }
}

fn row_to_provider(row: &Row<'_>) -> Provider {
    Provider {
        id: row.get(0).unwrap_or_default(),
        name: row.get(1).unwrap_or_default(),
        cli_command: row.get(2).unwrap_or_default(),
        template: row.get(3).unwrap_or_default(),
        default_model: row.get(4).unwrap_or_default(),
        env_enc: row.get(5).unwrap_or_default(),
        created_at: row.get(6).unwrap_or_default(),
        updated_at: row.get(7).unwrap_or_default(),
    }
}

use rusqlite::OptionalExtension;

use crate::db::Database;
use crate::error::ClawError;

/// Key/value settings table. Holds the vault's unlock check record.
#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, ClawError> {
        let key = key.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    "SELECT value FROM settings WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
            })
            .await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), ClawError> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO settings (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![key, value],
                )?;
                Ok(())
            })
            .await
    }
}

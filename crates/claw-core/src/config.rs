//! Runtime configuration resolved from the environment.

use std::path::PathBuf;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "CLAW_DATA_DIR";
/// Environment variable enabling the canned (no-spawn) CLI and skill results.
pub const FAKE_CLI_ENV: &str = "CLAW_FAKE_CLI";

const DEFAULT_DIR_NAME: &str = ".workflow-claw";
const DB_FILE_NAME: &str = "data.db";

#[derive(Debug, Clone)]
pub struct ClawConfig {
    /// Directory holding the SQLite database.
    pub data_dir: PathBuf,
    /// Path of the SQLite database file.
    pub db_path: PathBuf,
    /// Substitute deterministic canned results for agent CLI and skill
    /// processes.
    pub fake_cli: bool,
}

impl ClawConfig {
    /// Resolve the configuration from `CLAW_DATA_DIR` / `CLAW_FAKE_CLI`,
    /// falling back to `~/.workflow-claw`.
    pub fn from_env() -> Self {
        let data_dir = std::env::var(DATA_DIR_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        let fake_cli = std::env::var(FAKE_CLI_ENV)
            .map(|v| flag_enabled(&v))
            .unwrap_or(false);
        Self::with_data_dir(data_dir, fake_cli)
    }

    pub fn with_data_dir(data_dir: PathBuf, fake_cli: bool) -> Self {
        let db_path = data_dir.join(DB_FILE_NAME);
        Self {
            data_dir,
            db_path,
            fake_cli,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR_NAME)
}

/// `1`, `true`, `yes` and `on` (any case) enable a flag.
pub fn flag_enabled(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

//! Core error type for Workflow Claw.
//!
//! `ClawError` is used throughout the core domain (stores, vault, engine).
//! Process, skill and protocol failures never show up here: they are folded
//! into fail-shaped step results at the adapter boundary.

#[derive(Debug, thiserror::Error)]
pub enum ClawError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A workflow references configuration that does not exist (e.g. a
    /// step's provider). Fatal to the run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Vault locked")]
    VaultLocked,

    #[error("Vault error: {0}")]
    Vault(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ClawError {
    fn from(e: std::io::Error) -> Self {
        ClawError::Io(e.to_string())
    }
}

impl From<rusqlite::Error> for ClawError {
    fn from(e: rusqlite::Error) -> Self {
        ClawError::Database(e.to_string())
    }
}

//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the claw-core domain logic through `AppState`.

pub mod folder;
pub mod provider;
pub mod run;
pub mod runs;
pub mod vault;
pub mod workflow;

use std::sync::Arc;

use claw_core::config::ClawConfig;
use claw_core::state::{AppState, AppStateInner};

/// Initialize a shared `AppState` from the resolved configuration.
pub fn init_state(config: &ClawConfig) -> AppState {
    let state = AppStateInner::open(config).unwrap_or_else(|e| {
        eprintln!(
            "Failed to open database '{}': {}",
            config.db_path.display(),
            e
        );
        std::process::exit(1);
    });
    Arc::new(state)
}

/// Unlock the vault when a passphrase was supplied.
pub async fn unlock_vault(state: &AppState, passphrase: Option<&str>) -> Result<(), String> {
    let Some(passphrase) = passphrase else {
        return Ok(());
    };
    let unlocked = state
        .vault
        .unlock(passphrase)
        .await
        .map_err(|e| e.to_string())?;
    if unlocked {
        Ok(())
    } else {
        Err("Invalid vault passphrase".to_string())
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

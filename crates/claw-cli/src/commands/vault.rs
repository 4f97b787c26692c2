//! `claw vault`: passphrase management.
//!
//! The unlocked key only lives for one process, so `unlock` mostly serves
//! to set the passphrase the first time and to check it afterwards.

use claw_core::state::AppState;

use super::{print_json, unlock_vault};

pub async fn unlock(state: &AppState, passphrase: Option<&str>) -> Result<(), String> {
    if passphrase.is_none() {
        return Err("Missing passphrase (--passphrase or CLAW_VAULT_PASSPHRASE)".to_string());
    }
    unlock_vault(state, passphrase).await?;
    print_json(&serde_json::json!({ "unlocked": state.vault.is_unlocked() }));
    Ok(())
}

pub async fn status(state: &AppState) -> Result<(), String> {
    let initialized = state
        .vault
        .is_initialized()
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({
        "initialized": initialized,
        "unlocked": state.vault.is_unlocked(),
    }));
    Ok(())
}

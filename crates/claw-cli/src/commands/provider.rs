//! `claw provider`: manage agent CLI providers and their credentials.

use std::collections::HashMap;

use claw_core::models::Provider;
use claw_core::state::AppState;

use super::{print_json, unlock_vault};

/// Parse `KEY=VALUE` pairs. Values may contain `=`.
pub fn parse_env_pairs(pairs: &[String]) -> Result<HashMap<String, String>, String> {
    let mut env = HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", pair))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Empty variable name in '{}'", pair));
        }
        env.insert(key.to_string(), value.to_string());
    }
    Ok(env)
}

async fn seal_env(
    state: &AppState,
    env_pairs: &[String],
    passphrase: Option<&str>,
) -> Result<Option<String>, String> {
    if env_pairs.is_empty() {
        return Ok(None);
    }
    let env = parse_env_pairs(env_pairs)?;
    unlock_vault(state, passphrase).await?;
    if !state.vault.is_unlocked() {
        return Err(
            "Provider environment needs the vault passphrase (--passphrase or CLAW_VAULT_PASSPHRASE)"
                .to_string(),
        );
    }
    state.vault.encrypt_env(&env).map(Some).map_err(|e| e.to_string())
}

fn provider_json(provider: &Provider) -> serde_json::Value {
    let mut value = serde_json::to_value(provider).unwrap_or_default();
    value["hasEnv"] = serde_json::Value::Bool(provider.has_env());
    value
}

pub async fn add(
    state: &AppState,
    name: &str,
    cli: &str,
    template: &str,
    model: Option<&str>,
    env_pairs: &[String],
    passphrase: Option<&str>,
) -> Result<Provider, String> {
    if state
        .provider_store
        .get_by_name(name)
        .await
        .map_err(|e| e.to_string())?
        .is_some()
    {
        return Err(format!("Provider '{}' already exists", name));
    }

    let env_enc = seal_env(state, env_pairs, passphrase).await?;
    let provider = Provider::new(
        name.to_string(),
        cli.to_string(),
        template.to_string(),
        model.map(String::from),
        env_enc,
    );
    state
        .provider_store
        .save(&provider)
        .await
        .map_err(|e| e.to_string())?;

    print_json(&serde_json::json!({ "provider": provider_json(&provider) }));
    Ok(provider)
}

/// Replace a provider's environment; no pairs clears it.
pub async fn set_env(
    state: &AppState,
    name: &str,
    env_pairs: &[String],
    passphrase: Option<&str>,
) -> Result<(), String> {
    let provider = find(state, name).await?;
    let env_enc = seal_env(state, env_pairs, passphrase).await?;
    state
        .provider_store
        .update_env(&provider.id, env_enc)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "provider": provider.name, "updated": true }));
    Ok(())
}

pub async fn remove(state: &AppState, name: &str) -> Result<(), String> {
    let provider = find(state, name).await?;
    state
        .provider_store
        .delete(&provider.id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "provider": provider.name, "removed": true }));
    Ok(())
}

pub async fn list(state: &AppState) -> Result<(), String> {
    let providers = state.provider_store.list().await.map_err(|e| e.to_string())?;
    let providers: Vec<serde_json::Value> = providers.iter().map(provider_json).collect();
    print_json(&serde_json::json!({ "providers": providers }));
    Ok(())
}

async fn find(state: &AppState, name: &str) -> Result<Provider, String> {
    state
        .provider_store
        .get_by_name(name)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("Provider '{}' not found", name))
}

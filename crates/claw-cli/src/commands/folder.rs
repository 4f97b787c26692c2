//! `claw folder`: register project folders.

use claw_core::models::Folder;
use claw_core::state::AppState;

use super::print_json;

/// Register `path` (canonicalized). Registering a known path returns the
/// existing folder.
pub async fn add(state: &AppState, path: &str, label: Option<&str>) -> Result<Folder, String> {
    let canonical = std::fs::canonicalize(path)
        .map_err(|e| format!("Cannot register folder '{}': {}", path, e))?;
    if !canonical.is_dir() {
        return Err(format!("Not a directory: {}", canonical.display()));
    }
    let canonical = canonical.to_string_lossy().to_string();

    let folder = match state
        .folder_store
        .get_by_path(&canonical)
        .await
        .map_err(|e| e.to_string())?
    {
        Some(existing) => existing,
        None => {
            let folder = Folder::new(canonical, label.map(String::from));
            state
                .folder_store
                .save(&folder)
                .await
                .map_err(|e| e.to_string())?;
            folder
        }
    };

    print_json(&serde_json::json!({ "folder": folder }));
    Ok(folder)
}

pub async fn list(state: &AppState) -> Result<(), String> {
    let folders = state.folder_store.list().await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "folders": folders }));
    Ok(())
}

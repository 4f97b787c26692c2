use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::now_timestamp;

/// A registered project folder. Workflows run with this folder as their
/// working directory and keep their rules, skills, PRDs and memory in it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    pub path: String,
    pub label: Option<String>,
    pub created_at: String,
}

impl Folder {
    pub fn new(path: String, label: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            path,
            label,
            created_at: now_timestamp(),
        }
    }

    pub fn root(&self) -> &Path {
        Path::new(&self.path)
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.root().join("rules")
    }

    pub fn skills_dir(&self) -> PathBuf {
        self.root().join("skills")
    }

    pub fn prd_dir(&self) -> PathBuf {
        self.root().join("PRDs")
    }
}

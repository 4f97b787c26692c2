use serde::{Deserialize, Serialize};

use super::now_timestamp;

/// An agent CLI integration: how to invoke it and which credentials to
/// hand it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    pub id: String,
    pub name: String,
    /// Executable plus base arguments, e.g. `npx codex`.
    pub cli_command: String,
    /// Invocation template rendered with the prompt fields, e.g.
    /// `--model {{model}} -p {{prompt}}`.
    pub template: String,
    pub default_model: Option<String>,
    /// Vault envelope holding a JSON object of environment variables.
    #[serde(skip_serializing, default)]
    pub env_enc: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Provider {
    pub fn new(
        name: String,
        cli_command: String,
        template: String,
        default_model: Option<String>,
        env_enc: Option<String>,
    ) -> Self {
        let now = now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            cli_command,
            template,
            default_model,
            env_enc,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn has_env(&self) -> bool {
        self.env_enc.is_some()
    }
}

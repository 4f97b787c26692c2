//! Template renderer for provider invocation templates.
//!
//! Templates use `{{field}}` placeholders over a fixed field set
//! (`prompt`, `model`, `cwd`, `stepName`, `prdPath`, `memoryPath`).
//! Output is never escaped and unknown placeholders render empty.
//! Compiled templates are cached by their source text.

use std::sync::RwLock;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};
use serde::Serialize;

/// The placeholder values available to an invocation template.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateFields {
    pub prompt: String,
    pub model: String,
    pub cwd: String,
    pub step_name: String,
    pub prd_path: String,
    pub memory_path: String,
}

pub struct TemplateRenderer {
    env: RwLock<Environment<'static>>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_keep_trailing_newline(true);
        Self {
            env: RwLock::new(env),
        }
    }

    /// Render `template` against `fields`.
    ///
    /// A template that does not compile is returned verbatim; the agent CLI
    /// then sees the raw text and fails in a visible way.
    pub fn render(&self, template: &str, fields: &TemplateFields) -> String {
        if let Some(rendered) = self.render_cached(template, fields) {
            return rendered;
        }

        match self.env.write() {
            Ok(mut env) => {
                if env.get_template(template).is_err() {
                    let owned = template.to_string();
                    if let Err(e) = env.add_template_owned(owned.clone(), owned) {
                        tracing::warn!("[Template] Failed to compile template: {}", e);
                        return template.to_string();
                    }
                }
            }
            Err(_) => return template.to_string(),
        }

        self.render_cached(template, fields)
            .unwrap_or_else(|| template.to_string())
    }

    fn render_cached(&self, template: &str, fields: &TemplateFields) -> Option<String> {
        let env = self.env.read().ok()?;
        let compiled = env.get_template(template).ok()?;
        match compiled.render(fields) {
            Ok(rendered) => Some(rendered),
            Err(e) => {
                tracing::warn!("[Template] Failed to render template: {}", e);
                Some(template.to_string())
            }
        }
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

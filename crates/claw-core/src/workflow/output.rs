//! The structured result an agent prints at the end of a step.
//!
//! ```json
//! { "status": "success", "summary": "...", "files_modified": [],
//!   "checks": [], "next_actions": [] }
//! ```
//!
//! Agents run under a terminal, so the object usually arrives surrounded by
//! escape codes, progress output and the echoed prompt.

use serde::{Deserialize, Serialize};

pub const PARSE_FAILURE_SUMMARY: &str = "Failed to parse JSON output";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Fail,
    NeedsInput,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
            Self::NeedsInput => "needs_input",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "fail" => Some(Self::Fail),
            "needs_input" => Some(Self::NeedsInput),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutput {
    pub status: StepStatus,
    pub summary: String,
    pub files_modified: Vec<String>,
    pub checks: Vec<String>,
    pub next_actions: Vec<String>,
}

impl StepOutput {
    pub fn parse_failure() -> Self {
        Self {
            status: StepStatus::Fail,
            summary: PARSE_FAILURE_SUMMARY.to_string(),
            files_modified: Vec::new(),
            checks: Vec::new(),
            next_actions: Vec::new(),
        }
    }

    fn from_value(value: &serde_json::Value) -> Option<Self> {
        let status = StepStatus::parse(value.get("status")?.as_str()?)?;
        Some(Self {
            status,
            summary: value
                .get("summary")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            files_modified: string_list(value.get("files_modified")),
            checks: string_list(value.get("checks")),
            next_actions: string_list(value.get("next_actions")),
        })
    }
}

fn string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    value
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse agent output into a [`StepOutput`].
///
/// Only the first top-level brace-delimited object counts. When it is not
/// valid JSON with a known `status` the result is a `fail` with
/// [`PARSE_FAILURE_SUMMARY`], even if a later object would parse.
pub fn parse_step_output(raw: &str) -> StepOutput {
    first_top_level_object(raw)
        .and_then(|candidate| serde_json::from_str::<serde_json::Value>(candidate).ok())
        .and_then(|value| StepOutput::from_value(&value))
        .unwrap_or_else(StepOutput::parse_failure)
}

/// The first balanced `{...}` span, ignoring braces inside JSON strings.
fn first_top_level_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if depth > 0 && in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

//! Ask the step's agent which rules apply.

use std::collections::HashMap;
use std::path::Path;

use super::RuleFile;
use crate::agent_cli::{AgentCli, CliRequest};
use crate::models::{Provider, Step};

/// Characters of PRD and memory text included in the selection prompt.
const SUMMARY_CHARS: usize = 1200;

/// Context for one rule selection.
pub struct RuleSelection<'a> {
    pub step: &'a Step,
    pub provider: &'a Provider,
    pub provider_env: &'a HashMap<String, String>,
    pub cwd: &'a Path,
    pub prd_text: &'a str,
    pub memory_text: &'a str,
}

/// Pick the rules relevant to a step.
///
/// No rules means no agent call. An answer that is not a JSON array of
/// names selects every rule.
pub async fn select_rules(
    cli: &dyn AgentCli,
    rules: &[RuleFile],
    selection: RuleSelection<'_>,
) -> Vec<RuleFile> {
    if rules.is_empty() {
        return Vec::new();
    }

    let request = CliRequest {
        cli_command: selection.provider.cli_command.clone(),
        template: selection.provider.template.clone(),
        env: selection.provider_env.clone(),
        prompt: selection_prompt(rules, &selection),
        model: selection
            .step
            .model
            .clone()
            .or_else(|| selection.provider.default_model.clone()),
        cwd: selection.cwd.to_path_buf(),
        step_name: format!("{}-rule-select", selection.step.name),
        prd_path: String::new(),
        memory_path: String::new(),
    };

    let result = cli.run(request, None).await;
    match parse_selection(&result.stdout) {
        Some(names) => {
            let selected: Vec<RuleFile> = rules
                .iter()
                .filter(|rule| names.contains(&rule.header.name))
                .cloned()
                .collect();
            tracing::info!(
                "[RuleSelector] Step '{}' selected {}/{} rules",
                selection.step.name,
                selected.len(),
                rules.len()
            );
            selected
        }
        None => {
            tracing::warn!(
                "[RuleSelector] Unparseable selection for step '{}', using all rules",
                selection.step.name
            );
            rules.to_vec()
        }
    }
}

fn selection_prompt(rules: &[RuleFile], selection: &RuleSelection<'_>) -> String {
    let header_list = rules
        .iter()
        .map(|rule| format!("- {}: {}", rule.header.name, rule.header.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are selecting relevant rules for a step.\n\nStep: {}\nDescription: {}\n\nPRD Summary:\n{}\n\nMEMORY Summary:\n{}\n\nRules:\n{}\n\nReturn JSON array of rule names to include.",
        selection.step.name,
        selection.step.description,
        head_chars(selection.prd_text, SUMMARY_CHARS),
        head_chars(selection.memory_text, SUMMARY_CHARS),
        header_list
    )
}

fn head_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// The answer as a list of names: either the whole output or the first
/// bracketed span in it that parses (terminal output often wraps the JSON,
/// and ANSI escapes contain brackets too).
fn parse_selection(stdout: &str) -> Option<Vec<String>> {
    let trimmed = stdout.trim();
    if let Ok(names) = serde_json::from_str::<Vec<String>>(trimmed) {
        return Some(names);
    }

    let end = trimmed.rfind(']')?;
    trimmed
        .match_indices('[')
        .map(|(start, _)| start)
        .take_while(|start| *start < end)
        .find_map(|start| serde_json::from_str::<Vec<String>>(&trimmed[start..=end]).ok())
}

//! Step prompt assembly.

use crate::models::Step;
use crate::rules::RuleFile;
use crate::skills::SkillExecution;

pub struct StepPromptInput<'a> {
    pub goal: &'a str,
    pub step: &'a Step,
    pub prd_text: &'a str,
    pub memory_text: &'a str,
    pub rules: &'a [RuleFile],
    pub skill_results: &'a [SkillExecution],
}

/// The prompt handed to the step's agent: goal, step contract, project
/// context, selected rules, the result shape it must print, then the skill
/// outputs as JSON.
pub fn build_step_prompt(input: &StepPromptInput<'_>) -> String {
    let step = input.step;
    let rules_block = input
        .rules
        .iter()
        .map(|rule| format!("# {}\n{}", rule.header.name, rule.body))
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = format!(
        r#"You are an autonomous LLM step in a workflow.

Goal:
{goal}

Step Name: {name}
Step Description: {description}
Success Criteria: {success}
Failure Criteria: {failure}

PRD:
{prd}

MEMORY:
{memory}

RULES:
{rules}

Return JSON ONLY with:
{{
  "status": "success"|"fail"|"needs_input",
  "summary": string,
  "files_modified": string[],
  "checks": string[],
  "next_actions": string[]
}}
"#,
        goal = input.goal,
        name = step.name,
        description = step.description,
        success = step.success_criteria.as_deref().unwrap_or_default(),
        failure = step.failure_criteria.as_deref().unwrap_or_default(),
        prd = input.prd_text,
        memory = input.memory_text,
        rules = rules_block,
    );

    let skills = serde_json::to_string(input.skill_results).unwrap_or_else(|_| "[]".to_string());
    format!("{}\n\nSkill Outputs:\n{}", prompt, skills)
}

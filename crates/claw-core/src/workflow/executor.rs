//! Workflow Executor: runs a stored workflow graph against a goal.
//!
//! The executor:
//! 1. Snapshots the workflow, its folder, steps and edges
//! 2. Inserts the run and loads the folder's rules
//! 3. Resolves each step provider once, decrypting its environment
//! 4. Walks the graph from the start steps, one worklist per branch
//! 5. Records every step invocation as a step run and in the PRD
//!
//! Routing after a step:
//!
//! ```text
//! needs_input ──► run needs_input, branch stops
//! fail        ──► failure targets (in order) | run failed
//! success     ──► support targets ──► next targets ──► (callback target, self + 1)*
//! ```
//!
//! Run status is written once: the first terminal status wins and a run
//! that is still `running` when every branch is done becomes `success`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{join_all, BoxFuture};
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::graph::StepGraph;
use super::output::{parse_step_output, StepStatus};
use super::prd::{append_agent_update, ensure_prd, prd_path};
use super::prompt::{build_step_prompt, StepPromptInput};
use crate::agent_cli::{AgentCli, CliRequest};
use crate::error::ClawError;
use crate::memory::{ensure_memory, load_memory_text, memory_path};
use crate::models::{
    Edge, EdgeType, ExecutionMode, Folder, Provider, Run, RunStatus, Step, StepRun,
};
use crate::resource_lock::PathLocks;
use crate::rules::{list_rules, select_rules, RuleFile, RuleSelection};
use crate::skills::{run_skill, SkillExecution};
use crate::store::{FolderStore, ProviderStore, RunStore, WorkflowStore};
use crate::vault::Vault;

const CHUNK_BUFFER: usize = 64;
const FLUSH_BYTES: usize = 1024;
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// A provider with the environment its invocations receive.
struct ResolvedProvider {
    provider: Provider,
    env: HashMap<String, String>,
}

/// Everything a run needs, fixed when the run starts.
struct RunContext {
    run_id: String,
    goal: String,
    mode: ExecutionMode,
    root: PathBuf,
    skills_dir: PathBuf,
    prd_path: PathBuf,
    graph: StepGraph,
    providers: HashMap<String, ResolvedProvider>,
    rules: Vec<RuleFile>,
}

enum Task {
    Step { step_id: String, iteration: u32 },
    /// A group of `support` or `next` targets, fanned out per the
    /// execution mode and finished before the worklist continues.
    FanOut(Vec<Task>),
}

impl Task {
    fn step(step_id: &str, iteration: u32) -> Self {
        Self::Step {
            step_id: step_id.to_string(),
            iteration,
        }
    }
}

/// The workflow executor engine.
pub struct WorkflowExecutor {
    workflows: WorkflowStore,
    folders: FolderStore,
    providers: ProviderStore,
    runs: RunStore,
    vault: Arc<Vault>,
    locks: PathLocks,
    cli: Arc<dyn AgentCli>,
    /// Report skills as successful without spawning them.
    fake_skills: bool,
}

impl WorkflowExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workflows: WorkflowStore,
        folders: FolderStore,
        providers: ProviderStore,
        runs: RunStore,
        vault: Arc<Vault>,
        locks: PathLocks,
        cli: Arc<dyn AgentCli>,
        fake_skills: bool,
    ) -> Self {
        Self {
            workflows,
            folders,
            providers,
            runs,
            vault,
            locks,
            cli,
            fake_skills,
        }
    }

    /// Execute `workflow_id` for `goal` and return the run id.
    ///
    /// Step outcomes never surface here. An error means the run was
    /// aborted (missing provider, storage or file system failure) and has
    /// been marked `failed`.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        goal: &str,
    ) -> Result<String, ClawError> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .await?
            .ok_or_else(|| ClawError::NotFound(format!("Workflow {} not found", workflow_id)))?;
        let folder = self
            .folders
            .get(&workflow.folder_id)
            .await?
            .ok_or_else(|| {
                ClawError::NotFound(format!("Folder {} not found", workflow.folder_id))
            })?;
        let steps = self.workflows.list_steps(workflow_id).await?;
        let edges = self.workflows.list_edges(workflow_id).await?;

        let run = Run::new(workflow.id.clone(), goal.to_string());
        self.runs.insert(&run).await?;
        tracing::info!(
            "[Executor] Run {} started: workflow '{}' ({} steps, {})",
            run.id,
            workflow.name,
            steps.len(),
            workflow.execution_mode.as_str()
        );

        let outcome = self
            .run_graph(&run.id, goal, &folder, workflow.execution_mode, steps, &edges)
            .await;

        match outcome {
            Ok(()) => {
                self.runs.finish(&run.id, RunStatus::Success).await?;
                let status = self
                    .runs
                    .get(&run.id)
                    .await?
                    .map(|r| r.status)
                    .unwrap_or(RunStatus::Success);
                tracing::info!("[Executor] Run {} finished: {}", run.id, status.as_str());
                Ok(run.id)
            }
            Err(e) => {
                tracing::error!("[Executor] Run {} aborted: {}", run.id, e);
                if let Err(finish_err) = self.runs.finish(&run.id, RunStatus::Failed).await {
                    tracing::error!(
                        "[Executor] Failed to mark run {} failed: {}",
                        run.id,
                        finish_err
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_graph(
        &self,
        run_id: &str,
        goal: &str,
        folder: &Folder,
        mode: ExecutionMode,
        steps: Vec<Step>,
        edges: &[Edge],
    ) -> Result<(), ClawError> {
        tokio::fs::create_dir_all(folder.rules_dir()).await?;
        tokio::fs::create_dir_all(folder.skills_dir()).await?;
        let rules = list_rules(&folder.rules_dir());

        let providers = self.resolve_providers(&steps).await?;
        let graph = StepGraph::new(steps, edges);
        let start: Vec<Task> = graph
            .start_steps()
            .iter()
            .map(|id| Task::step(id, 1))
            .collect();

        let ctx = RunContext {
            run_id: run_id.to_string(),
            goal: goal.to_string(),
            mode,
            root: folder.root().to_path_buf(),
            skills_dir: folder.skills_dir(),
            prd_path: prd_path(&folder.prd_dir(), goal, chrono::Utc::now().date_naive()),
            graph,
            providers,
            rules,
        };

        self.run_branch(&ctx, vec![Task::FanOut(start)]).await
    }

    /// Load each distinct step provider once. Providers that do not exist
    /// are left out and fail the step that needs them.
    async fn resolve_providers(
        &self,
        steps: &[Step],
    ) -> Result<HashMap<String, ResolvedProvider>, ClawError> {
        let mut resolved = HashMap::new();
        for step in steps {
            if resolved.contains_key(&step.provider_id) {
                continue;
            }
            let Some(provider) = self.providers.get(&step.provider_id).await? else {
                continue;
            };
            let env = self.provider_env(&provider);
            resolved.insert(step.provider_id.clone(), ResolvedProvider { provider, env });
        }
        Ok(resolved)
    }

    fn provider_env(&self, provider: &Provider) -> HashMap<String, String> {
        let Some(env_enc) = provider.env_enc.as_deref() else {
            return HashMap::new();
        };
        if !self.vault.is_unlocked() {
            tracing::warn!(
                "[Executor] Vault locked, provider '{}' runs without its environment",
                provider.name
            );
            return HashMap::new();
        }
        match self.vault.decrypt_env(env_enc) {
            Ok(env) => env,
            Err(e) => {
                tracing::warn!(
                    "[Executor] Could not decrypt environment of provider '{}': {}",
                    provider.name,
                    e
                );
                HashMap::new()
            }
        }
    }

    /// Drain a depth-first worklist. In sequential mode a fan-out expands in
    /// place, so each target finishes with its descendants before the next
    /// one starts. In parallel mode every target gets its own worklist.
    fn run_branch<'a>(
        &'a self,
        ctx: &'a RunContext,
        tasks: Vec<Task>,
    ) -> BoxFuture<'a, Result<(), ClawError>> {
        Box::pin(async move {
            let mut stack: Vec<Task> = tasks.into_iter().rev().collect();

            while let Some(task) = stack.pop() {
                match task {
                    Task::FanOut(mut branches) if branches.len() == 1 => {
                        if let Some(branch) = branches.pop() {
                            stack.push(branch);
                        }
                    }
                    Task::FanOut(branches) if ctx.mode == ExecutionMode::Parallel => {
                        let results =
                            join_all(branches.into_iter().map(|b| self.run_branch(ctx, vec![b])))
                                .await;
                        results.into_iter().collect::<Result<Vec<_>, _>>()?;
                    }
                    Task::FanOut(branches) => {
                        stack.extend(branches.into_iter().rev());
                    }
                    Task::Step { step_id, iteration } => {
                        let Some(status) = self.execute_step(ctx, &step_id, iteration).await? else {
                            continue;
                        };
                        let follow_up = self.route(ctx, &step_id, iteration, status).await?;
                        stack.extend(follow_up.into_iter().rev());
                    }
                }
            }

            Ok(())
        })
    }

    /// Work that follows a finished step, in execution order.
    async fn route(
        &self,
        ctx: &RunContext,
        step_id: &str,
        iteration: u32,
        status: StepStatus,
    ) -> Result<Vec<Task>, ClawError> {
        let targets = |edge_type: EdgeType| -> Vec<Task> {
            ctx.graph
                .targets(step_id, edge_type)
                .iter()
                .map(|id| Task::step(id, 1))
                .collect()
        };

        match status {
            StepStatus::NeedsInput => {
                self.runs.finish(&ctx.run_id, RunStatus::NeedsInput).await?;
                Ok(Vec::new())
            }
            StepStatus::Fail => {
                let failure = targets(EdgeType::Failure);
                if failure.is_empty() {
                    self.runs.finish(&ctx.run_id, RunStatus::Failed).await?;
                }
                Ok(failure)
            }
            StepStatus::Success => {
                let mut work = vec![
                    Task::FanOut(targets(EdgeType::Support)),
                    Task::FanOut(targets(EdgeType::Next)),
                ];
                for target in ctx.graph.targets(step_id, EdgeType::Callback) {
                    work.push(Task::step(target, 1));
                    work.push(Task::step(step_id, iteration + 1));
                }
                Ok(work)
            }
        }
    }

    /// Run one step invocation. `None` when the iteration bound skips it.
    async fn execute_step(
        &self,
        ctx: &RunContext,
        step_id: &str,
        iteration: u32,
    ) -> Result<Option<StepStatus>, ClawError> {
        let step = ctx
            .graph
            .step(step_id)
            .ok_or_else(|| ClawError::Internal(format!("Step {} missing from graph", step_id)))?;
        if iteration > step.max_iterations {
            tracing::debug!(
                "[Executor] Step '{}' reached max iterations ({})",
                step.name,
                step.max_iterations
            );
            return Ok(None);
        }

        let resolved = ctx.providers.get(&step.provider_id).ok_or_else(|| {
            ClawError::Configuration(format!(
                "Provider {} for step '{}' not found",
                step.provider_id, step.name
            ))
        })?;
        let provider = &resolved.provider;

        ensure_memory(
            self.cli.as_ref(),
            &self.locks,
            provider,
            &resolved.env,
            &ctx.root,
        )
        .await?;
        ensure_prd(&self.locks, &ctx.prd_path, &ctx.goal).await?;

        let prd_text = tokio::fs::read_to_string(&ctx.prd_path).await?;
        let memory_text = load_memory_text(&ctx.root);
        let rules = select_rules(
            self.cli.as_ref(),
            &ctx.rules,
            RuleSelection {
                step,
                provider,
                provider_env: &resolved.env,
                cwd: &ctx.root,
                prd_text: &prd_text,
                memory_text: &memory_text,
            },
        )
        .await;

        let skill_results = self.run_skills(ctx, step, &prd_text, &memory_text).await;
        let prompt = build_step_prompt(&StepPromptInput {
            goal: &ctx.goal,
            step,
            prd_text: &prd_text,
            memory_text: &memory_text,
            rules: &rules,
            skill_results: &skill_results,
        });

        let step_run = StepRun::new(ctx.run_id.clone(), step.id.clone(), iteration);
        self.runs.insert_step_run(&step_run).await?;
        tracing::info!(
            "[Executor] Step '{}' iteration {} started ({} rules, {} skills)",
            step.name,
            iteration,
            rules.len(),
            skill_results.len()
        );

        let request = CliRequest {
            cli_command: provider.cli_command.clone(),
            template: provider.template.clone(),
            env: resolved.env.clone(),
            prompt,
            model: step.model.clone().or_else(|| provider.default_model.clone()),
            cwd: ctx.root.clone(),
            step_name: step.name.clone(),
            prd_path: ctx.prd_path.to_string_lossy().to_string(),
            memory_path: memory_path(&ctx.root).to_string_lossy().to_string(),
        };
        let (chunks_tx, chunks_rx) = mpsc::channel(CHUNK_BUFFER);
        let (result, ()) = tokio::join!(
            self.cli.run(request, Some(chunks_tx)),
            self.stream_stdout(&step_run.id, chunks_rx)
        );

        let output = parse_step_output(&result.stdout);
        append_agent_update(&self.locks, &ctx.prd_path, &step.name, &output).await?;
        self.runs
            .finish_step_run(
                &step_run.id,
                output.status.as_str(),
                &result.stdout,
                &result.stderr,
                &output.summary,
            )
            .await?;

        tracing::info!(
            "[Executor] Step '{}' iteration {} -> {}: {}",
            step.name,
            iteration,
            output.status.as_str(),
            output.summary
        );
        Ok(Some(output.status))
    }

    async fn run_skills(
        &self,
        ctx: &RunContext,
        step: &Step,
        prd_text: &str,
        memory_text: &str,
    ) -> Vec<SkillExecution> {
        if step.skills.is_empty() {
            return Vec::new();
        }
        let input = serde_json::json!({
            "goal": ctx.goal,
            "step": step,
            "prd": prd_text,
            "memory": memory_text,
        });
        let mut results = Vec::with_capacity(step.skills.len());
        for name in &step.skills {
            results.push(run_skill(&ctx.skills_dir, name, &input, self.fake_skills).await);
        }
        results
    }

    /// Mirror streamed output into the step run, flushing once 1024 bytes
    /// are pending or 250 ms have passed, and once more at the end.
    async fn stream_stdout(&self, step_run_id: &str, mut chunks: mpsc::Receiver<String>) {
        let mut captured = String::new();
        let mut pending = 0usize;
        let mut last_flush = Instant::now();

        loop {
            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Some(chunk) => {
                        pending += chunk.len();
                        captured.push_str(&chunk);
                        if pending >= FLUSH_BYTES || last_flush.elapsed() >= FLUSH_INTERVAL {
                            self.flush_stdout(step_run_id, &captured).await;
                            pending = 0;
                            last_flush = Instant::now();
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(last_flush + FLUSH_INTERVAL), if pending > 0 => {
                    self.flush_stdout(step_run_id, &captured).await;
                    pending = 0;
                    last_flush = Instant::now();
                }
            }
        }

        self.flush_stdout(step_run_id, &captured).await;
    }

    async fn flush_stdout(&self, step_run_id: &str, stdout: &str) {
        if let Err(e) = self.runs.update_step_run_stdout(step_run_id, stdout).await {
            tracing::warn!("[Executor] Failed to flush output of {}: {}", step_run_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_cli::CliRunner;
    use crate::db::Database;
    use crate::store::SettingsStore;

    fn executor(db: &Database, vault: Arc<Vault>) -> WorkflowExecutor {
        WorkflowExecutor::new(
            WorkflowStore::new(db.clone()),
            FolderStore::new(db.clone()),
            ProviderStore::new(db.clone()),
            RunStore::new(db.clone()),
            vault,
            PathLocks::new(),
            Arc::new(CliRunner::new(true)),
            true,
        )
    }

    #[tokio::test]
    async fn test_provider_env_requires_unlocked_vault() {
        let db = Database::open_in_memory().unwrap();
        let vault = Arc::new(Vault::with_iterations(SettingsStore::new(db.clone()), 1_000));
        assert!(vault.unlock("pass").await.unwrap());

        let env = HashMap::from([("API_KEY".to_string(), "sk-1".to_string())]);
        let sealed = vault.encrypt_env(&env).unwrap();
        let provider = Provider::new(
            "p".into(),
            "agent".into(),
            "{{prompt}}".into(),
            None,
            Some(sealed),
        );
        let executor = executor(&db, vault.clone());

        assert_eq!(executor.provider_env(&provider), env);

        vault.lock();
        assert!(executor.provider_env(&provider).is_empty());
    }

    #[tokio::test]
    async fn test_provider_env_fails_open() {
        let db = Database::open_in_memory().unwrap();
        let vault = Arc::new(Vault::with_iterations(SettingsStore::new(db.clone()), 1_000));
        assert!(vault.unlock("pass").await.unwrap());
        let executor = executor(&db, vault);

        let plain = Provider::new("p".into(), "agent".into(), "{{prompt}}".into(), None, None);
        assert!(executor.provider_env(&plain).is_empty());

        let corrupt = Provider::new(
            "q".into(),
            "agent".into(),
            "{{prompt}}".into(),
            None,
            Some("not an envelope".into()),
        );
        assert!(executor.provider_env(&corrupt).is_empty());
    }
}

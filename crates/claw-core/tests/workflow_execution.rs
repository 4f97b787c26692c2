//! End-to-end engine tests against an in-memory database and scripted agents.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, Barrier, Notify};

use claw_core::agent_cli::{AgentCli, CliRequest, CliRunResult};
use claw_core::models::{
    Edge, EdgeType, ExecutionMode, Folder, Provider, RunStatus, Step, StepRun, Workflow,
};
use claw_core::{AppState, AppStateInner, ClawError, Database};

/// Agent double: answers by step name and records every invocation.
#[derive(Default)]
struct ScriptedCli {
    /// Queued statuses per step name; `success` once exhausted.
    statuses: Mutex<HashMap<String, VecDeque<&'static str>>>,
    rule_answer: String,
    calls: Mutex<Vec<CliRequest>>,
    /// Steps whose names start with `par` wait here for each other.
    rendezvous: Option<Arc<Barrier>>,
}

impl ScriptedCli {
    fn new() -> Self {
        Self {
            rule_answer: "[]".to_string(),
            ..Default::default()
        }
    }

    fn script(self, step: &str, statuses: &[&'static str]) -> Self {
        self.statuses
            .lock()
            .unwrap()
            .insert(step.to_string(), statuses.iter().copied().collect());
        self
    }

    fn step_calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.step_name.ends_with("-rule-select"))
            .map(|r| r.step_name.clone())
            .collect()
    }

    fn prompt_of(&self, step: &str) -> String {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.step_name == step)
            .map(|r| r.prompt.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AgentCli for ScriptedCli {
    async fn run(
        &self,
        request: CliRequest,
        chunks: Option<mpsc::Sender<String>>,
    ) -> CliRunResult {
        self.calls.lock().unwrap().push(request.clone());
        let name = request.step_name.clone();

        if name.ends_with("-rule-select") {
            return CliRunResult {
                stdout: self.rule_answer.clone(),
                stderr: String::new(),
                exit_code: Some(0),
            };
        }

        if let (Some(barrier), true) = (&self.rendezvous, name.starts_with("par")) {
            let met = tokio::time::timeout(Duration::from_secs(5), barrier.wait()).await;
            assert!(met.is_ok(), "{} never met its sibling", name);
        }

        let status = self
            .statuses
            .lock()
            .unwrap()
            .get_mut(&name)
            .and_then(|queue| queue.pop_front())
            .unwrap_or("success");
        let body = serde_json::json!({
            "status": status,
            "summary": format!("{} {}", name, status),
            "files_modified": ["src/lib.rs"],
        })
        .to_string();

        let progress = format!("\u{1b}[2mworking on {}\u{1b}[0m\r\n", name);
        if let Some(tx) = chunks {
            let _ = tx.send(progress.clone()).await;
            let _ = tx.send(body.clone()).await;
        }
        CliRunResult {
            stdout: format!("{}{}", progress, body),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

/// Streams a large chunk and then a small one, and holds the step open
/// until `release` is notified.
struct PacedCli {
    release: Notify,
}

const BULK_BYTES: usize = 1500;
const TAIL: &str = "tail-chunk";

#[async_trait]
impl AgentCli for PacedCli {
    async fn run(
        &self,
        _request: CliRequest,
        chunks: Option<mpsc::Sender<String>>,
    ) -> CliRunResult {
        let bulk = "a".repeat(BULK_BYTES);
        if let Some(tx) = &chunks {
            let _ = tx.send(bulk.clone()).await;
            let _ = tx.send(TAIL.to_string()).await;
        }
        self.release.notified().await;
        CliRunResult {
            stdout: format!("{}{}{{\"status\":\"success\",\"summary\":\"paced\"}}", bulk, TAIL),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }
}

struct Fixture {
    state: AppState,
    dir: tempfile::TempDir,
    folder: Folder,
    provider: Provider,
}

async fn fixture(cli: Arc<dyn AgentCli>) -> Fixture {
    let db = Database::open_in_memory().unwrap();
    let state: AppState = Arc::new(AppStateInner::with_cli(db, cli, true));

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("MEMORY.md"), "# MEMORY\nUse cargo.").unwrap();
    let folder = Folder::new(dir.path().to_string_lossy().to_string(), None);
    state.folder_store.save(&folder).await.unwrap();

    let provider = Provider::new(
        "agent".into(),
        "agent-cli".into(),
        "-p {{prompt}}".into(),
        None,
        None,
    );
    state.provider_store.save(&provider).await.unwrap();

    Fixture {
        state,
        dir,
        folder,
        provider,
    }
}

impl Fixture {
    /// Store a workflow; steps are `(name, max_iterations)`.
    async fn workflow(
        &self,
        mode: ExecutionMode,
        steps: &[(&str, u32)],
        edges: &[(&str, &str, EdgeType)],
    ) -> (Workflow, HashMap<String, Step>) {
        let workflow = Workflow::new("wf".into(), None, self.folder.id.clone(), mode);
        self.state.workflow_store.save(&workflow).await.unwrap();

        let mut by_name = HashMap::new();
        for (name, max_iterations) in steps {
            let mut step = Step::new(
                workflow.id.clone(),
                name.to_string(),
                format!("{} description", name),
                self.provider.id.clone(),
            );
            step.max_iterations = *max_iterations;
            self.state.workflow_store.save_step(&step).await.unwrap();
            by_name.insert(name.to_string(), step);
        }
        for (from, to, edge_type) in edges {
            let edge = Edge::new(
                workflow.id.clone(),
                by_name[*from].id.clone(),
                by_name[*to].id.clone(),
                *edge_type,
            );
            self.state.workflow_store.save_edge(&edge).await.unwrap();
        }
        (workflow, by_name)
    }

    async fn run_status(&self, run_id: &str) -> RunStatus {
        self.state.run_store.get(run_id).await.unwrap().unwrap().status
    }

    /// Poll the workflow's first step run until its stored stdout matches.
    async fn wait_for_stdout(&self, workflow_id: &str, matches: impl Fn(&str) -> bool) -> StepRun {
        for _ in 0..200 {
            let runs = self.state.run_store.list_by_workflow(workflow_id).await.unwrap();
            if let Some(run) = runs.first() {
                let step_runs = self.state.run_store.list_step_runs(&run.id).await.unwrap();
                if let Some(step_run) = step_runs.into_iter().next() {
                    if step_run.stdout.as_deref().is_some_and(&matches) {
                        return step_run;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("step run stdout never reached the expected state");
    }

    fn prd_text(&self) -> String {
        let prd_dir = self.dir.path().join("PRDs");
        let entry = std::fs::read_dir(&prd_dir)
            .unwrap()
            .next()
            .expect("a PRD file")
            .unwrap();
        std::fs::read_to_string(entry.path()).unwrap()
    }
}

#[tokio::test]
async fn test_linear_success_records_step_runs_and_prd() {
    let cli = Arc::new(ScriptedCli::new());
    let fx = fixture(cli.clone()).await;
    let (workflow, steps) = fx
        .workflow(ExecutionMode::Sequential, &[("A", 10), ("B", 10)], &[("A", "B", EdgeType::Next)])
        .await;

    let run_id = fx
        .state
        .executor()
        .execute_workflow(&workflow.id, "Ship the feature")
        .await
        .unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::Success);
    let run = fx.state.run_store.get(&run_id).await.unwrap().unwrap();
    assert!(run.ended_at.is_some());

    let step_runs = fx.state.run_store.list_step_runs(&run_id).await.unwrap();
    assert_eq!(step_runs.len(), 2);
    assert_eq!(step_runs[0].step_id, steps["A"].id);
    assert_eq!(step_runs[1].step_id, steps["B"].id);
    assert!(step_runs.iter().all(|s| s.status == "success" && s.iteration == 1));
    assert!(step_runs[0].stdout.as_deref().unwrap().contains("working on A"));
    assert_eq!(step_runs[0].summary.as_deref(), Some("A success"));

    let prd = fx.prd_text();
    assert!(prd.starts_with("# PRD\n\nGoal: Ship the feature\n"));
    let a = prd.find("### A\n").unwrap();
    let b = prd.find("### B\n").unwrap();
    assert!(a < b);
    assert!(prd.contains("- Files: src/lib.rs"));

    let prd_name = std::fs::read_dir(fx.dir.path().join("PRDs"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .file_name();
    assert!(prd_name.to_string_lossy().ends_with("_ship-the-feature.md"));

    assert!(fx.dir.path().join("rules").is_dir());
    assert!(fx.dir.path().join("skills").is_dir());

    let prompt = cli.prompt_of("B");
    assert!(prompt.contains("Goal:\nShip the feature\n"));
    assert!(prompt.contains("### A\n"));
    assert!(prompt.contains("MEMORY:\n# MEMORY\nUse cargo."));
    assert!(prompt.ends_with("Skill Outputs:\n[]"));
}

#[tokio::test]
async fn test_failing_step_fails_run_and_stops_branch() {
    let cli = Arc::new(ScriptedCli::new().script("A", &["fail"]));
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(ExecutionMode::Sequential, &[("A", 10), ("B", 10)], &[("A", "B", EdgeType::Next)])
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::Failed);
    assert_eq!(cli.step_calls(), vec!["A"]);
    let step_runs = fx.state.run_store.list_step_runs(&run_id).await.unwrap();
    assert_eq!(step_runs.len(), 1);
    assert_eq!(step_runs[0].status, "fail");
}

#[tokio::test]
async fn test_callback_loop_is_bounded_by_max_iterations() {
    let cli = Arc::new(ScriptedCli::new());
    let fx = fixture(cli.clone()).await;
    let (workflow, steps) = fx
        .workflow(
            ExecutionMode::Sequential,
            &[("A", 3), ("B", 10)],
            &[("A", "B", EdgeType::Callback)],
        )
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::Success);
    assert_eq!(cli.step_calls(), vec!["A", "B", "A", "B", "A", "B"]);

    let iterations: Vec<u32> = fx
        .state
        .run_store
        .list_step_runs(&run_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.step_id == steps["A"].id)
        .map(|s| s.iteration)
        .collect();
    assert_eq!(iterations, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failure_edge_routes_instead_of_failing_run() {
    let cli = Arc::new(ScriptedCli::new().script("Build", &["fail"]));
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(
            ExecutionMode::Sequential,
            &[("Build", 10), ("Fix", 10), ("Deploy", 10)],
            &[
                ("Build", "Deploy", EdgeType::Next),
                ("Build", "Fix", EdgeType::Failure),
            ],
        )
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(cli.step_calls(), vec!["Build", "Fix"]);
    assert_eq!(fx.run_status(&run_id).await, RunStatus::Success);
}

#[tokio::test]
async fn test_needs_input_stops_branch() {
    let cli = Arc::new(ScriptedCli::new().script("Ask", &["needs_input"]));
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(
            ExecutionMode::Sequential,
            &[("Ask", 10), ("Then", 10)],
            &[("Ask", "Then", EdgeType::Next)],
        )
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::NeedsInput);
    assert_eq!(cli.step_calls(), vec!["Ask"]);
}

#[tokio::test]
async fn test_first_terminal_status_wins_and_siblings_continue() {
    let cli = Arc::new(
        ScriptedCli::new()
            .script("Ask", &["needs_input"])
            .script("Check", &["fail"]),
    );
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(ExecutionMode::Sequential, &[("Ask", 10), ("Check", 10)], &[])
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(cli.step_calls(), vec!["Ask", "Check"]);
    assert_eq!(fx.run_status(&run_id).await, RunStatus::NeedsInput);
}

#[tokio::test]
async fn test_support_steps_finish_before_next_steps() {
    let cli = Arc::new(ScriptedCli::new());
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(
            ExecutionMode::Sequential,
            &[("Plan", 10), ("Build", 10), ("Research", 10), ("Notes", 10)],
            &[
                ("Plan", "Build", EdgeType::Next),
                ("Plan", "Research", EdgeType::Support),
                ("Research", "Notes", EdgeType::Next),
            ],
        )
        .await;

    fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    // Research is a start step (no incoming next edge) and also Plan's support.
    assert_eq!(
        cli.step_calls(),
        vec!["Plan", "Research", "Notes", "Build", "Research", "Notes"]
    );
}

#[tokio::test]
async fn test_parallel_mode_runs_siblings_concurrently() {
    let cli = Arc::new(ScriptedCli {
        rendezvous: Some(Arc::new(Barrier::new(2))),
        ..ScriptedCli::new()
    });
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(
            ExecutionMode::Parallel,
            &[("Root", 10), ("par-left", 10), ("par-right", 10)],
            &[
                ("Root", "par-left", EdgeType::Next),
                ("Root", "par-right", EdgeType::Next),
            ],
        )
        .await;

    let run_id = fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::Success);
    let calls = cli.step_calls();
    assert_eq!(calls[0], "Root");
    assert_eq!(calls.len(), 3);
    assert_eq!(fx.state.run_store.list_step_runs(&run_id).await.unwrap().len(), 3);

    let prd = fx.prd_text();
    assert_eq!(prd.matches("## Agent Updates").count(), 1);
    assert!(prd.contains("### par-left\n"));
    assert!(prd.contains("### par-right\n"));
}

#[tokio::test]
async fn test_missing_provider_aborts_run() {
    let cli = Arc::new(ScriptedCli::new());
    let fx = fixture(cli.clone()).await;
    let workflow = Workflow::new(
        "wf".into(),
        None,
        fx.folder.id.clone(),
        ExecutionMode::Sequential,
    );
    fx.state.workflow_store.save(&workflow).await.unwrap();
    let step = Step::new(
        workflow.id.clone(),
        "Orphan".into(),
        "".into(),
        "no-such-provider".into(),
    );
    fx.state.workflow_store.save_step(&step).await.unwrap();

    let err = fx
        .state
        .executor()
        .execute_workflow(&workflow.id, "goal")
        .await
        .unwrap_err();
    assert!(matches!(err, ClawError::Configuration(_)));

    let runs = fx.state.run_store.list_by_workflow(&workflow.id).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Failed);
    assert!(runs[0].ended_at.is_some());
    assert!(cli.step_calls().is_empty());
}

#[tokio::test]
async fn test_unknown_workflow_creates_no_run() {
    let fx = fixture(Arc::new(ScriptedCli::new())).await;
    let err = fx
        .state
        .executor()
        .execute_workflow("missing", "goal")
        .await
        .unwrap_err();
    assert!(matches!(err, ClawError::NotFound(_)));
    assert!(fx.state.run_store.list_by_workflow("missing").await.unwrap().is_empty());
}

const STYLE_RULE: &str = "--------------\nname: style\ndescription: Formatting rules\n--------------\nRun rustfmt.\n";
const DOCS_RULE: &str = "--------------\nname: docs\ndescription: Documentation rules\n--------------\nDocument public items.\n";

async fn run_with_rules(rule_answer: &str) -> String {
    let cli = Arc::new(ScriptedCli {
        rule_answer: rule_answer.to_string(),
        ..ScriptedCli::new()
    });
    let fx = fixture(cli.clone()).await;
    let rules_dir = fx.dir.path().join("rules");
    std::fs::create_dir_all(&rules_dir).unwrap();
    std::fs::write(rules_dir.join("style.md"), STYLE_RULE).unwrap();
    std::fs::write(rules_dir.join("docs.md"), DOCS_RULE).unwrap();

    let (workflow, _) = fx.workflow(ExecutionMode::Sequential, &[("A", 10)], &[]).await;
    fx.state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();
    cli.prompt_of("A")
}

#[tokio::test]
async fn test_selected_rules_reach_the_prompt() {
    let prompt = run_with_rules(r#"["style"]"#).await;
    assert!(prompt.contains("# style\nRun rustfmt."));
    assert!(!prompt.contains("# docs\n"));
}

#[tokio::test]
async fn test_malformed_rule_answer_selects_all_rules() {
    let prompt = run_with_rules("I think style applies").await;
    assert!(prompt.contains("# style\nRun rustfmt."));
    assert!(prompt.contains("# docs\nDocument public items."));
}

#[tokio::test]
async fn test_fake_runner_generates_memory_and_completes() {
    let db = Database::open_in_memory().unwrap();
    let state: AppState = Arc::new(AppStateInner::new(db, true));
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

    let folder = Folder::new(dir.path().to_string_lossy().to_string(), None);
    state.folder_store.save(&folder).await.unwrap();
    let provider = Provider::new("fake".into(), "codex".into(), "{{prompt}}".into(), None, None);
    state.provider_store.save(&provider).await.unwrap();
    let workflow = Workflow::new("wf".into(), None, folder.id.clone(), ExecutionMode::Sequential);
    state.workflow_store.save(&workflow).await.unwrap();
    let plan = Step::new(workflow.id.clone(), "Plan".into(), "".into(), provider.id.clone());
    let build = Step::new(workflow.id.clone(), "Build".into(), "".into(), provider.id.clone());
    state.workflow_store.save_step(&plan).await.unwrap();
    state.workflow_store.save_step(&build).await.unwrap();
    state
        .workflow_store
        .save_edge(&Edge::new(
            workflow.id.clone(),
            plan.id.clone(),
            build.id.clone(),
            EdgeType::Next,
        ))
        .await
        .unwrap();

    let run_id = state.executor().execute_workflow(&workflow.id, "goal").await.unwrap();

    let run = state.run_store.get(&run_id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Success);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap(),
        "# MEMORY\nFake memory"
    );
    let step_runs = state.run_store.list_step_runs(&run_id).await.unwrap();
    assert_eq!(step_runs.len(), 2);
    assert!(step_runs.iter().all(|s| s.summary.as_deref() == Some("fake run")));
}

#[tokio::test]
async fn test_streamed_output_is_flushed_while_step_runs() {
    let cli = Arc::new(PacedCli {
        release: Notify::new(),
    });
    let fx = fixture(cli.clone()).await;
    let (workflow, _) = fx
        .workflow(ExecutionMode::Sequential, &[("Stream", 10)], &[])
        .await;
    let executor = fx.state.executor();

    let watch = async {
        // Over 1024 pending bytes: flushed at once.
        let bulk = fx
            .wait_for_stdout(&workflow.id, |stdout| stdout.len() >= BULK_BYTES)
            .await;
        assert_eq!(bulk.status, "running");
        assert!(bulk.stdout.unwrap().starts_with(&"a".repeat(BULK_BYTES)));
        let seen_bulk = Instant::now();

        // A small remainder lands on the interval, before the step ends.
        let tail = fx
            .wait_for_stdout(&workflow.id, |stdout| stdout.ends_with(TAIL))
            .await;
        assert_eq!(tail.status, "running");
        assert!(seen_bulk.elapsed() < Duration::from_secs(1));

        cli.release.notify_one();
    };
    let (run_id, ()) = tokio::join!(
        executor.execute_workflow(&workflow.id, "Stream output"),
        watch
    );
    let run_id = run_id.unwrap();

    assert_eq!(fx.run_status(&run_id).await, RunStatus::Success);
    let step_runs = fx.state.run_store.list_step_runs(&run_id).await.unwrap();
    assert_eq!(step_runs[0].status, "success");
    assert!(step_runs[0].stdout.as_deref().unwrap().ends_with(r#""summary":"paced"}"#));
}

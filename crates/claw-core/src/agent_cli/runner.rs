//! Pseudo-terminal runner for agent CLIs.
//!
//! Agent CLIs behave differently when they are not attached to a terminal
//! (no colors, buffered output, some refuse to start). Each invocation gets
//! its own PTY via portable-pty. The PTY merges stdout and stderr, so all
//! output is reported as stdout.

use std::io::{Read, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, PtySize};
use tokio::sync::mpsc;

use super::command::{build_command, resolve_command, search_path};
use super::{fake, AgentCli, CliRequest, CliRunResult};
use crate::template::{TemplateFields, TemplateRenderer};

const PTY_COLS: u16 = 120;
const PTY_ROWS: u16 = 30;
const PTY_TERM: &str = "xterm-color";

/// Production [`AgentCli`].
///
/// With `fake` set no process is spawned and canned results keyed by step
/// name are returned instead.
pub struct CliRunner {
    fake: bool,
    renderer: TemplateRenderer,
}

/// Everything the blocking PTY thread needs.
struct PtyLaunch {
    command: String,
    resolved: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    env: Vec<(String, String)>,
    prompt_input: Option<String>,
}

impl CliRunner {
    pub fn new(fake: bool) -> Self {
        Self {
            fake,
            renderer: TemplateRenderer::new(),
        }
    }
}

#[async_trait]
impl AgentCli for CliRunner {
    async fn run(
        &self,
        request: CliRequest,
        chunks: Option<mpsc::Sender<String>>,
    ) -> CliRunResult {
        if self.fake {
            return fake::canned_result(&request.step_name);
        }

        let model = request.model.clone().unwrap_or_default();
        let cwd = request.cwd.to_string_lossy().to_string();
        let rendered = self.renderer.render(
            &request.template,
            &TemplateFields {
                prompt: request.prompt.clone(),
                model: model.clone(),
                cwd: cwd.clone(),
                step_name: request.step_name.clone(),
                prd_path: request.prd_path.clone(),
                memory_path: request.memory_path.clone(),
            },
        );

        let invocation = build_command(&request.cli_command, &rendered);
        if invocation.program.is_empty() {
            return CliRunResult::failure("CLI command is empty.", "");
        }

        let path_override = request.env.get("PATH").map(String::as_str);
        let Some(resolved) = resolve_command(&invocation.program, path_override) else {
            tracing::warn!(
                "[CliRunner] Command '{}' not found on PATH",
                invocation.program
            );
            return CliRunResult::failure(
                format!(
                    "CLI command '{}' not found on PATH. Install it or set provider CLI to an absolute path.",
                    invocation.program
                ),
                "",
            );
        };

        let prompt_input =
            (!request.template.contains("{{prompt}}")).then(|| request.prompt.clone());
        let launch = PtyLaunch {
            env: process_env(&request, search_path(path_override), model, cwd),
            command: invocation.program,
            resolved,
            args: invocation.args,
            cwd: request.cwd,
            prompt_input,
        };

        tracing::info!(
            "[CliRunner] Spawning {} for step '{}'",
            launch.resolved.display(),
            request.step_name
        );

        let command = launch.command.clone();
        match tokio::task::spawn_blocking(move || run_in_pty(launch, chunks)).await {
            Ok(result) => result,
            Err(e) => CliRunResult::failure(
                format!("Failed to start CLI '{}'. {}", command, e),
                e.to_string(),
            ),
        }
    }
}

/// Variables layered over the inherited environment, lowest precedence
/// first. Provider variables come last and win.
fn process_env(
    request: &CliRequest,
    path: String,
    model: String,
    cwd: String,
) -> Vec<(String, String)> {
    let mut env = vec![
        ("TERM".to_string(), PTY_TERM.to_string()),
        ("PATH".to_string(), path),
        ("PROMPT".to_string(), request.prompt.clone()),
        ("MODEL".to_string(), model),
        ("STEP_NAME".to_string(), request.step_name.clone()),
        ("PRD_PATH".to_string(), request.prd_path.clone()),
        ("MEMORY_PATH".to_string(), request.memory_path.clone()),
        ("WORKDIR".to_string(), cwd),
    ];
    env.extend(request.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn spawn_failure(command: &str, message: String) -> CliRunResult {
    tracing::error!("[CliRunner] Failed to start '{}': {}", command, message);
    CliRunResult::failure(
        format!("Failed to start CLI '{}'. {}", command, message)
            .trim()
            .to_string(),
        message,
    )
}

fn run_in_pty(launch: PtyLaunch, chunks: Option<mpsc::Sender<String>>) -> CliRunResult {
    let pty_system = native_pty_system();
    let pair = match pty_system.openpty(PtySize {
        rows: PTY_ROWS,
        cols: PTY_COLS,
        pixel_width: 0,
        pixel_height: 0,
    }) {
        Ok(pair) => pair,
        Err(e) => return spawn_failure(&launch.command, format!("Failed to open PTY: {}", e)),
    };

    // CommandBuilder starts from the current process environment.
    let mut cmd = CommandBuilder::new(&launch.resolved);
    cmd.args(&launch.args);
    cmd.cwd(&launch.cwd);
    for (key, value) in &launch.env {
        cmd.env(key, value);
    }

    let mut child = match pair.slave.spawn_command(cmd) {
        Ok(child) => child,
        Err(e) => return spawn_failure(&launch.command, e.to_string()),
    };
    // Only the child may hold the slave side, otherwise reads never see EOF.
    drop(pair.slave);

    let mut reader = match pair.master.try_clone_reader() {
        Ok(reader) => reader,
        Err(e) => {
            let _ = child.kill();
            return spawn_failure(&launch.command, format!("Failed to clone PTY reader: {}", e));
        }
    };
    let writer = match pair.master.take_writer() {
        Ok(writer) => writer,
        Err(e) => {
            let _ = child.kill();
            return spawn_failure(&launch.command, format!("Failed to take PTY writer: {}", e));
        }
    };
    // The prompt is written while this thread drains the master side.
    // Dropping the writer sends EOT, so it is held until the child exits.
    let (exited_tx, exited_rx) = std::sync::mpsc::channel::<()>();
    let prompt_input = launch.prompt_input.clone();
    std::thread::spawn(move || {
        let mut writer = writer;
        if let Some(prompt) = prompt_input {
            if let Err(e) = write!(writer, "{}\r", prompt).and_then(|_| writer.flush()) {
                tracing::warn!("[CliRunner] Failed to write prompt to PTY: {}", e);
            }
        }
        let _ = exited_rx.recv();
    });

    let mut stdout = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let text = take_utf8(&mut pending);
                emit(&mut stdout, text, chunks.as_ref());
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // EIO once the child side has closed.
            Err(_) => break,
        }
    }
    if !pending.is_empty() {
        let text = String::from_utf8_lossy(&pending).into_owned();
        emit(&mut stdout, text, chunks.as_ref());
    }

    let exit_code = match child.wait() {
        Ok(status) => Some(status.exit_code() as i32),
        Err(e) => {
            tracing::warn!("[CliRunner] Failed to wait for '{}': {}", launch.command, e);
            None
        }
    };
    drop(exited_tx);

    tracing::info!(
        "[CliRunner] '{}' exited with {:?} ({} bytes)",
        launch.command,
        exit_code,
        stdout.len()
    );

    CliRunResult {
        stdout,
        stderr: String::new(),
        exit_code,
    }
}

fn emit(stdout: &mut String, text: String, chunks: Option<&mpsc::Sender<String>>) {
    if text.is_empty() {
        return;
    }
    stdout.push_str(&text);
    if let Some(tx) = chunks {
        // A dropped receiver only means nobody is watching live output.
        let _ = tx.blocking_send(text);
    }
}

/// Decode the longest valid UTF-8 prefix of `pending`, keeping an
/// incomplete trailing sequence for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}

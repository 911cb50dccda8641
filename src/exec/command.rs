// src/exec/command.rs

use std::process::Stdio;

use anyhow::Context;
use console::style;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::backend::{ExecRequest, Executor};
use crate::graph::CommandSpec;

/// Escape sequences that would wipe the interleaved output of other tasks.
const SCREEN_ESCAPES: &str = r"\x1bc|\x1b\[2J(?:\x1b\[H)?";

/// Production executor: runs command actions as OS processes.
///
/// Each line of the child's stdout and stderr is re-emitted under a
/// `name | ` prefix. Carriage-return progress redraws are collapsed to
/// their final state and full-screen clears are stripped, so tasks that
/// expect to own the terminal stay readable when interleaved.
pub struct ProcessExecutor {
    screen_escapes: Regex,
}

impl ProcessExecutor {
    pub fn new() -> Result<Self> {
        let screen_escapes =
            Regex::new(SCREEN_ESCAPES).context("compiling screen escape pattern")?;
        Ok(Self { screen_escapes })
    }
}

impl Executor for ProcessExecutor {
    fn execute(
        &self,
        request: ExecRequest,
        cancel: CancellationToken,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'static>> {
        let screen_escapes = self.screen_escapes.clone();
        Box::pin(async move { run_command(request, cancel, screen_escapes).await })
    }
}

async fn run_command(
    request: ExecRequest,
    cancel: CancellationToken,
    screen_escapes: Regex,
) -> Result<()> {
    let ExecRequest {
        task,
        command,
        cwd,
        env,
    } = request;

    println!("▪▪▪▪ {}", style(&task).bold());
    info!(task = %task, ?command, "starting task process");

    // Build a command appropriate for the action form and platform.
    let mut cmd = match &command {
        CommandSpec::Shell(line) => {
            if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(line);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(line);
                c
            }
        }
        CommandSpec::Argv { program, args } => {
            let mut c = Command::new(program);
            c.args(args);
            c
        }
    };

    cmd.current_dir(&cwd)
        .envs(&env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{task}'"))?;

    let mut printers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        printers.push(spawn_line_printer(
            stdout,
            task.clone(),
            screen_escapes.clone(),
            false,
        ));
    }
    if let Some(stderr) = child.stderr.take() {
        printers.push(spawn_line_printer(
            stderr,
            task.clone(),
            screen_escapes.clone(),
            true,
        ));
    }

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            debug!(task = %task, "run revoked; killing process");
            if let Err(err) = child.start_kill() {
                warn!(task = %task, error = %err, "failed to kill process");
            }
            child.wait().await
        }
    };
    let status = status.with_context(|| format!("waiting for process of task '{task}'"))?;

    // Let the pipes drain before settling so no output of this run lands
    // after a successor has started.
    for printer in printers {
        let _ = printer.await;
    }

    if !status.success() && !cancel.is_cancelled() {
        warn!(
            task = %task,
            exit_code = status.code().unwrap_or(-1),
            "task process exited with non-zero status"
        );
    }
    Ok(())
}

/// Relay one output pipe line by line under the task's prefix.
fn spawn_line_printer<R>(
    reader: R,
    task: String,
    screen_escapes: Regex,
    to_stderr: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = sanitize_line(&line, &screen_escapes);
            if to_stderr {
                eprintln!("{task} | {line}");
            } else {
                println!("{task} | {line}");
            }
        }
    })
}

/// Collapse carriage-return redraws to their final state and strip
/// full-screen clears.
fn sanitize_line(line: &str, screen_escapes: &Regex) -> String {
    let tail = match line.rfind('\r') {
        Some(idx) => &line[idx + 1..],
        None => line,
    };
    screen_escapes.replace_all(tail, "").into_owned()
}

// SPDX-License-Identifier: MIT

//! Subshell execution with output capture and timeout enforcement.
//!
//! Callers compose the full command text (including `pfexec` where the
//! operation needs privilege); the runner is unaware of privilege. On
//! timeout the child receives SIGTERM and, if it ignores it, SIGKILL.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Default timeout for host tool invocations.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// `pkg` operations routinely run for many minutes.
pub const PKG_COMMAND_TIMEOUT: Duration = Duration::from_secs(1200);
/// Grace between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Captured result of a subshell run. Failure modes (spawn error, non-zero
/// exit, timeout) all fold into `success: false` with the reason in
/// `error`; the task boundary never sees an exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
}

impl CommandOutput {
    fn spawn_failure(message: String) -> Self {
        Self { success: false, exit_code: None, output: String::new(), error: message }
    }
}

/// Spawns `/bin/sh -c <command>` and captures both streams to memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandRunner;

impl CommandRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run a command with the default timeout.
    pub async fn run(&self, command: &str) -> CommandOutput {
        self.run_with_timeout(command, DEFAULT_COMMAND_TIMEOUT).await
    }

    /// Run a command, killing the subshell if it outlives `timeout`.
    pub async fn run_with_timeout(&self, command: &str, timeout: Duration) -> CommandOutput {
        let start = std::time::Instant::now();
        let result = run_inner(command, timeout).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if result.success {
            tracing::debug!(elapsed_ms, "command ok: {}", command);
        } else {
            tracing::warn!(elapsed_ms, error = %result.error, "command failed: {}", command);
        }
        result
    }
}

async fn run_inner(command: &str, timeout: Duration) -> CommandOutput {
    let mut child = match Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return CommandOutput::spawn_failure(format!("failed to spawn shell: {e}")),
    };

    // Drain both pipes concurrently with the wait so a chatty child can
    // never deadlock on a full pipe buffer.
    let stdout_task = spawn_reader(child.stdout.take());
    let stderr_task = spawn_reader(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            return CommandOutput::spawn_failure(format!("failed to wait for child: {e}"));
        }
        Err(_) => {
            terminate(&mut child).await;
            None
        }
    };

    let output = collect(stdout_task).await;
    let error_stream = collect(stderr_task).await;

    match status {
        Some(status) => {
            let exit_code = status.code();
            CommandOutput {
                success: status.success(),
                exit_code,
                output,
                error: if status.success() {
                    String::new()
                } else if error_stream.is_empty() {
                    format!("command exited with status {}", exit_code.unwrap_or(-1))
                } else {
                    error_stream
                },
            }
        }
        None => CommandOutput {
            success: false,
            exit_code: None,
            output,
            error: format!("command timed out after {}s", timeout.as_secs()),
        },
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL unconditionally.
async fn terminate(child: &mut tokio::process::Child) {
    if let Some(pid) = child.id() {
        let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}

fn spawn_reader<R>(stream: Option<R>) -> Option<tokio::task::JoinHandle<String>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    stream.map(|mut stream| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

async fn collect(task: Option<tokio::task::JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Quote a string for safe interpolation into a `/bin/sh -c` command line.
pub fn sh_quote(s: &str) -> String {
    if !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./=:@,".contains(c)) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;

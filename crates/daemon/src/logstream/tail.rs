// SPDX-License-Identifier: MIT

//! The tail subprocess behind an active log stream.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};

pub struct TailProcess {
    pub child: Child,
    pub stdout: Lines<BufReader<ChildStdout>>,
    pub stderr: Lines<BufReader<ChildStderr>>,
}

/// Spawn `tail -f -n <follow_lines> <path>` with both streams piped.
pub fn spawn_tail(path: &Path, follow_lines: i64) -> std::io::Result<TailProcess> {
    let mut child = Command::new("tail")
        .arg("-f")
        .arg("-n")
        .arg(follow_lines.max(0).to_string())
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("tail stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("tail stderr not captured"))?;

    Ok(TailProcess {
        child,
        stdout: BufReader::new(stdout).lines(),
        stderr: BufReader::new(stderr).lines(),
    })
}

/// SIGSTOP the tail: the client asked to pause.
pub fn pause(pid: u32) {
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGSTOP);
}

/// SIGCONT the tail: resume delivery.
pub fn resume(pid: u32) {
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGCONT);
}

/// Terminate the tail outright.
pub fn kill(pid: u32) {
    let _ = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
}

#[cfg(test)]
#[path = "tail_tests.rs"]
mod tests;

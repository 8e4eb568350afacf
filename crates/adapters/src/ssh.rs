// SPDX-License-Identifier: MIT

//! SSH primitives for zone provisioning, driven through the host's `ssh`,
//! `sshpass`, and `rsync` binaries.
//!
//! Key mode is preferred; password mode falls back to `sshpass`. Relative
//! key paths resolve against the zone's provisioning dataset.

use crate::subprocess::{sh_quote, CommandOutput, CommandRunner};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("ssh to {host}:{port} not ready after {waited_secs}s: {last_error}")]
    NotReady { host: String, port: u16, waited_secs: u64, last_error: String },
    #[error("rsync failed: {0}")]
    Rsync(String),
}

/// Remote endpoint.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
}

impl SshTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

/// Credentials: a username plus either a private key path or a password.
#[derive(Debug, Clone)]
pub struct SshCredentials {
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<PathBuf>,
}

impl SshCredentials {
    pub fn with_key(username: impl Into<String>, key_path: impl Into<PathBuf>) -> Self {
        Self { username: username.into(), password: None, key_path: Some(key_path.into()) }
    }

    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: Some(password.into()), key_path: None }
    }

    /// Resolve a relative key path against the provisioning dataset root.
    pub fn resolved_key(&self, dataset_root: &Path) -> Option<PathBuf> {
        self.key_path.as_ref().map(|key| {
            if key.is_absolute() {
                key.clone()
            } else {
                dataset_root.join(key)
            }
        })
    }
}

/// Result of a remote command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Options for one rsync transfer.
#[derive(Debug, Clone, Default)]
pub struct RsyncOptions {
    pub exclude: Vec<String>,
    pub extra_args: Vec<String>,
    pub delete: bool,
}

/// SSH session facade over the command runner.
#[derive(Debug, Clone)]
pub struct SshSession {
    runner: CommandRunner,
    /// Base for resolving relative key paths.
    dataset_root: PathBuf,
}

impl SshSession {
    pub fn new(runner: CommandRunner, dataset_root: impl Into<PathBuf>) -> Self {
        Self { runner, dataset_root: dataset_root.into() }
    }

    /// Poll at `interval` until a genuine SSH round-trip succeeds or
    /// `timeout` elapses. Readiness is an `echo ready` echo over a real
    /// handshake, not a bare TCP connect.
    pub async fn wait_for_ready(
        &self,
        target: &SshTarget,
        creds: &SshCredentials,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Duration, SshError> {
        let start = std::time::Instant::now();
        let probe_timeout = timeout.min(Duration::from_secs(10));
        let mut last_error = String::from("no attempt made");
        loop {
            let probe = self.exec(target, creds, "echo ready", probe_timeout).await;
            if probe.success() && probe.stdout.trim() == "ready" {
                return Ok(start.elapsed());
            }
            last_error = if probe.stderr.trim().is_empty() {
                format!("exit code {:?}", probe.exit_code)
            } else {
                probe.stderr.trim().to_string()
            };
            if start.elapsed() + interval > timeout {
                return Err(SshError::NotReady {
                    host: target.host.clone(),
                    port: target.port,
                    waited_secs: start.elapsed().as_secs(),
                    last_error,
                });
            }
            tokio::time::sleep(interval).await;
        }
    }

    /// Execute a command on the remote host.
    pub async fn exec(
        &self,
        target: &SshTarget,
        creds: &SshCredentials,
        command: &str,
        timeout: Duration,
    ) -> ExecResult {
        let line = format!(
            "{} -p {} {} {}",
            self.ssh_command(creds),
            target.port,
            user_at_host(target, creds),
            sh_quote(command)
        );
        let output = self.runner.run_with_timeout(&line, timeout).await;
        to_exec_result(output)
    }

    /// Rsync `src` (local directory) to `dst_path` on the target.
    pub async fn rsync(
        &self,
        target: &SshTarget,
        creds: &SshCredentials,
        src: &Path,
        dst_path: &str,
        options: &RsyncOptions,
        timeout: Duration,
    ) -> Result<String, SshError> {
        let mut line = String::from("rsync -az");
        if options.delete {
            line.push_str(" --delete");
        }
        for pattern in &options.exclude {
            line.push_str(&format!(" --exclude {}", sh_quote(pattern)));
        }
        for arg in &options.extra_args {
            line.push_str(&format!(" {}", sh_quote(arg)));
        }
        // Port rides inside the transport command, not the destination.
        let transport = format!("{} -p {}", self.ssh_command(creds), target.port);
        line.push_str(&format!(" -e {}", sh_quote(&transport)));
        // Trailing slash: sync the directory's contents, not the directory.
        line.push_str(&format!(
            " {}/ {}:{}",
            sh_quote(&src.display().to_string()),
            user_at_host(target, creds),
            sh_quote(dst_path)
        ));

        let output = self.runner.run_with_timeout(&line, timeout).await;
        if output.success {
            Ok(output.output)
        } else {
            Err(SshError::Rsync(output.error))
        }
    }

    /// The `ssh` invocation shared by exec and rsync transport.
    fn ssh_command(&self, creds: &SshCredentials) -> String {
        let mut cmd = String::new();
        if let Some(password) = &creds.password {
            cmd.push_str(&format!("sshpass -p {} ", sh_quote(password)));
        }
        cmd.push_str(
            "ssh -o UserKnownHostsFile=/dev/null -o StrictHostKeyChecking=no \
             -o ConnectTimeout=10",
        );
        if creds.password.is_none() {
            cmd.push_str(" -o BatchMode=yes");
        }
        if let Some(key) = creds.resolved_key(&self.dataset_root) {
            cmd.push_str(&format!(" -i {}", sh_quote(&key.display().to_string())));
        }
        cmd
    }
}

fn user_at_host(target: &SshTarget, creds: &SshCredentials) -> String {
    format!("{}@{}", sh_quote(&creds.username), target.host)
}

fn to_exec_result(output: CommandOutput) -> ExecResult {
    ExecResult { exit_code: output.exit_code, stdout: output.output, stderr: output.error }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Zone provisioning executors: SSH readiness, folder sync, playbook
//! runs, and provisioning-bundle extraction.
//!
//! Multi-folder sync and multi-playbook provisioning are expressed as
//! chains of single-unit tasks linked by `depends_on`; each handler here
//! does exactly one unit of work.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use warden_adapters::{
    sh_quote, CommandRunner, RsyncOptions, SshCredentials, SshSession, SshTarget,
};
use warden_core::{TaskOutcome, WardenConfig};
use warden_queue::{TaskContext, TaskHandler};

const RSYNC_TIMEOUT: Duration = Duration::from_secs(600);
const ANSIBLE_TIMEOUT: Duration = Duration::from_secs(1800);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Deserialize)]
struct CredentialParams {
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    key_path: Option<String>,
}

impl CredentialParams {
    fn into_credentials(self, config: &WardenConfig) -> SshCredentials {
        SshCredentials {
            username: self.username,
            password: self.password,
            key_path: Some(
                self.key_path.unwrap_or_else(|| config.provisioning.ssh.key_path.clone()).into(),
            ),
        }
    }
}

fn default_port() -> u16 {
    22
}

/// Shared dependencies for the zone executors.
#[derive(Clone)]
pub struct ZoneDeps {
    pub config: Arc<WardenConfig>,
    pub runner: CommandRunner,
}

impl ZoneDeps {
    fn session_for(&self, zone: &str) -> SshSession {
        SshSession::new(self.runner, self.config.provisioning.zone_mountpoint(zone))
    }
}

#[derive(Debug, Deserialize)]
struct WaitSshParams {
    ip: String,
    #[serde(default = "default_port")]
    port: u16,
    credentials: CredentialParams,
    #[serde(default)]
    timeout_seconds: Option<u64>,
    #[serde(default)]
    poll_interval_seconds: Option<u64>,
}

/// Poll until the zone answers a genuine SSH round-trip.
pub struct ZoneWaitSshHandler {
    deps: ZoneDeps,
}

impl ZoneWaitSshHandler {
    pub fn new(deps: ZoneDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskHandler for ZoneWaitSshHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: WaitSshParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid wait_ssh metadata: {e}")),
        };
        let ssh_config = &self.deps.config.provisioning.ssh;
        let timeout =
            Duration::from_secs(params.timeout_seconds.unwrap_or(ssh_config.timeout_seconds));
        let interval = Duration::from_secs(
            params.poll_interval_seconds.unwrap_or(ssh_config.poll_interval_seconds).max(1),
        );

        let session = self.deps.session_for(&ctx.task.zone_name);
        let target = SshTarget::new(params.ip.clone(), params.port);
        let creds = params.credentials.into_credentials(&self.deps.config);

        match session.wait_for_ready(&target, &creds, timeout, interval).await {
            Ok(waited) => TaskOutcome::ok_with(
                format!("{}:{} ready after {}s", params.ip, params.port, waited.as_secs()),
                json!({"waited_seconds": waited.as_secs()}),
            ),
            Err(e) => TaskOutcome::fail(e.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SyncFolder {
    /// Local source, relative paths resolve under the zone's provisioning
    /// dataset.
    #[serde(alias = "map")]
    source: String,
    #[serde(alias = "to")]
    destination: String,
}

#[derive(Debug, Default, Deserialize)]
struct SyncOptions {
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    delete: bool,
    #[serde(default)]
    owner: Option<String>,
    #[serde(default)]
    group: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncParams {
    ip: String,
    #[serde(default = "default_port")]
    port: u16,
    credentials: CredentialParams,
    folder: SyncFolder,
    #[serde(default)]
    options: SyncOptions,
}

/// Rsync one folder into the zone. One folder per task.
pub struct ZoneSyncHandler {
    deps: ZoneDeps,
}

impl ZoneSyncHandler {
    pub fn new(deps: ZoneDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskHandler for ZoneSyncHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: SyncParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid sync metadata: {e}")),
        };
        let zone = &ctx.task.zone_name;
        let session = self.deps.session_for(zone);
        let target = SshTarget::new(params.ip.clone(), params.port);
        let creds = params.credentials.into_credentials(&self.deps.config);

        let source = resolve_source(
            &params.folder.source,
            &self.deps.config.provisioning.zone_mountpoint(zone),
        );

        // The destination may not exist; create it with privilege first.
        let mkdir = session
            .exec(
                &target,
                &creds,
                &format!("sudo mkdir -p {}", sh_quote(&params.folder.destination)),
                Duration::from_secs(30),
            )
            .await;
        if !mkdir.success() {
            return TaskOutcome::fail(format!(
                "failed to create {} on {}: {}",
                params.folder.destination,
                params.ip,
                mkdir.stderr.trim()
            ));
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail("sync cancelled".to_string());
        }

        let options = RsyncOptions {
            exclude: params.options.exclude.clone(),
            extra_args: params.options.args.clone(),
            delete: params.options.delete,
        };
        if let Err(e) = session
            .rsync(&target, &creds, &source, &params.folder.destination, &options, RSYNC_TIMEOUT)
            .await
        {
            return TaskOutcome::fail(e.to_string());
        }

        // Optional ownership fix-up after the transfer.
        if let Some(owner) = owner_spec(&params.options) {
            if ctx.is_cancelled() {
                return TaskOutcome::fail("sync cancelled".to_string());
            }
            let chown = session
                .exec(
                    &target,
                    &creds,
                    &format!(
                        "sudo chown -R {} {}",
                        sh_quote(&owner),
                        sh_quote(&params.folder.destination)
                    ),
                    Duration::from_secs(60),
                )
                .await;
            if !chown.success() {
                return TaskOutcome::fail(format!(
                    "synced but failed to chown {}: {}",
                    params.folder.destination,
                    chown.stderr.trim()
                ));
            }
        }

        TaskOutcome::ok(format!(
            "synced {} to {}:{}",
            source.display(),
            params.ip,
            params.folder.destination
        ))
    }
}

fn resolve_source(source: &str, dataset_root: &Path) -> std::path::PathBuf {
    let path = Path::new(source);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        dataset_root.join(path)
    }
}

fn owner_spec(options: &SyncOptions) -> Option<String> {
    match (&options.owner, &options.group) {
        (Some(owner), Some(group)) => Some(format!("{owner}:{group}")),
        (Some(owner), None) => Some(owner.clone()),
        (None, Some(group)) => Some(format!(":{group}")),
        (None, None) => None,
    }
}

#[derive(Debug, Deserialize)]
struct ProvisionParams {
    ip: String,
    #[serde(default = "default_port")]
    port: u16,
    credentials: CredentialParams,
    playbook: String,
    /// Directory on the zone holding the synced provisioning content.
    #[serde(default)]
    remote_dir: Option<String>,
    #[serde(default)]
    extra_vars: serde_json::Map<String, serde_json::Value>,
}

/// Run one playbook locally on the zone over SSH. One playbook per task;
/// ordering across playbooks is a `depends_on` chain.
pub struct ZoneProvisionHandler {
    deps: ZoneDeps,
}

impl ZoneProvisionHandler {
    pub fn new(deps: ZoneDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskHandler for ZoneProvisionHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ProvisionParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid provision metadata: {e}")),
        };
        let session = self.deps.session_for(&ctx.task.zone_name);
        let target = SshTarget::new(params.ip.clone(), params.port);
        let creds = params.credentials.clone().into_credentials(&self.deps.config);

        let command = build_ansible_command(&params);
        ctx.progress.update(
            Some(10),
            Some(json!({"status": "provisioning", "playbook": params.playbook})),
        );

        let result = session.exec(&target, &creds, &command, ANSIBLE_TIMEOUT).await;
        if result.success() {
            TaskOutcome::ok_with(
                format!("playbook {} completed on {}", params.playbook, params.ip),
                json!({"playbook": params.playbook, "stdout_tail": tail(&result.stdout, 2000)}),
            )
        } else {
            TaskOutcome::fail(format!(
                "playbook {} failed (exit {:?}): {}",
                params.playbook,
                result.exit_code,
                tail(if result.stderr.trim().is_empty() { &result.stdout } else { &result.stderr }, 2000)
            ))
        }
    }
}

fn build_ansible_command(params: &ProvisionParams) -> String {
    let mut command = String::new();
    if let Some(remote_dir) = &params.remote_dir {
        command.push_str(&format!("cd {} && ", sh_quote(remote_dir)));
    }
    command.push_str(&format!(
        "ansible-playbook -i localhost, -c local {}",
        sh_quote(&params.playbook)
    ));
    if !params.extra_vars.is_empty() {
        let vars = serde_json::Value::Object(params.extra_vars.clone());
        command.push_str(&format!(" -e {}", sh_quote(&vars.to_string())));
    }
    command
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[derive(Debug, Deserialize)]
struct ExtractParams {
    /// Provisioning bundle on the host filesystem.
    artifact_path: String,
}

/// Idempotent creation of the per-zone provisioning dataset plus bundle
/// extraction, permission tightening, and the pre-provision snapshot.
pub struct ZoneProvisioningExtractHandler {
    deps: ZoneDeps,
}

impl ZoneProvisioningExtractHandler {
    pub fn new(deps: ZoneDeps) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl TaskHandler for ZoneProvisioningExtractHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ExtractParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid extract metadata: {e}")),
        };
        let zone = ctx.task.zone_name.clone();
        let provisioning = &self.deps.config.provisioning;
        let dataset = provisioning.zone_dataset(&zone);
        let mountpoint = provisioning.zone_mountpoint(&zone);
        let mountpoint_str = mountpoint.display().to_string();
        let runner = &self.deps.runner;

        // Dataset create is idempotent: probe, then create with mountpoint.
        let exists = runner.run(&format!("zfs list -H -o name {}", sh_quote(&dataset))).await;
        if !exists.success {
            let create = runner
                .run(&format!(
                    "pfexec zfs create -p -o mountpoint={} {}",
                    sh_quote(&mountpoint_str),
                    sh_quote(&dataset)
                ))
                .await;
            if !create.success {
                return TaskOutcome::fail(format!("zfs create failed: {}", create.error));
            }
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail("extract cancelled".to_string());
        }
        ctx.progress.update(Some(30), Some(json!({"status": "extracting"})));

        let tar_flags = if params.artifact_path.ends_with(".tar") { "-xf" } else { "-xzf" };
        let untar = runner
            .run_with_timeout(
                &format!(
                    "pfexec tar {tar_flags} {} -C {}",
                    sh_quote(&params.artifact_path),
                    sh_quote(&mountpoint_str)
                ),
                EXTRACT_TIMEOUT,
            )
            .await;
        if !untar.success {
            return TaskOutcome::fail(format!("extract failed: {}", untar.error));
        }

        let chown = runner
            .run(&format!(
                "pfexec chown -R {} {}",
                sh_quote(&provisioning.service_user),
                sh_quote(&mountpoint_str)
            ))
            .await;
        if !chown.success {
            return TaskOutcome::fail(format!("chown failed: {}", chown.error));
        }

        // Private keys must not be group/world readable or ssh refuses them.
        let tighten = runner
            .run(&format!(
                "pfexec find {} -type f \\( -name 'id_*' -o -name '*.pem' \\) \
                 ! -name '*.pub' -exec chmod 600 {{}} +",
                sh_quote(&mountpoint_str)
            ))
            .await;
        if !tighten.success {
            tracing::warn!(zone = %zone, error = %tighten.error, "key permission tightening failed");
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail("extract cancelled".to_string());
        }
        ctx.progress.update(Some(90), Some(json!({"status": "snapshotting"})));

        let snapshot = runner
            .run(&format!("pfexec zfs snapshot {}", sh_quote(&format!("{dataset}@pre-provision"))))
            .await;
        if !snapshot.success && !snapshot.error.contains("exists") {
            return TaskOutcome::fail(format!("snapshot failed: {}", snapshot.error));
        }

        TaskOutcome::ok_with(
            format!("extracted provisioning bundle for {zone}"),
            json!({"dataset": dataset, "mountpoint": mountpoint_str}),
        )
    }
}

#[cfg(test)]
#[path = "zone_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! ZFS pool executors.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use warden_adapters::{sh_quote, CommandRunner};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

const VDEV_KINDS: &[&str] = &["mirror", "raidz", "raidz2", "raidz3", "spare", "log", "cache", "special"];

/// One vdev: either a bare disk or a typed device group.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum VdevEntry {
    Disk(String),
    Group {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        devices: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ZpoolCreateParams {
    pool_name: String,
    vdevs: Vec<VdevEntry>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    mount_point: Option<String>,
}

/// Serialize an ordered vdev list into the `zpool create` argument form.
pub fn vdev_spec(vdevs: &[VdevEntry]) -> Result<String, String> {
    if vdevs.is_empty() {
        return Err("at least one vdev is required".to_string());
    }
    let mut parts: Vec<String> = Vec::new();
    for vdev in vdevs {
        match vdev {
            VdevEntry::Disk(device) => {
                if device.is_empty() {
                    return Err("empty device name".to_string());
                }
                parts.push(sh_quote(device));
            }
            VdevEntry::Group { kind, devices } => {
                if devices.is_empty() {
                    return Err("vdev group has no devices".to_string());
                }
                if let Some(kind) = kind {
                    if !VDEV_KINDS.contains(&kind.as_str()) {
                        return Err(format!("unknown vdev type: {kind}"));
                    }
                    parts.push(kind.clone());
                }
                parts.extend(devices.iter().map(|d| sh_quote(d)));
            }
        }
    }
    Ok(parts.join(" "))
}

fn build_create_command(params: &ZpoolCreateParams) -> Result<String, String> {
    if params.pool_name.is_empty() {
        return Err("pool_name is required".to_string());
    }
    let mut command = String::from("pfexec zpool create");
    if params.force {
        command.push_str(" -f");
    }
    if let Some(mount_point) = &params.mount_point {
        command.push_str(&format!(" -m {}", sh_quote(mount_point)));
    }
    for (key, value) in &params.properties {
        command.push_str(&format!(" -o {}", sh_quote(&format!("{key}={value}"))));
    }
    command.push_str(&format!(" {} {}", sh_quote(&params.pool_name), vdev_spec(&params.vdevs)?));
    Ok(command)
}

/// `zpool create`. Not idempotent; callers check existence first when they
/// need to.
pub struct ZpoolCreateHandler {
    runner: CommandRunner,
}

impl ZpoolCreateHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for ZpoolCreateHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ZpoolCreateParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid zpool metadata: {e}")),
        };
        let command = match build_create_command(&params) {
            Ok(command) => command,
            Err(e) => return TaskOutcome::fail(e),
        };

        let result = self.runner.run_with_timeout(&command, std::time::Duration::from_secs(300)).await;
        if result.success {
            TaskOutcome::ok(format!("created pool {}", params.pool_name))
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ZpoolSetPropertiesParams {
    pool_name: String,
    properties: BTreeMap<String, String>,
}

/// One `zpool set k=v` per property, in parallel, with partial-success
/// reporting.
pub struct ZpoolSetPropertiesHandler {
    runner: CommandRunner,
}

impl ZpoolSetPropertiesHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for ZpoolSetPropertiesHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ZpoolSetPropertiesParams = match serde_json::from_value(ctx.task.metadata.clone())
        {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid zpool metadata: {e}")),
        };
        if params.properties.is_empty() {
            return TaskOutcome::fail("no properties to set");
        }

        let updates = params.properties.iter().map(|(key, value)| {
            let command = format!(
                "pfexec zpool set {} {}",
                sh_quote(&format!("{key}={value}")),
                sh_quote(&params.pool_name)
            );
            let runner = self.runner;
            let key = key.clone();
            async move { (key, runner.run(&command).await) }
        });

        let mut applied: Vec<String> = Vec::new();
        let mut errors: Vec<String> = Vec::new();
        for (key, result) in join_all(updates).await {
            if result.success {
                applied.push(key);
            } else {
                errors.push(format!("{key}: {}", result.error));
            }
        }

        let info = json!({"applied": applied, "errors": errors});
        if errors.is_empty() {
            TaskOutcome::ok_with(
                format!("set {} properties on {}", applied.len(), params.pool_name),
                info,
            )
        } else if applied.is_empty() {
            TaskOutcome::fail_with(format!("all property updates failed: {}", errors.join("; ")), info)
        } else {
            // Partial success: some units applied.
            TaskOutcome::ok_with(
                format!(
                    "set {} of {} properties on {} ({} failed)",
                    applied.len(),
                    applied.len() + errors.len(),
                    params.pool_name,
                    errors.len()
                ),
                info,
            )
        }
    }
}

#[cfg(test)]
#[path = "zpool_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Host lifecycle executors: restart, reboot, shutdown, power-off, halt,
//! runlevel changes.
//!
//! Every request carries `confirm: true` (validated at the API and again
//! here); `halt` additionally requires `emergency: true`. A shutdown may
//! carry a zone-orchestration plan, executed as a sub-plan inside this
//! one task, never as separately enqueued tasks.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use warden_adapters::{sh_quote, CommandRunner};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

pub const MAX_GRACE_PERIOD: i64 = 7200;
pub const MAX_MESSAGE_LEN: usize = 200;

/// Grace period must sit in [0, 7200] seconds.
pub fn validate_grace_period(seconds: i64) -> Result<(), String> {
    if seconds < 0 {
        return Err("Grace period cannot be negative".to_string());
    }
    if seconds > MAX_GRACE_PERIOD {
        return Err("Grace period cannot exceed 2 hours".to_string());
    }
    Ok(())
}

/// Strip shell-significant quotes and enforce the length cap.
pub fn sanitize_message(message: &str) -> Result<String, String> {
    if message.len() > MAX_MESSAGE_LEN {
        return Err(format!("Message cannot exceed {MAX_MESSAGE_LEN} characters"));
    }
    Ok(message.chars().filter(|c| !matches!(c, '\'' | '"' | '`')).collect())
}

pub fn validate_runlevel(runlevel: &str) -> Result<(), String> {
    match runlevel {
        "0" | "1" | "2" | "3" | "4" | "5" | "6" | "s" | "S" => Ok(()),
        other => Err(format!("Invalid runlevel: {other}")),
    }
}

/// The closed set of host lifecycle actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostAction {
    Restart,
    Reboot,
    FastReboot,
    Shutdown,
    Poweroff,
    Halt,
    RunlevelChange,
    SingleUser,
    MultiUser,
}

impl HostAction {
    pub fn requires_emergency(self) -> bool {
        matches!(self, HostAction::Halt)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostAction::Restart => "restart",
            HostAction::Reboot => "reboot",
            HostAction::FastReboot => "fast reboot",
            HostAction::Shutdown => "shutdown",
            HostAction::Poweroff => "poweroff",
            HostAction::Halt => "halt",
            HostAction::RunlevelChange => "runlevel change",
            HostAction::SingleUser => "single-user",
            HostAction::MultiUser => "multi-user",
        }
    }
}

impl std::fmt::Display for HostAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct HostParams {
    #[serde(default)]
    confirm: bool,
    #[serde(default)]
    emergency: bool,
    #[serde(default)]
    grace_period: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    runlevel: Option<String>,
    #[serde(default)]
    zone_orchestration: Option<ZoneOrchestration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ZoneOrchestration {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub strategy: OrchestrationStrategy,
    #[serde(default)]
    pub failure_action: FailureAction,
    /// Delay between batches for the staggered strategy, in seconds.
    #[serde(default)]
    pub priority_delay: u64,
    /// Per-zone shutdown timeout, in seconds.
    #[serde(default = "default_zone_timeout")]
    pub zone_timeout: u64,
}

fn default_zone_timeout() -> u64 {
    60
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStrategy {
    #[default]
    Sequential,
    ParallelByPriority,
    Staggered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    #[default]
    Abort,
    ForceStuck,
    SkipStuck,
}

/// Build the lifecycle command for an action.
fn build_command(
    action: HostAction,
    grace_period: i64,
    message: &str,
    runlevel: Option<&str>,
) -> Result<String, String> {
    let message_arg = if message.is_empty() {
        String::new()
    } else {
        format!(" {}", sh_quote(message))
    };
    Ok(match action {
        HostAction::Restart => {
            format!("pfexec shutdown -y -i6 -g {grace_period}{message_arg}")
        }
        HostAction::Reboot => "pfexec reboot".to_string(),
        HostAction::FastReboot => "pfexec reboot -f".to_string(),
        HostAction::Shutdown => {
            format!("pfexec shutdown -y -i5 -g {grace_period}{message_arg}")
        }
        HostAction::Poweroff => "pfexec poweroff".to_string(),
        HostAction::Halt => "pfexec halt".to_string(),
        HostAction::RunlevelChange => {
            let Some(runlevel) = runlevel else {
                return Err("runlevel is required".to_string());
            };
            validate_runlevel(runlevel)?;
            format!("pfexec init {runlevel}")
        }
        HostAction::SingleUser => {
            format!("pfexec shutdown -y -i s -g {grace_period}{message_arg}")
        }
        HostAction::MultiUser => "pfexec init 3".to_string(),
    })
}

pub struct HostLifecycleHandler {
    runner: CommandRunner,
    action: HostAction,
}

impl HostLifecycleHandler {
    pub fn new(runner: CommandRunner, action: HostAction) -> Self {
        Self { runner, action }
    }
}

#[async_trait]
impl TaskHandler for HostLifecycleHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: HostParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid host metadata: {e}")),
        };

        // The API validates; re-check here so a hand-written row cannot
        // power off the host.
        if !params.confirm {
            return TaskOutcome::fail("Confirmation required");
        }
        if self.action.requires_emergency() && !params.emergency {
            return TaskOutcome::fail("Emergency confirmation required for halt");
        }
        if let Err(e) = validate_grace_period(params.grace_period) {
            return TaskOutcome::fail(e);
        }
        let message = match params.message.as_deref().map(sanitize_message).transpose() {
            Ok(message) => message.unwrap_or_default(),
            Err(e) => return TaskOutcome::fail(e),
        };

        let mut orchestration_summary = None;
        if self.action == HostAction::Shutdown {
            if let Some(plan) = params.zone_orchestration.as_ref().filter(|p| p.enabled) {
                match orchestrate_zones(&self.runner, plan, &ctx).await {
                    Ok(summary) => orchestration_summary = Some(summary),
                    Err(e) => return TaskOutcome::fail(format!("zone orchestration failed: {e}")),
                }
            }
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail(format!("{} cancelled", self.action));
        }

        let command =
            match build_command(self.action, params.grace_period, &message, params.runlevel.as_deref())
            {
                Ok(command) => command,
                Err(e) => return TaskOutcome::fail(e),
            };
        tracing::warn!(action = %self.action, command = %command, "executing host lifecycle action");

        let result = self.runner.run_with_timeout(&command, Duration::from_secs(120)).await;
        if result.success {
            TaskOutcome::ok_with(
                format!("host {} initiated", self.action),
                json!({"zone_orchestration": orchestration_summary}),
            )
        } else {
            TaskOutcome::fail(result.error)
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
struct OrchestrationSummary {
    stopped: Vec<String>,
    forced: Vec<String>,
    skipped: Vec<String>,
}

/// Shut down non-global zones per the orchestration plan. Runs inside the
/// shutdown task as a sub-plan.
async fn orchestrate_zones(
    runner: &CommandRunner,
    plan: &ZoneOrchestration,
    ctx: &TaskContext,
) -> Result<serde_json::Value, String> {
    let listing = runner.run("zoneadm list").await;
    if !listing.success {
        return Err(format!("zoneadm list failed: {}", listing.error));
    }
    let zones: Vec<String> = listing
        .output
        .lines()
        .map(str::trim)
        .filter(|z| !z.is_empty() && *z != "global")
        .map(str::to_string)
        .collect();

    let timeout = Duration::from_secs(plan.zone_timeout.max(1));
    let mut summary = OrchestrationSummary::default();

    match plan.strategy {
        OrchestrationStrategy::ParallelByPriority => {
            let shutdowns = zones.iter().map(|zone| {
                let runner = *runner;
                let zone = zone.clone();
                async move {
                    let result = runner
                        .run_with_timeout(
                            &format!("pfexec zoneadm -z {} shutdown", sh_quote(&zone)),
                            timeout,
                        )
                        .await;
                    (zone, result.success)
                }
            });
            for (zone, stopped) in join_all(shutdowns).await {
                if stopped {
                    summary.stopped.push(zone);
                } else {
                    handle_stuck(runner, plan, &zone, &mut summary, timeout).await?;
                }
            }
        }
        OrchestrationStrategy::Sequential | OrchestrationStrategy::Staggered => {
            for (index, zone) in zones.iter().enumerate() {
                if ctx.is_cancelled() {
                    return Err("cancelled during zone orchestration".to_string());
                }
                if index > 0 && plan.strategy == OrchestrationStrategy::Staggered {
                    tokio::time::sleep(Duration::from_secs(plan.priority_delay)).await;
                }
                let result = runner
                    .run_with_timeout(
                        &format!("pfexec zoneadm -z {} shutdown", sh_quote(zone)),
                        timeout,
                    )
                    .await;
                if result.success {
                    summary.stopped.push(zone.clone());
                } else {
                    handle_stuck(runner, plan, zone, &mut summary, timeout).await?;
                }
                ctx.progress.update(
                    Some((((index + 1) * 50) / zones.len().max(1)) as u8),
                    Some(json!({"status": "stopping zones", "done": index + 1, "total": zones.len()})),
                );
            }
        }
    }

    serde_json::to_value(&summary).map_err(|e| e.to_string())
}

async fn handle_stuck(
    runner: &CommandRunner,
    plan: &ZoneOrchestration,
    zone: &str,
    summary: &mut OrchestrationSummary,
    timeout: Duration,
) -> Result<(), String> {
    match plan.failure_action {
        FailureAction::Abort => Err(format!("zone {zone} did not shut down")),
        FailureAction::ForceStuck => {
            let halt = runner
                .run_with_timeout(&format!("pfexec zoneadm -z {} halt", sh_quote(zone)), timeout)
                .await;
            if halt.success {
                summary.forced.push(zone.to_string());
                Ok(())
            } else {
                Err(format!("zone {zone} could not be halted: {}", halt.error))
            }
        }
        FailureAction::SkipStuck => {
            tracing::warn!(zone, "skipping stuck zone during shutdown orchestration");
            summary.skipped.push(zone.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;

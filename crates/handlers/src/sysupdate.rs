// SPDX-License-Identifier: MIT

//! System update executors and the `pkg` dry-run/history parsers.
//!
//! `check` is synchronous (the API calls it directly); `install` and
//! `refresh` run as tasks.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use warden_adapters::{CommandRunner, PKG_COMMAND_TIMEOUT};
use warden_core::TaskOutcome;
use warden_queue::{TaskContext, TaskHandler};

/// `pkg` exits 4 when there is nothing to do.
const PKG_EXIT_NOTHING_TO_DO: i32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PackageChange {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PublisherChanges {
    pub publisher: String,
    pub packages: Vec<PackageChange>,
}

/// Parsed `pkg update -nv` plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpdatePlan {
    pub packages_to_update: u64,
    pub create_boot_environment: bool,
    pub publishers: Vec<PublisherChanges>,
}

/// Result of a synchronous update check.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCheck {
    pub updates_available: bool,
    pub plan: UpdatePlan,
    pub raw: String,
}

/// Parse the human-readable `pkg update -nv` plan.
///
/// The plan summary uses `Key: value` lines; the `Changed packages:`
/// section groups package names (indented) under publishers (flush), with
/// `old -> new` version lines nested one level deeper.
pub fn parse_update_plan(output: &str) -> UpdatePlan {
    let mut plan = UpdatePlan::default();
    let mut in_changed = false;

    for line in output.lines() {
        let trimmed = line.trim();
        if let Some(value) = summary_value(trimmed, "Packages to update:") {
            plan.packages_to_update = value.parse().unwrap_or(0);
            continue;
        }
        if let Some(value) = summary_value(trimmed, "Packages to install:") {
            plan.packages_to_update += value.parse().unwrap_or(0);
            continue;
        }
        if let Some(value) = summary_value(trimmed, "Create boot environment:") {
            plan.create_boot_environment = value.eq_ignore_ascii_case("yes");
            continue;
        }
        if trimmed == "Changed packages:" {
            in_changed = true;
            continue;
        }
        if !in_changed {
            continue;
        }
        if trimmed.is_empty() {
            // A blank line ends the changed-packages section.
            in_changed = false;
            continue;
        }

        let indent = line.len() - line.trim_start().len();
        if indent == 0 {
            plan.publishers.push(PublisherChanges {
                publisher: trimmed.to_string(),
                packages: Vec::new(),
            });
        } else if let Some((from, to)) = trimmed.split_once("->") {
            if let Some(publisher) = plan.publishers.last_mut() {
                if let Some(package) = publisher.packages.last_mut() {
                    package.from_version = Some(from.trim().to_string());
                    package.to_version = Some(to.trim().to_string());
                }
            }
        } else if let Some(publisher) = plan.publishers.last_mut() {
            publisher.packages.push(PackageChange {
                name: trimmed.to_string(),
                from_version: None,
                to_version: None,
            });
        }
    }
    plan
}

fn summary_value<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key).map(str::trim)
}

/// Synchronous dry-run check.
pub async fn check_updates(runner: &CommandRunner) -> Result<UpdateCheck, String> {
    let result = runner.run_with_timeout("pfexec pkg update -nv", PKG_COMMAND_TIMEOUT).await;
    if result.success {
        return Ok(UpdateCheck {
            updates_available: true,
            plan: parse_update_plan(&result.output),
            raw: result.output,
        });
    }
    if result.exit_code == Some(PKG_EXIT_NOTHING_TO_DO) {
        return Ok(UpdateCheck {
            updates_available: false,
            plan: UpdatePlan::default(),
            raw: result.output,
        });
    }
    Err(format!("pkg update -nv failed: {}", result.error))
}

/// One `pkg history -H` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub start_time: String,
    pub operation: String,
    pub client: String,
    pub outcome: String,
}

/// Parse `pkg history -H` (whitespace-separated columns).
pub fn parse_history(output: &str) -> Vec<HistoryEntry> {
    output
        .lines()
        .filter_map(|line| {
            let mut columns = line.split_whitespace();
            Some(HistoryEntry {
                start_time: columns.next()?.to_string(),
                operation: columns.next()?.to_string(),
                client: columns.next()?.to_string(),
                outcome: columns.collect::<Vec<_>>().join(" "),
            })
        })
        .filter(|entry| !entry.outcome.is_empty())
        .collect()
}

pub async fn update_history(runner: &CommandRunner) -> Result<Vec<HistoryEntry>, String> {
    let result = runner.run("pfexec pkg history -H").await;
    if result.success {
        Ok(parse_history(&result.output))
    } else {
        Err(format!("pkg history failed: {}", result.error))
    }
}

/// `pkg update` as a task.
pub struct UpdateInstallHandler {
    runner: CommandRunner,
}

impl UpdateInstallHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for UpdateInstallHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        ctx.progress.update(Some(5), Some(json!({"status": "updating"})));
        let result =
            self.runner.run_with_timeout("pfexec pkg update --accept", PKG_COMMAND_TIMEOUT).await;
        if result.success {
            let plan = parse_update_plan(&result.output);
            TaskOutcome::ok_with(
                format!("system update applied ({} packages)", plan.packages_to_update),
                json!({"packages_updated": plan.packages_to_update, "boot_environment": plan.create_boot_environment}),
            )
        } else if result.exit_code == Some(PKG_EXIT_NOTHING_TO_DO) {
            TaskOutcome::ok("system already up to date")
        } else {
            TaskOutcome::fail(format!("pkg update failed: {}", result.error))
        }
    }
}

/// `pkg refresh --full` as a task.
pub struct UpdateRefreshHandler {
    runner: CommandRunner,
}

impl UpdateRefreshHandler {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl TaskHandler for UpdateRefreshHandler {
    async fn run(&self, _ctx: TaskContext) -> TaskOutcome {
        let result =
            self.runner.run_with_timeout("pfexec pkg refresh --full", PKG_COMMAND_TIMEOUT).await;
        if result.success {
            TaskOutcome::ok("package metadata refreshed")
        } else {
            TaskOutcome::fail(format!("pkg refresh failed: {}", result.error))
        }
    }
}

#[cfg(test)]
#[path = "sysupdate_tests.rs"]
mod tests;

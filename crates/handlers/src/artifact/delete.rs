// SPDX-License-Identifier: MIT

//! Deletion executors: per-artifact file removal and storage-folder
//! clearing.

use super::ArtifactEngine;
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::json;
use warden_adapters::sh_quote;
use warden_core::{ArtifactId, LocationId, TaskOutcome};
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Deserialize)]
struct DeleteFileParams {
    artifact_ids: Vec<String>,
    #[serde(default = "default_true")]
    delete_files: bool,
    #[serde(default)]
    force: bool,
}

fn default_true() -> bool {
    true
}

pub struct DeleteFileHandler {
    engine: ArtifactEngine,
}

impl DeleteFileHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for DeleteFileHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: DeleteFileParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid delete metadata: {e}")),
        };
        if params.artifact_ids.is_empty() {
            return TaskOutcome::fail("artifact_ids is empty");
        }

        let ids: Vec<ArtifactId> =
            params.artifact_ids.iter().map(ArtifactId::from_string).collect();
        let artifacts = match ctx.store.get_artifacts(&ids).await {
            Ok(artifacts) => artifacts,
            Err(e) => return TaskOutcome::fail(format!("store error: {e}")),
        };
        let missing = ids.len() - artifacts.len();

        // File removals fan out in parallel; each reports its own error
        // and the rest continue.
        let mut errors: Vec<String> = Vec::new();
        let mut removed_rows: Vec<ArtifactId> = Vec::new();
        if params.delete_files {
            let flag = if params.force { "-f " } else { "" };
            let deletions = artifacts.iter().map(|artifact| {
                let command = format!("pfexec rm {}{}", flag, sh_quote(&artifact.path));
                let runner = self.engine.runner;
                async move { (artifact, runner.run(&command).await) }
            });
            for (artifact, result) in join_all(deletions).await {
                if result.success {
                    removed_rows.push(artifact.id.clone());
                } else {
                    errors.push(format!("{}: {}", artifact.path, result.error));
                }
            }
        } else {
            removed_rows.extend(artifacts.iter().map(|a| a.id.clone()));
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail("delete cancelled".to_string());
        }

        // Rows and aggregates follow only the files that actually went away.
        let removed_set: std::collections::HashSet<&str> =
            removed_rows.iter().map(|id| id.as_str()).collect();
        if let Err(e) = ctx.store.bulk_delete_artifacts(&removed_rows).await {
            return TaskOutcome::fail(format!("store error: {e}"));
        }
        for artifact in artifacts.iter().filter(|a| removed_set.contains(a.id.as_str())) {
            if let Err(e) = ctx
                .store
                .adjust_location_aggregates(&artifact.storage_location_id, -1, -artifact.size)
                .await
            {
                return TaskOutcome::fail(format!("store error: {e}"));
            }
        }

        let info = json!({
            "requested": ids.len(),
            "deleted": removed_rows.len(),
            "missing": missing,
            "errors": errors,
        });
        if errors.is_empty() && missing == 0 {
            TaskOutcome::ok_with(format!("deleted {} artifacts", removed_rows.len()), info)
        } else {
            TaskOutcome::fail_with(
                format!(
                    "deleted {} of {} artifacts ({} errors, {} not found)",
                    removed_rows.len(),
                    ids.len(),
                    errors.len(),
                    missing
                ),
                info,
            )
        }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteFolderParams {
    storage_location_id: String,
    #[serde(default)]
    recursive: bool,
    #[serde(default = "default_true")]
    remove_db_records: bool,
    #[serde(default)]
    force: bool,
}

pub struct DeleteFolderHandler {
    engine: ArtifactEngine,
}

impl DeleteFolderHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for DeleteFolderHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: DeleteFolderParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid delete metadata: {e}")),
        };
        let location_id = LocationId::from_string(&params.storage_location_id);
        let location = match ctx.store.get_location(&location_id).await {
            Ok(Some(location)) => location,
            Ok(None) => {
                return TaskOutcome::fail(format!(
                    "storage location {} not found",
                    params.storage_location_id
                ));
            }
            Err(e) => return TaskOutcome::fail(format!("store error: {e}")),
        };

        // Contents only by default; the directory itself goes away only on
        // an explicitly recursive request.
        let flag = if params.force { "-rf" } else { "-r" };
        let command = if params.recursive {
            format!("pfexec rm {} {}", flag, sh_quote(&location.path))
        } else {
            format!("pfexec sh -c {}", sh_quote(&format!("rm {} {}/*", flag, location.path)))
        };
        let result = self.engine.runner.run(&command).await;
        if !result.success && !params.force {
            return TaskOutcome::fail(format!(
                "failed to delete contents of {}: {}",
                location.path, result.error
            ));
        }

        if ctx.is_cancelled() {
            return TaskOutcome::fail("delete cancelled".to_string());
        }

        let mut rows_removed = 0;
        if params.remove_db_records {
            rows_removed = match ctx.store.delete_artifacts_for_location(&location.id).await {
                Ok(count) => count,
                Err(e) => return TaskOutcome::fail(format!("store error: {e}")),
            };
            if let Err(e) = ctx.store.delete_location(&location.id).await {
                return TaskOutcome::fail(format!("store error: {e}"));
            }
        } else if let Err(e) = ctx
            .store
            .refresh_location_aggregates(&location.id, self.engine.clock_now())
            .await
        {
            return TaskOutcome::fail(format!("store error: {e}"));
        }

        TaskOutcome::ok_with(
            format!("cleared storage path {}", location.path),
            json!({
                "path": location.path,
                "recursive": params.recursive,
                "rows_removed": rows_removed,
            }),
        )
    }
}

#[cfg(test)]
#[path = "delete_tests.rs"]
mod tests;

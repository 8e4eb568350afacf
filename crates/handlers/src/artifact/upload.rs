// SPDX-License-Identifier: MIT

//! Upload post-processing: the multipart preamble has already staged the
//! file at `final_path`; this executor verifies and records it.

use super::{checksum, ArtifactEngine};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use warden_adapters::sh_quote;
use warden_core::{Artifact, ArtifactId, ChecksumAlgorithm, LocationId, TaskOutcome};
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Deserialize)]
struct UploadProcessParams {
    final_path: String,
    original_name: String,
    #[serde(default)]
    size: Option<i64>,
    storage_location_id: String,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    checksum_algorithm: ChecksumAlgorithm,
}

pub struct UploadProcessHandler {
    engine: ArtifactEngine,
}

impl UploadProcessHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for UploadProcessHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: UploadProcessParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid upload metadata: {e}")),
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

        let size = match tokio::fs::metadata(&params.final_path).await {
            Ok(metadata) => metadata.len() as i64,
            Err(e) => {
                return TaskOutcome::fail(format!(
                    "staged upload missing at {}: {e}",
                    params.final_path
                ));
            }
        };
        if let Some(declared) = params.size {
            if declared != size {
                tracing::warn!(
                    path = %params.final_path,
                    declared,
                    actual = size,
                    "upload size differs from multipart declaration"
                );
            }
        }

        let calculated = match checksum::hash_file(
            std::path::Path::new(&params.final_path),
            params.checksum_algorithm,
        )
        .await
        {
            Ok(digest) => digest,
            Err(e) => {
                return TaskOutcome::fail(format!("failed to hash {}: {e}", params.final_path));
            }
        };

        let checksum_verified = match &params.checksum {
            Some(expected) => {
                let expected = expected.trim().to_ascii_lowercase();
                if expected != calculated {
                    self.remove_file(&params.final_path).await;
                    return TaskOutcome::fail(format!(
                        "checksum mismatch: expected {expected}, calculated {calculated}"
                    ));
                }
                Some(true)
            }
            None => None,
        };

        let existing = match ctx.store.get_artifact_by_path(&params.final_path).await {
            Ok(existing) => existing,
            Err(e) => return TaskOutcome::fail(format!("store error: {e}")),
        };
        let now = self.engine.clock_now();
        let extension = warden_core::file_extension(&params.original_name);
        let artifact = Artifact {
            id: existing.as_ref().map(|a| a.id.clone()).unwrap_or_else(ArtifactId::new),
            storage_location_id: location.id.clone(),
            filename: params.original_name.clone(),
            path: params.final_path.clone(),
            size,
            file_type: location.kind,
            mime_type: extension.as_deref().map(|e| warden_core::mime_type_for(e).to_string()),
            extension,
            checksum: Some(calculated.clone()),
            checksum_algorithm: Some(params.checksum_algorithm),
            checksum_verified,
            source_url: None,
            discovered_at: now,
            last_verified: Some(now),
        };
        if let Err(e) = ctx.store.upsert_artifact_by_path(&artifact).await {
            return TaskOutcome::fail(format!("store error: {e}"));
        }

        let (delta_count, delta_size) = match &existing {
            Some(previous) => (0, size - previous.size),
            None => (1, size),
        };
        if let Err(e) =
            ctx.store.adjust_location_aggregates(&location.id, delta_count, delta_size).await
        {
            return TaskOutcome::fail(format!("store error: {e}"));
        }

        TaskOutcome::ok_with(
            format!("processed upload {} ({size} bytes)", params.original_name),
            json!({
                "status": "completed",
                "path": params.final_path,
                "size_bytes": size,
                "checksum": calculated,
                "checksum_algorithm": params.checksum_algorithm.as_str(),
            }),
        )
    }
}

impl UploadProcessHandler {
    async fn remove_file(&self, path: &str) {
        let result = self.engine.runner.run(&format!("pfexec rm -f {}", sh_quote(path))).await;
        if !result.success {
            tracing::warn!(path = %path, error = %result.error, "failed to remove rejected upload");
        }
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;

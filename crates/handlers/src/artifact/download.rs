// SPDX-License-Identifier: MIT

//! URL download executor: stream to disk, verify, record.

use super::{checksum, filename_from_url, join_location_path, ArtifactEngine};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use warden_adapters::sh_quote;
use warden_core::{Artifact, ArtifactId, ChecksumAlgorithm, LocationId, TaskOutcome};
use warden_queue::{TaskContext, TaskHandler};

#[derive(Debug, Deserialize)]
struct DownloadParams {
    url: String,
    storage_location_id: String,
    #[serde(default)]
    filename: Option<String>,
    /// Resolved at enqueue time; also the single-writer fence key.
    #[serde(default)]
    final_path: Option<String>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    checksum_algorithm: ChecksumAlgorithm,
    #[serde(default)]
    overwrite_existing: bool,
}

pub struct DownloadUrlHandler {
    engine: ArtifactEngine,
}

impl DownloadUrlHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for DownloadUrlHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: DownloadParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid download metadata: {e}")),
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
        if !location.enabled {
            return TaskOutcome::fail(format!("storage location {} is disabled", location.name));
        }

        let filename = match params.filename.clone().or_else(|| filename_from_url(&params.url)) {
            Some(filename) => filename,
            None => {
                return TaskOutcome::fail(format!(
                    "cannot derive a filename from url {}",
                    params.url
                ));
            }
        };
        let final_path = params
            .final_path
            .clone()
            .unwrap_or_else(|| join_location_path(&location.path, &filename));

        let already_exists = tokio::fs::try_exists(&final_path).await.unwrap_or(false);
        if already_exists && !params.overwrite_existing {
            return TaskOutcome::fail(format!(
                "file already exists at {final_path} and overwrite_existing is false"
            ));
        }

        // The service runs unprivileged; the storage roots are root-owned.
        // Pre-create with privilege and open the mode so we can stream.
        let precreate = self
            .engine
            .runner
            .run(&format!(
                "pfexec touch {p} && pfexec chmod 666 {p}",
                p = sh_quote(&final_path)
            ))
            .await;
        if !precreate.success {
            return TaskOutcome::fail(format!("failed to pre-create {final_path}: {}", precreate.error));
        }

        match self.download_and_verify(&ctx, &params, &filename, &final_path, &location).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.remove_file(&final_path).await;
                TaskOutcome::fail(error)
            }
        }
    }
}

impl DownloadUrlHandler {
    async fn download_and_verify(
        &self,
        ctx: &TaskContext,
        params: &DownloadParams,
        filename: &str,
        final_path: &str,
        location: &warden_core::StorageLocation,
    ) -> Result<TaskOutcome, String> {
        let downloaded = self.stream_to_file(ctx, &params.url, final_path).await?;

        ctx.progress
            .update_now(
                Some(99),
                Some(serde_json::json!({
                    "status": "verifying",
                    "downloaded_mb": mb(downloaded),
                })),
            )
            .await;

        // Re-read the file so the recorded digest covers what actually
        // landed on disk, not what passed through the stream.
        let calculated = checksum::hash_file(std::path::Path::new(final_path), params.checksum_algorithm)
            .await
            .map_err(|e| format!("failed to hash {final_path}: {e}"))?;

        let checksum_verified = match &params.checksum {
            Some(expected) => {
                let expected = expected.trim().to_ascii_lowercase();
                if expected != calculated {
                    return Err(format!(
                        "checksum mismatch: expected {expected}, calculated {calculated}"
                    ));
                }
                Some(true)
            }
            None => None,
        };

        // Idempotent against a concurrent scan having inserted a bare row.
        let existing = ctx
            .store
            .get_artifact_by_path(final_path)
            .await
            .map_err(|e| format!("store error: {e}"))?;

        let now = self.engine.clock.now_utc();
        let extension = warden_core::file_extension(filename);
        let artifact = Artifact {
            id: existing.as_ref().map(|a| a.id.clone()).unwrap_or_else(ArtifactId::new),
            storage_location_id: location.id.clone(),
            filename: filename.to_string(),
            path: final_path.to_string(),
            size: downloaded as i64,
            file_type: location.kind,
            mime_type: extension.as_deref().map(|e| warden_core::mime_type_for(e).to_string()),
            extension,
            checksum: Some(calculated.clone()),
            checksum_algorithm: Some(params.checksum_algorithm),
            checksum_verified,
            source_url: Some(params.url.clone()),
            discovered_at: now,
            last_verified: Some(now),
        };
        ctx.store
            .upsert_artifact_by_path(&artifact)
            .await
            .map_err(|e| format!("store error: {e}"))?;

        // Aggregate maintenance: new file adds a row; an overwrite only
        // shifts the size.
        let (delta_count, delta_size) = match &existing {
            Some(previous) => (0, downloaded as i64 - previous.size),
            None => (1, downloaded as i64),
        };
        ctx.store
            .adjust_location_aggregates(&location.id, delta_count, delta_size)
            .await
            .map_err(|e| format!("store error: {e}"))?;

        Ok(TaskOutcome::ok_with(
            format!("downloaded {filename} ({} bytes)", downloaded),
            serde_json::json!({
                "status": "completed",
                "path": final_path,
                "size_bytes": downloaded,
                "checksum": calculated,
                "checksum_algorithm": params.checksum_algorithm.as_str(),
            }),
        ))
    }

    /// Stream the HTTP body to the pre-created file, reporting throttled
    /// progress. Returns the byte count.
    async fn stream_to_file(
        &self,
        ctx: &TaskContext,
        url: &str,
        final_path: &str,
    ) -> Result<u64, String> {
        let response = self
            .engine
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| format!("download request failed: {e}"))?;
        let total = response.content_length();

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(final_path)
            .await
            .map_err(|e| format!("cannot open {final_path} for writing: {e}"))?;

        let started = Instant::now();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if ctx.is_cancelled() {
                return Err("download cancelled".to_string());
            }
            let chunk = chunk.map_err(|e| format!("download stream error: {e}"))?;
            file.write_all(&chunk).await.map_err(|e| format!("write error: {e}"))?;
            downloaded += chunk.len() as u64;

            let elapsed = started.elapsed().as_secs_f64().max(0.001);
            let speed_mbps = mb(downloaded) / elapsed;
            let (percent, eta_seconds) = match total {
                Some(total) if total > 0 => {
                    let percent = ((downloaded * 100) / total).min(99) as u8;
                    let remaining = total.saturating_sub(downloaded);
                    let eta = (mb(remaining) / speed_mbps.max(0.001)) as u64;
                    (Some(percent), Some(eta))
                }
                _ => (None, None),
            };
            // Fire-and-forget; the writer throttles to the configured
            // interval and never blocks this loop.
            ctx.progress.update(
                percent,
                Some(serde_json::json!({
                    "status": "downloading",
                    "downloaded_mb": mb(downloaded),
                    "total_mb": total.map(mb),
                    "speed_mbps": speed_mbps,
                    "eta_seconds": eta_seconds,
                })),
            );
        }

        file.flush().await.map_err(|e| format!("write error: {e}"))?;
        Ok(downloaded)
    }

    async fn remove_file(&self, final_path: &str) {
        let result =
            self.engine.runner.run(&format!("pfexec rm -f {}", sh_quote(final_path))).await;
        if !result.success {
            tracing::warn!(path = %final_path, error = %result.error, "failed to remove partial download");
        }
    }
}

fn mb(bytes: u64) -> f64 {
    (bytes as f64) / (1024.0 * 1024.0)
}

#[cfg(test)]
#[path = "download_tests.rs"]
mod tests;

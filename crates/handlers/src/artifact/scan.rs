// SPDX-License-Identifier: MIT

//! Filesystem scan executors: reconcile a storage location's directory
//! with the inventory.
//!
//! The scan classifies work first (skip / insert / touch / remove) and
//! then applies it with bulk writes. Files that are mid-download are
//! skipped entirely so a partial file never receives a row.

use super::{checksum, ArtifactEngine};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use warden_core::{LocationId, StorageLocation, TaskOutcome};
use warden_queue::{TaskContext, TaskHandler};
use warden_store::NewArtifact;

#[derive(Debug, Deserialize)]
struct ScanLocationParams {
    storage_location_id: String,
    #[serde(default)]
    verify_checksums: bool,
    #[serde(default)]
    remove_orphaned: bool,
}

#[derive(Debug, Deserialize, Default)]
struct ScanAllParams {
    #[serde(default)]
    verify_checksums: bool,
    #[serde(default)]
    remove_orphaned: bool,
}

/// Result of scanning one location.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScanSummary {
    pub scanned: u64,
    pub added: u64,
    pub removed: u64,
    pub skipped: u64,
}

pub struct ScanLocationHandler {
    engine: ArtifactEngine,
}

impl ScanLocationHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for ScanLocationHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ScanLocationParams = match serde_json::from_value(ctx.task.metadata.clone()) {
            Ok(params) => params,
            Err(e) => return TaskOutcome::fail(format!("invalid scan metadata: {e}")),
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

        match scan_location(&self.engine, &ctx, &location, params.verify_checksums, params.remove_orphaned)
            .await
        {
            Ok(summary) => TaskOutcome::ok_with(
                format!(
                    "scanned {}: {} added, {} removed, {} skipped",
                    location.name, summary.added, summary.removed, summary.skipped
                ),
                json!(summary),
            ),
            Err(error) => {
                if let Err(e) = ctx.store.record_location_scan_error(&location.id, &error).await {
                    tracing::warn!(location = %location.name, error = %e, "failed to record scan error");
                }
                TaskOutcome::fail(error)
            }
        }
    }
}

pub struct ScanAllHandler {
    engine: ArtifactEngine,
}

impl ScanAllHandler {
    pub fn new(engine: ArtifactEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for ScanAllHandler {
    async fn run(&self, ctx: TaskContext) -> TaskOutcome {
        let params: ScanAllParams =
            serde_json::from_value(ctx.task.metadata.clone()).unwrap_or_default();
        let locations = match ctx.store.list_locations(None, Some(true)).await {
            Ok(locations) => locations,
            Err(e) => return TaskOutcome::fail(format!("store error: {e}")),
        };
        if locations.is_empty() {
            return TaskOutcome::ok("no enabled storage locations to scan");
        }

        let total = locations.len();
        let mut combined = ScanSummary::default();
        let mut errors: Vec<String> = Vec::new();
        for (index, location) in locations.iter().enumerate() {
            if ctx.is_cancelled() {
                return TaskOutcome::fail("scan cancelled".to_string());
            }
            match scan_location(&self.engine, &ctx, location, params.verify_checksums, params.remove_orphaned)
                .await
            {
                Ok(summary) => {
                    combined.scanned += summary.scanned;
                    combined.added += summary.added;
                    combined.removed += summary.removed;
                    combined.skipped += summary.skipped;
                }
                Err(error) => {
                    if let Err(e) =
                        ctx.store.record_location_scan_error(&location.id, &error).await
                    {
                        tracing::warn!(location = %location.name, error = %e, "failed to record scan error");
                    }
                    errors.push(format!("{}: {error}", location.name));
                }
            }
            ctx.progress.update(
                Some((((index + 1) * 100) / total) as u8),
                Some(json!({"status": "scanning", "locations_done": index + 1, "locations_total": total})),
            );
        }

        // Bulk semantics: the task succeeds when at least one location
        // scanned cleanly; per-location errors ride along in the result.
        let info = json!({
            "scanned": combined.scanned,
            "added": combined.added,
            "removed": combined.removed,
            "skipped": combined.skipped,
            "errors": errors,
        });
        if errors.len() == total {
            TaskOutcome::fail_with(format!("all {total} location scans failed"), info)
        } else {
            TaskOutcome::ok_with(
                format!(
                    "scanned {} locations: {} added, {} removed, {} skipped, {} errors",
                    total, combined.added, combined.removed, combined.skipped, errors.len()
                ),
                info,
            )
        }
    }
}

/// Scan one location's directory into the inventory.
pub(crate) async fn scan_location(
    engine: &ArtifactEngine,
    ctx: &TaskContext,
    location: &StorageLocation,
    verify_checksums: bool,
    remove_orphaned: bool,
) -> Result<ScanSummary, String> {
    if !location.enabled {
        return Err(format!("storage location {} is disabled", location.name));
    }

    let extensions = engine.config.artifact_storage.scanning.supported_extensions.for_kind(location.kind);
    let on_disk = list_files(&location.path, extensions)
        .await
        .map_err(|e| format!("failed to list {}: {e}", location.path))?;

    let writing = engine.writing_paths();
    let existing: HashMap<String, warden_core::ArtifactId> = ctx
        .store
        .artifact_paths_for_location(&location.id)
        .await
        .map_err(|e| format!("store error: {e}"))?
        .into_iter()
        .map(|(id, path)| (path, id))
        .collect();

    // Classify before touching the database.
    let mut summary = ScanSummary::default();
    let mut to_insert: Vec<NewArtifact> = Vec::new();
    let mut to_touch: Vec<warden_core::ArtifactId> = Vec::new();
    let mut seen: std::collections::HashSet<&str> = std::collections::HashSet::new();
    for file in &on_disk {
        if writing.contains(&file.path) {
            summary.skipped += 1;
            continue;
        }
        summary.scanned += 1;
        seen.insert(file.path.as_str());
        match existing.get(&file.path) {
            Some(id) => to_touch.push(id.clone()),
            None => to_insert.push(NewArtifact {
                storage_location_id: location.id.clone(),
                filename: file.filename.clone(),
                path: file.path.clone(),
                size: file.size,
                file_type: location.kind,
            }),
        }
    }

    let now = engine.clock.now_utc();
    summary.added = ctx
        .store
        .bulk_insert_artifacts(&to_insert, now)
        .await
        .map_err(|e| format!("store error: {e}"))?;
    ctx.store
        .touch_artifacts_verified(&to_touch, now)
        .await
        .map_err(|e| format!("store error: {e}"))?;

    if remove_orphaned {
        let orphaned: Vec<warden_core::ArtifactId> = existing
            .iter()
            .filter(|(path, _)| !seen.contains(path.as_str()) && !writing.contains(path.as_str()))
            .map(|(_, id)| id.clone())
            .collect();
        summary.removed = ctx
            .store
            .bulk_delete_artifacts(&orphaned)
            .await
            .map_err(|e| format!("store error: {e}"))?;
    }

    if verify_checksums {
        verify_location_checksums(ctx, location, now).await?;
    }

    ctx.store
        .refresh_location_aggregates(&location.id, now)
        .await
        .map_err(|e| format!("store error: {e}"))?;

    tracing::info!(
        location = %location.name,
        scanned = summary.scanned,
        added = summary.added,
        removed = summary.removed,
        skipped = summary.skipped,
        "scan finished"
    );
    Ok(summary)
}

/// Re-hash every artifact that carries a checksum and record the verdict.
async fn verify_location_checksums(
    ctx: &TaskContext,
    location: &StorageLocation,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<(), String> {
    let artifacts = ctx
        .store
        .list_artifacts(&warden_store::ArtifactFilter {
            storage_location_id: Some(location.id.clone()),
            limit: i64::MAX,
            ..warden_store::ArtifactFilter::default()
        })
        .await
        .map_err(|e| format!("store error: {e}"))?;

    for artifact in artifacts {
        if ctx.is_cancelled() {
            return Err("scan cancelled".to_string());
        }
        let (Some(expected), Some(algorithm)) = (&artifact.checksum, artifact.checksum_algorithm)
        else {
            continue;
        };
        let calculated =
            match checksum::hash_file(std::path::Path::new(&artifact.path), algorithm).await {
                Ok(digest) => digest,
                Err(e) => {
                    tracing::warn!(path = %artifact.path, error = %e, "checksum verify skipped");
                    continue;
                }
            };
        let verified = calculated == *expected;
        if !verified {
            tracing::warn!(path = %artifact.path, "checksum verification failed");
        }
        ctx.store
            .set_artifact_checksum_verified(&artifact.id, verified, now)
            .await
            .map_err(|e| format!("store error: {e}"))?;
    }
    Ok(())
}

struct DiskFile {
    filename: String,
    path: String,
    size: i64,
}

/// Plain files directly under `dir` whose extension is supported.
async fn list_files(dir: &str, extensions: &[String]) -> std::io::Result<Vec<DiskFile>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let filename = entry.file_name().to_string_lossy().into_owned();
        let Some(extension) = warden_core::file_extension(&filename) else { continue };
        if !extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)) {
            continue;
        }
        files.push(DiskFile {
            path: format!("{}/{}", dir.trim_end_matches('/'), filename),
            filename,
            size: metadata.len() as i64,
        });
    }
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;

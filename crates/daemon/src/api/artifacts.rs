// SPDX-License-Identifier: MIT

//! Artifact storage surface: locations, inventory queries, downloads,
//! uploads, scans, and deletions.

use super::{accepted, accepted_with, ApiError, AppState, Principal};
use axum::body::Body;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use warden_adapters::sh_quote;
use warden_core::{
    ArtifactId, ChecksumAlgorithm, Clock, LocationId, LocationKind, NewTask, StorageLocation,
    TaskPriority, ZONE_ARTIFACT,
};
use warden_handlers::ops;
use warden_store::{ArtifactFilter, ArtifactSort, LocationUpdate, SortOrder};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/artifacts", get(list_artifacts))
        .route("/artifacts/iso", get(list_iso))
        .route("/artifacts/image", get(list_image))
        .route("/artifacts/stats", get(artifact_stats))
        .route("/artifacts/service/status", get(service_status))
        .route("/artifacts/download", post(download_url))
        .route("/artifacts/upload", post(upload))
        .route("/artifacts/scan", post(scan))
        .route("/artifacts/files", delete(delete_files))
        .route("/artifacts/storage/paths", get(list_locations).post(create_location))
        .route(
            "/artifacts/storage/paths/:location_id",
            axum::routing::put(update_location).delete(delete_location),
        )
        .route("/artifacts/:artifact_id", get(get_artifact))
        .route("/artifacts/:artifact_id/download", get(download_artifact))
}

fn ensure_enabled(state: &AppState) -> Result<(), ApiError> {
    if state.config.artifact_storage.enabled {
        Ok(())
    } else {
        Err(ApiError::ServiceDisabled("artifact storage is disabled".to_string()))
    }
}

// === Storage locations ===

#[derive(Debug, Deserialize)]
struct LocationListQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    enabled: Option<bool>,
}

/// `df -k` augmentation; parse failure degrades to nulls, never an error.
async fn disk_usage(state: &AppState, path: &str) -> serde_json::Value {
    let result = state.runner.run(&format!("df -k {}", sh_quote(path))).await;
    if !result.success {
        return json!({"disk_total": null, "disk_used": null, "disk_available": null});
    }
    // Second line: fs 1k-blocks used available capacity mount
    let fields: Vec<&str> = result
        .output
        .lines()
        .nth(1)
        .map(|line| line.split_whitespace().collect())
        .unwrap_or_default();
    let kb = |index: usize| {
        fields
            .get(index)
            .and_then(|v| v.parse::<i64>().ok())
            .map(|blocks| blocks * 1024)
    };
    json!({"disk_total": kb(1), "disk_used": kb(2), "disk_available": kb(3)})
}

async fn list_locations(
    State(state): State<AppState>,
    Query(query): Query<LocationListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| {
            LocationKind::parse(k).ok_or_else(|| ApiError::bad_request(format!("invalid type: {k}")))
        })
        .transpose()?;
    let locations = state.store.list_locations(kind, query.enabled).await?;

    let mut augmented = Vec::with_capacity(locations.len());
    for location in locations {
        let usage = disk_usage(&state, &location.path).await;
        let mut value = serde_json::to_value(&location).unwrap_or_default();
        if let (Some(object), Some(usage)) = (value.as_object_mut(), usage.as_object()) {
            for (key, entry) in usage {
                object.insert(key.clone(), entry.clone());
            }
        }
        augmented.push(value);
    }
    Ok(Json(json!({"storage_paths": augmented})))
}

#[derive(Debug, Deserialize)]
struct CreateLocationBody {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default = "default_true")]
    enabled: bool,
}

fn default_true() -> bool {
    true
}

async fn create_location(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateLocationBody>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_enabled(&state)?;
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required"));
    }
    if !body.path.starts_with('/') {
        return Err(ApiError::bad_request("path must be absolute"));
    }
    let kind = LocationKind::parse(&body.kind)
        .ok_or_else(|| ApiError::bad_request(format!("invalid type: {}", body.kind)))?;
    if state.store.get_location_by_path(&body.path).await?.is_some() {
        return Err(ApiError::Conflict(format!("a storage path already exists at {}", body.path)));
    }

    let clock = Clock::system();
    let location = StorageLocation {
        id: LocationId::new(),
        name: body.name.trim().to_string(),
        path: body.path.trim_end_matches('/').to_string(),
        kind,
        enabled: body.enabled,
        file_count: 0,
        total_size: 0,
        last_scan_at: None,
        scan_errors: 0,
        last_error_message: None,
        created_at: clock.now_utc(),
    };
    state.store.insert_location(&location).await?;

    // Seed the inventory right away when the location is live.
    let mut initial_scan_task = None;
    if location.enabled {
        let task = state
            .queue
            .enqueue(
                NewTask::new(ops::ARTIFACT_SCAN_LOCATION)
                    .zone_name(ZONE_ARTIFACT)
                    .metadata(json!({"storage_location_id": location.id}))
                    .created_by(&principal.0),
            )
            .await?;
        initial_scan_task = Some(task.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "storage_path": location,
            "initial_scan_task_id": initial_scan_task,
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateLocationBody {
    name: Option<String>,
    enabled: Option<bool>,
}

async fn update_location(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    Json(body): Json<UpdateLocationBody>,
) -> Result<impl IntoResponse, ApiError> {
    let id = LocationId::from_string(&location_id);
    if body.name.is_none() && body.enabled.is_none() {
        return Err(ApiError::bad_request("nothing to update"));
    }
    if let Some(name) = &body.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("name cannot be empty"));
        }
    }
    let updated = state
        .store
        .update_location(&id, &LocationUpdate { name: body.name, enabled: body.enabled })
        .await?;
    if !updated {
        return Err(ApiError::not_found(format!("storage path {location_id} not found")));
    }
    let location = state.store.get_location(&id).await?;
    Ok(Json(json!({"success": true, "storage_path": location})))
}

#[derive(Debug, Default, Deserialize)]
struct DeleteLocationBody {
    #[serde(default)]
    recursive: bool,
    #[serde(default = "default_true")]
    remove_db_records: bool,
    #[serde(default)]
    force: bool,
}

async fn delete_location(
    State(state): State<AppState>,
    Path(location_id): Path<String>,
    Extension(principal): Extension<Principal>,
    body: Option<Json<DeleteLocationBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let id = LocationId::from_string(&location_id);
    let location = state
        .store
        .get_location(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("storage path {location_id} not found")))?;
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DELETE_FOLDER)
                .zone_name(ZONE_ARTIFACT)
                .metadata(json!({
                    "storage_location_id": id,
                    "recursive": body.recursive,
                    "remove_db_records": body.remove_db_records,
                    "force": body.force,
                }))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted_with(
        &task,
        format!("deletion of {} queued", location.path),
        json!({"path": location.path}),
    ))
}

// === Inventory queries ===

#[derive(Debug, Deserialize)]
struct ArtifactListQuery {
    #[serde(rename = "type")]
    kind: Option<String>,
    storage_path_id: Option<String>,
    search: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
    sort_by: Option<String>,
    sort_order: Option<String>,
}

async fn list_with(
    state: &AppState,
    query: ArtifactListQuery,
    preset_kind: Option<LocationKind>,
) -> Result<Response, ApiError> {
    let kind = match preset_kind {
        Some(kind) => Some(kind),
        None => query
            .kind
            .as_deref()
            .map(|k| {
                LocationKind::parse(k)
                    .ok_or_else(|| ApiError::bad_request(format!("invalid type: {k}")))
            })
            .transpose()?,
    };
    let sort_by = query
        .sort_by
        .as_deref()
        .map(|s| {
            ArtifactSort::parse(s).ok_or_else(|| ApiError::bad_request(format!("invalid sort_by: {s}")))
        })
        .transpose()?
        .unwrap_or_default();
    let sort_order = query
        .sort_order
        .as_deref()
        .map(|s| {
            SortOrder::parse(s).ok_or_else(|| ApiError::bad_request(format!("invalid sort_order: {s}")))
        })
        .transpose()?
        .unwrap_or_default();

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let offset = query.offset.unwrap_or(0).max(0);
    let filter = ArtifactFilter {
        file_type: kind,
        storage_location_id: query.storage_path_id.as_deref().map(LocationId::from_string),
        search: query.search.clone().filter(|s| !s.is_empty()),
        sort_by,
        sort_order,
        limit,
        offset,
    };

    let total = state.store.count_artifacts(&filter).await?;
    let artifacts = state.store.list_artifacts(&filter).await?;
    Ok(Json(json!({
        "artifacts": artifacts,
        "pagination": {
            "total": total,
            "limit": limit,
            "offset": offset,
            "has_more": offset + (artifacts.len() as i64) < total,
        },
    }))
    .into_response())
}

async fn list_artifacts(
    State(state): State<AppState>,
    Query(query): Query<ArtifactListQuery>,
) -> Result<Response, ApiError> {
    list_with(&state, query, None).await
}

async fn list_iso(
    State(state): State<AppState>,
    Query(query): Query<ArtifactListQuery>,
) -> Result<Response, ApiError> {
    list_with(&state, query, Some(LocationKind::Iso)).await
}

async fn list_image(
    State(state): State<AppState>,
    Query(query): Query<ArtifactListQuery>,
) -> Result<Response, ApiError> {
    list_with(&state, query, Some(LocationKind::Image)).await
}

async fn get_artifact(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = state
        .store
        .get_artifact(&ArtifactId::from_string(&artifact_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("artifact {artifact_id} not found")))?;
    Ok(Json(serde_json::to_value(artifact).unwrap_or_default()))
}

/// Stream the artifact bytes with attachment headers; touches
/// `last_verified` as a liveness marker.
async fn download_artifact(
    State(state): State<AppState>,
    Path(artifact_id): Path<String>,
) -> Result<Response, ApiError> {
    let id = ArtifactId::from_string(&artifact_id);
    let artifact = state
        .store
        .get_artifact(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("artifact {artifact_id} not found")))?;

    let file = tokio::fs::File::open(&artifact.path)
        .await
        .map_err(|e| ApiError::not_found(format!("artifact file unavailable: {e}")))?;
    let size = file.metadata().await.map(|m| m.len()).unwrap_or(artifact.size as u64);
    state.store.touch_artifact_verified(&id, Clock::system().now_utc()).await?;

    let stream = tokio_util::io::ReaderStream::new(file);
    let mime = artifact.mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
    let disposition = format!("attachment; filename=\"{}\"", artifact.filename.replace('"', ""));
    let response = Response::builder()
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(response)
}

// === Mutations ===

#[derive(Debug, Deserialize)]
struct DownloadBody {
    url: String,
    storage_path_id: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    expected_checksum: Option<String>,
    #[serde(default)]
    checksum_algorithm: Option<ChecksumAlgorithm>,
    #[serde(default)]
    overwrite_existing: bool,
}

async fn download_url(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<DownloadBody>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_enabled(&state)?;
    if !body.url.starts_with("http://") && !body.url.starts_with("https://") {
        return Err(ApiError::bad_request("url must be http or https"));
    }

    let location_id = LocationId::from_string(&body.storage_path_id);
    let location = state
        .store
        .get_location(&location_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("storage path {} not found", body.storage_path_id)))?;
    if !location.enabled {
        return Err(ApiError::bad_request(format!("storage path {} is disabled", location.name)));
    }

    let filename = body
        .filename
        .clone()
        .or_else(|| filename_from_url(&body.url))
        .ok_or_else(|| ApiError::bad_request("cannot derive a filename from the url"))?;
    if filename.contains('/') {
        return Err(ApiError::bad_request("filename cannot contain path separators"));
    }
    let final_path = format!("{}/{}", location.path.trim_end_matches('/'), filename);

    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DOWNLOAD_URL)
                .zone_name(ZONE_ARTIFACT)
                .metadata(json!({
                    "url": body.url,
                    "storage_location_id": location.id,
                    "filename": filename,
                    "final_path": final_path,
                    "checksum": body.expected_checksum,
                    "checksum_algorithm": body.checksum_algorithm.unwrap_or_default(),
                    "overwrite_existing": body.overwrite_existing,
                }))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted_with(
        &task,
        format!("download of {filename} queued"),
        json!({"filename": filename, "final_path": final_path}),
    ))
}

/// Stage a multipart upload into the target location, then enqueue the
/// processing task. The storage roots are root-owned, so the staging file
/// is pre-created with privilege exactly like the download path.
async fn upload(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    ensure_enabled(&state)?;

    let mut storage_path_id: Option<String> = None;
    let mut expected_checksum: Option<String> = None;
    let mut checksum_algorithm = ChecksumAlgorithm::default();
    let mut overwrite_existing = false;
    let mut staged: Option<(String, String, i64)> = None; // (name, final_path, size)

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "storage_path_id" => {
                storage_path_id =
                    Some(field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            "expected_checksum" => {
                expected_checksum =
                    Some(field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?);
            }
            "checksum_algorithm" => {
                let text = field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
                checksum_algorithm = ChecksumAlgorithm::parse(&text)
                    .ok_or_else(|| ApiError::bad_request(format!("invalid checksum_algorithm: {text}")))?;
            }
            "overwrite_existing" => {
                let text = field.text().await.map_err(|e| ApiError::bad_request(e.to_string()))?;
                overwrite_existing = text == "true" || text == "1";
            }
            "file" => {
                // The location must be known before the file part arrives.
                let location_id = storage_path_id
                    .as_deref()
                    .ok_or_else(|| ApiError::bad_request("storage_path_id must precede the file part"))?;
                let location = state
                    .store
                    .get_location(&LocationId::from_string(location_id))
                    .await?
                    .ok_or_else(|| ApiError::not_found(format!("storage path {location_id} not found")))?;
                if !location.enabled {
                    return Err(ApiError::bad_request(format!(
                        "storage path {} is disabled",
                        location.name
                    )));
                }

                let original_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|n| !n.is_empty() && !n.contains('/'))
                    .ok_or_else(|| ApiError::bad_request("file part needs a valid filename"))?;
                let final_path =
                    format!("{}/{}", location.path.trim_end_matches('/'), original_name);

                if !overwrite_existing
                    && tokio::fs::try_exists(&final_path).await.unwrap_or(false)
                {
                    return Err(ApiError::Conflict(format!(
                        "file already exists at {final_path}"
                    )));
                }

                let precreate = state
                    .runner
                    .run(&format!(
                        "pfexec touch {p} && pfexec chmod 666 {p}",
                        p = sh_quote(&final_path)
                    ))
                    .await;
                if !precreate.success {
                    return Err(ApiError::Internal(format!(
                        "failed to stage upload: {}",
                        precreate.error
                    )));
                }

                let mut file = tokio::fs::OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(&final_path)
                    .await
                    .map_err(|e| ApiError::Internal(format!("cannot open staging file: {e}")))?;
                let mut size: i64 = 0;
                let mut field = field;
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("upload stream error: {e}")))?
                {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| ApiError::Internal(format!("staging write error: {e}")))?;
                    size += chunk.len() as i64;
                }
                file.flush()
                    .await
                    .map_err(|e| ApiError::Internal(format!("staging write error: {e}")))?;
                staged = Some((original_name, final_path, size));
            }
            _ => {}
        }
    }

    let storage_path_id =
        storage_path_id.ok_or_else(|| ApiError::bad_request("storage_path_id is required"))?;
    let (original_name, final_path, size) =
        staged.ok_or_else(|| ApiError::bad_request("file part is required"))?;

    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_UPLOAD_PROCESS)
                .zone_name(ZONE_ARTIFACT)
                .priority(TaskPriority::High)
                .metadata(json!({
                    "final_path": final_path,
                    "original_name": original_name,
                    "size": size,
                    "storage_location_id": storage_path_id,
                    "checksum": expected_checksum,
                    "checksum_algorithm": checksum_algorithm,
                }))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted_with(
        &task,
        format!("upload of {original_name} staged ({size} bytes)"),
        json!({"filename": original_name, "size": size}),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct ScanBody {
    #[serde(rename = "type")]
    #[allow(dead_code)]
    kind: Option<String>,
    storage_path_id: Option<String>,
    #[serde(default)]
    verify_checksums: bool,
    #[serde(default)]
    remove_orphaned: bool,
}

async fn scan(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Option<Json<ScanBody>>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_enabled(&state)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let task = match &body.storage_path_id {
        Some(location_id) => {
            let id = LocationId::from_string(location_id);
            let location = state
                .store
                .get_location(&id)
                .await?
                .ok_or_else(|| ApiError::not_found(format!("storage path {location_id} not found")))?;
            if !location.enabled {
                return Err(ApiError::bad_request(format!(
                    "storage path {} is disabled",
                    location.name
                )));
            }
            state
                .queue
                .enqueue(
                    NewTask::new(ops::ARTIFACT_SCAN_LOCATION)
                        .zone_name(ZONE_ARTIFACT)
                        .metadata(json!({
                            "storage_location_id": id,
                            "verify_checksums": body.verify_checksums,
                            "remove_orphaned": body.remove_orphaned,
                        }))
                        .created_by(&principal.0),
                )
                .await?
        }
        None => {
            state
                .queue
                .enqueue(
                    NewTask::new(ops::ARTIFACT_SCAN_ALL)
                        .zone_name(ZONE_ARTIFACT)
                        .metadata(json!({
                            "verify_checksums": body.verify_checksums,
                            "remove_orphaned": body.remove_orphaned,
                        }))
                        .created_by(&principal.0),
                )
                .await?
        }
    };
    Ok(accepted(&task, "scan queued"))
}

#[derive(Debug, Deserialize)]
struct DeleteFilesBody {
    artifact_ids: Vec<String>,
    #[serde(default = "default_true")]
    delete_files: bool,
    #[serde(default)]
    force: bool,
}

async fn delete_files(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<DeleteFilesBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.artifact_ids.is_empty() {
        return Err(ApiError::bad_request("artifact_ids is empty"));
    }
    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::ARTIFACT_DELETE_FILE)
                .zone_name(ZONE_ARTIFACT)
                .metadata(json!({
                    "artifact_ids": body.artifact_ids,
                    "delete_files": body.delete_files,
                    "force": body.force,
                }))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted_with(
        &task,
        format!("deletion of {} artifacts queued", body.artifact_ids.len()),
        json!({"count": body.artifact_ids.len()}),
    ))
}

// === Aggregates ===

async fn artifact_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let by_type = state.store.artifact_type_stats().await?;
    let locations = state.store.list_locations(None, None).await?;
    let types: Vec<serde_json::Value> = by_type
        .iter()
        .map(|(kind, count, size)| json!({"type": kind, "count": count, "total_size": size}))
        .collect();
    let per_location: Vec<serde_json::Value> = locations
        .iter()
        .map(|location| {
            json!({
                "id": location.id,
                "name": location.name,
                "path": location.path,
                "file_count": location.file_count,
                "total_size": location.total_size,
                "last_scan_at": location.last_scan_at,
            })
        })
        .collect();
    Ok(Json(json!({"by_type": types, "locations": per_location})))
}

async fn service_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let running = state.queue.running_index();
    Ok(Json(json!({
        "enabled": state.config.artifact_storage.enabled,
        "location_count": state.store.list_locations(None, None).await?.len(),
        "artifact_count": state.store.count_all_artifacts().await?,
        "active_downloads": running.count_operation(ops::ARTIFACT_DOWNLOAD_URL),
    })))
}

/// Derive a filename from the URL path, ignoring query/fragment.
fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let rest = without_query.split_once("://").map(|(_, rest)| rest).unwrap_or(without_query);
    if !rest.contains('/') {
        return None;
    }
    let candidate = rest.rsplit('/').next().unwrap_or("");
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Task read and cancel endpoints: the task record is the single source
//! of truth clients poll for asynchronous outcomes.

use super::{ApiError, AppState};
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use warden_core::{TaskId, TaskStatus};
use warden_queue::CancelOutcome;
use warden_store::TaskFilter;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/stats", get(task_stats))
        .route("/tasks/:task_id", get(get_task).delete(cancel_task))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
    operation: Option<String>,
    zone_name: Option<String>,
    limit: Option<i64>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(|s| TaskStatus::parse(s).ok_or_else(|| ApiError::bad_request(format!("invalid status: {s}"))))
        .transpose()?;
    let filter = TaskFilter {
        status,
        operation: query.operation,
        zone_name: query.zone_name,
        limit: Some(query.limit.unwrap_or(100).clamp(1, 1000)),
    };
    let tasks = state.queue.list(&filter).await?;
    let count = tasks.len();
    Ok(Json(json!({"tasks": tasks, "count": count})))
}

async fn task_stats(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.store.task_stats().await?;
    Ok(Json(serde_json::to_value(stats).unwrap_or_default()))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .queue
        .get(&TaskId::from_string(&task_id))
        .await?
        .ok_or_else(|| ApiError::not_found(format!("task {task_id} not found")))?;
    Ok(Json(serde_json::to_value(task).unwrap_or_default()))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = TaskId::from_string(&task_id);
    match state.queue.cancel(&id).await? {
        CancelOutcome::Cancelled => Ok(Json(json!({
            "success": true,
            "message": "task cancelled",
            "task_id": id,
        }))),
        CancelOutcome::Signalled => Ok(Json(json!({
            "success": true,
            "message": "cancellation requested; the running handler will stop at its next checkpoint",
            "task_id": id,
        }))),
        CancelOutcome::AlreadyFinished(status) => Err(ApiError::Conflict(format!(
            "task {task_id} is already {status}"
        ))),
        CancelOutcome::NotFound => Err(ApiError::not_found(format!("task {task_id} not found"))),
    }
}

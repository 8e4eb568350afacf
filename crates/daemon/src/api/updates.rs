// SPDX-License-Identifier: MIT

//! System update endpoints: synchronous check, asynchronous
//! install/refresh, history.

use super::{accepted, ApiError, AppState, Principal};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use warden_core::{NewTask, TaskPriority, ZONE_SYSTEM};
use warden_handlers::{ops, sysupdate};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/system/updates/check", get(check))
        .route("/system/updates/install", post(install))
        .route("/system/updates/refresh", post(refresh))
        .route("/system/updates/history", get(history))
}

#[derive(Debug, Deserialize)]
struct CheckQuery {
    format: Option<String>,
}

async fn check(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let result = sysupdate::check_updates(&state.runner).await.map_err(ApiError::Internal)?;
    match query.format.as_deref() {
        Some("raw") => Ok(Json(json!({
            "updates_available": result.updates_available,
            "raw": result.raw,
        }))),
        None | Some("structured") => Ok(Json(json!({
            "updates_available": result.updates_available,
            "plan": result.plan,
        }))),
        Some(other) => Err(ApiError::bad_request(format!("invalid format: {other}"))),
    }
}

async fn install(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::SYSTEM_UPDATE_INSTALL)
                .zone_name(ZONE_SYSTEM)
                .priority(TaskPriority::High)
                .metadata(json!({}))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted(&task, "system update queued"))
}

async fn refresh(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .queue
        .enqueue(
            NewTask::new(ops::SYSTEM_UPDATE_REFRESH)
                .zone_name(ZONE_SYSTEM)
                .metadata(json!({}))
                .created_by(&principal.0),
        )
        .await?;
    Ok(accepted(&task, "package metadata refresh queued"))
}

async fn history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let entries = sysupdate::update_history(&state.runner).await.map_err(ApiError::Internal)?;
    Ok(Json(json!({"history": entries})))
}

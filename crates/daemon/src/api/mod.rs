// SPDX-License-Identifier: MIT

//! The HTTP/WS surface: thin handlers that validate input, answer
//! read-only queries directly, and enqueue a task for everything that
//! mutates the host.

pub mod accounts;
pub mod artifacts;
pub mod error;
pub mod host;
pub mod logs;
pub mod tasks;
pub mod updates;

pub use error::ApiError;

use crate::logstream::LogStreamManager;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use warden_adapters::CommandRunner;
use warden_core::{Task, WardenConfig};
use warden_queue::TaskQueue;
use warden_store::Store;

/// Shared state for every route handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<WardenConfig>,
    pub store: Store,
    pub queue: Arc<TaskQueue>,
    pub runner: CommandRunner,
    pub logs: LogStreamManager,
    pub state_dir: PathBuf,
}

/// The authenticated principal, resolved from the API key and recorded as
/// `created_by` on every task the request produces.
#[derive(Debug, Clone)]
pub struct Principal(pub String);

/// API-key authentication. With no keys configured the surface is open
/// and requests act as `local`.
async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = if state.config.api_keys.is_empty() {
        Principal("local".to_string())
    } else {
        let presented = request
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        let matched = state
            .config
            .api_keys
            .iter()
            .find(|k| k.key == presented)
            .ok_or(ApiError::Unauthorized)?;
        Principal(matched.name.clone())
    };
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": crate::env::VERSION}))
}

/// Assemble the full router. The WebSocket endpoint sits outside the
/// API-key layer: the session id issued by the start endpoint is the
/// credential there.
pub fn router(state: AppState) -> Router {
    let authed = Router::new()
        .merge(tasks::routes())
        .merge(artifacts::routes())
        .merge(host::routes())
        .merge(updates::routes())
        .merge(accounts::routes())
        .merge(logs::routes())
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/logs/stream/:session_id", get(logs::ws_stream))
        .merge(authed)
        .with_state(state)
}

/// `202 Accepted` body for task-producing endpoints.
pub(crate) fn accepted(task: &Task, message: impl Into<String>) -> Response {
    accepted_with(task, message, json!({}))
}

pub(crate) fn accepted_with(
    task: &Task,
    message: impl Into<String>,
    extra: serde_json::Value,
) -> Response {
    let mut body = json!({
        "success": true,
        "message": message.into(),
        "task_id": task.id,
        "status": task.status,
        "created_at": task.created_at,
    });
    if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            body.insert(key.clone(), value.clone());
        }
    }
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

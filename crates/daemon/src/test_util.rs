// SPDX-License-Identifier: MIT

//! Shared fixtures for API tests.

use crate::api::AppState;
use crate::logstream::LogStreamManager;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use std::sync::Arc;
use tower::ServiceExt;
use warden_adapters::CommandRunner;
use warden_core::{Clock, WardenConfig};
use warden_handlers::{build_registry, HandlerDeps};
use warden_queue::{RunningIndex, TaskQueue};
use warden_store::Store;

/// Build an AppState over an in-memory store and a scratch state dir.
pub(crate) async fn test_state(
    configure: impl FnOnce(&mut WardenConfig),
) -> (AppState, tempfile::TempDir) {
    let mut config = WardenConfig::default();
    configure(&mut config);
    let config = Arc::new(config);

    let store = Store::open_in_memory().await.unwrap_or_else(|e| panic!("store: {e}"));
    let runner = CommandRunner::new();
    let running = RunningIndex::new();
    let registry = build_registry(&HandlerDeps {
        config: Arc::clone(&config),
        runner,
        running: running.clone(),
    });
    let queue = Arc::new(
        TaskQueue::new(store.clone(), Arc::new(registry), config.task_queue.clone(), Clock::system())
            .with_running_index(running),
    );
    let logs = LogStreamManager::new(Arc::clone(&config), store.clone());

    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
    let state = AppState {
        config,
        store,
        queue,
        runner,
        logs,
        state_dir: dir.path().to_path_buf(),
    };
    (state, dir)
}

/// One-shot request against the full router.
pub(crate) async fn request(
    state: &AppState,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let router = crate::api::router(state.clone());
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(json.to_string()))
        }
        None => builder.body(Body::empty()),
    }
    .unwrap_or_else(|e| panic!("request: {e}"));

    let response: Response<Body> =
        router.oneshot(request).await.unwrap_or_else(|e| panic!("oneshot: {e}"));
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap_or_default();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

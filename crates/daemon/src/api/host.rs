// SPDX-License-Identifier: MIT

//! Host lifecycle endpoints. All mutating routes demand `confirm: true`
//! and enqueue a critical, serial task; reads parse the usual host tools.

use super::{accepted_with, ApiError, AppState, Principal};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Deserialize;
use serde_json::json;
use warden_core::{NewTask, TaskPriority, ZONE_SYSTEM};
use warden_handlers::host::{
    sanitize_message, validate_grace_period, validate_runlevel, HostAction,
};
use warden_handlers::ops;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/system/host/restart", post(restart))
        .route("/system/host/reboot", post(reboot))
        .route("/system/host/reboot/fast", post(fast_reboot))
        .route("/system/host/shutdown", post(shutdown))
        .route("/system/host/poweroff", post(poweroff))
        .route("/system/host/halt", post(halt))
        .route("/system/host/runlevel", get(get_runlevel).post(change_runlevel))
        .route("/system/host/single-user", post(single_user))
        .route("/system/host/multi-user", post(multi_user))
        .route("/system/host/status", get(host_status))
        .route("/system/host/uptime", get(host_uptime))
        .route(
            "/system/host/reboot-status",
            get(reboot_status).delete(clear_reboot_status),
        )
}

#[derive(Debug, Default, Deserialize)]
struct LifecycleBody {
    #[serde(default)]
    confirm: bool,
    #[serde(default)]
    emergency: bool,
    #[serde(default)]
    grace_period: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    runlevel: Option<String>,
    #[serde(default)]
    zone_orchestration: Option<serde_json::Value>,
}

fn validate(body: &LifecycleBody, action: HostAction) -> Result<(), ApiError> {
    if !body.confirm {
        return Err(ApiError::bad_request("Confirmation required"));
    }
    if action.requires_emergency() && !body.emergency {
        return Err(ApiError::bad_request("Emergency confirmation required for halt"));
    }
    validate_grace_period(body.grace_period).map_err(ApiError::BadRequest)?;
    if let Some(message) = &body.message {
        sanitize_message(message).map_err(ApiError::BadRequest)?;
    }
    if let Some(runlevel) = &body.runlevel {
        validate_runlevel(runlevel).map_err(ApiError::BadRequest)?;
    }
    Ok(())
}

fn warnings_for(action: HostAction) -> Vec<&'static str> {
    match action {
        HostAction::Shutdown | HostAction::Poweroff | HostAction::Halt => vec![
            "This will interrupt all system services and running zones",
            "The host will require manual power-on or remote management to return",
        ],
        HostAction::Restart | HostAction::Reboot | HostAction::FastReboot => {
            vec!["This will interrupt all system services and running zones"]
        }
        HostAction::SingleUser | HostAction::RunlevelChange => {
            vec!["This will interrupt all system services and most logins"]
        }
        HostAction::MultiUser => Vec::new(),
    }
}

async fn enqueue_lifecycle(
    state: AppState,
    principal: Principal,
    body: LifecycleBody,
    operation: &str,
    action: HostAction,
) -> Result<axum::response::Response, ApiError> {
    validate(&body, action)?;

    let metadata = json!({
        "confirm": body.confirm,
        "emergency": body.emergency,
        "grace_period": body.grace_period,
        "message": body.message,
        "runlevel": body.runlevel,
        "zone_orchestration": body.zone_orchestration,
    });
    let task = state
        .queue
        .enqueue(
            NewTask::new(operation)
                .zone_name(ZONE_SYSTEM)
                .priority(TaskPriority::Critical)
                .metadata(metadata)
                .created_by(&principal.0),
        )
        .await?;

    // Reboot-type actions leave a marker so the UI can explain the outage
    // after the daemon comes back.
    if matches!(
        action,
        HostAction::Restart | HostAction::Reboot | HostAction::FastReboot | HostAction::Shutdown
    ) {
        write_reboot_marker(&state, operation, &principal.0);
    }

    Ok(accepted_with(
        &task,
        format!("host {action} queued"),
        json!({"warnings": warnings_for(action), "grace_period": body.grace_period}),
    ))
}

macro_rules! lifecycle_route {
    ($name:ident, $operation:expr, $action:expr) => {
        async fn $name(
            State(state): State<AppState>,
            Extension(principal): Extension<Principal>,
            body: Option<Json<LifecycleBody>>,
        ) -> Result<impl IntoResponse, ApiError> {
            let body = body.map(|Json(body)| body).unwrap_or_default();
            enqueue_lifecycle(state, principal, body, $operation, $action).await
        }
    };
}

lifecycle_route!(restart, ops::SYSTEM_HOST_RESTART, HostAction::Restart);
lifecycle_route!(reboot, ops::SYSTEM_HOST_REBOOT, HostAction::Reboot);
lifecycle_route!(fast_reboot, ops::SYSTEM_HOST_FAST_REBOOT, HostAction::FastReboot);
lifecycle_route!(shutdown, ops::SYSTEM_HOST_SHUTDOWN, HostAction::Shutdown);
lifecycle_route!(poweroff, ops::SYSTEM_HOST_POWEROFF, HostAction::Poweroff);
lifecycle_route!(halt, ops::SYSTEM_HOST_HALT, HostAction::Halt);
lifecycle_route!(change_runlevel, ops::SYSTEM_HOST_RUNLEVEL, HostAction::RunlevelChange);
lifecycle_route!(single_user, ops::SYSTEM_HOST_SINGLE_USER, HostAction::SingleUser);
lifecycle_route!(multi_user, ops::SYSTEM_HOST_MULTI_USER, HostAction::MultiUser);

// === Reads ===

async fn get_runlevel(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = state.runner.run("who -r").await;
    if !result.success {
        return Err(ApiError::Internal(format!("who -r failed: {}", result.error)));
    }
    Ok(Json(json!({
        "runlevel": parse_runlevel(&result.output),
        "raw": result.output.trim(),
    })))
}

/// `who -r` prints `   .       run-level 3  Oct  1 09:00 ...`.
fn parse_runlevel(output: &str) -> Option<String> {
    let mut words = output.split_whitespace();
    while let Some(word) = words.next() {
        if word == "run-level" {
            return words.next().map(str::to_string);
        }
    }
    None
}

async fn host_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let hostname = state.runner.run("hostname").await;
    let uptime = state.runner.run("uptime").await;
    let runlevel = state.runner.run("who -r").await;
    Ok(Json(json!({
        "hostname": hostname.success.then(|| hostname.output.trim().to_string()),
        "uptime": uptime.success.then(|| uptime.output.trim().to_string()),
        "runlevel": runlevel.success.then(|| parse_runlevel(&runlevel.output)).flatten(),
    })))
}

async fn host_uptime(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let result = state.runner.run("uptime").await;
    if !result.success {
        return Err(ApiError::Internal(format!("uptime failed: {}", result.error)));
    }
    Ok(Json(json!({"uptime": result.output.trim()})))
}

// === Reboot-status marker ===

fn marker_path(state: &AppState) -> std::path::PathBuf {
    state.state_dir.join("reboot-status.json")
}

fn write_reboot_marker(state: &AppState, operation: &str, requested_by: &str) {
    let marker = json!({
        "operation": operation,
        "requested_by": requested_by,
        "requested_at": chrono::Utc::now(),
    });
    if let Err(e) = std::fs::write(marker_path(state), marker.to_string()) {
        tracing::warn!(error = %e, "failed to write reboot-status marker");
    }
}

async fn reboot_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    match std::fs::read_to_string(marker_path(&state)) {
        Ok(contents) => {
            let marker: serde_json::Value = serde_json::from_str(&contents).unwrap_or(json!(null));
            Ok(Json(json!({"pending": true, "marker": marker})))
        }
        Err(_) => Ok(Json(json!({"pending": false, "marker": null}))),
    }
}

async fn clear_reboot_status(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let path = marker_path(&state);
    if path.exists() {
        std::fs::remove_file(&path).map_err(|e| ApiError::Internal(e.to_string()))?;
    }
    Ok(Json(json!({"success": true})))
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;

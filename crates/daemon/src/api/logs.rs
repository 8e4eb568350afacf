// SPDX-License-Identifier: MIT

//! Log streaming endpoints and the WebSocket bridge that pumps a tail
//! subprocess into the socket.

use super::{ApiError, AppState};
use crate::logstream::guard::Refusal;
use crate::logstream::{Attachment, LogStreamError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use warden_core::{LogSessionId, LogSessionStatus};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/system/logs/:logname/stream/start", post(start_stream))
        .route("/system/logs/stream/sessions", get(list_sessions))
        .route("/system/logs/stream/:session_id/stop", delete(stop_stream))
}

impl From<LogStreamError> for ApiError {
    fn from(e: LogStreamError) -> Self {
        match e {
            LogStreamError::Refused(Refusal::Disabled) => {
                ApiError::ServiceDisabled("log streaming is disabled".to_string())
            }
            LogStreamError::Refused(refusal) => ApiError::BadRequest(refusal.to_string()),
            LogStreamError::NotFound(message) => ApiError::NotFound(message),
            LogStreamError::NotConnectable(message) => ApiError::Conflict(message),
            LogStreamError::Spawn(e) => ApiError::Internal(e.to_string()),
            LogStreamError::Store(e) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StartBody {
    follow_lines: Option<i64>,
    grep_pattern: Option<String>,
}

async fn start_stream(
    State(state): State<AppState>,
    Path(logname): Path<String>,
    body: Option<Json<StartBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let session = state.logs.start(&logname, body.follow_lines, body.grep_pattern).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session.session_id,
        "websocket_url": format!("/logs/stream/{}", session.session_id),
        "logname": session.logname,
        "follow_lines": session.follow_lines,
        "grep_pattern": session.grep_pattern,
        "status": session.status,
    })))
}

async fn list_sessions(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.logs.list().await?;
    Ok(Json(json!({"sessions": sessions})))
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.logs.stop(&LogSessionId::from_string(&session_id)).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session.session_id,
        "status": session.status,
        "lines_sent": session.lines_sent,
    })))
}

/// WebSocket upgrade: bind the session to a tail subprocess.
pub async fn ws_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let id = LogSessionId::from_string(&session_id);
    match state.logs.attach(&id).await {
        Ok(attachment) => {
            upgrade.on_upgrade(move |socket| pump(state, socket, attachment)).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Client control frames accepted mid-stream.
#[derive(Debug, Deserialize)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
}

type WsSender = SplitSink<WebSocket, Message>;
type WsReceiver = SplitStream<WebSocket>;

async fn send_json(sender: &mut WsSender, frame: serde_json::Value) -> bool {
    sender.send(Message::Text(frame.to_string())).await.is_ok()
}

/// Pump tail output into the socket and control frames back, until any
/// side terminates. Every exit path persists the session outcome.
async fn pump(state: AppState, socket: WebSocket, attachment: Attachment) {
    let Attachment { session, mut tail, stop } = attachment;
    let session_id = session.session_id.clone();
    let (mut sender, mut receiver): (WsSender, WsReceiver) = socket.split();
    let mut lines_sent: i64 = 0;

    let hello = json!({
        "type": "status",
        "status": "active",
        "logname": session.logname,
        "follow_lines": session.follow_lines,
    });
    if !send_json(&mut sender, hello).await {
        state.logs.finish(&session_id, LogSessionStatus::Closed, 0, None).await;
        return;
    }

    let (status, error_message): (LogSessionStatus, Option<String>) = loop {
        tokio::select! {
            // Stop endpoint or janitor asked us to wind down.
            _ = stop.cancelled() => break (LogSessionStatus::Stopped, None),

            line = tail.stdout.next_line() => match line {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(pattern) = &session.grep_pattern {
                        if !line.contains(pattern.as_str()) {
                            continue;
                        }
                    }
                    let frame = json!({
                        "type": "log_line",
                        "line": line,
                        "timestamp": chrono::Utc::now(),
                    });
                    if !send_json(&mut sender, frame).await {
                        break (LogSessionStatus::Closed, None);
                    }
                    lines_sent += 1;
                }
                // Tail exited (log rotated away, file deleted).
                Ok(None) => {
                    let _ = send_json(&mut sender, json!({"type": "process_exit"})).await;
                    break (LogSessionStatus::Closed, None);
                }
                Err(e) => break (LogSessionStatus::Error, Some(e.to_string())),
            },

            line = tail.stderr.next_line() => {
                if let Ok(Some(line)) = line {
                    let frame = json!({"type": "error", "message": line});
                    if !send_json(&mut sender, frame).await {
                        break (LogSessionStatus::Closed, None);
                    }
                }
            }

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(frame) = serde_json::from_str::<ControlFrame>(&text) else {
                        continue;
                    };
                    match frame.kind.as_str() {
                        "ping" => {
                            if !send_json(&mut sender, json!({"type": "pong"})).await {
                                break (LogSessionStatus::Closed, None);
                            }
                        }
                        "pause" => state.logs.pause(&session_id),
                        "resume" => state.logs.resume(&session_id),
                        other => {
                            tracing::debug!(session_id = %session_id, other, "unknown control frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break (LogSessionStatus::Closed, None),
                Some(Ok(_)) => {} // Ping/Pong/Binary -- ignore
                Some(Err(e)) => break (LogSessionStatus::Error, Some(e.to_string())),
            },
        }
    };

    let _ = tail.child.kill().await;
    state.logs.finish(&session_id, status, lines_sent, error_message.as_deref()).await;
    let _ = sender.send(Message::Close(None)).await;
}

// SPDX-License-Identifier: MIT

//! Log-stream session management.
//!
//! The start endpoint writes a `created` row; the WebSocket upgrade
//! attaches a tail subprocess and flips it `active`; every termination
//! path persists `lines_sent`/`disconnected_at` and a terminal status.
//! Persistent truth is the store; the in-memory map is an advisory index
//! of live tails.

pub mod guard;
pub mod tail;

use guard::Refusal;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tail::TailProcess;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use warden_core::{
    Clock, LogSession, LogSessionId, LogSessionStatus, WardenConfig,
};
use warden_store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum LogStreamError {
    #[error("{0}")]
    Refused(Refusal),
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session is not connectable: {0}")]
    NotConnectable(String),
    #[error("failed to spawn tail: {0}")]
    Spawn(#[from] std::io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

struct ActiveEntry {
    pid: Option<u32>,
    stop: CancellationToken,
}

/// Process-wide registry of log-stream sessions.
#[derive(Clone)]
pub struct LogStreamManager {
    config: Arc<WardenConfig>,
    store: Store,
    clock: Clock,
    active: Arc<Mutex<HashMap<LogSessionId, ActiveEntry>>>,
}

/// What the WebSocket handler drives after a successful attach.
pub struct Attachment {
    pub session: LogSession,
    pub tail: TailProcess,
    pub stop: CancellationToken,
}

impl LogStreamManager {
    pub fn new(config: Arc<WardenConfig>, store: Store) -> Self {
        Self { config, store, clock: Clock::system(), active: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Validate and create a `created` session row.
    pub async fn start(
        &self,
        logname: &str,
        follow_lines: Option<i64>,
        grep_pattern: Option<String>,
    ) -> Result<LogSession, LogStreamError> {
        let open = self.store.count_open_log_sessions().await?;
        let path = guard::authorize_stream(&self.config.system_logs, logname, open)
            .map_err(LogStreamError::Refused)?;

        let session = LogSession {
            session_id: LogSessionId::new(),
            cookie: nanoid::nanoid!(24),
            logname: logname.to_string(),
            log_path: path.display().to_string(),
            follow_lines: follow_lines.unwrap_or(100).clamp(0, 10_000),
            grep_pattern: grep_pattern.filter(|p| !p.is_empty()),
            status: LogSessionStatus::Created,
            created_at: self.clock.now_utc(),
            connected_at: None,
            disconnected_at: None,
            lines_sent: 0,
            error_message: None,
        };
        self.store.insert_log_session(&session).await?;
        tracing::info!(session_id = %session.session_id, logname, "log stream session created");
        Ok(session)
    }

    /// Bind the WebSocket upgrade to a tail subprocess:
    /// `created -> active`.
    pub async fn attach(&self, id: &LogSessionId) -> Result<Attachment, LogStreamError> {
        let session = self
            .store
            .get_log_session(id)
            .await?
            .ok_or_else(|| LogStreamError::NotFound(id.to_string()))?;
        if !self.store.activate_log_session(id, self.clock.now_utc()).await? {
            return Err(LogStreamError::NotConnectable(format!(
                "{id} is {}",
                session.status
            )));
        }

        let tail = tail::spawn_tail(std::path::Path::new(&session.log_path), session.follow_lines)
            .map_err(|e| {
                // The row is already active; record the spawn failure.
                let store = self.store.clone();
                let id = id.clone();
                let now = self.clock.now_utc();
                let message = e.to_string();
                tokio::spawn(async move {
                    let _ = store
                        .close_log_session(&id, LogSessionStatus::Error, 0, now, Some(&message))
                        .await;
                });
                LogStreamError::Spawn(e)
            })?;

        let stop = CancellationToken::new();
        self.active.lock().insert(
            id.clone(),
            ActiveEntry { pid: tail.child.id(), stop: stop.clone() },
        );
        tracing::info!(session_id = %id, path = %session.log_path, "log stream attached");
        Ok(Attachment { session, tail, stop })
    }

    /// Client control: pause delivery by stopping the tail.
    pub fn pause(&self, id: &LogSessionId) {
        if let Some(pid) = self.active.lock().get(id).and_then(|e| e.pid) {
            tail::pause(pid);
        }
    }

    pub fn resume(&self, id: &LogSessionId) {
        if let Some(pid) = self.active.lock().get(id).and_then(|e| e.pid) {
            tail::resume(pid);
        }
    }

    /// Terminal transition from any exit path. Idempotent: only the first
    /// caller wins the row update; every caller drops the live tail.
    pub async fn finish(
        &self,
        id: &LogSessionId,
        status: LogSessionStatus,
        lines_sent: i64,
        error_message: Option<&str>,
    ) {
        let entry = self.active.lock().remove(id);
        if let Some(entry) = entry {
            entry.stop.cancel();
            if let Some(pid) = entry.pid {
                tail::kill(pid);
            }
        }
        match self
            .store
            .close_log_session(id, status, lines_sent, self.clock.now_utc(), error_message)
            .await
        {
            Ok(true) => {
                tracing::info!(session_id = %id, status = %status, lines_sent, "log stream finished")
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(session_id = %id, error = %e, "failed to close session row"),
        }
    }

    /// Explicit stop endpoint: kills the tail and closes the WS.
    pub async fn stop(&self, id: &LogSessionId) -> Result<LogSession, LogStreamError> {
        let session = self
            .store
            .get_log_session(id)
            .await?
            .ok_or_else(|| LogStreamError::NotFound(id.to_string()))?;
        let lines = session.lines_sent;
        self.finish(id, LogSessionStatus::Stopped, lines, None).await;
        self.store
            .get_log_session(id)
            .await?
            .ok_or_else(|| LogStreamError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<LogSession>, LogStreamError> {
        Ok(self.store.list_log_sessions().await?)
    }

    /// Janitor: remove closed/error rows older than an hour and GC
    /// in-memory entries whose row is already terminal.
    pub async fn sweep(&self) -> Result<u64, LogStreamError> {
        let cutoff = self.clock.now_utc() - chrono::Duration::hours(1);
        let removed = self.store.delete_stale_log_sessions(cutoff).await?;

        let tracked: Vec<LogSessionId> = self.active.lock().keys().cloned().collect();
        for id in tracked {
            let terminal = match self.store.get_log_session(&id).await? {
                Some(session) => session.status.is_terminal(),
                None => true,
            };
            if terminal {
                if let Some(entry) = self.active.lock().remove(&id) {
                    entry.stop.cancel();
                    if let Some(pid) = entry.pid {
                        tail::kill(pid);
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Spawn the hourly janitor.
    pub fn spawn_janitor(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(std::time::Duration::from_secs(600)) => {}
                }
                match manager.sweep().await {
                    Ok(removed) if removed > 0 => {
                        tracing::info!(removed, "log session janitor removed stale rows");
                    }
                    Err(e) => tracing::warn!(error = %e, "log session janitor failed"),
                    _ => {}
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Log-stream session repository.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use warden_core::{LogSession, LogSessionId, LogSessionStatus};

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    cookie: String,
    logname: String,
    log_path: String,
    follow_lines: i64,
    grep_pattern: Option<String>,
    status: String,
    created_at: i64,
    connected_at: Option<i64>,
    disconnected_at: Option<i64>,
    lines_sent: i64,
    error_message: Option<String>,
}

impl SessionRow {
    fn into_session(self) -> LogSession {
        LogSession {
            session_id: LogSessionId::from_string(self.session_id),
            cookie: self.cookie,
            logname: self.logname,
            log_path: self.log_path,
            follow_lines: self.follow_lines,
            grep_pattern: self.grep_pattern,
            status: LogSessionStatus::parse(&self.status).unwrap_or(LogSessionStatus::Error),
            created_at: DateTime::from_timestamp_millis(self.created_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            connected_at: self.connected_at.and_then(DateTime::from_timestamp_millis),
            disconnected_at: self.disconnected_at.and_then(DateTime::from_timestamp_millis),
            lines_sent: self.lines_sent,
            error_message: self.error_message,
        }
    }
}

const SELECT_SESSION: &str = "SELECT session_id, cookie, logname, log_path, follow_lines, \
     grep_pattern, status, created_at, connected_at, disconnected_at, lines_sent, \
     error_message FROM log_sessions";

impl Store {
    pub async fn insert_log_session(&self, session: &LogSession) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO log_sessions (session_id, cookie, logname, log_path, follow_lines, \
             grep_pattern, status, created_at, lines_sent) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.session_id.as_str())
        .bind(&session.cookie)
        .bind(&session.logname)
        .bind(&session.log_path)
        .bind(session.follow_lines)
        .bind(session.grep_pattern.clone())
        .bind(session.status.as_str())
        .bind(session.created_at.timestamp_millis())
        .bind(session.lines_sent)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_log_session(
        &self,
        id: &LogSessionId,
    ) -> Result<Option<LogSession>, StoreError> {
        let row = sqlx::query_as::<_, SessionRow>(&format!("{SELECT_SESSION} WHERE session_id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(SessionRow::into_session))
    }

    pub async fn list_log_sessions(&self) -> Result<Vec<LogSession>, StoreError> {
        let rows =
            sqlx::query_as::<_, SessionRow>(&format!("{SELECT_SESSION} ORDER BY created_at DESC"))
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(SessionRow::into_session).collect())
    }

    /// Sessions counted against `max_concurrent_streams`.
    pub async fn count_open_log_sessions(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM log_sessions WHERE status IN ('created', 'active')",
        )
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// `created -> active` on WebSocket upgrade.
    pub async fn activate_log_session(
        &self,
        id: &LogSessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE log_sessions SET status = 'active', connected_at = ? \
             WHERE session_id = ? AND status = 'created'",
        )
        .bind(now.timestamp_millis())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Terminal transition from any non-terminal state.
    pub async fn close_log_session(
        &self,
        id: &LogSessionId,
        status: LogSessionStatus,
        lines_sent: i64,
        now: DateTime<Utc>,
        error_message: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE log_sessions SET status = ?, disconnected_at = ?, lines_sent = ?, \
             error_message = ? WHERE session_id = ? AND status IN ('created', 'active')",
        )
        .bind(status.as_str())
        .bind(now.timestamp_millis())
        .bind(lines_sent)
        .bind(error_message)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Janitor: remove closed/error sessions older than the cutoff.
    pub async fn delete_stale_log_sessions(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM log_sessions WHERE status IN ('closed', 'error') \
             AND COALESCE(disconnected_at, created_at) < ?",
        )
        .bind(cutoff.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
#[path = "sessions_tests.rs"]
mod tests;

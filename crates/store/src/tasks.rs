// SPDX-License-Identifier: MIT

//! Task repository. The claim CAS and terminal-state freezing live here.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use warden_core::{Task, TaskId, TaskPriority, TaskStatus};

fn ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn dt(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, sqlx::FromRow)]
struct TaskRow {
    id: String,
    operation: String,
    zone_name: String,
    priority: i64,
    status: String,
    metadata: String,
    depends_on: Option<String>,
    created_by: String,
    attempt: i64,
    progress_percent: Option<i64>,
    progress_info: Option<String>,
    error: Option<String>,
    result_message: Option<String>,
    created_at: i64,
    started_at: Option<i64>,
    completed_at: Option<i64>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, StoreError> {
        let progress_info = match self.progress_info {
            Some(text) => Some(serde_json::from_str(&text)?),
            None => None,
        };
        Ok(Task {
            id: TaskId::from_string(self.id),
            operation: self.operation,
            zone_name: self.zone_name,
            priority: TaskPriority::from_rank(self.priority),
            // Unknown statuses cannot appear: writes go through TaskStatus.
            status: TaskStatus::parse(&self.status).unwrap_or(TaskStatus::Failed),
            metadata: serde_json::from_str(&self.metadata)?,
            depends_on: self.depends_on.map(TaskId::from_string),
            created_by: self.created_by,
            attempt: self.attempt as u32,
            progress_percent: self.progress_percent.map(|p| p.clamp(0, 100) as u8),
            progress_info,
            error: self.error,
            result_message: self.result_message,
            created_at: dt(self.created_at),
            started_at: self.started_at.map(dt),
            completed_at: self.completed_at.map(dt),
        })
    }
}

const SELECT_TASK: &str = "SELECT id, operation, zone_name, priority, status, metadata, \
     depends_on, created_by, attempt, progress_percent, progress_info, error, \
     result_message, created_at, started_at, completed_at FROM tasks";

/// Projection filter for task listings.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub operation: Option<String>,
    pub zone_name: Option<String>,
    pub limit: Option<i64>,
}

/// Counts per status plus pending depth per priority.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct TaskStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub pending_by_priority: Vec<(String, i64)>,
}

impl Store {
    pub async fn insert_task(&self, task: &Task) -> Result<(), StoreError> {
        let metadata = serde_json::to_string(&task.metadata)?;
        sqlx::query(
            "INSERT INTO tasks (id, operation, zone_name, priority, status, metadata, \
             depends_on, created_by, attempt, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.as_str())
        .bind(&task.operation)
        .bind(&task.zone_name)
        .bind(task.priority.rank())
        .bind(task.status.as_str())
        .bind(metadata)
        .bind(task.depends_on.as_ref().map(|d| d.as_str().to_string()))
        .bind(&task.created_by)
        .bind(task.attempt as i64)
        .bind(ms(task.created_at))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("{SELECT_TASK} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let mut sql = format!("{SELECT_TASK} WHERE 1=1");
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.operation.is_some() {
            sql.push_str(" AND operation = ?");
        }
        if filter.zone_name.is_some() {
            sql.push_str(" AND zone_name = ?");
        }
        sql.push_str(" ORDER BY created_at DESC");
        if filter.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, TaskRow>(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(operation) = &filter.operation {
            query = query.bind(operation.clone());
        }
        if let Some(zone) = &filter.zone_name {
            query = query.bind(zone.clone());
        }
        if let Some(limit) = filter.limit {
            query = query.bind(limit);
        }

        let rows = query.fetch_all(self.pool()).await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Pending tasks in claim order: priority first, FIFO within a priority.
    pub async fn pending_tasks_ordered(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK} WHERE status = 'pending' ORDER BY priority ASC, created_at ASC"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    pub async fn running_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK} WHERE status = 'running' ORDER BY started_at ASC"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Exclusive claim: conditional `pending -> running` transition.
    ///
    /// Returns false when another worker won the race (zero rows updated).
    pub async fn claim_task(&self, id: &TaskId, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'running', started_at = ?, attempt = attempt + 1 \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(ms(now))
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Finalize a running task as completed.
    pub async fn complete_task(
        &self,
        id: &TaskId,
        now: DateTime<Utc>,
        result_message: Option<&str>,
        progress_info: Option<&serde_json::Value>,
    ) -> Result<bool, StoreError> {
        let info = progress_info.map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE tasks SET status = 'completed', completed_at = ?, result_message = ?, \
             progress_percent = 100, progress_info = COALESCE(?, progress_info) \
             WHERE id = ? AND status = 'running'",
        )
        .bind(ms(now))
        .bind(result_message)
        .bind(info)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Finalize a running task as failed.
    pub async fn fail_task(
        &self,
        id: &TaskId,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', completed_at = ?, error = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(ms(now))
        .bind(error)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Push a running task back to pending for a retry attempt.
    pub async fn requeue_task(&self, id: &TaskId, error: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'pending', started_at = NULL, error = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(error)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Cancel a pending task. CAS: no handler has run, none will.
    pub async fn cancel_pending_task(
        &self,
        id: &TaskId,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', completed_at = ?, error = ? \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(ms(now))
        .bind(reason)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Mark a running task cancelled after its handler observed the
    /// cancellation flag and unwound.
    pub async fn cancel_running_task(
        &self,
        id: &TaskId,
        now: DateTime<Utc>,
        reason: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', completed_at = ?, error = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(ms(now))
        .bind(reason)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Progress writeback; only running tasks accept progress.
    pub async fn set_task_progress(
        &self,
        id: &TaskId,
        percent: Option<u8>,
        info: Option<&serde_json::Value>,
    ) -> Result<(), StoreError> {
        let info = info.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "UPDATE tasks SET progress_percent = COALESCE(?, progress_percent), \
             progress_info = COALESCE(?, progress_info) \
             WHERE id = ? AND status = 'running'",
        )
        .bind(percent.map(|p| p as i64))
        .bind(info)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Pending tasks that depend on the given task.
    pub async fn pending_dependents_of(&self, id: &TaskId) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK} WHERE depends_on = ? AND status = 'pending'"
        ))
        .bind(id.as_str())
        .fetch_all(self.pool())
        .await?;
        rows.into_iter().map(TaskRow::into_task).collect()
    }

    /// Startup recovery: sweep tasks stuck in `running` since before the
    /// grace cutoff to failed with reason `worker_crash`.
    pub async fn sweep_stale_running(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'failed', completed_at = ?, error = 'worker_crash' \
             WHERE status = 'running' AND started_at < ?",
        )
        .bind(ms(now))
        .bind(ms(cutoff))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    /// Retention cleanup for one terminal status.
    pub async fn delete_terminal_tasks_before(
        &self,
        status: TaskStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM tasks WHERE status = ? AND completed_at IS NOT NULL AND completed_at < ?",
        )
        .bind(status.as_str())
        .bind(ms(cutoff))
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn task_stats(&self) -> Result<TaskStats, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(self.pool())
                .await?;
        let mut stats = TaskStats::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => stats.pending = count,
                "running" => stats.running = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                _ => {}
            }
        }
        let depth: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT priority, COUNT(*) FROM tasks WHERE status = 'pending' \
             GROUP BY priority ORDER BY priority ASC",
        )
        .fetch_all(self.pool())
        .await?;
        stats.pending_by_priority = depth
            .into_iter()
            .map(|(rank, count)| (TaskPriority::from_rank(rank).to_string(), count))
            .collect();
        Ok(stats)
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;

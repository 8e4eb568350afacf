// SPDX-License-Identifier: MIT

//! Task record and state machine.
//!
//! A task is a unit of deferred, persisted, observable work. Every mutating
//! API endpoint funnels into one; the scheduler claims, dispatches, and
//! finalizes them.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId("tsk-");
}

/// Grouping key for tasks that do not belong to a concrete zone.
pub const ZONE_SYSTEM: &str = "system";
/// Grouping key for artifact inventory work.
pub const ZONE_ARTIFACT: &str = "artifact";

/// Scheduling priority. `Critical` is claimed before everything else;
/// `Background` may starve indefinitely while higher work exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
    Background,
}

impl TaskPriority {
    /// Sort rank: lower sorts first in candidate selection.
    pub fn rank(self) -> i64 {
        match self {
            TaskPriority::Critical => 0,
            TaskPriority::High => 1,
            TaskPriority::Medium => 2,
            TaskPriority::Low => 3,
            TaskPriority::Background => 4,
        }
    }

    pub fn from_rank(rank: i64) -> Self {
        match rank {
            0 => TaskPriority::Critical,
            1 => TaskPriority::High,
            3 => TaskPriority::Low,
            4 => TaskPriority::Background,
            _ => TaskPriority::Medium,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Medium => "medium",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task lifecycle status. Terminal states are immutable except by cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub operation: String,
    pub zone_name: String,
    pub priority: TaskPriority,
    pub metadata: serde_json::Value,
    pub depends_on: Option<TaskId>,
    pub created_by: String,
}

impl NewTask {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            zone_name: ZONE_SYSTEM.to_string(),
            priority: TaskPriority::Medium,
            metadata: serde_json::Value::Null,
            depends_on: None,
            created_by: String::new(),
        }
    }

    pub fn zone_name(mut self, v: impl Into<String>) -> Self {
        self.zone_name = v.into();
        self
    }

    pub fn priority(mut self, v: TaskPriority) -> Self {
        self.priority = v;
        self
    }

    pub fn metadata(mut self, v: serde_json::Value) -> Self {
        self.metadata = v;
        self
    }

    pub fn depends_on(mut self, v: TaskId) -> Self {
        self.depends_on = Some(v);
        self
    }

    pub fn created_by(mut self, v: impl Into<String>) -> Self {
        self.created_by = v.into();
        self
    }
}

/// A persisted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Name of the registered handler that executes this task.
    pub operation: String,
    /// Grouping key; concrete zone names plus the `system`/`artifact`
    /// sentinels. Governs per-zone serialization.
    pub zone_name: String,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    /// Opaque parameter bag; handler-specific schema, decoded inside the
    /// handler entry.
    pub metadata: serde_json::Value,
    /// Linear dependency: ineligible to run until this task is completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<TaskId>,
    pub created_by: String,
    /// Execution attempt count (0 until first claim).
    #[serde(default)]
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task record.
    pub fn new(config: NewTask, clock: &Clock) -> Self {
        Self {
            id: TaskId::new(),
            operation: config.operation,
            zone_name: config.zone_name,
            priority: config.priority,
            status: TaskStatus::Pending,
            metadata: config.metadata,
            depends_on: config.depends_on,
            created_by: config.created_by,
            attempt: 0,
            progress_percent: None,
            progress_info: None,
            error: None,
            result_message: None,
            created_at: clock.now_utc(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Result of a handler invocation. Executors never propagate errors across
/// the task boundary; every failure folds into `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<serde_json::Value>,
}

impl TaskOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: Some(message.into()), error: None, progress_info: None }
    }

    pub fn ok_with(message: impl Into<String>, info: serde_json::Value) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
            progress_info: Some(info),
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, message: None, error: Some(error.into()), progress_info: None }
    }

    pub fn fail_with(error: impl Into<String>, info: serde_json::Value) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            progress_info: Some(info),
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;

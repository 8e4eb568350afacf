// SPDX-License-Identifier: MIT

//! Log-stream session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a log-stream session.
    pub struct LogSessionId("lgs-");
}

/// Session lifecycle.
///
/// `created`: row written by the start endpoint;
/// `active`: WebSocket attached and tail running;
/// `closed` / `error` / `stopped`: terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSessionStatus {
    Created,
    Active,
    Closed,
    Error,
    Stopped,
}

impl LogSessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LogSessionStatus::Closed | LogSessionStatus::Error | LogSessionStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogSessionStatus::Created => "created",
            LogSessionStatus::Active => "active",
            LogSessionStatus::Closed => "closed",
            LogSessionStatus::Error => "error",
            LogSessionStatus::Stopped => "stopped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(LogSessionStatus::Created),
            "active" => Some(LogSessionStatus::Active),
            "closed" => Some(LogSessionStatus::Closed),
            "error" => Some(LogSessionStatus::Error),
            "stopped" => Some(LogSessionStatus::Stopped),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogSessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted log-stream session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSession {
    pub session_id: LogSessionId,
    /// Opaque handle the WebSocket client must present on upgrade.
    pub cookie: String,
    pub logname: String,
    pub log_path: String,
    pub follow_lines: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grep_pattern: Option<String>,
    pub status: LogSessionStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lines_sent: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
#[path = "logstream_tests.rs"]
mod tests;

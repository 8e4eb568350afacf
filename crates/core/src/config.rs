// SPDX-License-Identifier: MIT

//! Typed, read-only configuration sections.
//!
//! Loaded once at startup from a TOML file and shared as an immutable
//! `Arc<WardenConfig>`. Every section has serde defaults so a partial (or
//! empty) file yields a runnable configuration.

use crate::artifact::LocationKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    Read(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub server: ServerConfig,
    pub task_queue: TaskQueueConfig,
    pub artifact_storage: ArtifactStorageConfig,
    pub system_logs: SystemLogsConfig,
    pub provisioning: ProvisioningConfig,
    pub host_monitoring: HostMonitoringConfig,
    pub api_keys: Vec<ApiKey>,
}

impl WardenConfig {
    /// Load from a TOML file. A missing file is a hard error; callers that
    /// want defaults pass no config path and use `WardenConfig::default()`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 5001 }
    }
}

/// API key bound to a principal name; the matched name becomes the task's
/// `created_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskQueueConfig {
    /// Scheduler tick in milliseconds.
    pub tick_ms: u64,
    /// Global cap on concurrently running tasks.
    pub global_max: usize,
    /// Concurrency cap for artifact URL downloads.
    pub max_concurrent_downloads: usize,
    /// Retry attempts for a failing task (0 disables retries).
    pub max_retries: u32,
    /// Base for exponential retry backoff, in seconds.
    pub retry_backoff_base_secs: u64,
    /// Grace window before a stale `running` task is swept to failed at
    /// startup, in seconds.
    pub recovery_grace_secs: i64,
    /// Retention for completed tasks, in days.
    pub retention_completed_days: i64,
    /// Retention for failed/cancelled tasks, in days.
    pub retention_failed_days: i64,
    /// Cleanup sweep interval in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            tick_ms: 500,
            global_max: 8,
            max_concurrent_downloads: 3,
            max_retries: 0,
            retry_backoff_base_secs: 5,
            recovery_grace_secs: 300,
            retention_completed_days: 7,
            retention_failed_days: 30,
            cleanup_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactStorageConfig {
    pub enabled: bool,
    pub download: DownloadConfig,
    pub scanning: ScanningConfig,
}

impl Default for ArtifactStorageConfig {
    fn default() -> Self {
        Self { enabled: true, download: DownloadConfig::default(), scanning: ScanningConfig::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Per-connect timeout for the HTTP client.
    pub timeout_seconds: u64,
    /// Total stream timeout for one download.
    pub total_timeout_seconds: u64,
    /// Minimum interval between task progress writebacks.
    pub progress_update_seconds: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { timeout_seconds: 60, total_timeout_seconds: 1800, progress_update_seconds: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanningConfig {
    pub supported_extensions: SupportedExtensions,
}

impl Default for ScanningConfig {
    fn default() -> Self {
        Self { supported_extensions: SupportedExtensions::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportedExtensions {
    pub iso: Vec<String>,
    pub image: Vec<String>,
    pub provisioning: Vec<String>,
}

impl Default for SupportedExtensions {
    fn default() -> Self {
        Self {
            iso: vec!["iso".into()],
            image: vec![
                "img".into(),
                "raw".into(),
                "qcow2".into(),
                "vmdk".into(),
                "zvol".into(),
                "gz".into(),
                "xz".into(),
                "zst".into(),
            ],
            provisioning: vec!["tar".into(), "tgz".into(), "gz".into(), "zip".into()],
        }
    }
}

impl SupportedExtensions {
    /// Extensions accepted when scanning a location of the given kind.
    pub fn for_kind(&self, kind: LocationKind) -> &[String] {
        match kind {
            LocationKind::Iso => &self.iso,
            LocationKind::Image => &self.image,
            LocationKind::Provisioning => &self.provisioning,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemLogsConfig {
    pub enabled: bool,
    /// Roots under which files may be streamed.
    pub allowed_paths: Vec<String>,
    pub max_concurrent_streams: usize,
    pub security: LogSecurityConfig,
}

impl Default for SystemLogsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_paths: vec!["/var/log".into(), "/var/adm".into()],
            max_concurrent_streams: 10,
            security: LogSecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSecurityConfig {
    pub max_file_size_mb: u64,
    /// Glob patterns; a filename or path matching any of them is refused.
    pub forbidden_patterns: Vec<String>,
}

impl Default for LogSecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            forbidden_patterns: vec!["*shadow*".into(), "*passwd*".into(), "*.key".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// ZFS dataset under which per-zone provisioning datasets are created.
    pub dataset: String,
    /// Mountpoint root; zone `web01` lands at `<base>/web01`.
    pub mountpoint_base: String,
    /// Account that owns extracted provisioning content.
    pub service_user: String,
    pub ssh: SshConfig,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            dataset: "rpool/warden/provisioning".to_string(),
            mountpoint_base: "/var/warden/provisioning".to_string(),
            service_user: "warden".to_string(),
            ssh: SshConfig::default(),
        }
    }
}

impl ProvisioningConfig {
    /// Per-zone dataset name and mountpoint.
    pub fn zone_dataset(&self, zone: &str) -> String {
        format!("{}/{}", self.dataset, zone)
    }

    pub fn zone_mountpoint(&self, zone: &str) -> std::path::PathBuf {
        std::path::Path::new(&self.mountpoint_base).join(zone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    /// Default private key; relative paths resolve under the zone's
    /// provisioning dataset.
    pub key_path: String,
    pub timeout_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self { key_path: "keys/id_ed25519".to_string(), timeout_seconds: 300, poll_interval_seconds: 5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostMonitoringConfig {
    pub performance: PerformanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Timeout for metric-collection subcommands, in seconds.
    pub command_timeout: u64,
    /// Row batch size for bulk database writes.
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { command_timeout: 30, batch_size: 100 }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

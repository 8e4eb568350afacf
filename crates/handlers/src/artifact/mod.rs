// SPDX-License-Identifier: MIT

//! The artifact storage engine: scan, download, upload processing,
//! deletion, and checksum verification over the configured storage
//! locations.

pub mod checksum;
pub mod delete;
pub mod download;
pub mod scan;
pub mod upload;

use std::collections::HashSet;
use std::sync::Arc;
use warden_adapters::CommandRunner;
use warden_core::{Clock, WardenConfig};
use warden_queue::RunningIndex;

use crate::ops;

/// Shared state for every artifact handler.
#[derive(Clone)]
pub struct ArtifactEngine {
    pub(crate) config: Arc<WardenConfig>,
    pub(crate) runner: CommandRunner,
    pub(crate) running: RunningIndex,
    pub(crate) http: reqwest::Client,
    pub(crate) clock: Clock,
}

impl ArtifactEngine {
    pub fn new(config: Arc<WardenConfig>, runner: CommandRunner, running: RunningIndex) -> Self {
        let connect_timeout =
            std::time::Duration::from_secs(config.artifact_storage.download.timeout_seconds);
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_default();
        Self { config, runner, running, http, clock: Clock::system() }
    }

    pub(crate) fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now_utc()
    }

    /// Final paths of in-flight downloads and upload processing. The scan
    /// skips these so a partial file never gets an inventory row.
    pub(crate) fn writing_paths(&self) -> HashSet<String> {
        let mut paths: HashSet<String> =
            self.running.target_paths_for(ops::ARTIFACT_DOWNLOAD_URL).into_iter().collect();
        paths.extend(self.running.target_paths_for(ops::ARTIFACT_UPLOAD_PROCESS));
        paths
    }
}

/// Target-path extractor for `artifact_download_url` (single-writer-per-
/// path fence and the scan skip rule). The API layer resolves the final
/// path at enqueue time.
pub fn download_target_path(metadata: &serde_json::Value) -> Option<String> {
    metadata.get("final_path").and_then(|v| v.as_str()).map(str::to_string)
}

/// Target-path extractor for `artifact_upload_process`.
pub fn upload_target_path(metadata: &serde_json::Value) -> Option<String> {
    metadata.get("final_path").and_then(|v| v.as_str()).map(str::to_string)
}

/// Derive a filename from a URL path, ignoring query and fragment.
pub(crate) fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let rest = without_query.split_once("://").map(|(_, rest)| rest).unwrap_or(without_query);
    if !rest.contains('/') {
        return None;
    }
    let candidate = rest.rsplit('/').next().unwrap_or("");
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

/// Join a location path and filename.
pub(crate) fn join_location_path(location_path: &str, filename: &str) -> String {
    format!("{}/{}", location_path.trim_end_matches('/'), filename)
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

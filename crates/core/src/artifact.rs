// SPDX-License-Identifier: MIT

//! Artifact inventory domain types: storage locations and the files
//! discovered or downloaded into them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for an artifact row.
    pub struct ArtifactId("art-");
}

crate::define_id! {
    /// Unique identifier for a storage location.
    pub struct LocationId("loc-");
}

/// What a storage location holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationKind {
    Iso,
    Image,
    Provisioning,
}

impl LocationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocationKind::Iso => "iso",
            LocationKind::Image => "image",
            LocationKind::Provisioning => "provisioning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "iso" => Some(LocationKind::Iso),
            "image" => Some(LocationKind::Image),
            "provisioning" => Some(LocationKind::Provisioning),
            _ => None,
        }
    }
}

impl std::fmt::Display for LocationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hash algorithm for artifact verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    #[default]
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Md5 => "md5",
            ChecksumAlgorithm::Sha1 => "sha1",
            ChecksumAlgorithm::Sha256 => "sha256",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "md5" => Some(ChecksumAlgorithm::Md5),
            "sha1" => Some(ChecksumAlgorithm::Sha1),
            "sha256" => Some(ChecksumAlgorithm::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured filesystem path scanned for artifacts.
///
/// `file_count` and `total_size` are cached aggregates, updated by scans
/// and by create/delete operations; after any successful scan they equal
/// the row count and size sum of the location's artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageLocation {
    pub id: LocationId,
    pub name: String,
    pub path: String,
    pub kind: LocationKind,
    pub enabled: bool,
    pub file_count: i64,
    pub total_size: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scan_errors: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A file tracked by the inventory. `path` uniquely identifies it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub storage_location_id: LocationId,
    pub filename: String,
    pub path: String,
    pub size: i64,
    pub file_type: LocationKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_algorithm: Option<ChecksumAlgorithm>,
    /// `None` = never checked; `Some(true/false)` = verification outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_verified: Option<DateTime<Utc>>,
}

/// Guess a MIME type from a filename extension. Only the types the
/// inventory actually serves are mapped; everything else is octet-stream.
pub fn mime_type_for(extension: &str) -> &'static str {
    match extension {
        "iso" => "application/x-iso9660-image",
        "gz" | "tgz" => "application/gzip",
        "xz" => "application/x-xz",
        "zst" => "application/zstd",
        "tar" => "application/x-tar",
        "zip" => "application/zip",
        "raw" | "img" | "vmdk" | "qcow2" | "zvol" => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

/// Extract the lowercase extension of a filename, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;

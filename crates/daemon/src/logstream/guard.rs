// SPDX-License-Identifier: MIT

//! Start-endpoint validations for log streaming: path confinement,
//! forbidden patterns, size caps, and the binary-content heuristic.

use std::io::Read;
use std::path::{Path, PathBuf};
use warden_core::config::SystemLogsConfig;

/// Bytes inspected by the binary heuristic.
const SNIFF_LEN: usize = 8 * 1024;
/// NUL-byte ratio above which a file is considered binary.
const NUL_RATIO: f64 = 0.01;
/// Control-byte ratio (excluding \t \n \r) above which a file is binary.
const CONTROL_RATIO: f64 = 0.05;

/// Reject reason for a stream-start request; maps to a 400.
#[derive(Debug, PartialEq, Eq)]
pub enum Refusal {
    Disabled,
    BadName(String),
    NotFound(String),
    OutsideAllowedPaths(String),
    Forbidden(String),
    TooLarge { size: u64, limit: u64 },
    Binary(String),
    TooManyStreams { active: i64, limit: usize },
}

impl std::fmt::Display for Refusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Refusal::Disabled => write!(f, "log streaming is disabled"),
            Refusal::BadName(name) => write!(f, "invalid log name: {name}"),
            Refusal::NotFound(name) => write!(f, "log file not found: {name}"),
            Refusal::OutsideAllowedPaths(path) => {
                write!(f, "log file outside allowed paths: {path}")
            }
            Refusal::Forbidden(name) => write!(f, "log file matches a forbidden pattern: {name}"),
            Refusal::TooLarge { size, limit } => {
                write!(f, "log file too large ({size} bytes, limit {limit})")
            }
            Refusal::Binary(name) => write!(f, "refusing to stream binary file: {name}"),
            Refusal::TooManyStreams { active, limit } => {
                write!(f, "too many concurrent streams ({active}/{limit})")
            }
        }
    }
}

/// Resolve and validate a log name against the configured policy.
/// `active_sessions` is the current open-session count.
pub fn authorize_stream(
    config: &SystemLogsConfig,
    logname: &str,
    active_sessions: i64,
) -> Result<PathBuf, Refusal> {
    if !config.enabled {
        return Err(Refusal::Disabled);
    }
    if active_sessions >= config.max_concurrent_streams as i64 {
        return Err(Refusal::TooManyStreams {
            active: active_sessions,
            limit: config.max_concurrent_streams,
        });
    }
    // Names are plain filenames (optionally with subdirectories), never
    // traversals.
    if logname.is_empty() || logname.starts_with('/') || logname.split('/').any(|c| c == "..") {
        return Err(Refusal::BadName(logname.to_string()));
    }

    let path = config
        .allowed_paths
        .iter()
        .map(|root| Path::new(root).join(logname))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| Refusal::NotFound(logname.to_string()))?;

    // Canonicalize so a symlink cannot escape the allowed roots.
    let canonical = path
        .canonicalize()
        .map_err(|_| Refusal::NotFound(logname.to_string()))?;
    let inside = config.allowed_paths.iter().any(|root| {
        Path::new(root)
            .canonicalize()
            .map(|root| canonical.starts_with(root))
            .unwrap_or(false)
    });
    if !inside {
        return Err(Refusal::OutsideAllowedPaths(canonical.display().to_string()));
    }

    let path_str = canonical.display().to_string();
    let filename = canonical
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    for pattern in &config.security.forbidden_patterns {
        if glob_match(pattern, &filename) || glob_match(pattern, &path_str) {
            return Err(Refusal::Forbidden(filename));
        }
    }

    let size = canonical.metadata().map(|m| m.len()).unwrap_or(0);
    let limit = config.security.max_file_size_mb * 1024 * 1024 * 2;
    if size > limit {
        return Err(Refusal::TooLarge { size, limit });
    }

    if looks_binary(&canonical) {
        return Err(Refusal::Binary(filename));
    }

    Ok(canonical)
}

/// Heuristic: read the first 8 KiB; >1% NUL bytes or >5% control bytes
/// (excluding tab/newline/carriage-return) means binary.
pub fn looks_binary(path: &Path) -> bool {
    let Ok(mut file) = std::fs::File::open(path) else { return false };
    let mut buf = vec![0u8; SNIFF_LEN];
    let Ok(read) = file.read(&mut buf) else { return false };
    if read == 0 {
        return false;
    }
    is_binary_content(&buf[..read])
}

pub fn is_binary_content(data: &[u8]) -> bool {
    let total = data.len() as f64;
    let nuls = data.iter().filter(|b| **b == 0).count() as f64;
    if nuls / total >= NUL_RATIO {
        return true;
    }
    let controls = data
        .iter()
        .filter(|b| b.is_ascii_control() && !matches!(**b, b'\t' | b'\n' | b'\r'))
        .count() as f64;
    controls / total > CONTROL_RATIO
}

/// Minimal glob matching: `*` (any run) and `?` (any single byte).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(pattern: &[u8], text: &[u8]) -> bool {
        match (pattern.first(), text.first()) {
            (None, None) => true,
            (Some(b'*'), _) => {
                inner(&pattern[1..], text)
                    || (!text.is_empty() && inner(pattern, &text[1..]))
            }
            (Some(b'?'), Some(_)) => inner(&pattern[1..], &text[1..]),
            (Some(p), Some(t)) if p == t => inner(&pattern[1..], &text[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;

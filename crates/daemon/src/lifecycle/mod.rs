// SPDX-License-Identifier: MIT

//! Daemon lifecycle: paths, exclusive lock, ordered startup, graceful
//! shutdown.

mod startup;

pub use startup::{run, startup, Daemon};

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use warden_core::WardenConfig;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("another wardend already holds the lock: {0}")]
    LockFailed(std::io::Error),
    #[error("store unavailable: {0}")]
    Store(#[from] warden_store::StoreError),
    #[error("failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),
}

/// Resolved filesystem layout plus the loaded configuration.
#[derive(Clone)]
pub struct DaemonPaths {
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub lock_path: PathBuf,
    pub log_dir: PathBuf,
    pub config: Arc<WardenConfig>,
}

impl DaemonPaths {
    pub fn new(state_dir: PathBuf, config: Arc<WardenConfig>) -> Self {
        Self {
            db_path: state_dir.join("warden.db"),
            lock_path: state_dir.join("wardend.lock"),
            log_dir: state_dir.join("logs"),
            state_dir,
            config,
        }
    }
}

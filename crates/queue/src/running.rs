// SPDX-License-Identifier: MIT

//! Advisory in-memory index of in-flight tasks.
//!
//! Used by the scheduler's concurrency fences and by the artifact scan's
//! downloading-path skip rule. Advisory only: persistent truth is the
//! store.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use warden_core::TaskId;

#[derive(Debug, Clone)]
pub struct RunningEntry {
    pub operation: String,
    pub zone_name: String,
    pub zone_exclusive: bool,
    pub target_path: Option<String>,
}

/// Process-local registry of running tasks, sharable with handlers.
#[derive(Clone, Default)]
pub struct RunningIndex {
    inner: Arc<Mutex<HashMap<TaskId, RunningEntry>>>,
}

impl RunningIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: TaskId, entry: RunningEntry) {
        self.inner.lock().insert(id, entry);
    }

    pub fn remove(&self, id: &TaskId) {
        self.inner.lock().remove(id);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn count_operation(&self, operation: &str) -> usize {
        self.inner.lock().values().filter(|e| e.operation == operation).count()
    }

    /// A zone is busy when any exclusive task is running against it.
    pub fn zone_busy(&self, zone_name: &str) -> bool {
        self.inner
            .lock()
            .values()
            .any(|e| e.zone_exclusive && e.zone_name == zone_name)
    }

    pub fn path_busy(&self, path: &str) -> bool {
        self.inner.lock().values().any(|e| e.target_path.as_deref() == Some(path))
    }

    /// Target paths of running tasks for one operation. The artifact scan
    /// reads this to skip files that are mid-download.
    pub fn target_paths_for(&self, operation: &str) -> Vec<String> {
        self.inner
            .lock()
            .values()
            .filter(|e| e.operation == operation)
            .filter_map(|e| e.target_path.clone())
            .collect()
    }

    pub fn all_target_paths(&self) -> Vec<String> {
        self.inner.lock().values().filter_map(|e| e.target_path.clone()).collect()
    }
}

#[cfg(test)]
#[path = "running_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Throttled, fire-and-forget task progress writeback.
//!
//! The data path (a download stream, a hash loop) must never stall on the
//! progress writer; updates are scheduled onto the runtime and dropped
//! when they arrive faster than the configured interval.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_core::TaskId;
use warden_store::Store;

#[derive(Clone)]
pub struct ProgressWriter {
    task_id: TaskId,
    store: Store,
    min_interval: Duration,
    last_write: Arc<Mutex<Option<Instant>>>,
}

impl ProgressWriter {
    pub fn new(store: Store, task_id: TaskId, min_interval: Duration) -> Self {
        Self { task_id, store, min_interval, last_write: Arc::new(Mutex::new(None)) }
    }

    /// Record progress without blocking the caller. Writes are throttled
    /// to one per `min_interval`; a 100% update always goes through.
    pub fn update(&self, percent: Option<u8>, info: Option<serde_json::Value>) {
        let now = Instant::now();
        {
            let mut last = self.last_write.lock();
            let due = match *last {
                Some(previous) => now.duration_since(previous) >= self.min_interval,
                None => true,
            };
            if !due && percent != Some(100) {
                return;
            }
            *last = Some(now);
        }

        let store = self.store.clone();
        let task_id = self.task_id.clone();
        tokio::spawn(async move {
            if let Err(e) = store.set_task_progress(&task_id, percent, info.as_ref()).await {
                tracing::warn!(task_id = %task_id, error = %e, "progress write failed");
            }
        });
    }

    /// Synchronous write for step boundaries where ordering matters
    /// (e.g. the final state before verification starts).
    pub async fn update_now(&self, percent: Option<u8>, info: Option<serde_json::Value>) {
        *self.last_write.lock() = Some(Instant::now());
        if let Err(e) = self.store.set_task_progress(&self.task_id, percent, info.as_ref()).await {
            tracing::warn!(task_id = %self.task_id, error = %e, "progress write failed");
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Cooperative cancellation registry.
//!
//! One `CancellationToken` per running task; handlers poll between
//! discrete steps and propagate to subprocesses by letting the current
//! step finish and declining the next.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use warden_core::TaskId;

#[derive(Clone, Default)]
pub struct CancelRegistry {
    inner: Arc<Mutex<HashMap<TaskId, CancellationToken>>>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and track the token for a freshly claimed task.
    pub fn register(&self, id: TaskId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().insert(id, token.clone());
        token
    }

    /// Signal a running task. Returns false when the task is not in
    /// flight (already finished, or never claimed by this process).
    pub fn cancel(&self, id: &TaskId) -> bool {
        match self.inner.lock().get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
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
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

//! Time source for scheduling decisions and persisted timestamps.
//!
//! One cloneable handle instead of a trait: production code holds a
//! system-backed `Clock`, tests pin a manual one and advance it
//! explicitly. Cloning shares the underlying source, so every component
//! handed a manual clock observes the same advances.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Clock {
    source: Source,
}

#[derive(Clone)]
enum Source {
    System,
    Manual(Arc<Mutex<ManualState>>),
}

struct ManualState {
    instant: Instant,
    epoch_ms: u64,
}

impl Clock {
    /// Wall-clock time; the only source production code uses.
    pub fn system() -> Self {
        Self { source: Source::System }
    }

    /// A clock pinned at `epoch_ms` that only moves through [`advance`].
    ///
    /// [`advance`]: Clock::advance
    pub fn manual(epoch_ms: u64) -> Self {
        Self {
            source: Source::Manual(Arc::new(Mutex::new(ManualState {
                instant: Instant::now(),
                epoch_ms,
            }))),
        }
    }

    /// Monotonic reading for elapsed-time measurements.
    pub fn now(&self) -> Instant {
        match &self.source {
            Source::System => Instant::now(),
            Source::Manual(state) => state.lock().instant,
        }
    }

    /// Milliseconds since the Unix epoch.
    pub fn epoch_ms(&self) -> u64 {
        match &self.source {
            Source::System => {
                SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
            }
            Source::Manual(state) => state.lock().epoch_ms,
        }
    }

    /// Wall-clock time as stored in the database.
    pub fn now_utc(&self) -> DateTime<Utc> {
        match &self.source {
            Source::System => Utc::now(),
            Source::Manual(state) => {
                DateTime::from_timestamp_millis(state.lock().epoch_ms as i64)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC)
            }
        }
    }

    /// Move a manual clock forward. System clocks ignore this; real time
    /// is not steerable.
    pub fn advance(&self, duration: Duration) {
        if let Source::Manual(state) = &self.source {
            let mut state = state.lock();
            state.instant += duration;
            state.epoch_ms += duration.as_millis() as u64;
        }
    }
}

impl std::fmt::Debug for Clock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Source::System => f.write_str("Clock::system"),
            Source::Manual(state) => {
                write!(f, "Clock::manual({})", state.lock().epoch_ms)
            }
        }
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-store: SQLite persistence for tasks, artifacts, storage
//! locations, and log-stream sessions.
//!
//! One repository module per entity; records are `FromRow` structs
//! converted to/from the domain types in `warden-core`. The database is
//! the only shared mutable state in the system; every cross-worker
//! invariant (the claim CAS, terminal-state freezing, aggregate caches)
//! is enforced here.

mod artifacts;
mod locations;
mod schema;
mod sessions;
mod tasks;

pub use artifacts::{ArtifactFilter, ArtifactSort, NewArtifact, SortOrder};
pub use locations::LocationUpdate;
pub use tasks::{TaskFilter, TaskStats};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("invalid stored json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid database path: {0}")]
    BadPath(String),
}

/// Default row count per bulk INSERT/DELETE statement.
const DEFAULT_BULK_CHUNK: usize = 100;

/// Handle to the process-wide store. Cheap to clone; all methods take
/// `&self` and are safe to call from concurrent workers.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    bulk_chunk: usize,
}

impl Store {
    /// Open (creating if missing) the database file and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let url = path.to_str().ok_or_else(|| StoreError::BadPath(path.display().to_string()))?;
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{url}"))?
            .create_if_missing(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;
        let store = Self { pool, bulk_chunk: DEFAULT_BULK_CHUNK };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database for tests. Single connection: each SQLite
    /// `:memory:` connection is its own database.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new().max_connections(1).connect("sqlite::memory:").await?;
        let store = Self { pool, bulk_chunk: DEFAULT_BULK_CHUNK };
        store.migrate().await?;
        Ok(store)
    }

    /// Override the bulk-write batch size. Batching keeps transactions
    /// short while scans insert or delete many rows.
    pub fn with_bulk_chunk(mut self, rows: usize) -> Self {
        self.bulk_chunk = rows.max(1);
        self
    }

    pub(crate) fn bulk_chunk(&self) -> usize {
        self.bulk_chunk
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in schema::SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

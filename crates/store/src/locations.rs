// SPDX-License-Identifier: MIT

//! Storage-location repository.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use warden_core::{LocationId, LocationKind, StorageLocation};

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: String,
    name: String,
    path: String,
    kind: String,
    enabled: bool,
    file_count: i64,
    total_size: i64,
    last_scan_at: Option<i64>,
    scan_errors: i64,
    last_error_message: Option<String>,
    created_at: i64,
}

impl LocationRow {
    fn into_location(self) -> StorageLocation {
        StorageLocation {
            id: LocationId::from_string(self.id),
            name: self.name,
            path: self.path,
            kind: LocationKind::parse(&self.kind).unwrap_or(LocationKind::Iso),
            enabled: self.enabled,
            file_count: self.file_count,
            total_size: self.total_size,
            last_scan_at: self.last_scan_at.and_then(DateTime::from_timestamp_millis),
            scan_errors: self.scan_errors,
            last_error_message: self.last_error_message,
            created_at: DateTime::from_timestamp_millis(self.created_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
        }
    }
}

const SELECT_LOCATION: &str = "SELECT id, name, path, kind, enabled, file_count, total_size, \
     last_scan_at, scan_errors, last_error_message, created_at FROM storage_locations";

/// Partial update for the mutable location fields.
#[derive(Debug, Clone, Default)]
pub struct LocationUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl Store {
    /// Insert a location. The unique `path` constraint surfaces as a
    /// database error the caller maps to a conflict.
    pub async fn insert_location(&self, location: &StorageLocation) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO storage_locations \
             (id, name, path, kind, enabled, file_count, total_size, scan_errors, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(location.id.as_str())
        .bind(&location.name)
        .bind(&location.path)
        .bind(location.kind.as_str())
        .bind(location.enabled)
        .bind(location.file_count)
        .bind(location.total_size)
        .bind(location.scan_errors)
        .bind(location.created_at.timestamp_millis())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_location(&self, id: &LocationId) -> Result<Option<StorageLocation>, StoreError> {
        let row = sqlx::query_as::<_, LocationRow>(&format!("{SELECT_LOCATION} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(LocationRow::into_location))
    }

    pub async fn get_location_by_path(
        &self,
        path: &str,
    ) -> Result<Option<StorageLocation>, StoreError> {
        let row = sqlx::query_as::<_, LocationRow>(&format!("{SELECT_LOCATION} WHERE path = ?"))
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(LocationRow::into_location))
    }

    pub async fn list_locations(
        &self,
        kind: Option<LocationKind>,
        enabled: Option<bool>,
    ) -> Result<Vec<StorageLocation>, StoreError> {
        let mut sql = format!("{SELECT_LOCATION} WHERE 1=1");
        if kind.is_some() {
            sql.push_str(" AND kind = ?");
        }
        if enabled.is_some() {
            sql.push_str(" AND enabled = ?");
        }
        sql.push_str(" ORDER BY name ASC");

        let mut query = sqlx::query_as::<_, LocationRow>(&sql);
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        if let Some(enabled) = enabled {
            query = query.bind(enabled);
        }
        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(LocationRow::into_location).collect())
    }

    pub async fn update_location(
        &self,
        id: &LocationId,
        update: &LocationUpdate,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE storage_locations SET name = COALESCE(?, name), \
             enabled = COALESCE(?, enabled) WHERE id = ?",
        )
        .bind(update.name.clone())
        .bind(update.enabled)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn delete_location(&self, id: &LocationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM storage_locations WHERE id = ?")
            .bind(id.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Incremental aggregate maintenance for create/delete paths.
    pub async fn adjust_location_aggregates(
        &self,
        id: &LocationId,
        delta_count: i64,
        delta_size: i64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE storage_locations SET \
             file_count = MAX(file_count + ?, 0), \
             total_size = MAX(total_size + ?, 0) WHERE id = ?",
        )
        .bind(delta_count)
        .bind(delta_size)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Post-scan aggregate recompute from the artifact rows themselves.
    pub async fn refresh_location_aggregates(
        &self,
        id: &LocationId,
        scanned_at: DateTime<Utc>,
    ) -> Result<(i64, i64), StoreError> {
        let (count, size): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(size), 0) FROM artifacts WHERE storage_location_id = ?",
        )
        .bind(id.as_str())
        .fetch_one(self.pool())
        .await?;

        sqlx::query(
            "UPDATE storage_locations SET file_count = ?, total_size = ?, last_scan_at = ?, \
             last_error_message = NULL WHERE id = ?",
        )
        .bind(count)
        .bind(size)
        .bind(scanned_at.timestamp_millis())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok((count, size))
    }

    pub async fn record_location_scan_error(
        &self,
        id: &LocationId,
        message: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE storage_locations SET scan_errors = scan_errors + 1, \
             last_error_message = ? WHERE id = ?",
        )
        .bind(message)
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "locations_tests.rs"]
mod tests;

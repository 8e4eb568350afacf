// SPDX-License-Identifier: MIT

//! Artifact repository. Bulk writes batch to keep transactions short; the
//! scan path classifies work first and then applies it in chunks.

use crate::{Store, StoreError};
use chrono::{DateTime, Utc};
use warden_core::{Artifact, ArtifactId, ChecksumAlgorithm, LocationId, LocationKind};

#[derive(Debug, sqlx::FromRow)]
struct ArtifactRow {
    id: String,
    storage_location_id: String,
    filename: String,
    path: String,
    size: i64,
    file_type: String,
    extension: Option<String>,
    mime_type: Option<String>,
    checksum: Option<String>,
    checksum_algorithm: Option<String>,
    checksum_verified: Option<bool>,
    source_url: Option<String>,
    discovered_at: i64,
    last_verified: Option<i64>,
}

impl ArtifactRow {
    fn into_artifact(self) -> Artifact {
        Artifact {
            id: ArtifactId::from_string(self.id),
            storage_location_id: LocationId::from_string(self.storage_location_id),
            filename: self.filename,
            path: self.path,
            size: self.size,
            file_type: LocationKind::parse(&self.file_type).unwrap_or(LocationKind::Iso),
            extension: self.extension,
            mime_type: self.mime_type,
            checksum: self.checksum,
            checksum_algorithm: self.checksum_algorithm.as_deref().and_then(ChecksumAlgorithm::parse),
            checksum_verified: self.checksum_verified,
            source_url: self.source_url,
            discovered_at: DateTime::from_timestamp_millis(self.discovered_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            last_verified: self.last_verified.and_then(DateTime::from_timestamp_millis),
        }
    }
}

const SELECT_ARTIFACT: &str = "SELECT id, storage_location_id, filename, path, size, file_type, \
     extension, mime_type, checksum, checksum_algorithm, checksum_verified, source_url, \
     discovered_at, last_verified FROM artifacts";

/// A bare artifact record for bulk scan insertion.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub storage_location_id: LocationId,
    pub filename: String,
    pub path: String,
    pub size: i64,
    pub file_type: LocationKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArtifactSort {
    Filename,
    Size,
    #[default]
    DiscoveredAt,
}

impl ArtifactSort {
    fn column(self) -> &'static str {
        match self {
            ArtifactSort::Filename => "filename",
            ArtifactSort::Size => "size",
            ArtifactSort::DiscoveredAt => "discovered_at",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "filename" => Some(ArtifactSort::Filename),
            "size" => Some(ArtifactSort::Size),
            "discovered_at" => Some(ArtifactSort::DiscoveredAt),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// Projection filter for artifact listings.
#[derive(Debug, Clone, Default)]
pub struct ArtifactFilter {
    pub file_type: Option<LocationKind>,
    pub storage_location_id: Option<LocationId>,
    /// Substring match against the filename.
    pub search: Option<String>,
    pub sort_by: ArtifactSort,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl ArtifactFilter {
    fn where_clause(&self) -> String {
        let mut sql = String::from(" WHERE 1=1");
        if self.file_type.is_some() {
            sql.push_str(" AND file_type = ?");
        }
        if self.storage_location_id.is_some() {
            sql.push_str(" AND storage_location_id = ?");
        }
        if self.search.is_some() {
            sql.push_str(" AND filename LIKE ?");
        }
        sql
    }
}

impl Store {
    pub async fn insert_artifact(&self, artifact: &Artifact) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO artifacts (id, storage_location_id, filename, path, size, file_type, \
             extension, mime_type, checksum, checksum_algorithm, checksum_verified, source_url, \
             discovered_at, last_verified) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(artifact.id.as_str())
        .bind(artifact.storage_location_id.as_str())
        .bind(&artifact.filename)
        .bind(&artifact.path)
        .bind(artifact.size)
        .bind(artifact.file_type.as_str())
        .bind(artifact.extension.clone())
        .bind(artifact.mime_type.clone())
        .bind(artifact.checksum.clone())
        .bind(artifact.checksum_algorithm.map(|a| a.as_str().to_string()))
        .bind(artifact.checksum_verified)
        .bind(artifact.source_url.clone())
        .bind(artifact.discovered_at.timestamp_millis())
        .bind(artifact.last_verified.map(|t| t.timestamp_millis()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Insert-or-update keyed by `path`. Idempotent against a concurrent
    /// scan having already inserted a bare record for the same file.
    pub async fn upsert_artifact_by_path(&self, artifact: &Artifact) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO artifacts (id, storage_location_id, filename, path, size, file_type, \
             extension, mime_type, checksum, checksum_algorithm, checksum_verified, source_url, \
             discovered_at, last_verified) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT (path) DO UPDATE SET \
             size = excluded.size, checksum = excluded.checksum, \
             checksum_algorithm = excluded.checksum_algorithm, \
             checksum_verified = excluded.checksum_verified, \
             source_url = excluded.source_url, last_verified = excluded.last_verified",
        )
        .bind(artifact.id.as_str())
        .bind(artifact.storage_location_id.as_str())
        .bind(&artifact.filename)
        .bind(&artifact.path)
        .bind(artifact.size)
        .bind(artifact.file_type.as_str())
        .bind(artifact.extension.clone())
        .bind(artifact.mime_type.clone())
        .bind(artifact.checksum.clone())
        .bind(artifact.checksum_algorithm.map(|a| a.as_str().to_string()))
        .bind(artifact.checksum_verified)
        .bind(artifact.source_url.clone())
        .bind(artifact.discovered_at.timestamp_millis())
        .bind(artifact.last_verified.map(|t| t.timestamp_millis()))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_artifact(&self, id: &ArtifactId) -> Result<Option<Artifact>, StoreError> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!("{SELECT_ARTIFACT} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(ArtifactRow::into_artifact))
    }

    pub async fn get_artifact_by_path(&self, path: &str) -> Result<Option<Artifact>, StoreError> {
        let row = sqlx::query_as::<_, ArtifactRow>(&format!("{SELECT_ARTIFACT} WHERE path = ?"))
            .bind(path)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(ArtifactRow::into_artifact))
    }

    pub async fn get_artifacts(&self, ids: &[ArtifactId]) -> Result<Vec<Artifact>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.bulk_chunk()) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("{SELECT_ARTIFACT} WHERE id IN ({placeholders})");
            let mut query = sqlx::query_as::<_, ArtifactRow>(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            let rows = query.fetch_all(self.pool()).await?;
            out.extend(rows.into_iter().map(ArtifactRow::into_artifact));
        }
        Ok(out)
    }

    pub async fn list_artifacts(&self, filter: &ArtifactFilter) -> Result<Vec<Artifact>, StoreError> {
        let mut sql = format!("{SELECT_ARTIFACT}{}", filter.where_clause());
        sql.push_str(&format!(
            " ORDER BY {} {} LIMIT ? OFFSET ?",
            filter.sort_by.column(),
            filter.sort_order.keyword()
        ));

        let mut query = sqlx::query_as::<_, ArtifactRow>(&sql);
        if let Some(file_type) = filter.file_type {
            query = query.bind(file_type.as_str());
        }
        if let Some(location) = &filter.storage_location_id {
            query = query.bind(location.as_str().to_string());
        }
        if let Some(search) = &filter.search {
            query = query.bind(format!("%{search}%"));
        }
        query = query.bind(filter.limit.max(1)).bind(filter.offset.max(0));

        let rows = query.fetch_all(self.pool()).await?;
        Ok(rows.into_iter().map(ArtifactRow::into_artifact).collect())
    }

    pub async fn count_artifacts(&self, filter: &ArtifactFilter) -> Result<i64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM artifacts{}", filter.where_clause());
        let mut query = sqlx::query_as::<_, (i64,)>(&sql);
        if let Some(file_type) = filter.file_type {
            query = query.bind(file_type.as_str());
        }
        if let Some(location) = &filter.storage_location_id {
            query = query.bind(location.as_str().to_string());
        }
        if let Some(search) = &filter.search {
            query = query.bind(format!("%{search}%"));
        }
        let (count,) = query.fetch_one(self.pool()).await?;
        Ok(count)
    }

    /// Paths of every artifact row under a location.
    pub async fn artifact_paths_for_location(
        &self,
        id: &LocationId,
    ) -> Result<Vec<(ArtifactId, String)>, StoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, path FROM artifacts WHERE storage_location_id = ?")
                .bind(id.as_str())
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(id, path)| (ArtifactId::from_string(id), path)).collect())
    }

    /// Bulk scan insertion; bare rows carry no checksum.
    pub async fn bulk_insert_artifacts(
        &self,
        artifacts: &[NewArtifact],
        discovered_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inserted = 0;
        for chunk in artifacts.chunks(self.bulk_chunk()) {
            let mut builder = sqlx::QueryBuilder::new(
                "INSERT INTO artifacts (id, storage_location_id, filename, path, size, \
                 file_type, extension, mime_type, discovered_at) ",
            );
            builder.push_values(chunk, |mut b, artifact| {
                let extension = warden_core::file_extension(&artifact.filename);
                let mime = extension.as_deref().map(warden_core::mime_type_for);
                b.push_bind(ArtifactId::new().as_str().to_string())
                    .push_bind(artifact.storage_location_id.as_str().to_string())
                    .push_bind(artifact.filename.clone())
                    .push_bind(artifact.path.clone())
                    .push_bind(artifact.size)
                    .push_bind(artifact.file_type.as_str())
                    .push_bind(extension)
                    .push_bind(mime)
                    .push_bind(discovered_at.timestamp_millis());
            });
            // Scan races with a finishing download on the same path: the
            // download's upsert wins, the scan row is dropped.
            builder.push(" ON CONFLICT (path) DO NOTHING");
            let result = builder.build().execute(self.pool()).await?;
            inserted += result.rows_affected();
        }
        Ok(inserted)
    }

    pub async fn bulk_delete_artifacts(&self, ids: &[ArtifactId]) -> Result<u64, StoreError> {
        let mut deleted = 0;
        for chunk in ids.chunks(self.bulk_chunk()) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("DELETE FROM artifacts WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            deleted += query.execute(self.pool()).await?.rows_affected();
        }
        Ok(deleted)
    }

    pub async fn delete_artifacts_for_location(&self, id: &LocationId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM artifacts WHERE storage_location_id = ?")
            .bind(id.as_str())
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    /// Mark existing rows as seen by a scan.
    pub async fn touch_artifacts_verified(
        &self,
        ids: &[ArtifactId],
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        for chunk in ids.chunks(self.bulk_chunk()) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!("UPDATE artifacts SET last_verified = ? WHERE id IN ({placeholders})");
            let mut query = sqlx::query(&sql).bind(verified_at.timestamp_millis());
            for id in chunk {
                query = query.bind(id.as_str());
            }
            query.execute(self.pool()).await?;
        }
        Ok(())
    }

    /// Record the outcome of re-hashing an artifact against its stored
    /// checksum.
    pub async fn set_artifact_checksum_verified(
        &self,
        id: &ArtifactId,
        verified: bool,
        checked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE artifacts SET checksum_verified = ?, last_verified = ? WHERE id = ?",
        )
        .bind(verified)
        .bind(checked_at.timestamp_millis())
        .bind(id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn touch_artifact_verified(
        &self,
        id: &ArtifactId,
        verified_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE artifacts SET last_verified = ? WHERE id = ?")
            .bind(verified_at.timestamp_millis())
            .bind(id.as_str())
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Aggregates per file type: `(file_type, count, total_size)`.
    pub async fn artifact_type_stats(&self) -> Result<Vec<(String, i64, i64)>, StoreError> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            "SELECT file_type, COUNT(*), COALESCE(SUM(size), 0) FROM artifacts \
             GROUP BY file_type ORDER BY file_type",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_all_artifacts(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM artifacts").fetch_one(self.pool()).await?;
        Ok(count)
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;

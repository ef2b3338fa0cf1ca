use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, VaultError};
use crate::ports::{CatalogStore, InsertOutcome};
use crate::types::{CatalogRecord, ContentHash, MediaKind, Metadata};

const RECORD_COLUMNS: &str = "id, content_hash, canonical_path, canonical_filename, media_kind, metadata, created_at, modified_at";

/// Catalog store on Postgres. Insert-if-absent is pushed down to the
/// `catalog_records_content_hash_key` unique constraint.
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| VaultError::Catalog(format!("Failed to connect to catalog database: {e}")))?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| VaultError::Catalog(format!("Migration failed: {e}")))?;
        info!("catalog schema up to date");
        Ok(())
    }

    fn map_row(row: &PgRow) -> Result<CatalogRecord> {
        let read = |column: &str, e: sqlx::Error| {
            VaultError::Catalog(format!("Failed to read {column}: {e}"))
        };

        let id: Uuid = row.try_get("id").map_err(|e| read("id", e))?;
        let hash: String = row
            .try_get("content_hash")
            .map_err(|e| read("content_hash", e))?;
        let canonical_path: String = row
            .try_get("canonical_path")
            .map_err(|e| read("canonical_path", e))?;
        let canonical_filename: String = row
            .try_get("canonical_filename")
            .map_err(|e| read("canonical_filename", e))?;
        let media_kind: String = row
            .try_get("media_kind")
            .map_err(|e| read("media_kind", e))?;
        let Json(metadata): Json<Metadata> = row
            .try_get("metadata")
            .map_err(|e| read("metadata", e))?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| read("created_at", e))?;
        let modified_at: DateTime<Utc> = row
            .try_get("modified_at")
            .map_err(|e| read("modified_at", e))?;

        let content_hash: ContentHash = hash
            .trim()
            .parse()
            .map_err(|e| VaultError::Catalog(format!("Corrupt content hash: {e}")))?;
        let media_kind = MediaKind::parse(&media_kind).ok_or_else(|| {
            VaultError::Catalog(format!("Unknown media kind {media_kind:?}"))
        })?;

        Ok(CatalogRecord {
            id,
            content_hash,
            canonical_path: PathBuf::from(canonical_path),
            canonical_filename,
            media_kind,
            metadata,
            created_at,
            modified_at,
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresCatalog {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| VaultError::Catalog(format!("Catalog unreachable: {e}")))?;
        Ok(())
    }

    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<CatalogRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM catalog_records WHERE content_hash = $1"
        ))
        .bind(hash.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VaultError::Catalog(format!("Failed to look up {hash}: {e}")))?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn insert(&self, record: &CatalogRecord) -> Result<InsertOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO catalog_records
                (id, content_hash, canonical_path, canonical_filename, media_kind, metadata, created_at, modified_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (content_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(record.id)
        .bind(record.content_hash.as_str())
        .bind(record.canonical_path.to_string_lossy().into_owned())
        .bind(&record.canonical_filename)
        .bind(record.media_kind.as_str())
        .bind(Json(&record.metadata))
        .bind(record.created_at)
        .bind(record.modified_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            VaultError::Catalog(format!(
                "Failed to insert {}: {e}",
                record.content_hash
            ))
        })?;

        Ok(match inserted {
            Some(_) => InsertOutcome::Inserted,
            None => InsertOutcome::AlreadyExists,
        })
    }

    async fn remove_by_path(&self, path: &Path) -> Result<Option<CatalogRecord>> {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            "DELETE FROM catalog_records WHERE canonical_path = $1 AND canonical_filename = $2 RETURNING {RECORD_COLUMNS}"
        ))
        .bind(dir.to_string_lossy().into_owned())
        .bind(name.to_string_lossy().into_owned())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            VaultError::Catalog(format!("Failed to remove {}: {e}", path.display()))
        })?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<Option<CatalogRecord>> {
        let (Some(from_dir), Some(from_name)) = (from.parent(), from.file_name()) else {
            return Ok(None);
        };
        let (Some(to_dir), Some(to_name)) = (to.parent(), to.file_name()) else {
            return Ok(None);
        };

        let row = sqlx::query(&format!(
            r#"
            UPDATE catalog_records
            SET canonical_path = $3, canonical_filename = $4
            WHERE canonical_path = $1 AND canonical_filename = $2
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(from_dir.to_string_lossy().into_owned())
        .bind(from_name.to_string_lossy().into_owned())
        .bind(to_dir.to_string_lossy().into_owned())
        .bind(to_name.to_string_lossy().into_owned())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            VaultError::Catalog(format!(
                "Failed to relocate {} to {}: {e}",
                from.display(),
                to.display()
            ))
        })?;

        row.as_ref().map(Self::map_row).transpose()
    }
}

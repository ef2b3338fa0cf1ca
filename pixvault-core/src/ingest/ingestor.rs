use std::any::type_name_of_val;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::locks::HashLocks;
use super::recent::RecentHashes;
use crate::config::IngestConfig;
use crate::error::{Result, VaultError};
use crate::identity::{
    classify, extract_metadata_async, file_timestamps, hash_file_async,
};
use crate::ports::{CatalogStore, InsertOutcome, NotificationSink};
use crate::transform::MediaTransformPipeline;
use crate::types::{
    CatalogEvent, CatalogRecord, ContentHash, MediaKind, Metadata, Notification,
};

/// Status reported for a single `ingest` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IngestStatus {
    Created,
    SkippedExists,
    SkippedLocked,
    Error,
}

impl IngestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            IngestStatus::Created => "created",
            IngestStatus::SkippedExists => "skipped_exists",
            IngestStatus::SkippedLocked => "skipped_locked",
            IngestStatus::Error => "error",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one presented file.
#[derive(Clone, Debug)]
pub enum IngestOutcome {
    Created(CatalogRecord),
    /// The content is already catalogued (possibly under another path).
    SkippedExists { content_hash: ContentHash },
    /// Another caller holds the lock for this content right now.
    SkippedLocked { content_hash: ContentHash },
    /// The file could not be identified or read; nothing was written.
    Error { path: PathBuf, reason: String },
}

impl IngestOutcome {
    pub fn status(&self) -> IngestStatus {
        match self {
            IngestOutcome::Created(_) => IngestStatus::Created,
            IngestOutcome::SkippedExists { .. } => IngestStatus::SkippedExists,
            IngestOutcome::SkippedLocked { .. } => IngestStatus::SkippedLocked,
            IngestOutcome::Error { .. } => IngestStatus::Error,
        }
    }

    pub fn content_hash(&self) -> Option<&ContentHash> {
        match self {
            IngestOutcome::Created(record) => Some(&record.content_hash),
            IngestOutcome::SkippedExists { content_hash }
            | IngestOutcome::SkippedLocked { content_hash } => Some(content_hash),
            IngestOutcome::Error { .. } => None,
        }
    }

    fn error(path: &Path, reason: impl fmt::Display) -> Self {
        IngestOutcome::Error {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}

/// Insert-once ingestion keyed by content hash.
///
/// Every caller (bulk scan workers, the watch consumer) shares one ingestor so
/// they also share its lock provider and duplicate-suppression cache.
pub struct DedupIngestor {
    catalog: Arc<dyn CatalogStore>,
    locks: Arc<dyn HashLocks>,
    sink: Arc<dyn NotificationSink>,
    transforms: Option<Arc<MediaTransformPipeline>>,
    recent: RecentHashes,
}

impl fmt::Debug for DedupIngestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupIngestor")
            .field("catalog", &type_name_of_val(self.catalog.as_ref()))
            .field("locks", &self.locks)
            .field("sink", &type_name_of_val(self.sink.as_ref()))
            .field("transforms", &self.transforms.is_some())
            .field("recent_hashes", &self.recent.len())
            .finish()
    }
}

impl DedupIngestor {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        locks: Arc<dyn HashLocks>,
        sink: Arc<dyn NotificationSink>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            catalog,
            locks,
            sink,
            transforms: None,
            recent: RecentHashes::new(config.recent_ttl()),
        }
    }

    /// Schedule artifact generation after inserts and for known content.
    pub fn with_transforms(mut self, transforms: Arc<MediaTransformPipeline>) -> Self {
        self.transforms = Some(transforms);
        self
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn transforms(&self) -> Option<&Arc<MediaTransformPipeline>> {
        self.transforms.as_ref()
    }

    /// Identify `path` and insert it into the catalog unless its content is
    /// already there.
    ///
    /// Contention, existing content and unreadable files are reported through
    /// the returned [`IngestOutcome`]. `Err` is reserved for catalog failures,
    /// which are fatal; the hash lock is released before they propagate.
    pub async fn ingest(&self, path: &Path) -> Result<IngestOutcome> {
        let path = match std::path::absolute(path) {
            Ok(path) => path,
            Err(err) => return Ok(IngestOutcome::error(path, err)),
        };

        let kind = classify(&path);
        if !kind.is_supported() {
            debug!(path = %path.display(), "not a supported media file");
            return Ok(IngestOutcome::error(&path, "unsupported media type"));
        }

        let hash = match hash_file_async(&path).await {
            Ok(hash) => hash,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not hash file");
                return Ok(IngestOutcome::error(&path, err));
            }
        };

        if self.recent.contains(&hash) {
            debug!(path = %path.display(), hash = %hash.short(), "recently catalogued");
            self.schedule_artifacts(&hash, &path);
            return Ok(IngestOutcome::SkippedExists { content_hash: hash });
        }

        if let Some(existing) = self.catalog.find_by_hash(&hash).await? {
            debug!(
                path = %path.display(),
                canonical = %existing.full_path().display(),
                "content already catalogued"
            );
            self.recent.remember(hash.clone());
            self.schedule_artifacts(&hash, &path);
            return Ok(IngestOutcome::SkippedExists { content_hash: hash });
        }

        let token = match self.locks.try_acquire(&hash) {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!(path = %path.display(), hash = %hash.short(), "hash locked by another ingest");
                return Ok(IngestOutcome::SkippedLocked { content_hash: hash });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not take hash lock");
                return Ok(IngestOutcome::error(&path, err));
            }
        };

        let result = self.insert_locked(&path, kind, &hash).await;
        drop(token);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(path = %path.display(), hash = %hash.short(), error = %err, "catalog insert failed");
                return Err(err);
            }
        };

        match &outcome {
            IngestOutcome::Created(record) => {
                info!(
                    path = %path.display(),
                    hash = %hash.short(),
                    kind = %record.media_kind,
                    "catalogued new content"
                );
                self.recent.remember(hash.clone());
                self.sink.publish(Notification::Catalog {
                    content_hash: hash.clone(),
                    event: CatalogEvent::Created,
                });
                self.schedule_artifacts(&hash, &path);
            }
            IngestOutcome::SkippedExists { .. } => self.recent.remember(hash.clone()),
            _ => {}
        }

        Ok(outcome)
    }

    /// [`ingest`](Self::ingest) for a file the watcher saw appear.
    ///
    /// When the content is already catalogued but its canonical copy no
    /// longer exists, the record is relocated to `path` instead of being
    /// skipped. A rename reported as a separate removal and creation thus
    /// keeps its record whichever half settles first. Content retired while
    /// this ran is ingested again.
    pub async fn ingest_observed(&self, path: &Path) -> Result<IngestOutcome> {
        let outcome = self.ingest(path).await?;
        let IngestOutcome::SkippedExists { content_hash } = &outcome else {
            return Ok(outcome);
        };
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());

        let Some(existing) = self.catalog.find_by_hash(content_hash).await? else {
            debug!(path = %path.display(), hash = %content_hash.short(), "record retired during ingest");
            self.recent.forget(content_hash);
            return self.ingest(&path).await;
        };

        let canonical = existing.full_path();
        if canonical != path && !tokio::fs::try_exists(&canonical).await.unwrap_or(true) {
            self.relocate(&canonical, &path).await?;
        }
        Ok(outcome)
    }

    /// Repoint the record whose canonical copy was at `from` to `to`. The
    /// record keeps its id and artifacts.
    pub async fn relocate(&self, from: &Path, to: &Path) -> Result<Option<CatalogRecord>> {
        let Some(record) = self.catalog.relocate(from, to).await? else {
            debug!(from = %from.display(), to = %to.display(), "no catalog record at moved path");
            return Ok(None);
        };

        self.recent.remember(record.content_hash.clone());
        self.sink.publish(Notification::Catalog {
            content_hash: record.content_hash.clone(),
            event: CatalogEvent::Moved,
        });
        info!(
            from = %from.display(),
            to = %to.display(),
            hash = %record.content_hash.short(),
            "relocated catalog record"
        );
        Ok(Some(record))
    }

    /// Steps that run while holding the hash lock: re-check, build, insert.
    async fn insert_locked(
        &self,
        path: &Path,
        kind: MediaKind,
        hash: &ContentHash,
    ) -> Result<IngestOutcome> {
        if self.catalog.find_by_hash(hash).await?.is_some() {
            return Ok(IngestOutcome::SkippedExists {
                content_hash: hash.clone(),
            });
        }

        let record = match build_record(path, kind, hash).await {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read file metadata");
                return Ok(IngestOutcome::error(path, err));
            }
        };

        Ok(match self.catalog.insert(&record).await? {
            InsertOutcome::Inserted => IngestOutcome::Created(record),
            InsertOutcome::AlreadyExists => IngestOutcome::SkippedExists {
                content_hash: hash.clone(),
            },
        })
    }

    /// Remove the record whose canonical copy was at `path`, purge its
    /// artifacts and announce the removal.
    pub async fn retire(&self, path: &Path) -> Result<Option<CatalogRecord>> {
        let Some(record) = self.catalog.remove_by_path(path).await? else {
            debug!(path = %path.display(), "no catalog record at removed path");
            return Ok(None);
        };

        self.recent.forget(&record.content_hash);
        if let Some(transforms) = &self.transforms {
            transforms.purge(&record.content_hash).await;
        }
        self.sink.publish(Notification::Catalog {
            content_hash: record.content_hash.clone(),
            event: CatalogEvent::Removed,
        });
        info!(path = %path.display(), hash = %record.content_hash.short(), "removed catalog record");
        Ok(Some(record))
    }

    fn schedule_artifacts(&self, hash: &ContentHash, source: &Path) {
        if let Some(transforms) = &self.transforms {
            transforms.schedule(hash, source);
        }
    }
}

async fn build_record(
    path: &Path,
    kind: MediaKind,
    hash: &ContentHash,
) -> Result<CatalogRecord> {
    let fs_meta = tokio::fs::metadata(path)
        .await
        .map_err(|err| VaultError::read(path, err))?;
    let (created_at, modified_at) = file_timestamps(&fs_meta);

    let metadata = match kind {
        MediaKind::Image => extract_metadata_async(path).await?,
        MediaKind::Video | MediaKind::Unsupported => Metadata::new(),
    };

    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return Err(VaultError::Unsupported(format!(
            "{} has no file name",
            path.display()
        )));
    };

    Ok(CatalogRecord {
        id: Uuid::now_v7(),
        content_hash: hash.clone(),
        canonical_path: dir.to_path_buf(),
        canonical_filename: name.to_string_lossy().into_owned(),
        media_kind: kind,
        metadata,
        created_at,
        modified_at,
    })
}

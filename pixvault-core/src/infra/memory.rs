//! Process-local adapters. Used by tests, single-node deployments without a
//! database, and as the default path registry seeded from configuration.

use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{RwLock, broadcast};

use crate::Result;
use crate::config::TransformConfig;
use crate::ports::{
    CatalogStore, InsertOutcome, NotificationSink, PathRegistry, SettingsSource,
};
use crate::types::{
    ArtifactVariant, CatalogRecord, ContentHash, Notification, ProposalOutcome,
    WatchedPath, WatchedPaths,
};

/// Catalog held in a concurrent map keyed by content hash.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    records: DashMap<ContentHash, CatalogRecord>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> Vec<CatalogRecord> {
        self.records.iter().map(|entry| entry.value().clone()).collect()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<CatalogRecord>> {
        Ok(self.records.get(hash).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, record: &CatalogRecord) -> Result<InsertOutcome> {
        match self.records.entry(record.content_hash.clone()) {
            Entry::Occupied(_) => Ok(InsertOutcome::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn remove_by_path(&self, path: &Path) -> Result<Option<CatalogRecord>> {
        let hash = self
            .records
            .iter()
            .find(|entry| entry.value().is_located_at(path))
            .map(|entry| entry.key().clone());

        Ok(hash.and_then(|hash| self.records.remove(&hash).map(|(_, record)| record)))
    }

    async fn relocate(&self, from: &Path, to: &Path) -> Result<Option<CatalogRecord>> {
        let hash = self
            .records
            .iter()
            .find(|entry| entry.value().is_located_at(from))
            .map(|entry| entry.key().clone());
        let Some(hash) = hash else {
            return Ok(None);
        };

        // The record may have been removed or moved since the scan above.
        Ok(self.records.get_mut(&hash).and_then(|mut entry| {
            (entry.is_located_at(from) && entry.value_mut().move_to(to))
                .then(|| entry.value().clone())
        }))
    }
}

/// Registry seeded from configuration. New directories under an unignored
/// entry are accepted and remembered; anything under an ignored entry is
/// reported as ignored.
#[derive(Debug, Default)]
pub struct InMemoryPathRegistry {
    entries: RwLock<Vec<WatchedPath>>,
}

impl InMemoryPathRegistry {
    pub fn new(entries: Vec<WatchedPath>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn snapshot(&self) -> WatchedPaths {
        WatchedPaths::new(self.entries.read().await.clone())
    }
}

#[async_trait]
impl PathRegistry for InMemoryPathRegistry {
    async fn list_watched_paths(&self) -> Result<Vec<WatchedPath>> {
        Ok(self.entries.read().await.clone())
    }

    async fn propose_path(&self, path: &Path, _parent: &Path) -> Result<ProposalOutcome> {
        let mut guard = self.entries.write().await;
        let snapshot = WatchedPaths::new(guard.clone());

        if snapshot.is_ignored(path) {
            return Ok(ProposalOutcome::Ignored);
        }
        if snapshot.is_known(path) {
            return Ok(ProposalOutcome::Known);
        }

        guard.push(WatchedPath::new(path));
        Ok(ProposalOutcome::Accepted)
    }
}

/// Notification sink backed by a tokio broadcast channel. Subscribers that
/// fall behind lose the oldest messages.
#[derive(Debug)]
pub struct BroadcastSink {
    tx: broadcast::Sender<Notification>,
    published: AtomicU64,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            published: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, notification: Notification) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(notification);
    }
}

/// Artifact bounds that can be changed while the pipeline runs.
#[derive(Debug)]
pub struct InMemorySettings {
    thumbnail: AtomicU32,
    preview: AtomicU32,
}

impl InMemorySettings {
    pub fn new(thumbnail_bound: u32, preview_bound: u32) -> Self {
        Self {
            thumbnail: AtomicU32::new(thumbnail_bound),
            preview: AtomicU32::new(preview_bound),
        }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(config.thumbnail_bound, config.preview_bound)
    }

    pub fn set_bound(&self, variant: ArtifactVariant, bound: u32) {
        self.slot(variant).store(bound.max(1), Ordering::Relaxed);
    }

    fn slot(&self, variant: ArtifactVariant) -> &AtomicU32 {
        match variant {
            ArtifactVariant::Thumbnail => &self.thumbnail,
            ArtifactVariant::Preview => &self.preview,
        }
    }
}

#[async_trait]
impl SettingsSource for InMemorySettings {
    async fn artifact_bound(&self, variant: ArtifactVariant) -> u32 {
        self.slot(variant).load(Ordering::Relaxed)
    }
}

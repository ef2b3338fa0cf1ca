#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use pixvault_core::config::{IngestConfig, TransformConfig};
use pixvault_core::infra::memory::{
    BroadcastSink, InMemoryCatalog, InMemoryPathRegistry, InMemorySettings,
};
use pixvault_core::ingest::{DedupIngestor, HashLocks, InProcessHashLocks};
use pixvault_core::ports::{CatalogStore, InsertOutcome};
use pixvault_core::transform::{FrameExtractor, MediaTransformPipeline};
use pixvault_core::types::{CatalogRecord, ContentHash, WatchedPath};

/// Write a solid-colour image; the format follows the extension.
pub fn write_image(path: &Path, width: u32, height: u32, seed: u8) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_pixel(width, height, Rgb([seed, seed.wrapping_mul(3), 200]))
        .save(path)
        .unwrap();
    path.to_path_buf()
}

/// Ingest settings with the duplicate-suppression cache turned off so each
/// call exercises the catalog and lock path.
pub fn uncached() -> IngestConfig {
    IngestConfig {
        recent_ttl_ms: 0,
        ..IngestConfig::default()
    }
}

pub struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub sink: Arc<BroadcastSink>,
    pub locks: Arc<InProcessHashLocks>,
    pub ingestor: Arc<DedupIngestor>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|_| None, |catalog| catalog as Arc<dyn CatalogStore>)
    }

    /// Every removal waits `delay` before reaching the in-memory catalog.
    pub fn with_slow_deletes(delay: Duration) -> Self {
        Self::build(|_| None, |catalog| {
            Arc::new(SlowDeletes {
                inner: catalog,
                delay,
            }) as Arc<dyn CatalogStore>
        })
    }

    /// Attach a transform pipeline built against the harness sink.
    pub fn with_transforms(
        make: impl FnOnce(Arc<BroadcastSink>) -> Arc<MediaTransformPipeline>,
    ) -> Self {
        Self::build(|sink| Some(make(sink)), |catalog| catalog as Arc<dyn CatalogStore>)
    }

    fn build(
        make: impl FnOnce(Arc<BroadcastSink>) -> Option<Arc<MediaTransformPipeline>>,
        store: impl FnOnce(Arc<InMemoryCatalog>) -> Arc<dyn CatalogStore>,
    ) -> Self {
        let catalog = Arc::new(InMemoryCatalog::new());
        let sink = Arc::new(BroadcastSink::new(256));
        let locks = Arc::new(InProcessHashLocks::new());
        let pipeline = make(sink.clone());
        let mut ingestor = DedupIngestor::new(
            store(catalog.clone()),
            locks.clone() as Arc<dyn HashLocks>,
            sink.clone(),
            &uncached(),
        );
        if let Some(pipeline) = pipeline {
            ingestor = ingestor.with_transforms(pipeline);
        }
        Self {
            catalog,
            sink,
            locks,
            ingestor: Arc::new(ingestor),
        }
    }
}

/// In-memory catalog whose removals take a database round trip.
pub struct SlowDeletes {
    inner: Arc<InMemoryCatalog>,
    delay: Duration,
}

#[async_trait]
impl CatalogStore for SlowDeletes {
    async fn ping(&self) -> pixvault_core::Result<()> {
        self.inner.ping().await
    }

    async fn find_by_hash(&self, hash: &ContentHash) -> pixvault_core::Result<Option<CatalogRecord>> {
        self.inner.find_by_hash(hash).await
    }

    async fn insert(&self, record: &CatalogRecord) -> pixvault_core::Result<InsertOutcome> {
        self.inner.insert(record).await
    }

    async fn remove_by_path(&self, path: &Path) -> pixvault_core::Result<Option<CatalogRecord>> {
        tokio::time::sleep(self.delay).await;
        self.inner.remove_by_path(path).await
    }

    async fn relocate(&self, from: &Path, to: &Path) -> pixvault_core::Result<Option<CatalogRecord>> {
        self.inner.relocate(from, to).await
    }
}

pub fn registry(entries: Vec<WatchedPath>) -> Arc<InMemoryPathRegistry> {
    Arc::new(InMemoryPathRegistry::new(entries))
}

/// Stand-in for ffmpeg: writes a fixed still and counts invocations.
#[derive(Debug, Default)]
pub struct CountingExtractor {
    pub calls: AtomicUsize,
}

impl CountingExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameExtractor for CountingExtractor {
    async fn extract_frame(
        &self,
        _video: &Path,
        output: &Path,
    ) -> pixvault_core::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        RgbImage::from_pixel(640, 360, Rgb([10, 20, 30]))
            .save(output)
            .map_err(pixvault_core::VaultError::from)
    }
}

pub fn pipeline(
    artifact_root: &Path,
    extractor: Arc<dyn FrameExtractor>,
    sink: Arc<BroadcastSink>,
) -> Arc<MediaTransformPipeline> {
    let config = TransformConfig {
        artifact_root: artifact_root.to_path_buf(),
        thumbnail_bound: 64,
        preview_bound: 128,
        ..TransformConfig::default()
    };
    let settings = Arc::new(InMemorySettings::from_config(&config));
    Arc::new(MediaTransformPipeline::new(config, extractor, settings, sink))
}

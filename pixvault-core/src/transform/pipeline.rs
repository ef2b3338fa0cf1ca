use std::any::type_name_of_val;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::artifacts::ArtifactStore;
use super::extractor::FrameExtractor;
use super::render::render_artifact;
use crate::config::TransformConfig;
use crate::error::{Result, VaultError};
use crate::identity::classify;
use crate::ports::{NotificationSink, SettingsSource};
use crate::types::{ArtifactVariant, ContentHash, MediaKind, Notification};

/// How `ensure_artifact` satisfied a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArtifactOutcome {
    /// The artifact was already on disk; nothing was decoded or encoded.
    Existing(PathBuf),
    Generated(PathBuf),
}

impl ArtifactOutcome {
    pub fn path(&self) -> &Path {
        match self {
            ArtifactOutcome::Existing(path) | ArtifactOutcome::Generated(path) => path,
        }
    }
}

/// Counters for work actually performed.
#[derive(Debug, Default)]
pub struct TransformStats {
    generated: AtomicU64,
    existing: AtomicU64,
    frames_extracted: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransformStatsSnapshot {
    pub generated: u64,
    pub existing: u64,
    pub frames_extracted: u64,
    pub failed: u64,
}

impl TransformStats {
    pub fn snapshot(&self) -> TransformStatsSnapshot {
        TransformStatsSnapshot {
            generated: self.generated.load(Ordering::Relaxed),
            existing: self.existing.load(Ordering::Relaxed),
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Lazily renders thumbnails and previews keyed by content hash.
///
/// The artifact file's existence is the only "done" marker. Background jobs
/// started through [`schedule`](Self::schedule) are bounded by a semaphore and
/// coalesced per (hash, variant).
#[derive(Clone)]
pub struct MediaTransformPipeline {
    store: ArtifactStore,
    extractor: Arc<dyn FrameExtractor>,
    settings: Arc<dyn SettingsSource>,
    sink: Arc<dyn NotificationSink>,
    eager: Arc<[ArtifactVariant]>,
    in_flight: Arc<DashSet<(ContentHash, ArtifactVariant)>>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    stats: Arc<TransformStats>,
}

impl fmt::Debug for MediaTransformPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTransformPipeline")
            .field("artifact_root", &self.store.root())
            .field("extractor", &type_name_of_val(self.extractor.as_ref()))
            .field("eager_variants", &self.eager)
            .field("in_flight_jobs", &self.in_flight.len())
            .field("permits_available", &self.permits.available_permits())
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

impl MediaTransformPipeline {
    pub fn new(
        config: TransformConfig,
        extractor: Arc<dyn FrameExtractor>,
        settings: Arc<dyn SettingsSource>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store: ArtifactStore::new(&config.artifact_root),
            extractor,
            settings,
            sink,
            eager: config.eager_variants.into(),
            in_flight: Arc::new(DashSet::new()),
            permits: Arc::new(Semaphore::new(config.max_parallel.max(1))),
            tracker: TaskTracker::new(),
            stats: Arc::new(TransformStats::default()),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn stats(&self) -> TransformStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn artifact_path(&self, hash: &ContentHash, variant: ArtifactVariant) -> PathBuf {
        self.store.path_for(hash, variant)
    }

    /// Make sure the `variant` artifact for `hash` exists, rendering it from
    /// `source` when missing. Failures concern this artifact only.
    pub async fn ensure_artifact(
        &self,
        hash: &ContentHash,
        variant: ArtifactVariant,
        source: &Path,
    ) -> Result<ArtifactOutcome> {
        let target = self.store.path_for(hash, variant);
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            self.stats.existing.fetch_add(1, Ordering::Relaxed);
            return Ok(ArtifactOutcome::Existing(target));
        }

        match self.generate(hash, variant, source, &target).await {
            Ok(()) => {
                self.stats.generated.fetch_add(1, Ordering::Relaxed);
                self.sink.publish(Notification::ArtifactReady {
                    content_hash: hash.clone(),
                    variant,
                });
                debug!(target: "transform::job", hash = %hash.short(), %variant, "artifact ready");
                Ok(ArtifactOutcome::Generated(target))
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "transform::job",
                    hash = %hash.short(),
                    %variant,
                    source = %source.display(),
                    error = %err,
                    "artifact generation failed"
                );
                Err(err)
            }
        }
    }

    async fn generate(
        &self,
        hash: &ContentHash,
        variant: ArtifactVariant,
        source: &Path,
        target: &Path,
    ) -> Result<()> {
        let kind = classify(source);
        if !kind.is_supported() {
            return Err(VaultError::Unsupported(source.display().to_string()));
        }

        let bound = self.settings.artifact_bound(variant).await.max(1);
        let dir = self.store.variant_dir(variant);
        tokio::fs::create_dir_all(&dir).await?;

        // Removed when dropped, whichever way this function exits.
        let frame = match kind {
            MediaKind::Video => {
                let staged = tempfile::Builder::new()
                    .prefix(&format!(".frame-{}-", hash.short()))
                    .suffix(".png")
                    .tempfile_in(&dir)?;
                self.extractor.extract_frame(source, staged.path()).await?;
                self.stats.frames_extracted.fetch_add(1, Ordering::Relaxed);
                Some(staged)
            }
            _ => None,
        };

        let input = frame
            .as_ref()
            .map(|staged| staged.path().to_path_buf())
            .unwrap_or_else(|| source.to_path_buf());
        let output = target.to_path_buf();

        let (width, height) = spawn_blocking(move || render_artifact(&input, bound, &output))
            .await
            .map_err(|err| VaultError::Internal(format!("render task failed: {err}")))??;

        drop(frame);
        debug!(hash = %hash.short(), %variant, width, height, "rendered artifact");
        Ok(())
    }

    /// Start background jobs for the eager variants. Returns immediately.
    pub fn schedule(&self, hash: &ContentHash, source: &Path) {
        for &variant in self.eager.iter() {
            self.spawn_job(hash.clone(), variant, source.to_path_buf());
        }
    }

    /// Start one background job unless the same (hash, variant) is already
    /// running.
    pub fn spawn_job(&self, hash: ContentHash, variant: ArtifactVariant, source: PathBuf) {
        let key = (hash.clone(), variant);
        if !self.in_flight.insert(key.clone()) {
            debug!(hash = %hash.short(), %variant, "artifact job already in flight");
            return;
        }

        let this = self.clone();
        self.tracker.spawn(async move {
            if let Ok(_permit) = this.permits.acquire().await {
                // Errors are logged inside ensure_artifact.
                let _ = this.ensure_artifact(&hash, variant, &source).await;
            }
            this.in_flight.remove(&key);
        });
    }

    /// Delete all artifacts for `hash`.
    pub async fn purge(&self, hash: &ContentHash) {
        let removed = self.store.purge(hash).await;
        if removed > 0 {
            info!(target: "transform::job", hash = %hash.short(), removed, "purged artifacts");
        }
    }

    /// Wait for every background job spawned so far.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

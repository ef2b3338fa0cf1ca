use std::any::type_name_of_val;
use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use pixvault_config::{Config, DatabaseConfig};
use pixvault_core::config::LockStrategy;
use pixvault_core::infra::memory::{
    BroadcastSink, InMemoryCatalog, InMemoryPathRegistry, InMemorySettings,
};
use pixvault_core::infra::postgres::PostgresCatalog;
use pixvault_core::ingest::{DedupIngestor, FileHashLocks, HashLocks, InProcessHashLocks};
use pixvault_core::ports::CatalogStore;
use pixvault_core::scan::BulkTreeScanner;
use pixvault_core::transform::{FfmpegFrameExtractor, MediaTransformPipeline};
use pixvault_core::types::Notification;
use pixvault_core::watch::WatchSupervisor;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Every long-lived component, wired once at startup.
pub struct App {
    pub catalog: Arc<dyn CatalogStore>,
    pub registry: Arc<InMemoryPathRegistry>,
    pub sink: Arc<BroadcastSink>,
    pub transforms: Arc<MediaTransformPipeline>,
    pub ingestor: Arc<DedupIngestor>,
    pub scanner: Arc<BulkTreeScanner>,
    pub supervisor: WatchSupervisor,
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("catalog", &type_name_of_val(self.catalog.as_ref()))
            .field("transforms", &self.transforms)
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

/// Startup switches that are not part of the persisted configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Leave lock files from earlier runs in place. Needed when another
    /// process is ingesting against the same lock directory.
    pub keep_stale_locks: bool,
}

impl App {
    pub async fn build(config: &Config, options: BuildOptions) -> anyhow::Result<Self> {
        let pipeline = &config.pipeline;

        let catalog = open_catalog(&config.database).await?;
        catalog
            .ping()
            .await
            .context("catalog store is unreachable")?;

        let locks: Arc<dyn HashLocks> = match pipeline.ingest.lock_strategy {
            LockStrategy::File => {
                let locks = FileHashLocks::new(&pipeline.ingest.lock_dir).with_context(|| {
                    format!(
                        "failed to prepare lock directory {}",
                        pipeline.ingest.lock_dir.display()
                    )
                })?;
                if !options.keep_stale_locks {
                    let purged = locks.purge_stale()?;
                    if purged > 0 {
                        warn!(purged, dir = %locks.dir().display(), "removed stale lock files");
                    }
                }
                Arc::new(locks)
            }
            LockStrategy::InProcess => Arc::new(InProcessHashLocks::new()),
        };

        let registry = Arc::new(InMemoryPathRegistry::new(config.watched_paths()));
        let sink = Arc::new(BroadcastSink::new(1_024));
        let settings = Arc::new(InMemorySettings::from_config(&pipeline.transform));

        let transforms = Arc::new(MediaTransformPipeline::new(
            pipeline.transform.clone(),
            Arc::new(FfmpegFrameExtractor::from_config(&pipeline.transform)),
            settings,
            sink.clone(),
        ));

        let ingestor = Arc::new(
            DedupIngestor::new(catalog.clone(), locks, sink.clone(), &pipeline.ingest)
                .with_transforms(transforms.clone()),
        );

        let scanner = Arc::new(BulkTreeScanner::new(
            ingestor.clone(),
            registry.clone(),
            pipeline.scan.clone(),
        ));

        let supervisor = WatchSupervisor::new(ingestor.clone(), registry.clone(), pipeline.watch.clone())
            .with_scanner(scanner.clone());

        Ok(Self {
            catalog,
            registry,
            sink,
            transforms,
            ingestor,
            scanner,
            supervisor,
        })
    }

    /// Log every published notification until the sink goes away.
    pub fn spawn_notification_log(&self) -> JoinHandle<()> {
        let mut rx = self.sink.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => log_notification(&notification),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(target: "notify", skipped, "notification log fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Wait for background artifact jobs to finish.
    pub async fn drain(&self) {
        self.transforms.drain().await;
        debug!(stats = ?self.transforms.stats(), "artifact jobs drained");
    }
}

fn log_notification(notification: &Notification) {
    match serde_json::to_string(notification) {
        Ok(json) => debug!(target: "notify", %json, "published"),
        Err(err) => warn!(target: "notify", error = %err, "unserializable notification"),
    }
}

async fn open_catalog(database: &DatabaseConfig) -> anyhow::Result<Arc<dyn CatalogStore>> {
    let Some(url) = database.url.as_deref() else {
        info!("using in-memory catalog");
        return Ok(Arc::new(InMemoryCatalog::new()));
    };

    let catalog = PostgresCatalog::connect(url, database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?;
    if database.run_migrations {
        catalog
            .migrate()
            .await
            .context("database migration failed")?;
    }
    info!("using PostgreSQL catalog");
    Ok(Arc::new(catalog))
}

/// Connect and apply migrations without starting anything else.
pub async fn migrate_only(database: &DatabaseConfig) -> anyhow::Result<()> {
    let url = database
        .url
        .as_deref()
        .context("no database URL configured; set DATABASE_URL")?;
    PostgresCatalog::connect(url, database.max_connections)
        .await
        .context("failed to connect to PostgreSQL")?
        .migrate()
        .await
        .context("database migration failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pixvault_config::RootConfig;

    fn config_for(root: &std::path::Path, artifacts: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.library.roots.push(RootConfig {
            path: root.to_path_buf(),
            ignore: false,
        });
        config.pipeline.ingest.lock_strategy = LockStrategy::InProcess;
        config.pipeline.transform.artifact_root = artifacts.to_path_buf();
        config
    }

    #[tokio::test]
    async fn in_memory_app_scans_registered_roots() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("photos");
        std::fs::create_dir_all(&root).unwrap();
        let png = [
            0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0,
        ];
        std::fs::write(root.join("a.png"), png).unwrap();

        let app = App::build(&config_for(&root, &dir.path().join("artifacts")), BuildOptions::default())
            .await
            .unwrap();
        let reports = app.scanner.scan_registered().await.unwrap();
        app.drain().await;

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].created, 1);
        assert_eq!(
            app.catalog.find_by_hash(
                &pixvault_core::identity::hash_file(&root.join("a.png")).unwrap()
            )
            .await
            .unwrap()
            .map(|r| r.canonical_filename),
            Some("a.png".to_string())
        );
    }

    #[tokio::test]
    async fn file_locks_are_purged_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let locks = dir.path().join("locks");
        std::fs::create_dir_all(&locks).unwrap();
        std::fs::write(locks.join(format!("{}.lock", "f".repeat(64))), "1").unwrap();

        let mut config = config_for(dir.path(), &dir.path().join("artifacts"));
        config.pipeline.ingest.lock_strategy = LockStrategy::File;
        config.pipeline.ingest.lock_dir = locks.clone();

        App::build(&config, BuildOptions { keep_stale_locks: true }).await.unwrap();
        assert_eq!(std::fs::read_dir(&locks).unwrap().count(), 1);

        App::build(&config, BuildOptions::default()).await.unwrap();
        assert_eq!(std::fs::read_dir(&locks).unwrap().count(), 0);
    }
}

use std::any::type_name_of_val;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::debounce::Debouncer;
use super::monitor::{Monitor, WatchMessage, spawn_in_process, spawn_subprocess};
use crate::config::{WatchConfig, WatchIsolation};
use crate::error::{Result, VaultError};
use crate::identity::classify;
use crate::ingest::{DedupIngestor, IngestOutcome};
use crate::ports::PathRegistry;
use crate::scan::BulkTreeScanner;
use crate::types::{CanonicalEvent, CanonicalEventKind, WatchedPaths};

/// Live monitoring of watched roots.
///
/// Raw notifications from every monitor flow into one consumer task, are
/// debounced per path and turned into ingest, relocate or retire calls on the shared
/// [`DedupIngestor`].
pub struct WatchSupervisor {
    inner: Arc<Dispatcher>,
    config: WatchConfig,
    state: Mutex<SupervisorState>,
}

/// Everything a dispatched canonical event needs.
struct Dispatcher {
    ingestor: Arc<DedupIngestor>,
    registry: Arc<dyn PathRegistry>,
    scanner: Option<Arc<BulkTreeScanner>>,
    rescan_new_directories: bool,
}

#[derive(Default)]
struct SupervisorState {
    /// Roots passed to `start`, in order, kept across `stop` for `restart`.
    started: Vec<PathBuf>,
    running: Option<Running>,
}

struct Running {
    cancel: CancellationToken,
    tx: mpsc::Sender<WatchMessage>,
    consumer: JoinHandle<()>,
    monitors: HashMap<PathBuf, Monitor>,
}

impl fmt::Debug for WatchSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSupervisor")
            .field("ingestor", &self.inner.ingestor)
            .field("registry", &type_name_of_val(self.inner.registry.as_ref()))
            .field("scanner", &self.inner.scanner.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl WatchSupervisor {
    pub fn new(
        ingestor: Arc<DedupIngestor>,
        registry: Arc<dyn PathRegistry>,
        config: WatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Dispatcher {
                ingestor,
                registry,
                scanner: None,
                rescan_new_directories: config.rescan_new_directories,
            }),
            config,
            state: Mutex::new(SupervisorState::default()),
        }
    }

    /// Bulk-scan directories that appear under a watched root.
    pub fn with_scanner(mut self, scanner: Arc<BulkTreeScanner>) -> Self {
        let inner = Dispatcher {
            ingestor: Arc::clone(&self.inner.ingestor),
            registry: Arc::clone(&self.inner.registry),
            scanner: Some(scanner),
            rescan_new_directories: self.inner.rescan_new_directories,
        };
        self.inner = Arc::new(inner);
        self
    }

    /// Begin monitoring `path` recursively.
    ///
    /// Ignored paths are skipped without error. Starting a path that is
    /// already monitored does nothing.
    pub async fn start(&self, path: &Path) -> Result<()> {
        let path = std::path::absolute(path)?;
        let watched = WatchedPaths::new(self.inner.registry.list_watched_paths().await?);
        if watched.is_ignored(&path) {
            info!(target: "watch::supervisor", path = %path.display(), "path is ignored; not watching");
            return Ok(());
        }
        if !tokio::fs::metadata(&path).await?.is_dir() {
            return Err(VaultError::Watch(format!("{} is not a directory", path.display())));
        }

        let mut state = self.state.lock().await;
        if !state.started.contains(&path) {
            state.started.push(path.clone());
        }

        let running = state.running.get_or_insert_with(|| self.launch_consumer());
        if running.monitors.contains_key(&path) {
            debug!(target: "watch::supervisor", path = %path.display(), "already watching");
            return Ok(());
        }

        let monitor = match &self.config.isolation {
            WatchIsolation::InProcess => spawn_in_process(path.clone(), running.tx.clone()).await?,
            WatchIsolation::Subprocess { program, args } => spawn_subprocess(
                program,
                args,
                path.clone(),
                running.tx.clone(),
                running.cancel.child_token(),
            )?,
        };
        info!(
            target: "watch::supervisor",
            path = %path.display(),
            isolation = ?self.config.isolation,
            "watching"
        );
        running.monitors.insert(path, monitor);
        Ok(())
    }

    /// Stop every monitor and the consumer. Pending debounce windows are
    /// discarded; ingests already dispatched run to completion. Calling this
    /// when nothing is running is a no-op.
    pub async fn stop(&self) {
        let running = self.state.lock().await.running.take();
        let Some(running) = running else {
            return;
        };

        running.cancel.cancel();
        for (path, monitor) in running.monitors {
            debug!(target: "watch::supervisor", path = %path.display(), "stopping monitor");
            monitor.shutdown().await;
        }
        drop(running.tx);
        if let Err(err) = running.consumer.await {
            error!(target: "watch::supervisor", error = %err, "watch consumer panicked");
        }
        info!(target: "watch::supervisor", "watching stopped");
    }

    /// Stop, then start again every path ever started.
    pub async fn restart(&self) -> Result<()> {
        let paths = self.state.lock().await.started.clone();
        self.stop().await;
        for path in paths {
            self.start(&path).await?;
        }
        Ok(())
    }

    /// Roots with a live monitor.
    pub async fn watched_paths(&self) -> Vec<PathBuf> {
        let state = self.state.lock().await;
        let mut paths: Vec<PathBuf> = state
            .running
            .as_ref()
            .map(|running| running.monitors.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        paths
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running.is_some()
    }

    fn launch_consumer(&self) -> Running {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let cancel = CancellationToken::new();
        let consumer = tokio::spawn(consume(
            rx,
            cancel.clone(),
            self.config.debounce(),
            Arc::new(Semaphore::new(self.config.max_concurrent_ingests.max(1))),
            Arc::clone(&self.inner),
        ));
        Running {
            cancel,
            tx,
            consumer,
            monitors: HashMap::new(),
        }
    }
}

async fn consume(
    mut rx: mpsc::Receiver<WatchMessage>,
    cancel: CancellationToken,
    quiet: Duration,
    permits: Arc<Semaphore>,
    dispatcher: Arc<Dispatcher>,
) {
    let mut debouncer = Debouncer::new(quiet);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            message = rx.recv() => match message {
                Some(WatchMessage::Event(event)) => debouncer.push(event),
                Some(WatchMessage::Error { message }) => {
                    warn!(target: "watch::consumer", error = %message, "monitor reported an error");
                }
                None => break,
            },
            Some(event) = debouncer.next_fired(), if !debouncer.is_empty() => {
                let dispatcher = Arc::clone(&dispatcher);
                let permits = Arc::clone(&permits);
                tokio::spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    dispatcher.handle(event).await;
                });
            }
        }
    }

    let discarded = debouncer.pending();
    debouncer.clear();
    debug!(target: "watch::consumer", discarded, "watch consumer exiting");
}

impl Dispatcher {
    async fn handle(&self, event: CanonicalEvent) {
        debug!(target: "watch::consumer", path = %event.path.display(), kind = ?event.kind, "settled");
        match event.kind {
            CanonicalEventKind::Removed => self.retire(&event.path).await,
            CanonicalEventKind::Moved => self.moved(&event.path, event.target()).await,
            CanonicalEventKind::Appeared => self.appeared(&event.path).await,
        }
    }

    async fn retire(&self, path: &Path) {
        if let Err(err) = self.ingestor.retire(path).await {
            error!(target: "watch::consumer", path = %path.display(), error = %err, "catalog removal failed");
        }
    }

    /// Carry the source's record over to the destination. Content that was
    /// never catalogued, or a whole directory, goes through `appeared`.
    async fn moved(&self, from: &Path, to: &Path) {
        if self.is_ignored(to).await {
            debug!(target: "watch::consumer", path = %to.display(), "moved into an ignored path");
            self.retire(from).await;
            return;
        }

        match self.ingestor.relocate(from, to).await {
            Ok(Some(_)) => {}
            Ok(None) => self.appeared(to).await,
            Err(err) => {
                error!(
                    target: "watch::consumer",
                    from = %from.display(),
                    to = %to.display(),
                    error = %err,
                    "catalog relocation failed"
                );
            }
        }
    }

    async fn is_ignored(&self, path: &Path) -> bool {
        match self.registry.list_watched_paths().await {
            Ok(entries) => WatchedPaths::new(entries).is_ignored(path),
            Err(err) => {
                warn!(target: "watch::consumer", error = %err, "registry unavailable; not checking ignore flags");
                false
            }
        }
    }

    async fn appeared(&self, path: &Path) {
        if self.is_ignored(path).await {
            debug!(target: "watch::consumer", path = %path.display(), "ignored path");
            return;
        }

        let meta = match tokio::fs::metadata(path).await {
            Ok(meta) => meta,
            Err(_) => {
                debug!(target: "watch::consumer", path = %path.display(), "path vanished before ingest");
                return;
            }
        };

        if meta.is_dir() {
            if self.rescan_new_directories
                && let Some(scanner) = &self.scanner
                && let Err(err) = scanner.scan(path).await
            {
                error!(target: "watch::consumer", dir = %path.display(), error = %err, "scan of new directory failed");
            }
            return;
        }

        if !classify(path).is_supported() {
            debug!(target: "watch::consumer", path = %path.display(), "not a media file");
            return;
        }

        match self.ingestor.ingest_observed(path).await {
            Ok(IngestOutcome::Error { reason, .. }) => {
                warn!(target: "watch::consumer", path = %path.display(), reason = %reason, "ingest failed");
            }
            Ok(outcome) => {
                debug!(target: "watch::consumer", path = %path.display(), status = %outcome.status(), "ingested");
            }
            Err(err) => {
                error!(target: "watch::consumer", path = %path.display(), error = %err, "catalog failure during ingest");
            }
        }
    }
}

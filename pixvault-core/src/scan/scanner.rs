use std::any::type_name_of_val;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinSet, spawn_blocking};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::listing::{DirListing, list_directory};
use crate::config::ScanConfig;
use crate::error::{Result, VaultError};
use crate::identity::classify;
use crate::ingest::{DedupIngestor, IngestOutcome};
use crate::ports::PathRegistry;
use crate::types::{ProposalOutcome, WatchedPaths};

/// Totals for one `scan` call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub root: PathBuf,
    pub files_seen: usize,
    pub created: usize,
    pub skipped_exists: usize,
    pub skipped_locked: usize,
    pub errors: usize,
    pub unsupported: usize,
    pub directories_visited: usize,
    pub directories_proposed: usize,
    pub elapsed: Duration,
}

impl ScanReport {
    fn skipped(root: PathBuf) -> Self {
        Self {
            root,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct ScanTally {
    files_seen: AtomicUsize,
    created: AtomicUsize,
    skipped_exists: AtomicUsize,
    skipped_locked: AtomicUsize,
    errors: AtomicUsize,
    unsupported: AtomicUsize,
    directories_visited: AtomicUsize,
    directories_proposed: AtomicUsize,
}

impl ScanTally {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Created(_) => Self::bump(&self.created),
            IngestOutcome::SkippedExists { .. } => Self::bump(&self.skipped_exists),
            IngestOutcome::SkippedLocked { .. } => Self::bump(&self.skipped_locked),
            IngestOutcome::Error { .. } => Self::bump(&self.errors),
        }
    }

    fn into_report(self, root: PathBuf, elapsed: Duration) -> ScanReport {
        ScanReport {
            root,
            files_seen: self.files_seen.into_inner(),
            created: self.created.into_inner(),
            skipped_exists: self.skipped_exists.into_inner(),
            skipped_locked: self.skipped_locked.into_inner(),
            errors: self.errors.into_inner(),
            unsupported: self.unsupported.into_inner(),
            directories_visited: self.directories_visited.into_inner(),
            directories_proposed: self.directories_proposed.into_inner(),
            elapsed,
        }
    }
}

enum DirJob {
    Visit(PathBuf),
    Shutdown,
}

/// State shared by every worker of one `scan` call.
struct ScanRun {
    ingestor: Arc<DedupIngestor>,
    registry: Arc<dyn PathRegistry>,
    watched: WatchedPaths,
    tally: ScanTally,
    cancel: CancellationToken,
    fatal: Mutex<Option<VaultError>>,
    outstanding_dirs: AtomicUsize,
    dir_workers: usize,
}

/// Recursive directory scanner feeding the dedup ingestor.
///
/// Each `scan` call runs one directory-worker pool and one file-worker pool for
/// the whole tree, so the number of workers does not grow with depth.
pub struct BulkTreeScanner {
    ingestor: Arc<DedupIngestor>,
    registry: Arc<dyn PathRegistry>,
    config: ScanConfig,
}

impl fmt::Debug for BulkTreeScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkTreeScanner")
            .field("ingestor", &self.ingestor)
            .field("registry", &type_name_of_val(self.registry.as_ref()))
            .field("config", &self.config)
            .finish()
    }
}

impl BulkTreeScanner {
    pub fn new(
        ingestor: Arc<DedupIngestor>,
        registry: Arc<dyn PathRegistry>,
        config: ScanConfig,
    ) -> Self {
        Self {
            ingestor,
            registry,
            config,
        }
    }

    pub fn ingestor(&self) -> &Arc<DedupIngestor> {
        &self.ingestor
    }

    /// Scan every visible registered root once.
    pub async fn scan_registered(&self) -> Result<Vec<ScanReport>> {
        let watched = WatchedPaths::new(self.registry.list_watched_paths().await?);
        let mut reports = Vec::new();
        for root in watched.top_roots() {
            if !root.is_dir() {
                warn!(root = %root.display(), "registered root is not a directory; skipping");
                continue;
            }
            reports.push(self.scan(&root).await?);
        }
        Ok(reports)
    }

    /// Ingest every supported file under `root`.
    ///
    /// Files in each directory are enqueued in creation order. Per-file
    /// failures are counted in the report; a catalog failure stops the scan
    /// and is returned.
    pub async fn scan(&self, root: &Path) -> Result<ScanReport> {
        let started = Instant::now();
        let root = std::path::absolute(root)?;
        let watched = WatchedPaths::new(self.registry.list_watched_paths().await?);

        if watched.is_ignored(&root) {
            info!(target: "scan::summary", root = %root.display(), "root is ignored; nothing to scan");
            return Ok(ScanReport::skipped(root));
        }

        let file_workers = self.config.file_workers.max(1);
        let dir_workers = self.config.dir_workers.max(1);

        let run = Arc::new(ScanRun {
            ingestor: Arc::clone(&self.ingestor),
            registry: Arc::clone(&self.registry),
            watched,
            tally: ScanTally::default(),
            cancel: CancellationToken::new(),
            fatal: Mutex::new(None),
            outstanding_dirs: AtomicUsize::new(1),
            dir_workers,
        });

        let (file_tx, file_rx) = mpsc::channel::<PathBuf>(self.config.file_queue_capacity.max(1));
        let file_rx = Arc::new(Mutex::new(file_rx));
        let (dir_tx, dir_rx) = mpsc::unbounded_channel::<DirJob>();
        let dir_rx = Arc::new(Mutex::new(dir_rx));

        dir_tx
            .send(DirJob::Visit(root.clone()))
            .map_err(|_| VaultError::Internal("directory queue closed".into()))?;

        let mut file_pool = JoinSet::new();
        for worker in 0..file_workers {
            file_pool.spawn(file_worker(worker, Arc::clone(&run), Arc::clone(&file_rx)));
        }

        let mut dir_pool = JoinSet::new();
        for worker in 0..dir_workers {
            dir_pool.spawn(dir_worker(
                worker,
                Arc::clone(&run),
                Arc::clone(&dir_rx),
                dir_tx.clone(),
                file_tx.clone(),
            ));
        }
        drop(dir_tx);
        drop(file_tx);

        // Directory phase ends when the last visit pushes shutdown sentinels.
        while let Some(joined) = dir_pool.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "directory worker panicked");
            }
        }
        // Every file sender is gone now; workers drain the queue and exit.
        while let Some(joined) = file_pool.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "file worker panicked");
            }
        }

        let run = Arc::try_unwrap(run).map_err(|_| {
            VaultError::Internal("scan workers outlived their pools".into())
        })?;
        if let Some(err) = run.fatal.into_inner() {
            error!(target: "scan::summary", root = %root.display(), error = %err, "scan aborted");
            return Err(err);
        }

        let report = run.tally.into_report(root, started.elapsed());
        info!(
            target: "scan::summary",
            root = %report.root.display(),
            files = report.files_seen,
            created = report.created,
            skipped_exists = report.skipped_exists,
            skipped_locked = report.skipped_locked,
            errors = report.errors,
            unsupported = report.unsupported,
            directories = report.directories_visited,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scan complete"
        );
        Ok(report)
    }
}

async fn file_worker(
    worker: usize,
    run: Arc<ScanRun>,
    queue: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let Some(path) = next else {
            break;
        };

        // After a fatal error the queue is drained without ingesting so
        // directory workers blocked on a full queue can finish.
        if run.cancel.is_cancelled() {
            continue;
        }

        tracing::trace!(worker, path = %path.display(), "ingesting");
        match run.ingestor.ingest(&path).await {
            Ok(outcome) => run.tally.record(&outcome),
            Err(err) => {
                error!(worker, path = %path.display(), error = %err, "fatal ingest failure; cancelling scan");
                let mut fatal = run.fatal.lock().await;
                if fatal.is_none() {
                    *fatal = Some(err);
                }
                run.cancel.cancel();
            }
        }
    }
}

async fn dir_worker(
    worker: usize,
    run: Arc<ScanRun>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<DirJob>>>,
    dirs: mpsc::UnboundedSender<DirJob>,
    files: mpsc::Sender<PathBuf>,
) {
    loop {
        let next = { queue.lock().await.recv().await };
        let dir = match next {
            Some(DirJob::Visit(dir)) => dir,
            Some(DirJob::Shutdown) | None => break,
        };

        visit(worker, &run, &dir, &dirs, &files).await;

        if run.outstanding_dirs.fetch_sub(1, Ordering::AcqRel) == 1 {
            for _ in 0..run.dir_workers {
                let _ = dirs.send(DirJob::Shutdown);
            }
        }
    }
}

async fn visit(
    worker: usize,
    run: &ScanRun,
    dir: &Path,
    dirs: &mpsc::UnboundedSender<DirJob>,
    files: &mpsc::Sender<PathBuf>,
) {
    if run.cancel.is_cancelled() {
        return;
    }

    let owned = dir.to_path_buf();
    let listed = spawn_blocking(move || {
        list_directory(&owned).map(|listing| {
            let DirListing { files, dirs } = listing;
            let (media, unsupported): (Vec<_>, Vec<_>) = files
                .into_iter()
                .partition(|path| classify(path).is_supported());
            (media, unsupported.len(), dirs)
        })
    })
    .await;

    let (media, unsupported, subdirs) = match listed {
        Ok(Ok(listing)) => listing,
        Ok(Err(err)) => {
            warn!(worker, dir = %dir.display(), error = %err, "cannot list directory");
            ScanTally::bump(&run.tally.errors);
            return;
        }
        Err(err) => {
            error!(worker, dir = %dir.display(), error = %err, "listing task failed");
            ScanTally::bump(&run.tally.errors);
            return;
        }
    };

    ScanTally::bump(&run.tally.directories_visited);
    run.tally.unsupported.fetch_add(unsupported, Ordering::Relaxed);

    for subdir in subdirs {
        if run.watched.is_ignored(&subdir) {
            debug!(dir = %subdir.display(), "skipping ignored directory");
            continue;
        }
        if !run.watched.is_known(&subdir) {
            match run.registry.propose_path(&subdir, dir).await {
                Ok(ProposalOutcome::Ignored) => {
                    debug!(dir = %subdir.display(), "registry ignores directory");
                    continue;
                }
                Ok(ProposalOutcome::Accepted) => {
                    ScanTally::bump(&run.tally.directories_proposed);
                }
                Ok(ProposalOutcome::Known) => {}
                Err(err) => {
                    warn!(dir = %subdir.display(), error = %err, "could not propose directory");
                }
            }
        }

        run.outstanding_dirs.fetch_add(1, Ordering::AcqRel);
        if dirs.send(DirJob::Visit(subdir)).is_err() {
            run.outstanding_dirs.fetch_sub(1, Ordering::AcqRel);
        }
    }

    for file in media {
        if run.cancel.is_cancelled() {
            break;
        }
        ScanTally::bump(&run.tally.files_seen);
        if files.send(file).await.is_err() {
            break;
        }
    }
}

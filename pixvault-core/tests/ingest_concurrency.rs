mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{Harness, uncached, write_image};
use pixvault_core::infra::memory::{BroadcastSink, InMemoryCatalog};
use pixvault_core::ingest::{
    DedupIngestor, FileHashLocks, HashLocks, InProcessHashLocks, IngestOutcome, IngestStatus,
};
use pixvault_core::ports::{CatalogStore, InsertOutcome};
use pixvault_core::identity::hash_file;
use pixvault_core::types::{CatalogEvent, CatalogRecord, ContentHash, Notification};
use pixvault_core::{Result, VaultError};
use tempfile::tempdir;

fn count(outcomes: &[IngestOutcome], status: IngestStatus) -> usize {
    outcomes.iter().filter(|o| o.status() == status).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_content_racing_yields_one_record() {
    let dir = tempdir().unwrap();
    let original = write_image(&dir.path().join("a.png"), 32, 32, 7);
    let copy = dir.path().join("copy-of-a.png");
    std::fs::copy(&original, &copy).unwrap();

    let harness = Harness::new();
    let mut tasks = Vec::new();
    for i in 0..16 {
        let ingestor = Arc::clone(&harness.ingestor);
        let path = if i % 2 == 0 { original.clone() } else { copy.clone() };
        tasks.push(tokio::spawn(async move { ingestor.ingest(&path).await }));
    }

    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    assert_eq!(count(&outcomes, IngestStatus::Created), 1);
    assert_eq!(count(&outcomes, IngestStatus::Error), 0);
    assert_eq!(
        count(&outcomes, IngestStatus::SkippedExists) + count(&outcomes, IngestStatus::SkippedLocked),
        15
    );
    assert_eq!(harness.catalog.len(), 1);
    assert_eq!(harness.locks.held(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ingestors_sharing_a_lock_directory_insert_once() {
    let dir = tempdir().unwrap();
    let file = write_image(&dir.path().join("shared.png"), 16, 16, 42);
    let lock_dir = dir.path().join("locks");

    // Two ingestors standing in for two processes: separate lock providers
    // over the same directory, one catalog.
    let catalog = Arc::new(InMemoryCatalog::new());
    let sink = Arc::new(BroadcastSink::new(16));
    let make = || {
        Arc::new(DedupIngestor::new(
            catalog.clone(),
            Arc::new(FileHashLocks::new(&lock_dir).unwrap()),
            sink.clone(),
            &uncached(),
        ))
    };
    let first = make();
    let second = make();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let ingestor = if i % 2 == 0 { first.clone() } else { second.clone() };
        let path = file.clone();
        tasks.push(tokio::spawn(async move { ingestor.ingest(&path).await }));
    }
    let mut outcomes = Vec::new();
    for task in tasks {
        outcomes.push(task.await.unwrap().unwrap());
    }

    assert_eq!(count(&outcomes, IngestStatus::Created), 1);
    assert_eq!(catalog.len(), 1);
    assert_eq!(std::fs::read_dir(&lock_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn repeat_and_distinct_content() {
    let dir = tempdir().unwrap();
    let a = write_image(&dir.path().join("a.png"), 8, 8, 1);
    let b = write_image(&dir.path().join("b.png"), 8, 8, 2);
    let harness = Harness::new();
    let mut notifications = harness.sink.subscribe();

    let created = harness.ingestor.ingest(&a).await.unwrap();
    let IngestOutcome::Created(record) = &created else {
        panic!("expected a new record, got {created:?}");
    };
    assert_eq!(record.full_path(), a);
    assert_eq!(record.canonical_filename, "a.png");
    assert_eq!(record.metadata.get("width"), Some(&serde_json::json!(8)));

    let again = harness.ingestor.ingest(&a).await.unwrap();
    assert_eq!(again.status(), IngestStatus::SkippedExists);
    assert_eq!(again.content_hash(), created.content_hash());

    let other = harness.ingestor.ingest(&b).await.unwrap();
    assert_eq!(other.status(), IngestStatus::Created);
    assert_eq!(harness.catalog.len(), 2);

    let first = notifications.recv().await.unwrap();
    assert_eq!(
        first,
        Notification::Catalog {
            content_hash: record.content_hash.clone(),
            event: CatalogEvent::Created,
        }
    );
}

#[tokio::test]
async fn unreadable_and_unsupported_files_write_nothing() {
    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "not media").unwrap();
    let missing = dir.path().join("gone.jpg");

    let harness = Harness::new();
    let unsupported = harness.ingestor.ingest(&notes).await.unwrap();
    let unreadable = harness.ingestor.ingest(&missing).await.unwrap();

    assert_eq!(unsupported.status(), IngestStatus::Error);
    assert!(matches!(unreadable, IngestOutcome::Error { ref path, .. } if path == &missing));
    assert!(harness.catalog.is_empty());
    assert_eq!(harness.sink.published(), 0);
}

#[tokio::test]
async fn held_lock_reports_contention_without_waiting() {
    let dir = tempdir().unwrap();
    let file = write_image(&dir.path().join("busy.png"), 8, 8, 9);
    let harness = Harness::new();

    let hash = hash_file(&file).unwrap();
    let token = harness.locks.try_acquire(&hash).unwrap().unwrap();

    let contended = harness.ingestor.ingest(&file).await.unwrap();
    assert_eq!(contended.status(), IngestStatus::SkippedLocked);
    assert!(harness.catalog.is_empty());

    drop(token);
    let created = harness.ingestor.ingest(&file).await.unwrap();
    assert_eq!(created.status(), IngestStatus::Created);
}

#[tokio::test]
async fn observed_file_takes_over_a_vanished_canonical_copy() {
    let dir = tempdir().unwrap();
    let original = write_image(&dir.path().join("a.png"), 8, 8, 11);
    let harness = Harness::new();
    let IngestOutcome::Created(record) = harness.ingestor.ingest(&original).await.unwrap() else {
        panic!("expected a new record");
    };
    let mut notifications = harness.sink.subscribe();

    // A copy next to an existing canonical file is only a duplicate.
    let copy = dir.path().join("copy.png");
    std::fs::copy(&original, &copy).unwrap();
    let outcome = harness.ingestor.ingest_observed(&copy).await.unwrap();
    assert_eq!(outcome.status(), IngestStatus::SkippedExists);
    assert_eq!(harness.catalog.records()[0].full_path(), original);

    std::fs::remove_file(&copy).unwrap();
    let renamed = dir.path().join("renamed.png");
    std::fs::rename(&original, &renamed).unwrap();
    let outcome = harness.ingestor.ingest_observed(&renamed).await.unwrap();
    assert_eq!(outcome.status(), IngestStatus::SkippedExists);

    let records = harness.catalog.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].full_path(), renamed);
    assert_eq!(
        notifications.recv().await.unwrap(),
        Notification::Catalog {
            content_hash: record.content_hash.clone(),
            event: CatalogEvent::Moved,
        }
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rename_halves_racing_keep_the_record() {
    let dir = tempdir().unwrap();
    let original = write_image(&dir.path().join("a.png"), 8, 8, 12);
    let renamed = dir.path().join("renamed.png");

    // The removal is still in flight when the destination is ingested.
    let harness = Harness::with_slow_deletes(Duration::from_millis(150));
    let IngestOutcome::Created(record) = harness.ingestor.ingest(&original).await.unwrap() else {
        panic!("expected a new record");
    };
    std::fs::rename(&original, &renamed).unwrap();

    let (retired, observed) = tokio::join!(
        harness.ingestor.retire(&original),
        harness.ingestor.ingest_observed(&renamed),
    );
    assert!(retired.unwrap().is_none());
    assert_eq!(observed.unwrap().status(), IngestStatus::SkippedExists);

    let records = harness.catalog.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, record.id);
    assert_eq!(records[0].full_path(), renamed);
}

#[tokio::test]
async fn content_retired_before_it_is_observed_is_catalogued_again() {
    let dir = tempdir().unwrap();
    let original = write_image(&dir.path().join("a.png"), 8, 8, 13);
    let renamed = dir.path().join("renamed.png");
    let harness = Harness::new();
    harness.ingestor.ingest(&original).await.unwrap();
    std::fs::rename(&original, &renamed).unwrap();

    assert!(harness.ingestor.retire(&original).await.unwrap().is_some());
    let outcome = harness.ingestor.ingest_observed(&renamed).await.unwrap();
    assert_eq!(outcome.status(), IngestStatus::Created);
    assert_eq!(harness.catalog.records()[0].full_path(), renamed);
}

/// Catalog whose writes always fail.
struct BrokenCatalog;

#[async_trait]
impl CatalogStore for BrokenCatalog {
    async fn ping(&self) -> Result<()> {
        Err(VaultError::Catalog("connection refused".into()))
    }

    async fn find_by_hash(&self, _hash: &ContentHash) -> Result<Option<CatalogRecord>> {
        Ok(None)
    }

    async fn insert(&self, _record: &CatalogRecord) -> Result<InsertOutcome> {
        Err(VaultError::Catalog("connection reset".into()))
    }

    async fn remove_by_path(&self, _path: &Path) -> Result<Option<CatalogRecord>> {
        Err(VaultError::Catalog("connection reset".into()))
    }

    async fn relocate(&self, _from: &Path, _to: &Path) -> Result<Option<CatalogRecord>> {
        Err(VaultError::Catalog("connection reset".into()))
    }
}

#[tokio::test]
async fn catalog_failure_propagates_and_releases_the_lock() {
    let dir = tempdir().unwrap();
    let file = write_image(&dir.path().join("a.png"), 8, 8, 3);
    let locks = Arc::new(InProcessHashLocks::new());
    let sink = Arc::new(BroadcastSink::new(8));
    let ingestor = DedupIngestor::new(
        Arc::new(BrokenCatalog),
        locks.clone() as Arc<dyn HashLocks>,
        sink.clone(),
        &uncached(),
    );

    let err = ingestor.ingest(&file).await.unwrap_err();
    assert!(matches!(err, VaultError::Catalog(_)));
    assert_eq!(locks.held(), 0);
    assert_eq!(sink.published(), 0);

    let err = ingestor.retire(&file).await.unwrap_err();
    assert!(matches!(err, VaultError::Catalog(_)));
}

#[tokio::test]
async fn retire_removes_only_the_canonical_copy() {
    let dir = tempdir().unwrap();
    let a = write_image(&dir.path().join("a.png"), 8, 8, 4);
    let copy = dir.path().join("b.png");
    std::fs::copy(&a, &copy).unwrap();
    let harness = Harness::new();

    harness.ingestor.ingest(&a).await.unwrap();
    assert!(harness.ingestor.retire(&copy).await.unwrap().is_none());
    assert_eq!(harness.catalog.len(), 1);

    let removed = harness.ingestor.retire(&a).await.unwrap().unwrap();
    assert_eq!(removed.full_path(), a);
    assert!(harness.catalog.is_empty());

    // The surviving copy can now become canonical.
    let created = harness.ingestor.ingest(&copy).await.unwrap();
    assert_eq!(created.status(), IngestStatus::Created);
}

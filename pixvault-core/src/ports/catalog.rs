use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::types::{CatalogRecord, ContentHash};

/// Result of an insert-if-absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A record with the same content hash was already stored.
    AlreadyExists,
}

/// Repository port for catalog records.
///
/// `insert` must be atomic with respect to `content_hash`: when two callers
/// race past the ingestor's lock (separate processes with separate lock
/// directories, say) exactly one observes [`InsertOutcome::Inserted`].
/// Errors from any method are treated as fatal by the ingestor.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Reachability check run once at startup.
    async fn ping(&self) -> Result<()>;
    async fn find_by_hash(&self, hash: &ContentHash) -> Result<Option<CatalogRecord>>;
    async fn insert(&self, record: &CatalogRecord) -> Result<InsertOutcome>;
    /// Remove the record whose canonical copy lives at `path`, returning it.
    async fn remove_by_path(&self, path: &Path) -> Result<Option<CatalogRecord>>;
    /// Point the record whose canonical copy lives at `from` at `to`
    /// instead, keeping its id and timestamps. Returns the updated record.
    async fn relocate(&self, from: &Path, to: &Path) -> Result<Option<CatalogRecord>>;
}

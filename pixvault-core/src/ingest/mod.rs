//! Dedup ingestion: identity, per-hash locking and insert-once semantics.

mod ingestor;
mod locks;
mod recent;

pub use ingestor::{DedupIngestor, IngestOutcome, IngestStatus};
pub use locks::{FileHashLocks, HashLocks, InProcessHashLocks, LockToken};
pub use recent::RecentHashes;

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::types::ContentHash;

const PRUNE_THRESHOLD: usize = 4_096;

/// Short-lived memory of hashes known to be catalogued. Absorbs the burst of
/// duplicate notifications a watcher and a concurrent bulk scan produce for
/// the same content.
#[derive(Debug)]
pub struct RecentHashes {
    ttl: Duration,
    entries: DashMap<ContentHash, Instant>,
}

impl RecentHashes {
    /// A zero `ttl` disables the cache.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        let fresh = self
            .entries
            .get(hash)
            .map(|seen| seen.elapsed() < self.ttl);
        match fresh {
            Some(true) => true,
            Some(false) => {
                self.entries.remove(hash);
                false
            }
            None => false,
        }
    }

    pub fn remember(&self, hash: ContentHash) {
        if self.ttl.is_zero() {
            return;
        }
        self.entries.insert(hash, Instant::now());
        if self.entries.len() > PRUNE_THRESHOLD {
            self.prune();
        }
    }

    pub fn forget(&self, hash: &ContentHash) {
        self.entries.remove(hash);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn prune(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, seen| seen.elapsed() < ttl);
    }
}

use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::types::{ProposalOutcome, WatchedPath};

/// Registry of watched directories and their ignore flags.
#[async_trait]
pub trait PathRegistry: Send + Sync {
    async fn list_watched_paths(&self) -> Result<Vec<WatchedPath>>;
    /// Offer a newly discovered directory found under `parent`.
    async fn propose_path(&self, path: &Path, parent: &Path) -> Result<ProposalOutcome>;
}

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::types::{ArtifactVariant, ContentHash};

/// Deterministic on-disk layout: `<root>/<variant>/<hash>_<variant>.webp`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        // Absolute so paths handed to clients stay valid if the cwd changes.
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn variant_dir(&self, variant: ArtifactVariant) -> PathBuf {
        self.root.join(variant.as_str())
    }

    pub fn path_for(&self, hash: &ContentHash, variant: ArtifactVariant) -> PathBuf {
        self.variant_dir(variant).join(variant.file_name(hash))
    }

    /// Delete every variant for `hash`. Returns how many files were removed.
    pub async fn purge(&self, hash: &ContentHash) -> usize {
        let mut removed = 0;
        for variant in ArtifactVariant::ALL {
            let path = self.path_for(hash, variant);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove artifact");
                }
            }
        }
        removed
    }
}

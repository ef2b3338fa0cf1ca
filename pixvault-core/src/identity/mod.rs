//! Content identity: what a file *is*, independent of where it lives.
//!
//! Hashing and metadata extraction are blocking file reads; the `_async`
//! wrappers move them onto tokio's blocking pool so callers on the runtime
//! never stall a worker thread.

mod classify;
mod hasher;
mod metadata;

pub use classify::{classify, classify_extension, sniff_header};
pub use hasher::{BLOCK_SIZE, hash_file, hash_reader};
pub use metadata::{extract_metadata, file_timestamps};

use std::path::{Path, PathBuf};

use tokio::task::spawn_blocking;

use crate::error::{Result, VaultError};
use crate::types::{ContentHash, Metadata};

/// [`hash_file`] on the blocking pool.
pub async fn hash_file_async(path: &Path) -> Result<ContentHash> {
    let owned: PathBuf = path.to_path_buf();
    spawn_blocking(move || hash_file(&owned))
        .await
        .map_err(|err| VaultError::Internal(format!("hash task failed: {err}")))?
}

/// [`extract_metadata`] on the blocking pool.
pub async fn extract_metadata_async(path: &Path) -> Result<Metadata> {
    let owned: PathBuf = path.to_path_buf();
    spawn_blocking(move || extract_metadata(&owned))
        .await
        .map_err(|err| {
            VaultError::Internal(format!("metadata task failed: {err}"))
        })?
}

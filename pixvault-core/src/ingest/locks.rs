use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, warn};

use crate::error::{Result, VaultError};
use crate::types::ContentHash;

const LOCK_EXTENSION: &str = "lock";

/// Non-blocking, per-content-hash exclusion.
pub trait HashLocks: Send + Sync + fmt::Debug {
    /// `Ok(None)` when another holder owns the hash; never waits.
    fn try_acquire(&self, hash: &ContentHash) -> Result<Option<LockToken>>;
}

/// Held lock for one content hash. Released on drop, on every exit path.
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken {
    hash: ContentHash,
    release: Release,
}

enum Release {
    File { path: PathBuf, file: Option<File> },
    Memory { held: Arc<DashSet<ContentHash>> },
}

impl LockToken {
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        match &mut self.release {
            Release::File { path, file } => {
                // Close before unlinking.
                drop(file.take());
                if let Err(err) = fs::remove_file(&*path)
                    && err.kind() != io::ErrorKind::NotFound
                {
                    warn!(path = %path.display(), error = %err, "failed to remove lock file");
                }
            }
            Release::Memory { held } => {
                held.remove(&self.hash);
            }
        }
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.release {
            Release::File { .. } => "file",
            Release::Memory { .. } => "memory",
        };
        f.debug_struct("LockToken")
            .field("hash", &self.hash)
            .field("kind", &kind)
            .finish()
    }
}

/// Lock files `<dir>/<hash>.lock`, created with `create_new` so the
/// filesystem arbitrates between processes sharing the directory.
#[derive(Debug, Clone)]
pub struct FileHashLocks {
    dir: PathBuf,
}

impl FileHashLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{hash}.{LOCK_EXTENSION}"))
    }

    /// Delete lock files left behind by a crashed process. Only call this
    /// while no other process is ingesting against the same directory.
    pub fn purge_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == LOCK_EXTENSION) {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
            }
        }
        if removed > 0 {
            debug!(dir = %self.dir.display(), removed, "purged stale lock files");
        }
        Ok(removed)
    }

    fn open_exclusive(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new().write(true).create_new(true).open(path)
    }
}

impl HashLocks for FileHashLocks {
    fn try_acquire(&self, hash: &ContentHash) -> Result<Option<LockToken>> {
        let path = self.lock_path(hash);
        let opened = match self.open_exclusive(&path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                // Lock directory removed underneath us.
                fs::create_dir_all(&self.dir)?;
                self.open_exclusive(&path)
            }
            other => other,
        };

        match opened {
            Ok(mut file) => {
                if let Err(err) = writeln!(file, "{}", std::process::id()) {
                    debug!(path = %path.display(), error = %err, "could not stamp lock file");
                }
                Ok(Some(LockToken {
                    hash: hash.clone(),
                    release: Release::File {
                        path,
                        file: Some(file),
                    },
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(VaultError::Io(err)),
        }
    }
}

/// Concurrent set of held hashes; exclusion within this process only.
#[derive(Debug, Clone, Default)]
pub struct InProcessHashLocks {
    held: Arc<DashSet<ContentHash>>,
}

impl InProcessHashLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }
}

impl HashLocks for InProcessHashLocks {
    fn try_acquire(&self, hash: &ContentHash) -> Result<Option<LockToken>> {
        if !self.held.insert(hash.clone()) {
            return Ok(None);
        }
        Ok(Some(LockToken {
            hash: hash.clone(),
            release: Release::Memory {
                held: Arc::clone(&self.held),
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn hash(c: char) -> ContentHash {
        std::iter::repeat_n(c, 64).collect::<String>().parse().unwrap()
    }

    #[test]
    fn file_lock_is_exclusive_and_removed_on_drop() {
        let dir = tempdir().unwrap();
        let locks = FileHashLocks::new(dir.path().join("locks")).unwrap();
        let h = hash('a');

        let token = locks.try_acquire(&h).unwrap().expect("first acquire");
        assert!(locks.lock_path(&h).exists());
        assert!(locks.try_acquire(&h).unwrap().is_none());
        assert!(locks.try_acquire(&hash('b')).unwrap().is_some());

        drop(token);
        assert!(!locks.lock_path(&h).exists());
        assert!(locks.try_acquire(&h).unwrap().is_some());
    }

    #[test]
    fn file_lock_recreates_missing_directory() {
        let dir = tempdir().unwrap();
        let locks = FileHashLocks::new(dir.path().join("locks")).unwrap();
        fs::remove_dir(locks.dir()).unwrap();

        let token = locks.try_acquire(&hash('c')).unwrap();
        assert!(token.is_some());
    }

    #[test]
    fn purge_removes_only_lock_files() {
        let dir = tempdir().unwrap();
        let locks = FileHashLocks::new(dir.path()).unwrap();
        fs::write(locks.lock_path(&hash('d')), "123").unwrap();
        fs::write(dir.path().join("keep.txt"), "x").unwrap();

        assert_eq!(locks.purge_stale().unwrap(), 1);
        assert!(dir.path().join("keep.txt").exists());
        assert!(locks.try_acquire(&hash('d')).unwrap().is_some());
    }

    #[test]
    fn in_process_lock_releases_on_drop() {
        let locks = InProcessHashLocks::new();
        let h = hash('e');
        let token = locks.try_acquire(&h).unwrap().unwrap();
        assert!(locks.try_acquire(&h).unwrap().is_none());
        assert_eq!(locks.held(), 1);
        drop(token);
        assert_eq!(locks.held(), 0);
        assert!(locks.try_acquire(&h).unwrap().is_some());
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A directory known to the path registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedPath {
    pub path: PathBuf,
    #[serde(default)]
    pub ignore: bool,
}

impl WatchedPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ignore: false,
        }
    }

    pub fn ignored(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ignore: true,
        }
    }
}

/// Registry verdict for a newly discovered directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalOutcome {
    Accepted,
    Ignored,
    /// Already registered; the stored ignore flag still applies.
    Known,
}

/// Snapshot of the registry used to answer ignore questions without a
/// round-trip per path.
#[derive(Clone, Debug, Default)]
pub struct WatchedPaths {
    entries: Vec<WatchedPath>,
}

impl WatchedPaths {
    pub fn new(entries: Vec<WatchedPath>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[WatchedPath] {
        &self.entries
    }

    pub fn is_known(&self, path: &Path) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    /// A path is ignored when its nearest registered ancestor-or-self is.
    pub fn is_ignored(&self, path: &Path) -> bool {
        self.entries
            .iter()
            .filter(|entry| path.starts_with(&entry.path))
            .max_by_key(|entry| entry.path.components().count())
            .is_some_and(|entry| entry.ignore)
    }

    /// Unignored entries with no unignored registered ancestor. Scanning these
    /// covers the whole registry exactly once.
    pub fn top_roots(&self) -> Vec<PathBuf> {
        let visible: Vec<&WatchedPath> = self
            .entries
            .iter()
            .filter(|entry| !self.is_ignored(&entry.path))
            .collect();

        let mut roots: Vec<PathBuf> = visible
            .iter()
            .filter(|candidate| {
                !visible.iter().any(|other| {
                    other.path != candidate.path
                        && candidate.path.starts_with(&other.path)
                })
            })
            .map(|entry| entry.path.clone())
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }
}

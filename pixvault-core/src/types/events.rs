use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw filesystem notification kinds the debouncer understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// One notification from a filesystem monitor. This is also the wire format
/// used by isolated watch workers, so it stays plain serializable data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub path: PathBuf,
    /// Destination for `Moved`; `path` is the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<PathBuf>,
    pub observed_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            dest_path: None,
            observed_at: Utc::now(),
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            kind: RawEventKind::Moved,
            path: from.into(),
            dest_path: Some(to.into()),
            observed_at: Utc::now(),
        }
    }

    /// Path whose debounce window this event belongs to. Renames are keyed by
    /// their destination.
    pub fn window_key(&self) -> &Path {
        match (&self.kind, &self.dest_path) {
            (RawEventKind::Moved, Some(dest)) => dest,
            _ => &self.path,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalEventKind {
    Appeared,
    Removed,
    Moved,
}

/// The single event a debounce window resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub path: PathBuf,
    pub kind: CanonicalEventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_path: Option<PathBuf>,
}

impl CanonicalEvent {
    /// Path the consumer should act on: the destination of a move, otherwise
    /// the event path.
    pub fn target(&self) -> &Path {
        self.dest_path.as_deref().unwrap_or(&self.path)
    }
}

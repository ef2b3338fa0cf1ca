use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ContentHash, MediaKind};

/// Opaque key/value metadata attached to a record (image dimensions, format,
/// EXIF presence). Ordered so serialized output is stable.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One catalogued piece of content. `content_hash` is unique across the
/// catalog; the record remembers the first path the content was seen at.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: Uuid,
    pub content_hash: ContentHash,
    /// Directory holding the canonical copy.
    pub canonical_path: PathBuf,
    pub canonical_filename: String,
    pub media_kind: MediaKind,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl CatalogRecord {
    /// Full path of the canonical copy.
    pub fn full_path(&self) -> PathBuf {
        self.canonical_path.join(&self.canonical_filename)
    }

    /// Move the canonical copy to `path`. Returns false, leaving the record
    /// untouched, when `path` has no parent or file name.
    pub fn move_to(&mut self, path: &Path) -> bool {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        self.canonical_path = dir.to_path_buf();
        self.canonical_filename = name.to_string_lossy().into_owned();
        true
    }

    /// Whether `path` names the canonical copy of this record.
    pub fn is_located_at(&self, path: &Path) -> bool {
        path.parent() == Some(self.canonical_path.as_path())
            && path
                .file_name()
                .is_some_and(|name| name == self.canonical_filename.as_str())
    }
}

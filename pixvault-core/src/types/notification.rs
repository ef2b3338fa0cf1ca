use serde::{Deserialize, Serialize};

use super::{ArtifactVariant, ContentHash};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogEvent {
    Created,
    /// The canonical copy moved; the record kept its id.
    Moved,
    Removed,
}

/// Payloads published to the notification sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    ArtifactReady {
        content_hash: ContentHash,
        variant: ArtifactVariant,
    },
    Catalog {
        content_hash: ContentHash,
        event: CatalogEvent,
    },
}

impl Notification {
    pub fn content_hash(&self) -> &ContentHash {
        match self {
            Notification::ArtifactReady { content_hash, .. }
            | Notification::Catalog { content_hash, .. } => content_hash,
        }
    }
}

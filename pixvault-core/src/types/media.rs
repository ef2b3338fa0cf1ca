use std::fmt;

use serde::{Deserialize, Serialize};

use super::ContentHash;

/// Coarse media family, decided by [`crate::identity::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Unsupported,
}

impl MediaKind {
    pub fn is_supported(self) -> bool {
        !matches!(self, MediaKind::Unsupported)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Unsupported => "unsupported",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "unsupported" => Some(MediaKind::Unsupported),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size class of a derived display artifact.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactVariant {
    Thumbnail,
    Preview,
}

impl ArtifactVariant {
    pub const ALL: [ArtifactVariant; 2] =
        [ArtifactVariant::Thumbnail, ArtifactVariant::Preview];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactVariant::Thumbnail => "thumb",
            ArtifactVariant::Preview => "preview",
        }
    }

    /// Deterministic artifact filename: `<hash>_<variant>.webp`.
    pub fn file_name(self, hash: &ContentHash) -> String {
        format!("{}_{}.webp", hash, self.as_str())
    }
}

impl fmt::Display for ArtifactVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//! Value types shared across the pipeline.

mod events;
mod hash;
mod media;
mod notification;
mod paths;
mod record;

pub use events::{CanonicalEvent, CanonicalEventKind, RawEvent, RawEventKind};
pub use hash::{ContentHash, ParseContentHashError};
pub use media::{ArtifactVariant, MediaKind};
pub use notification::{CatalogEvent, Notification};
pub use paths::{ProposalOutcome, WatchedPath, WatchedPaths};
pub use record::{CatalogRecord, Metadata};

use async_trait::async_trait;

use crate::types::ArtifactVariant;

/// Live display settings. Read once per transform job.
#[async_trait]
pub trait SettingsSource: Send + Sync {
    /// Longest edge, in pixels, for `variant`.
    async fn artifact_bound(&self, variant: ArtifactVariant) -> u32;
}

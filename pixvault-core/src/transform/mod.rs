//! Derived display artifacts (thumbnails, previews).

mod artifacts;
mod extractor;
mod pipeline;
mod render;

pub use artifacts::ArtifactStore;
pub use extractor::{FfmpegFrameExtractor, FrameExtractor};
pub use pipeline::{
    ArtifactOutcome, MediaTransformPipeline, TransformStats, TransformStatsSnapshot,
};
pub use render::render_artifact;

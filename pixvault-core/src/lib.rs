//! # PixVault Core
//!
//! Ingestion engine for a content-addressed photo and video library.
//!
//! ## Overview
//!
//! `pixvault-core` turns files discovered under watched directory roots into
//! catalog records keyed by the SHA-256 of their bytes, and lazily renders
//! display artifacts (thumbnails and previews) for them:
//!
//! - **Content identity**: streaming hashing, typed media classification and
//!   image metadata extraction ([`identity`])
//! - **Dedup ingestion**: lock-then-double-check insert-once semantics keyed by
//!   content hash ([`ingest`])
//! - **Bulk scanning**: creation-ordered recursive traversal on a shared pair of
//!   bounded worker pools ([`scan`])
//! - **Live watching**: per-path debouncing of raw filesystem notifications,
//!   optionally with the monitor isolated in a child process ([`watch`])
//! - **Artifacts**: idempotent WebP thumbnail/preview generation with external
//!   frame extraction for video ([`transform`])
//!
//! Collaborators outside the core (catalog storage, path registry,
//! notification fan-out, settings) are reached through the traits in
//! [`ports`]; in-memory and Postgres adapters live in [`infra`].
//!
//! ## Feature Flags
//!
//! - `postgres` (default): enables the SQLx-backed catalog store
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use pixvault_core::config::PipelineConfig;
//! use pixvault_core::infra::memory::{
//!     BroadcastSink, InMemoryCatalog, InMemoryPathRegistry, InMemorySettings,
//! };
//! use pixvault_core::ingest::{DedupIngestor, InProcessHashLocks};
//! use pixvault_core::transform::{FfmpegFrameExtractor, MediaTransformPipeline};
//!
//! # async fn run() -> pixvault_core::Result<()> {
//! let config = PipelineConfig::default();
//! let sink = Arc::new(BroadcastSink::new(64));
//! let settings = Arc::new(InMemorySettings::from_config(&config.transform));
//! let transforms = Arc::new(MediaTransformPipeline::new(
//!     config.transform.clone(),
//!     Arc::new(FfmpegFrameExtractor::from_config(&config.transform)),
//!     settings,
//!     sink.clone(),
//! ));
//! let ingestor = DedupIngestor::new(
//!     Arc::new(InMemoryCatalog::new()),
//!     Arc::new(InProcessHashLocks::new()),
//!     sink,
//!     &config.ingest,
//! )
//! .with_transforms(transforms);
//!
//! let outcome = ingestor.ingest(Path::new("/photos/IMG_0001.jpg")).await?;
//! println!("{:?}", outcome.status());
//! # let _ = InMemoryPathRegistry::new(Vec::new());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod identity;
pub mod infra;
pub mod ingest;
pub mod ports;
pub mod scan;
pub mod transform;
pub mod types;
pub mod watch;

pub use error::{Result, VaultError};
pub use types::{
    ArtifactVariant, CanonicalEvent, CanonicalEventKind, CatalogEvent,
    CatalogRecord, ContentHash, MediaKind, Metadata, Notification, RawEvent,
    RawEventKind, WatchedPath,
};

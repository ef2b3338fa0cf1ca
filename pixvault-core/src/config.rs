//! Tuning knobs for the ingestion pipeline.
//!
//! Every struct here deserializes with `#[serde(default)]`, so a config file
//! only needs to mention the values it overrides.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::types::ArtifactVariant;

/// Aggregate configuration passed to every pipeline component at construction.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ingest: IngestConfig,
    pub scan: ScanConfig,
    pub watch: WatchConfig,
    pub transform: TransformConfig,
}

impl PipelineConfig {
    /// Reject values that would stall a worker pool or produce empty artifacts.
    pub fn validate(&self) -> Result<()> {
        if self.scan.file_workers == 0 || self.scan.dir_workers == 0 {
            return Err(VaultError::Config(
                "scan worker counts must be non-zero".into(),
            ));
        }
        if self.scan.file_queue_capacity == 0 {
            return Err(VaultError::Config(
                "scan.file_queue_capacity must be non-zero".into(),
            ));
        }
        if self.watch.channel_capacity == 0
            || self.watch.max_concurrent_ingests == 0
        {
            return Err(VaultError::Config(
                "watch channel capacity and ingest concurrency must be non-zero"
                    .into(),
            ));
        }
        if self.transform.thumbnail_bound == 0
            || self.transform.preview_bound == 0
        {
            return Err(VaultError::Config(
                "artifact bounds must be greater than zero".into(),
            ));
        }
        if self.transform.max_parallel == 0 {
            return Err(VaultError::Config(
                "transform.max_parallel must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// How content-hash exclusion is enforced while inserting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// Lock files under `lock_dir`; safe across processes sharing the directory.
    #[default]
    File,
    /// Concurrent map inside this process only.
    InProcess,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub lock_strategy: LockStrategy,
    /// Directory holding per-hash lock files when `lock_strategy = "file"`.
    pub lock_dir: PathBuf,
    /// How long a freshly ingested or confirmed hash short-circuits repeat
    /// notifications for the same content.
    pub recent_ttl_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lock_strategy: LockStrategy::File,
            lock_dir: std::env::temp_dir().join("pixvault-locks"),
            recent_ttl_ms: 5_000,
        }
    }
}

impl IngestConfig {
    pub fn recent_ttl(&self) -> Duration {
        Duration::from_millis(self.recent_ttl_ms)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Workers calling `ingest` for queued files.
    pub file_workers: usize,
    /// Workers listing queued directories.
    pub dir_workers: usize,
    /// Bound on files waiting for a worker; directory workers wait when full.
    pub file_queue_capacity: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            file_workers: 4,
            dir_workers: 4,
            file_queue_capacity: 256,
        }
    }
}

/// Where the low-level filesystem monitor runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum WatchIsolation {
    #[default]
    InProcess,
    /// Spawn `program args.. <path>` and read JSON lines from its stdout.
    Subprocess { program: PathBuf, args: Vec<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period in milliseconds before a path's events are resolved.
    pub debounce_ms: u64,
    /// Capacity of the raw event channel between monitors and the consumer.
    pub channel_capacity: usize,
    /// Upper bound on canonical events being ingested at once.
    pub max_concurrent_ingests: usize,
    pub isolation: WatchIsolation,
    /// Bulk-scan directories that appear under a watched root.
    pub rescan_new_directories: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            channel_capacity: 1_024,
            max_concurrent_ingests: 4,
            isolation: WatchIsolation::InProcess,
            rescan_new_directories: true,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(1))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Root directory for generated artifacts, one subdirectory per variant.
    pub artifact_root: PathBuf,
    /// Longest edge in pixels for thumbnails.
    pub thumbnail_bound: u32,
    /// Longest edge in pixels for previews.
    pub preview_bound: u32,
    /// Concurrent background artifact jobs.
    pub max_parallel: usize,
    /// Variants rendered right after a record is ingested; others are
    /// produced on demand.
    pub eager_variants: Vec<ArtifactVariant>,
    pub ffmpeg_path: PathBuf,
    pub frame_timeout_ms: u64,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("cache/artifacts"),
            thumbnail_bound: 400,
            preview_bound: 1_024,
            max_parallel: 4,
            eager_variants: vec![ArtifactVariant::Thumbnail],
            ffmpeg_path: PathBuf::from("ffmpeg"),
            frame_timeout_ms: 30_000,
        }
    }
}

impl TransformConfig {
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.frame_timeout_ms.max(1))
    }

    pub fn bound_for(&self, variant: ArtifactVariant) -> u32 {
        match variant {
            ArtifactVariant::Thumbnail => self.thumbnail_bound,
            ArtifactVariant::Preview => self.preview_bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        PipelineConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = PipelineConfig::default();
        config.scan.file_workers = 0;
        assert!(matches!(config.validate(), Err(VaultError::Config(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"watch": {"debounce_ms": 250}, "transform": {"thumbnail_bound": 256}}"#,
        )
        .unwrap();
        assert_eq!(config.watch.debounce_ms, 250);
        assert_eq!(config.watch.channel_capacity, 1_024);
        assert_eq!(config.transform.thumbnail_bound, 256);
        assert_eq!(config.transform.preview_bound, 1_024);
        assert_eq!(config.scan.file_workers, 4);
    }

    #[test]
    fn subprocess_isolation_deserializes() {
        let config: WatchConfig = serde_json::from_str(
            r#"{"isolation": {"mode": "subprocess", "program": "/usr/bin/pixvault-server", "args": ["watch-worker"]}}"#,
        )
        .unwrap();
        assert_eq!(
            config.isolation,
            WatchIsolation::Subprocess {
                program: PathBuf::from("/usr/bin/pixvault-server"),
                args: vec!["watch-worker".to_string()],
            }
        );
    }
}

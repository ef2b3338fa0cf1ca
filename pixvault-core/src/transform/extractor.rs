use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::TransformConfig;
use crate::error::{Result, VaultError};

/// Seek offset for the representative frame; the first decodable frame.
const FRAME_OFFSET: &str = "00:00:00.001";

/// Produces one still image from a video.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Write a single frame of `video` to `output`. The output format follows
    /// the output file extension.
    async fn extract_frame(&self, video: &Path, output: &Path) -> Result<()>;
}

/// Runs the `ffmpeg` binary as an opaque subprocess.
#[derive(Debug, Clone)]
pub struct FfmpegFrameExtractor {
    ffmpeg_path: PathBuf,
    timeout: Duration,
}

impl FfmpegFrameExtractor {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout,
        }
    }

    pub fn from_config(config: &TransformConfig) -> Self {
        Self::new(config.ffmpeg_path.clone(), config.frame_timeout())
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    async fn extract_frame(&self, video: &Path, output: &Path) -> Result<()> {
        let mut command = Command::new(&self.ffmpeg_path);
        command
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(video)
            .args(["-ss", FRAME_OFFSET, "-frames:v", "1", "-q:v", "2"])
            .arg(output)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(video = %video.display(), "extracting frame");

        let result = timeout(self.timeout, command.output())
            .await
            .map_err(|_| VaultError::FrameExtraction {
                status: "timed out".into(),
                stderr: format!("no frame after {:?}", self.timeout),
            })?
            .map_err(|err| VaultError::FrameExtraction {
                status: "failed to start".into(),
                stderr: format!("{}: {err}", self.ffmpeg_path.display()),
            })?;

        if !result.status.success() {
            return Err(VaultError::FrameExtraction {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

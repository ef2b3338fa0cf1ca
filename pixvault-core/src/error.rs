use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file vanished, was truncated, or could not be read mid-operation.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog store error: {0}")]
    Catalog(String),

    #[error("Path registry error: {0}")]
    Registry(String),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Unsupported media: {0}")]
    Unsupported(String),

    #[error("frame extraction failed ({status}): {stderr}")]
    FrameExtraction { status: String, stderr: String },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VaultError::Read {
            path: path.into(),
            source,
        }
    }

    /// Errors that abort a single operation but say nothing about the health
    /// of the catalog.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VaultError::Read { .. }
                | VaultError::Image(_)
                | VaultError::Unsupported(_)
                | VaultError::FrameExtraction { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

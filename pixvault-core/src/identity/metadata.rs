use std::fs::{self, Metadata as FsMetadata};
use std::path::Path;

use chrono::{DateTime, Utc};
use image::{ImageDecoder, ImageReader};
use serde_json::json;
use tracing::warn;

use crate::error::{Result, VaultError};
use crate::types::Metadata;

/// Image properties worth keeping on the catalog record.
///
/// I/O failures are [`VaultError::Read`]. A file the codec cannot parse still
/// gets a record: the decode error is logged and only the size is kept.
pub fn extract_metadata(path: &Path) -> Result<Metadata> {
    let file_size = fs::metadata(path)
        .map_err(|err| VaultError::read(path, err))?
        .len();

    let mut metadata = Metadata::new();
    metadata.insert("file_size".into(), json!(file_size));

    let reader = ImageReader::open(path)
        .map_err(|err| VaultError::read(path, err))?
        .with_guessed_format()
        .map_err(|err| VaultError::read(path, err))?;

    if let Some(format) = reader.format() {
        metadata.insert(
            "format".into(),
            json!(format!("{format:?}").to_ascii_lowercase()),
        );
    }

    match reader.into_decoder() {
        Ok(mut decoder) => {
            let (width, height) = decoder.dimensions();
            metadata.insert("width".into(), json!(width));
            metadata.insert("height".into(), json!(height));
            metadata.insert(
                "color_type".into(),
                json!(format!("{:?}", decoder.color_type()).to_ascii_lowercase()),
            );
            let has_exif = decoder
                .exif_metadata()
                .ok()
                .flatten()
                .is_some_and(|exif| !exif.is_empty());
            metadata.insert("has_exif".into(), json!(has_exif));
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "image header unreadable; keeping size only");
        }
    }

    Ok(metadata)
}

/// Creation and modification times. Creation falls back to modification on
/// filesystems without birth time, and both fall back to now.
pub fn file_timestamps(meta: &FsMetadata) -> (DateTime<Utc>, DateTime<Utc>) {
    let modified = meta.modified().ok().map(DateTime::<Utc>::from);
    let created = meta.created().ok().map(DateTime::<Utc>::from);
    let now = Utc::now();
    let modified_at = modified.unwrap_or(now);
    (created.unwrap_or(modified_at), modified_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    #[test]
    fn reads_dimensions_from_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tiny.png");
        ImageBuffer::from_pixel(7, 3, Rgb([10u8, 20, 30]))
            .save(&path)
            .unwrap();

        let metadata = extract_metadata(&path).unwrap();
        assert_eq!(metadata["width"], json!(7));
        assert_eq!(metadata["height"], json!(3));
        assert_eq!(metadata["format"], json!("png"));
        assert!(metadata["file_size"].as_u64().unwrap() > 0);
    }

    #[test]
    fn undecodable_image_keeps_size_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        fs::write(&path, b"not really a jpeg").unwrap();

        let metadata = extract_metadata(&path).unwrap();
        assert_eq!(metadata["file_size"], json!(17));
        assert!(!metadata.contains_key("width"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempdir().unwrap();
        let err = extract_metadata(&dir.path().join("gone.png")).unwrap_err();
        assert!(matches!(err, VaultError::Read { .. }));
    }
}

use std::io::{BufWriter, Write};
use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::{Result, VaultError};

/// Decode `input`, normalize to RGB, shrink to fit within `bound` (never
/// enlarging) and write WebP to `target` through a temp file in the same
/// directory, so readers never observe a partial artifact.
///
/// Blocking; run it on the blocking pool.
pub fn render_artifact(input: &Path, bound: u32, target: &Path) -> Result<(u32, u32)> {
    let decoded = ImageReader::open(input)
        .map_err(|err| VaultError::read(input, err))?
        .with_guessed_format()
        .map_err(|err| VaultError::read(input, err))?
        .decode()?;

    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let fitted = if rgb.width() > bound || rgb.height() > bound {
        rgb.thumbnail(bound, bound)
    } else {
        rgb
    };

    let dir = target.parent().ok_or_else(|| {
        VaultError::Internal(format!("artifact path {} has no parent", target.display()))
    })?;
    let mut staged = tempfile::Builder::new()
        .prefix(".render-")
        .suffix(".webp")
        .tempfile_in(dir)?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        fitted.write_to(&mut writer, ImageFormat::WebP)?;
        writer.flush()?;
    }
    staged.persist(target).map_err(|err| VaultError::Io(err.error))?;

    Ok((fitted.width(), fitted.height()))
}

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::MediaKind;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "png", "gif", "webp", "tif", "tiff", "bmp", "heic",
    "heif", "avif",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mov", "qt", "avi", "webm", "mkv", "3gp",
];

const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"mif1", b"msf1",
    b"avif", b"avis",
];

/// Decide the media family of `path`: extension first, leading bytes when the
/// extension is missing or unknown. Unreadable files are `Unsupported`.
pub fn classify(path: &Path) -> MediaKind {
    if let Some(kind) = path
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(classify_extension)
    {
        return kind;
    }

    let mut header = [0u8; 16];
    let read = match File::open(path).and_then(|mut file| file.read(&mut header)) {
        Ok(read) => read,
        Err(_) => return MediaKind::Unsupported,
    };
    sniff_header(&header[..read])
}

pub fn classify_extension(ext: &str) -> Option<MediaKind> {
    let ext = ext.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

/// Magic-number detection over the first bytes of a file.
pub fn sniff_header(data: &[u8]) -> MediaKind {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => MediaKind::Image,
        [0x89, b'P', b'N', b'G', ..] => MediaKind::Image,
        [b'G', b'I', b'F', b'8', ..] => MediaKind::Image,
        [b'I', b'I', 0x2A, 0x00, ..] | [b'M', b'M', 0x00, 0x2A, ..] => {
            MediaKind::Image
        }
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => {
            MediaKind::Image
        }
        [b'R', b'I', b'F', b'F', _, _, _, _, b'A', b'V', b'I', b' ', ..] => {
            MediaKind::Video
        }
        [0x1A, 0x45, 0xDF, 0xA3, ..] => MediaKind::Video,
        [_, _, _, _, b'f', b't', b'y', b'p', b0, b1, b2, b3, ..] => {
            let brand = [*b0, *b1, *b2, *b3];
            if HEIF_BRANDS.iter().any(|candidate| **candidate == brand) {
                MediaKind::Image
            } else {
                MediaKind::Video
            }
        }
        [b'B', b'M', ..] => MediaKind::Image,
        _ => MediaKind::Unsupported,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn extension_wins_and_is_case_insensitive() {
        assert_eq!(classify(Path::new("/x/IMG_0001.JPG")), MediaKind::Image);
        assert_eq!(classify(Path::new("/x/clip.MOV")), MediaKind::Video);
        assert_eq!(classify_extension("txt"), None);
    }

    #[test]
    fn headers_identify_common_containers() {
        assert_eq!(sniff_header(&[0xFF, 0xD8, 0xFF, 0xE0]), MediaKind::Image);
        assert_eq!(sniff_header(b"RIFF\0\0\0\0WEBPVP8 "), MediaKind::Image);
        assert_eq!(sniff_header(b"RIFF\0\0\0\0AVI LIST"), MediaKind::Video);
        assert_eq!(sniff_header(b"\0\0\0\x18ftypheic\0\0\0\0"), MediaKind::Image);
        assert_eq!(sniff_header(b"\0\0\0\x18ftypisom\0\0\0\0"), MediaKind::Video);
        assert_eq!(sniff_header(b"hello world"), MediaKind::Unsupported);
        assert_eq!(sniff_header(&[]), MediaKind::Unsupported);
    }

    #[test]
    fn unknown_extension_falls_back_to_header() {
        let dir = tempdir().unwrap();
        let disguised = dir.path().join("download.bin");
        fs::write(&disguised, [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]).unwrap();
        assert_eq!(classify(&disguised), MediaKind::Image);

        let notes = dir.path().join("notes");
        fs::write(&notes, "just text").unwrap();
        assert_eq!(classify(&notes), MediaKind::Unsupported);

        assert_eq!(classify(&dir.path().join("missing")), MediaKind::Unsupported);
    }
}

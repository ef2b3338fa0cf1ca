use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

/// Immediate children of a directory, each group in creation order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirListing {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

struct Entry {
    path: PathBuf,
    created: Option<SystemTime>,
}

/// List `dir`, splitting files from subdirectories and sorting both ascending
/// by creation time (modification time where the platform has no birth time).
/// Entries without a readable timestamp sort last; ties sort by name.
/// Symlinked directories are skipped.
pub fn list_directory(dir: &Path) -> io::Result<DirListing> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };

        if file_type.is_dir() {
            dirs.push(Entry {
                created: creation_time(&path),
                path,
            });
        } else if file_type.is_file() {
            files.push(Entry {
                created: creation_time(&path),
                path,
            });
        } else if file_type.is_symlink() && path.is_file() {
            files.push(Entry {
                created: creation_time(&path),
                path,
            });
        }
    }

    files.sort_by(compare_entries);
    dirs.sort_by(compare_entries);

    Ok(DirListing {
        files: files.into_iter().map(|entry| entry.path).collect(),
        dirs: dirs.into_iter().map(|entry| entry.path).collect(),
    })
}

fn creation_time(path: &Path) -> Option<SystemTime> {
    let meta = fs::metadata(path).ok()?;
    meta.created().or_else(|_| meta.modified()).ok()
}

fn compare_entries(a: &Entry, b: &Entry) -> Ordering {
    match (a.created, b.created) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.path.cmp(&b.path))
}

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};
use crate::types::ContentHash;

/// Read size for streaming hashes.
pub const BLOCK_SIZE: usize = 64 * 1024;

/// SHA-256 of the file's full content, read in [`BLOCK_SIZE`] chunks.
///
/// A file that disappears or cannot be read part-way through yields
/// [`VaultError::Read`]; the caller must not ingest it.
pub fn hash_file(path: &Path) -> Result<ContentHash> {
    let file = File::open(path).map_err(|err| VaultError::read(path, err))?;
    hash_reader(file).map_err(|err| VaultError::read(path, err))
}

pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; BLOCK_SIZE];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..read]);
    }
    Ok(ContentHash::from_digest(&hasher.finalize()))
}

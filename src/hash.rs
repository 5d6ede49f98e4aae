//! Content hashing used as the filename-independent identity of a file.

use std::{fs::File, io::Read, path::Path};

use sha2::{Digest, Sha256};

use crate::error::StoreError;

const CHUNK_SIZE: usize = 64 * 1024;

/// SHA-256 of the file's bytes as lowercase hex, read in fixed-size chunks.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Like [`hash_file`], tagging the error with the file it came from.
pub fn content_hash(path: &Path) -> Result<String, StoreError> {
    hash_file(path).map_err(|source| StoreError::Hash {
        file: path.to_path_buf(),
        source,
    })
}

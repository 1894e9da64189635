//! Content checksums for package bytes.
//!
//! A package checksum is the first four bytes of the SHA-256 digest of its
//! contents, read as a big-endian `u32`. Manifests carry this value and the
//! downloader uses it to verify completed transfers.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Read buffer size for streaming checksums.
const BUFFER_SIZE: usize = 64 * 1024;

fn fold_digest(digest: &[u8]) -> u32 {
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Compute the checksum of an in-memory byte slice.
pub fn checksum_bytes(data: &[u8]) -> u32 {
    let digest = Sha256::digest(data);
    fold_digest(&digest)
}

/// Compute the checksum of a file, streaming its contents.
pub fn checksum_file(path: &Path) -> io::Result<u32> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(fold_digest(&hasher.finalize()))
}

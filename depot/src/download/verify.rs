//! Integrity verification for downloaded packages.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;

use crate::package::checksum::{checksum_bytes, checksum_file};
use crate::package::ManifestRecord;

/// Verifies a completed transfer before it is promoted.
///
/// Implementations return a human-readable reason on failure; the downloader
/// turns it into [`super::DownloadError::VerificationFailed`].
pub trait PackageVerifier: Send + Sync {
    /// Verify a staged file.
    fn verify_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), String>>;

    /// Verify an in-memory payload.
    fn verify_bytes(&self, data: &[u8]) -> Result<(), String>;
}

/// Accepts every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PackageVerifier for AcceptAll {
    fn verify_file<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<(), String>> {
        Box::pin(async { Ok(()) })
    }

    fn verify_bytes(&self, _data: &[u8]) -> Result<(), String> {
        Ok(())
    }
}

/// Checks size and content checksum against a manifest record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumVerifier {
    expected_checksum: u32,
    expected_size: Option<u64>,
}

impl ChecksumVerifier {
    /// Verify against an explicit checksum, without a size check.
    pub fn new(expected_checksum: u32) -> Self {
        Self {
            expected_checksum,
            expected_size: None,
        }
    }

    /// Also require the payload to be exactly `size` bytes.
    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Verify against a record's checksum and (when positive) size.
    pub fn for_record(record: &ManifestRecord) -> Self {
        let verifier = Self::new(record.checksum);
        if record.size_bytes > 0 {
            verifier.with_size(record.size_bytes as u64)
        } else {
            verifier
        }
    }

    fn check_size(&self, actual: u64) -> Result<(), String> {
        match self.expected_size {
            Some(expected) if expected != actual => Err(format!(
                "size mismatch: expected {} bytes, got {}",
                expected, actual
            )),
            _ => Ok(()),
        }
    }

    fn check_checksum(&self, actual: u32) -> Result<(), String> {
        if actual == self.expected_checksum {
            Ok(())
        } else {
            Err(format!(
                "checksum mismatch: expected {:08x}, got {:08x}",
                self.expected_checksum, actual
            ))
        }
    }
}

impl PackageVerifier for ChecksumVerifier {
    fn verify_file<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<(), String>> {
        let owned: PathBuf = path.to_path_buf();
        Box::pin(async move {
            let len = tokio::fs::metadata(&owned)
                .await
                .map_err(|e| format!("cannot stat {}: {}", owned.display(), e))?
                .len();
            self.check_size(len)?;

            let actual = tokio::task::spawn_blocking(move || checksum_file(&owned))
                .await
                .map_err(|e| format!("checksum task failed: {}", e))?
                .map_err(|e| format!("cannot read staged file: {}", e))?;
            self.check_checksum(actual)
        })
    }

    fn verify_bytes(&self, data: &[u8]) -> Result<(), String> {
        self.check_size(data.len() as u64)?;
        self.check_checksum(checksum_bytes(data))
    }
}

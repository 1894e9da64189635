//! Realized package bytes.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// Bytes of a package that are ready to be loaded.
///
/// File-backed blobs are produced for bundled packages, previously
/// downloaded packages and staged downloads; memory-backed blobs come from
/// downloads with staging disabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageBlob {
    /// Package stored in a local file.
    File {
        /// Location of the package file.
        path: PathBuf,
        /// File length in bytes.
        len: u64,
    },
    /// Package held in memory.
    Memory(Bytes),
}

impl PackageBlob {
    /// Open a local package file.
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a file", path.display()),
            ));
        }
        Ok(Self::File {
            path,
            len: metadata.len(),
        })
    }

    /// Length in bytes.
    pub fn len(&self) -> u64 {
        match self {
            Self::File { len, .. } => *len,
            Self::Memory(bytes) => bytes.len() as u64,
        }
    }

    /// Returns true if the package has no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of a file-backed blob.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path, .. } => Some(path),
            Self::Memory(_) => None,
        }
    }

    /// Read the whole package into memory.
    pub async fn read(&self) -> io::Result<Bytes> {
        match self {
            Self::File { path, .. } => tokio::fs::read(path).await.map(Bytes::from),
            Self::Memory(bytes) => Ok(bytes.clone()),
        }
    }
}

//! Tracker error types.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::download::DownloadError;
use crate::package::ManifestError;

/// Errors produced by the package tracker.
///
/// Cloneable so a single remote-manifest failure can be handed to every
/// caller waiting on the same fetch.
#[derive(Debug, Clone, Error)]
pub enum TrackerError {
    /// No remote base URL is configured.
    #[error("No remote base URL configured")]
    NoRemote,

    /// The remote manifest could not be downloaded.
    #[error("Failed to fetch remote manifest: {0}")]
    Download(#[source] Arc<DownloadError>),

    /// A manifest could not be decoded.
    #[error("Manifest {origin} is corrupt: {source}")]
    Manifest {
        origin: String,
        #[source]
        source: Arc<ManifestError>,
    },

    /// The ledger could not be encoded.
    #[error("Failed to encode ledger: {0}")]
    LedgerEncode(#[source] Arc<ManifestError>),

    /// Local file operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// No remote record matches a completed download.
    #[error("No remote record for package {0}")]
    UnknownPackage(String),

    /// A package transfer failed.
    #[error("Download of {package} failed: {source}")]
    PackageDownload {
        package: String,
        #[source]
        source: Arc<DownloadError>,
    },

    /// The in-flight manifest fetch ended without a result.
    #[error("Remote manifest fetch was abandoned")]
    FetchAbandoned,

    /// The in-flight package transfer ended without a result.
    #[error("Download of {0} was abandoned")]
    DownloadAbandoned(String),
}

impl TrackerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn package_download(package: impl Into<String>, source: DownloadError) -> Self {
        Self::PackageDownload {
            package: package.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn manifest(origin: impl Into<String>, source: ManifestError) -> Self {
        Self::Manifest {
            origin: origin.into(),
            source: Arc::new(source),
        }
    }
}

impl From<DownloadError> for TrackerError {
    fn from(err: DownloadError) -> Self {
        Self::Download(Arc::new(err))
    }
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

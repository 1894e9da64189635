//! Download error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring data.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The request could not be sent or the body could not be read.
    #[error("Transport error for {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The request timed out.
    #[error("Request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// Downloaded bytes failed the integrity check.
    #[error("Verification failed for {url}: {reason}")]
    VerificationFailed { url: String, reason: String },

    /// The response was not valid UTF-8 text.
    #[error("Response from {url} is not valid UTF-8")]
    InvalidText { url: String },

    /// Local file operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The transfer was cancelled.
    #[error("Download of {url} was cancelled")]
    Cancelled { url: String },
}

impl DownloadError {
    /// Returns true if a partial transfer may be resumed after this error.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::HttpStatus { .. } | Self::Timeout { .. } | Self::Cancelled { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;

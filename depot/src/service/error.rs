//! Service error types.

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigFileError;
use crate::download::DownloadError;
use crate::tracker::TrackerError;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigFileError),

    /// Failed to create the HTTP transport
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] DownloadError),

    /// The remote manifest could not be fetched after every retry
    #[error("Remote manifest unavailable after {attempts} attempt(s): {source}")]
    RemoteUnavailable {
        attempts: u32,
        #[source]
        source: TrackerError,
    },

    /// A package could not be downloaded
    #[error("Download of {package} failed: {source}")]
    Download {
        package: String,
        #[source]
        source: Arc<DownloadError>,
    },

    /// A tracker operation failed
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_unavailable_display() {
        let err = ServiceError::RemoteUnavailable {
            attempts: 3,
            source: TrackerError::NoRemote,
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.contains(&TrackerError::NoRemote.to_string()));
    }

    #[test]
    fn test_tracker_error_is_transparent() {
        let err: ServiceError = TrackerError::UnknownPackage("a.pkg".into()).into();
        assert_eq!(
            err.to_string(),
            TrackerError::UnknownPackage("a.pkg".into()).to_string()
        );
    }
}

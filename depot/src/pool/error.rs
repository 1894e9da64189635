//! Pool error types.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::download::DownloadError;
use crate::tracker::TrackerError;

/// Errors returned by [`super::PackagePool::get`].
///
/// Cloneable because one load result is shared by every coalesced caller.
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    /// No known manifest has a record for the path.
    #[error("No package provides {0}")]
    NotFound(String),

    /// The dependency graph contains a cycle.
    #[error("Dependency cycle: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    /// A dependency failed to load.
    #[error("Dependency {dependency} of {package} failed: {source}")]
    Dependency {
        package: String,
        dependency: String,
        #[source]
        source: Arc<PoolError>,
    },

    /// The package bytes could not be downloaded.
    #[error("Download of {package} failed: {source}")]
    Download {
        package: String,
        #[source]
        source: Arc<DownloadError>,
    },

    /// The package is not present locally and downloads are disabled.
    #[error("Package {0} is not present locally")]
    NotPresent(String),

    /// The package must be downloaded but no remote is configured.
    #[error("Package {0} has no remote source")]
    NoRemote(String),

    /// The tracker rejected the completed download.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Local package file could not be opened.
    #[error("Cannot open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    /// The loader could not construct the package.
    #[error("Failed to load {package}: {reason}")]
    LoadFailed { package: String, reason: String },

    /// The load task ended without producing a result.
    #[error("Load of {0} was abandoned")]
    Abandoned(String),

    /// The caller stopped waiting.
    #[error("Wait for {0} was cancelled")]
    Cancelled(String),
}

impl PoolError {
    /// Transfer failures keep their package name; anything else came from
    /// recording the download.
    pub(crate) fn from_download(error: TrackerError) -> Self {
        match error {
            TrackerError::PackageDownload { package, source } => Self::Download { package, source },
            other => Self::Tracker(other),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Innermost error, following dependency failures.
    pub fn root_cause(&self) -> &PoolError {
        match self {
            Self::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display() {
        let err = PoolError::DependencyCycle {
            cycle: vec!["a.pkg".into(), "b.pkg".into(), "a.pkg".into()],
        };
        assert_eq!(err.to_string(), "Dependency cycle: a.pkg -> b.pkg -> a.pkg");
    }

    #[test]
    fn test_root_cause() {
        let inner = PoolError::NotFound("c.pkg".to_string());
        let err = PoolError::Dependency {
            package: "a.pkg".to_string(),
            dependency: "b.pkg".to_string(),
            source: Arc::new(PoolError::Dependency {
                package: "b.pkg".to_string(),
                dependency: "c.pkg".to_string(),
                source: Arc::new(inner),
            }),
        };
        assert!(matches!(err.root_cause(), PoolError::NotFound(p) if p == "c.pkg"));
    }

    #[test]
    fn test_transfer_failure_maps_to_download() {
        let err = PoolError::from_download(TrackerError::package_download(
            "a.pkg",
            DownloadError::Cancelled {
                url: "mem://a.pkg".to_string(),
            },
        ));
        assert!(matches!(err, PoolError::Download { ref package, .. } if package == "a.pkg"));

        let err = PoolError::from_download(TrackerError::UnknownPackage("a.pkg".into()));
        assert!(matches!(err, PoolError::Tracker(TrackerError::UnknownPackage(_))));
    }
}

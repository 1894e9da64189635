//! Content service facade.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::error::ServiceError;
use crate::config::{ConfigFile, DownloadConfig};
use crate::download::Downloader;
use crate::package::ManifestRecord;
use crate::pool::{PackageHandle, PackageLoader, PackagePool, PoolConfig, PoolResult};
use crate::tracker::{
    PackageFetch, PackageTracker, PendingUpdate, TrackerConfig, TrackerError, UpdateSet,
};

/// Outcome of [`ContentService::start`].
#[derive(Debug)]
pub struct StartupReport {
    /// Number of remote records, or why the remote manifest is unavailable.
    pub remote: Result<usize, ServiceError>,
    /// Packages whose remote content differs from the local copy.
    pub updates: UpdateSet,
}

/// Outcome of [`ContentService::update_all`].
#[derive(Debug, Default)]
pub struct UpdateReport {
    /// Records installed as downloaded.
    pub installed: Vec<ManifestRecord>,
    /// Packages that could not be updated, keyed by local logical path.
    pub failed: Vec<(String, ServiceError)>,
}

impl UpdateReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Bytes installed, as declared by the remote manifest.
    pub fn installed_bytes(&self) -> u64 {
        self.installed.iter().map(|r| r.size_bytes.max(0) as u64).sum()
    }
}

/// Wires the tracker, downloader and pool together.
///
/// Construction does no I/O. [`start`](Self::start) loads the local
/// manifests, fetches the remote one and computes the update set;
/// [`update_all`](Self::update_all) downloads it; [`shutdown`](Self::shutdown)
/// unloads the pool and writes the ledger.
pub struct ContentService<L: PackageLoader> {
    tracker: Arc<PackageTracker>,
    pool: PackagePool<L>,
    download: DownloadConfig,
}

impl<L: PackageLoader> ContentService<L> {
    /// Build a service from the configuration file, using HTTP for every
    /// transfer.
    pub fn from_config(config: &ConfigFile, loader: L) -> Result<Self, ServiceError> {
        let download = config.download_config();
        let downloader = Downloader::http(&download).map_err(ServiceError::HttpClient)?;
        Ok(Self::new(
            config.tracker_config(),
            Arc::new(downloader),
            loader,
            download,
        ))
    }

    pub fn new(
        tracker_config: TrackerConfig,
        downloader: Arc<Downloader>,
        loader: L,
        download: DownloadConfig,
    ) -> Self {
        let tracker = Arc::new(PackageTracker::new(tracker_config, downloader));
        let pool = PackagePool::with_config(Arc::clone(&tracker), loader, PoolConfig::default());
        Self {
            tracker,
            pool,
            download,
        }
    }

    pub fn tracker(&self) -> &Arc<PackageTracker> {
        &self.tracker
    }

    pub fn pool(&self) -> &PackagePool<L> {
        &self.pool
    }

    pub fn download_config(&self) -> &DownloadConfig {
        &self.download
    }

    /// Initialize the tracker, fetch the remote manifest and diff.
    ///
    /// A failed remote fetch is reported, not returned: the tracker keeps
    /// serving local packages and the update set is empty.
    pub async fn start(&self) -> StartupReport {
        self.tracker.initialize().await;
        let remote = self.fetch_remote().await;
        if let Err(e) = &remote {
            warn!(error = %e, "Continuing without remote manifest");
        }
        let updates = self.tracker.diff_for_update();
        info!(
            updates = updates.len(),
            bytes = updates.total_bytes(),
            "Content service started"
        );
        StartupReport { remote, updates }
    }

    /// Fetch the remote manifest, retrying transient failures up to the
    /// configured retry count.
    pub async fn fetch_remote(&self) -> Result<usize, ServiceError> {
        let attempts = self.download.max_retries() + 1;
        let mut attempt = 1;
        loop {
            match self.tracker.fetch_remote_manifest().await {
                Ok(count) => return Ok(count),
                Err(TrackerError::NoRemote) => {
                    return Err(ServiceError::RemoteUnavailable {
                        attempts: attempt,
                        source: TrackerError::NoRemote,
                    })
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        attempt,
                        attempts,
                        error = %e,
                        delay_ms = self.download.retry_delay().as_millis() as u64,
                        "Remote manifest fetch failed, retrying"
                    );
                    tokio::time::sleep(self.download.retry_delay()).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ServiceError::RemoteUnavailable {
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    /// Download every pending update, at most `parallel_downloads` at a
    /// time, then persist the ledger.
    ///
    /// A failed package does not stop the others.
    pub async fn update_all(&self, set: &UpdateSet) -> Result<UpdateReport, ServiceError> {
        let parallel = self.download.parallel_downloads();
        info!(packages = set.len(), parallel, "Downloading updates");

        let results: Vec<(String, Result<ManifestRecord, ServiceError>)> =
            stream::iter(set.updates().iter().cloned())
                .map(|update| async move {
                    let path = update.local_path.clone();
                    (path, self.install(update).await)
                })
                .buffer_unordered(parallel)
                .collect()
                .await;

        let mut report = UpdateReport::default();
        for (path, result) in results {
            match result {
                Ok(record) => report.installed.push(record),
                Err(e) => {
                    warn!(package = %path, error = %e, "Update failed");
                    report.failed.push((path, e));
                }
            }
        }

        self.tracker.persist_ledger().await?;
        info!(
            installed = report.installed.len(),
            failed = report.failed.len(),
            bytes = report.installed_bytes(),
            "Update finished"
        );
        Ok(report)
    }

    /// Download one update, resuming the partial transfer on transient
    /// failures. Shares the transfer with a concurrent pool load of the same
    /// package.
    async fn install(&self, update: PendingUpdate) -> Result<ManifestRecord, ServiceError> {
        let policy = PackageFetch {
            verify: true,
            max_retries: self.download.max_retries(),
            retry_delay: self.download.retry_delay(),
        };
        match self
            .tracker
            .download_package(&update.local_path, &update.remote, policy)
            .await
        {
            Ok((record, _)) => Ok(record),
            Err(TrackerError::PackageDownload { package, source }) => {
                Err(ServiceError::Download { package, source })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Load the package owning `path` through the pool.
    pub async fn get(&self, path: &str) -> PoolResult<PackageHandle<L::Package>> {
        self.pool.get(path).await
    }

    /// Unload every pooled package and write the ledger if it changed.
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        let unloaded = self.pool.unload_all();
        self.tracker.persist_ledger().await?;
        self.pool.log_stats();
        self.tracker.log_stats();
        info!(unloaded, "Content service stopped");
        Ok(())
    }
}

//! Resumable, verified transfers.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::blob::PackageBlob;
use super::error::{DownloadError, DownloadResult};
use super::transport::{ReqwestTransport, ResponseKind, Transport};
use super::verify::PackageVerifier;
use crate::config::DownloadConfig;

/// Suffix appended to the destination path while a transfer is staged.
pub const TEMP_SUFFIX: &str = ".temp";

/// Largest buffer reserved up front from a reported `Content-Length`.
const MAX_PREALLOCATION: usize = 8 * 1024 * 1024;

/// Progress callback invoked with `(bytes_downloaded, total_bytes)`.
///
/// `total_bytes` is 0 when the server did not report a length.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// How a verified temp file replaces the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromoteStrategy {
    /// Rename in place, falling back to copy when rename fails.
    #[default]
    Rename,
    /// Always copy the temp file over the destination and delete it.
    Copy,
}

impl std::fmt::Display for PromoteStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rename => write!(f, "rename"),
            Self::Copy => write!(f, "copy"),
        }
    }
}

impl std::str::FromStr for PromoteStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rename" => Ok(Self::Rename),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown promote strategy '{}'", other)),
        }
    }
}

/// Returns the staging path for `dest`.
pub fn temp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// The reported length is untrusted; bodies larger than the cap grow the
/// buffer as they arrive.
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .map(|len| usize::try_from(len).unwrap_or(usize::MAX).min(MAX_PREALLOCATION))
        .unwrap_or(0)
}

/// Downloads manifests and packages over a [`Transport`].
///
/// Package transfers are staged into `<dest>.temp` and resumed from the
/// staged length on the next attempt. Nothing is retried internally; retry
/// is the caller's policy.
#[derive(Clone)]
pub struct Downloader {
    transport: Arc<dyn Transport>,
    staging: bool,
    promote: PromoteStrategy,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("staging", &self.staging)
            .field("promote", &self.promote)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl Downloader {
    /// Creates a staging downloader over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            staging: true,
            promote: PromoteStrategy::default(),
            progress: None,
        }
    }

    /// Creates an HTTP downloader from configuration.
    pub fn http(config: &DownloadConfig) -> DownloadResult<Self> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.timeout_secs()))?;
        Ok(Self::new(Arc::new(transport))
            .with_staging(config.staging())
            .with_promote(config.promote()))
    }

    /// Enables or disables staging to disk.
    pub fn with_staging(mut self, staging: bool) -> Self {
        self.staging = staging;
        self
    }

    /// Sets how verified files are promoted.
    pub fn with_promote(mut self, promote: PromoteStrategy) -> Self {
        self.promote = promote;
        self
    }

    /// Sets a progress callback for package transfers.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Returns true if package transfers are staged to disk.
    pub fn staging(&self) -> bool {
        self.staging
    }

    /// Fetches a resource into memory.
    pub async fn fetch_bytes(&self, url: &str) -> DownloadResult<Bytes> {
        debug!(url = %url, "Fetching bytes");
        let response = self.transport.get(url, 0).await?;
        let mut buffer = BytesMut::with_capacity(initial_capacity(response.content_length));
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Fetches a resource as UTF-8 text.
    pub async fn fetch_text(&self, url: &str) -> DownloadResult<String> {
        let bytes = self.fetch_bytes(url).await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DownloadError::InvalidText {
            url: url.to_string(),
        })
    }

    /// Downloads a package to `dest`, verifying it before promotion.
    ///
    /// With staging disabled the package is verified in memory and `dest`
    /// is not touched.
    pub async fn fetch_package(
        &self,
        url: &str,
        dest: &Path,
        verifier: &dyn PackageVerifier,
    ) -> DownloadResult<PackageBlob> {
        if !self.staging {
            return self.fetch_in_memory(url, verifier).await;
        }

        let temp = temp_path(dest);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        self.transfer_to_temp(url, &temp).await?;

        if let Err(reason) = verifier.verify_file(&temp).await {
            warn!(url = %url, reason = %reason, "Package failed verification");
            if let Err(e) = tokio::fs::remove_file(&temp).await {
                warn!(path = %temp.display(), error = %e, "Failed to delete rejected temp file");
            }
            return Err(DownloadError::VerificationFailed {
                url: url.to_string(),
                reason,
            });
        }

        let len = self.promote_temp(&temp, dest).await?;
        info!(url = %url, dest = %dest.display(), bytes = len, "Package downloaded");
        Ok(PackageBlob::File {
            path: dest.to_path_buf(),
            len,
        })
    }

    /// Like [`fetch_package`](Self::fetch_package) but stops when `cancel` fires.
    ///
    /// A cancelled transfer leaves its temp file in place for resumption.
    pub async fn fetch_package_cancellable(
        &self,
        url: &str,
        dest: &Path,
        verifier: &dyn PackageVerifier,
        cancel: CancellationToken,
    ) -> DownloadResult<PackageBlob> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(url = %url, "Package download cancelled");
                Err(DownloadError::Cancelled { url: url.to_string() })
            }
            result = self.fetch_package(url, dest, verifier) => result,
        }
    }

    async fn fetch_in_memory(
        &self,
        url: &str,
        verifier: &dyn PackageVerifier,
    ) -> DownloadResult<PackageBlob> {
        let response = self.transport.get(url, 0).await?;
        let total = response.content_length.unwrap_or(0);
        let mut buffer = BytesMut::with_capacity(initial_capacity(response.content_length));
        let mut body = response.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
            self.report(buffer.len() as u64, total);
        }
        let bytes = buffer.freeze();

        verifier
            .verify_bytes(&bytes)
            .map_err(|reason| DownloadError::VerificationFailed {
                url: url.to_string(),
                reason,
            })?;
        debug!(url = %url, bytes = bytes.len(), "Package downloaded into memory");
        Ok(PackageBlob::Memory(bytes))
    }

    /// Streams the body into the temp file, resuming from its current length.
    async fn transfer_to_temp(&self, url: &str, temp: &Path) -> DownloadResult<()> {
        let offset = match tokio::fs::metadata(temp).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(DownloadError::io(temp, e)),
        };

        if offset > 0 {
            debug!(url = %url, offset, "Resuming staged download");
        }

        let response = self.transport.get(url, offset).await?;

        let (mut file, start) = match response.kind {
            ResponseKind::RangeNotSatisfiable => {
                debug!(url = %url, offset, "Staged file already complete");
                return Ok(());
            }
            ResponseKind::Partial => (open_append(temp).await?, offset),
            ResponseKind::Full => {
                if offset > 0 {
                    debug!(url = %url, "Server ignored range, restarting transfer");
                }
                (open_truncate(temp).await?, 0)
            }
        };

        let total = response.content_length.map(|len| start + len).unwrap_or(0);
        let mut written = start;
        let mut body = response.body;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    // Keep what was received so the next attempt resumes.
                    if let Err(flush_err) = file.flush().await {
                        warn!(path = %temp.display(), error = %flush_err, "Failed to flush partial download");
                    }
                    return Err(e);
                }
            };
            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(temp, e))?;
            written += chunk.len() as u64;
            self.report(written, total);
        }

        file.flush().await.map_err(|e| DownloadError::io(temp, e))?;
        file.sync_all().await.map_err(|e| DownloadError::io(temp, e))?;
        Ok(())
    }

    async fn promote_temp(&self, temp: &Path, dest: &Path) -> DownloadResult<u64> {
        if self.promote == PromoteStrategy::Rename {
            match tokio::fs::rename(temp, dest).await {
                Ok(()) => return file_len(dest).await,
                Err(e) => {
                    debug!(error = %e, "Rename failed, falling back to copy");
                }
            }
        }

        let len = tokio::fs::copy(temp, dest)
            .await
            .map_err(|e| DownloadError::io(dest, e))?;
        tokio::fs::remove_file(temp)
            .await
            .map_err(|e| DownloadError::io(temp, e))?;
        Ok(len)
    }

    fn report(&self, downloaded: u64, total: u64) {
        if let Some(progress) = &self.progress {
            progress(downloaded, total);
        }
    }
}

async fn open_append(path: &Path) -> DownloadResult<File> {
    OpenOptions::new()
        .append(true)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))
}

async fn open_truncate(path: &Path) -> DownloadResult<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|e| DownloadError::io(path, e))
}

async fn file_len(path: &Path) -> DownloadResult<u64> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|e| DownloadError::io(path, e))
}

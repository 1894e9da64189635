//! Pool configuration.

/// Behavior of a [`super::PackagePool`] for packages that are not present
/// locally.
///
/// # Example
///
/// ```
/// use depot::pool::PoolConfig;
///
/// let offline = PoolConfig::new().with_download_missing(false);
/// assert!(!offline.download_missing());
/// assert!(offline.verify_downloads());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    download_missing: bool,
    verify_downloads: bool,
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download packages that are not present locally. Default: true.
    pub fn with_download_missing(mut self, download: bool) -> Self {
        self.download_missing = download;
        self
    }

    /// Check size and checksum of downloads against their record.
    /// Default: true.
    pub fn with_verify_downloads(mut self, verify: bool) -> Self {
        self.verify_downloads = verify;
        self
    }

    pub fn download_missing(&self) -> bool {
        self.download_missing
    }

    pub fn verify_downloads(&self) -> bool {
        self.verify_downloads
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            download_missing: true,
            verify_downloads: true,
        }
    }
}

//! Download configuration.

use std::time::Duration;

use super::defaults::{
    DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_PARALLEL_DOWNLOADS,
    DEFAULT_RETRY_DELAY_MS,
};
use crate::download::PromoteStrategy;

/// Configuration for package and manifest transfers.
///
/// # Example
///
/// ```
/// use depot::config::DownloadConfig;
///
/// // Using defaults
/// let config = DownloadConfig::default();
/// assert_eq!(config.timeout_secs(), 30);
/// assert_eq!(config.max_retries(), 3);
///
/// // Custom configuration
/// let config = DownloadConfig::new()
///     .with_timeout_secs(60)
///     .with_max_retries(5)
///     .with_parallel_downloads(8);
/// assert_eq!(config.parallel_downloads(), 8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Request timeout (in seconds)
    timeout_secs: u64,
    /// Remote manifest fetch retries after the first failure
    max_retries: u32,
    /// Delay between manifest fetch attempts
    retry_delay: Duration,
    /// Maximum number of concurrent package downloads
    parallel_downloads: usize,
    /// Stage transfers to `<dest>.temp`
    staging: bool,
    /// How verified files replace their destination
    promote: PromoteStrategy,
}

impl DownloadConfig {
    /// Create a new download configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout in seconds. Default: 30 seconds.
    pub fn with_timeout_secs(mut self, timeout: u64) -> Self {
        self.timeout_secs = timeout;
        self
    }

    /// Set how many times a failed remote manifest fetch is retried.
    ///
    /// Package downloads are never retried automatically; an interrupted
    /// package resumes on its next request. Default: 3 retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the delay between manifest fetch attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the maximum number of parallel package downloads.
    ///
    /// Values below 1 are raised to 1. Default: 4.
    pub fn with_parallel_downloads(mut self, parallel: usize) -> Self {
        self.parallel_downloads = parallel.max(1);
        self
    }

    /// Enable or disable staging to disk.
    pub fn with_staging(mut self, staging: bool) -> Self {
        self.staging = staging;
        self
    }

    /// Set the promotion strategy.
    pub fn with_promote(mut self, promote: PromoteStrategy) -> Self {
        self.promote = promote;
        self
    }

    /// Get the request timeout in seconds.
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs
    }

    /// Get the maximum number of manifest retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the delay between manifest attempts.
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Get the maximum number of parallel downloads.
    pub fn parallel_downloads(&self) -> usize {
        self.parallel_downloads
    }

    /// Returns true if transfers are staged to disk.
    pub fn staging(&self) -> bool {
        self.staging
    }

    /// Get the promotion strategy.
    pub fn promote(&self) -> PromoteStrategy {
        self.promote
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            parallel_downloads: DEFAULT_PARALLEL_DOWNLOADS,
            staging: true,
            promote: PromoteStrategy::Rename,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.timeout_secs(), DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        assert_eq!(config.max_retries(), DEFAULT_MAX_RETRIES);
        assert_eq!(config.parallel_downloads(), DEFAULT_PARALLEL_DOWNLOADS);
        assert!(config.staging());
        assert_eq!(config.promote(), PromoteStrategy::Rename);
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(DownloadConfig::new(), DownloadConfig::default());
    }

    #[test]
    fn test_builder_chain() {
        let config = DownloadConfig::new()
            .with_timeout_secs(45)
            .with_max_retries(2)
            .with_retry_delay(Duration::from_millis(10))
            .with_parallel_downloads(16)
            .with_staging(false)
            .with_promote(PromoteStrategy::Copy);

        assert_eq!(config.timeout_secs(), 45);
        assert_eq!(config.max_retries(), 2);
        assert_eq!(config.retry_delay(), Duration::from_millis(10));
        assert_eq!(config.parallel_downloads(), 16);
        assert!(!config.staging());
        assert_eq!(config.promote(), PromoteStrategy::Copy);
    }

    #[test]
    fn test_parallel_downloads_floor() {
        let config = DownloadConfig::new().with_parallel_downloads(0);
        assert_eq!(config.parallel_downloads(), 1);
    }
}

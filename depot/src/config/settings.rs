//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing or serialization logic.

use std::path::PathBuf;

use crate::download::PromoteStrategy;
use crate::package::ManifestFormat;

/// Complete application configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    /// Remote content server
    pub remote: RemoteSettings,
    /// Local storage locations
    pub storage: StorageSettings,
    /// Transfer behavior
    pub download: DownloadSettings,
    /// Update policy
    pub update: UpdateSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Remote content server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSettings {
    /// Base URL packages and the manifest are served from
    pub base_url: Option<String>,
    /// Manifest file name relative to `base_url`
    pub manifest_name: String,
    /// Manifest encoding; `None` detects it from the payload
    pub manifest_format: Option<ManifestFormat>,
}

/// Local storage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    /// Read-only directory holding packages shipped with the build
    pub bundled_dir: PathBuf,
    /// Manifest file name inside `bundled_dir`
    pub bundled_manifest: String,
    /// Writable directory downloaded packages are stored in
    pub package_dir: PathBuf,
    /// Directory holding per-player ledgers
    pub ledger_dir: PathBuf,
    /// Encoding used when writing the ledger
    pub ledger_format: ManifestFormat,
}

/// Download configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    /// Request timeout in seconds
    pub timeout: u64,
    /// Remote manifest fetch attempts after the first failure
    pub max_retries: u32,
    /// Delay between manifest fetch attempts in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum concurrent package downloads during an update
    pub parallel: usize,
    /// Stage transfers in `<dest>.temp` before promotion
    pub staging: bool,
    /// How staged files replace their destination
    pub promote: PromoteStrategy,
}

/// Update policy.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSettings {
    /// Reset changed local records as soon as the diff is computed
    pub auto_update: bool,
    /// Player id the ledger is stored under
    pub player: String,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Log file path
    pub file: PathBuf,
}

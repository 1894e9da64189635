//! Default values and constants for all configuration settings.

use std::path::PathBuf;

use super::file::config_directory;
use super::settings::*;
use crate::download::PromoteStrategy;
use crate::package::ManifestFormat;

/// Default remote manifest name.
pub const DEFAULT_MANIFEST_NAME: &str = "manifest.json";

/// Default bundled manifest name.
pub const DEFAULT_BUNDLED_MANIFEST: &str = "manifest.json";

/// Default request timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Default number of manifest fetch retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between manifest fetch attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Default number of concurrent package downloads.
pub const DEFAULT_PARALLEL_DOWNLOADS: usize = 4;

/// Default player id.
pub const DEFAULT_PLAYER: &str = "default";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "depot.log";

/// Default bundled package directory (~/.depot/bundled).
pub fn default_bundled_dir() -> PathBuf {
    config_directory().join("bundled")
}

/// Default downloaded package directory (~/.depot/packages).
pub fn default_package_dir() -> PathBuf {
    config_directory().join("packages")
}

/// Default ledger directory (~/.depot/ledger).
pub fn default_ledger_dir() -> PathBuf {
    config_directory().join("ledger")
}

/// Default log file path (~/.depot/logs/depot.log).
pub fn default_log_path() -> PathBuf {
    config_directory().join("logs").join(DEFAULT_LOG_FILE)
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            remote: RemoteSettings {
                base_url: None,
                manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
                manifest_format: None,
            },
            storage: StorageSettings {
                bundled_dir: default_bundled_dir(),
                bundled_manifest: DEFAULT_BUNDLED_MANIFEST.to_string(),
                package_dir: default_package_dir(),
                ledger_dir: default_ledger_dir(),
                ledger_format: ManifestFormat::Json,
            },
            download: DownloadSettings {
                timeout: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
                max_retries: DEFAULT_MAX_RETRIES,
                retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
                parallel: DEFAULT_PARALLEL_DOWNLOADS,
                staging: true,
                promote: PromoteStrategy::Rename,
            },
            update: UpdateSettings {
                auto_update: true,
                player: DEFAULT_PLAYER.to_string(),
            },
            logging: LoggingSettings {
                file: default_log_path(),
            },
        }
    }
}

//! Configuration file handling for ~/.depot/config.ini.
//!
//! Loads and saves user configuration with sensible defaults.
//! Settings structs live in [`super::settings`], constants in [`super::defaults`],
//! parsing in [`super::parser`], and serialization in [`super::writer`].

use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use super::download::DownloadConfig;
use super::settings::ConfigFile;
use crate::tracker::TrackerConfig;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from the default path (~/.depot/config.ini).
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Save configuration to the default path (~/.depot/config.ini).
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Render the configuration as a commented INI document.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Create a default config file at `path` if it doesn't exist.
    ///
    /// Returns true if a file was written.
    pub fn ensure_exists_at(path: &Path) -> Result<bool, ConfigFileError> {
        if path.exists() {
            return Ok(false);
        }
        Self::default().save_to(path)?;
        Ok(true)
    }

    /// Transfer settings as a [`DownloadConfig`].
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::new()
            .with_timeout_secs(self.download.timeout)
            .with_max_retries(self.download.max_retries)
            .with_retry_delay(Duration::from_millis(self.download.retry_delay_ms))
            .with_parallel_downloads(self.download.parallel)
            .with_staging(self.download.staging)
            .with_promote(self.download.promote)
    }

    /// Storage, remote and update settings as a [`TrackerConfig`].
    pub fn tracker_config(&self) -> TrackerConfig {
        let mut config = TrackerConfig::new(
            &self.storage.bundled_dir,
            &self.storage.package_dir,
            &self.storage.ledger_dir,
        )
        .with_bundled_manifest(&self.storage.bundled_manifest)
        .with_ledger_format(self.storage.ledger_format)
        .with_player(&self.update.player)
        .with_auto_update(self.update.auto_update)
        .with_manifest_name(&self.remote.manifest_name)
        .with_manifest_format(self.remote.manifest_format);
        if let Some(url) = &self.remote.base_url {
            config = config.with_base_url(url);
        }
        config
    }
}

/// Get the path to the config directory (~/.depot).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".depot")
}

/// Get the path to the config file (~/.depot/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defaults::*;
    use crate::package::ManifestFormat;

    #[test]
    fn test_default_config() {
        let config = ConfigFile::default();

        assert!(config.remote.base_url.is_none());
        assert_eq!(config.remote.manifest_name, DEFAULT_MANIFEST_NAME);
        assert_eq!(config.download.timeout, DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        assert_eq!(config.storage.ledger_format, ManifestFormat::Json);
        assert_eq!(config.update.player, DEFAULT_PLAYER);
        assert!(config.update.auto_update);
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.ini");

        let config = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.remote.base_url = Some("https://cdn.example.com".to_string());
        config.download.max_retries = 7;
        config.save_to(&config_path).unwrap();

        let loaded = ConfigFile::load_from(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ensure_exists_at() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");

        assert!(ConfigFile::ensure_exists_at(&config_path).unwrap());
        assert!(config_path.exists());
        assert!(!ConfigFile::ensure_exists_at(&config_path).unwrap());
    }

    #[test]
    fn test_load_invalid_value() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.ini");
        std::fs::write(&config_path, "[download]\ntimeout = never\n").unwrap();

        let err = ConfigFile::load_from(&config_path).unwrap_err();
        assert!(matches!(err, ConfigFileError::InvalidValue { .. }));
    }

    #[test]
    fn test_download_config_conversion() {
        let mut config = ConfigFile::default();
        config.download.retry_delay_ms = 50;
        config.download.parallel = 2;

        let download = config.download_config();
        assert_eq!(download.retry_delay(), Duration::from_millis(50));
        assert_eq!(download.parallel_downloads(), 2);
    }

    #[test]
    fn test_tracker_config_conversion() {
        let mut config = ConfigFile::default();
        config.remote.base_url = Some("https://cdn.example.com/c".to_string());
        config.update.player = "p2".to_string();
        config.storage.ledger_dir = PathBuf::from("/var/depot/ledger");

        let tracker = config.tracker_config();
        assert_eq!(
            tracker.remote_manifest_url().as_deref(),
            Some("https://cdn.example.com/c/manifest.json")
        );
        assert_eq!(
            tracker.ledger_path(),
            PathBuf::from("/var/depot/ledger/p2/ledger.json")
        );
    }
}

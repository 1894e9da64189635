//! Tracker configuration.

use std::path::{Path, PathBuf};

use crate::config::{DEFAULT_BUNDLED_MANIFEST, DEFAULT_MANIFEST_NAME, DEFAULT_PLAYER};
use crate::package::ManifestFormat;

/// Locations and policy for a [`super::PackageTracker`].
///
/// # Example
///
/// ```
/// use depot::tracker::TrackerConfig;
///
/// let config = TrackerConfig::new("/opt/game/bundled", "/var/depot/packages", "/var/depot/ledger")
///     .with_base_url("https://cdn.example.com/content/")
///     .with_player("alice");
///
/// assert_eq!(
///     config.remote_manifest_url().as_deref(),
///     Some("https://cdn.example.com/content/manifest.json")
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    bundled_dir: PathBuf,
    bundled_manifest: String,
    package_dir: PathBuf,
    ledger_dir: PathBuf,
    ledger_format: ManifestFormat,
    player: String,
    base_url: Option<String>,
    manifest_name: String,
    manifest_format: Option<ManifestFormat>,
    auto_update: bool,
}

impl TrackerConfig {
    /// Create a configuration with the given storage directories.
    pub fn new(
        bundled_dir: impl Into<PathBuf>,
        package_dir: impl Into<PathBuf>,
        ledger_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            bundled_dir: bundled_dir.into(),
            bundled_manifest: DEFAULT_BUNDLED_MANIFEST.to_string(),
            package_dir: package_dir.into(),
            ledger_dir: ledger_dir.into(),
            ledger_format: ManifestFormat::Json,
            player: DEFAULT_PLAYER.to_string(),
            base_url: None,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            manifest_format: None,
            auto_update: true,
        }
    }

    /// Set the bundled manifest file name.
    pub fn with_bundled_manifest(mut self, name: impl Into<String>) -> Self {
        self.bundled_manifest = name.into();
        self
    }

    /// Set the ledger encoding.
    pub fn with_ledger_format(mut self, format: ManifestFormat) -> Self {
        self.ledger_format = format;
        self
    }

    /// Set the player whose ledger is used.
    pub fn with_player(mut self, player: impl Into<String>) -> Self {
        self.player = player.into();
        self
    }

    /// Set the remote base URL. A trailing slash is ignored.
    pub fn with_base_url(mut self, url: impl AsRef<str>) -> Self {
        self.base_url = Some(url.as_ref().trim_end_matches('/').to_string());
        self
    }

    /// Set the remote manifest file name.
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Set the remote manifest encoding; `None` detects it.
    pub fn with_manifest_format(mut self, format: Option<ManifestFormat>) -> Self {
        self.manifest_format = format;
        self
    }

    /// Enable or disable invalidating changed records during the diff.
    pub fn with_auto_update(mut self, auto_update: bool) -> Self {
        self.auto_update = auto_update;
        self
    }

    pub fn bundled_dir(&self) -> &Path {
        &self.bundled_dir
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    pub fn player(&self) -> &str {
        &self.player
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn manifest_format(&self) -> Option<ManifestFormat> {
        self.manifest_format
    }

    pub fn ledger_format(&self) -> ManifestFormat {
        self.ledger_format
    }

    pub fn auto_update(&self) -> bool {
        self.auto_update
    }

    /// Path of the bundled manifest.
    pub fn bundled_manifest_path(&self) -> PathBuf {
        self.bundled_dir.join(&self.bundled_manifest)
    }

    /// Path of this player's ledger: `<ledger_dir>/<player>/ledger.<ext>`.
    pub fn ledger_path(&self) -> PathBuf {
        self.ledger_dir
            .join(&self.player)
            .join(format!("ledger.{}", self.ledger_format.extension()))
    }

    /// URL of the remote manifest, if a base URL is configured.
    pub fn remote_manifest_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|base| format!("{}/{}", base, self.manifest_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::new("/b", "/p", "/l");
        assert_eq!(config.player(), DEFAULT_PLAYER);
        assert!(config.auto_update());
        assert!(config.base_url().is_none());
        assert!(config.remote_manifest_url().is_none());
        assert_eq!(config.bundled_manifest_path(), PathBuf::from("/b/manifest.json"));
    }

    #[test]
    fn test_ledger_path_per_player_and_format() {
        let config = TrackerConfig::new("/b", "/p", "/l")
            .with_player("bob")
            .with_ledger_format(ManifestFormat::Binary);
        assert_eq!(config.ledger_path(), PathBuf::from("/l/bob/ledger.bin"));
    }

    #[test]
    fn test_manifest_url_joins_base() {
        let config = TrackerConfig::new("/b", "/p", "/l")
            .with_base_url("https://cdn.example.com/")
            .with_manifest_name("manifest.bin");
        assert_eq!(
            config.remote_manifest_url().as_deref(),
            Some("https://cdn.example.com/manifest.bin")
        );
    }
}

//! Configuration for depot components.
//!
//! [`ConfigFile`] is the user-facing INI file at `~/.depot/config.ini`.
//! Component configuration objects such as [`DownloadConfig`] are derived
//! from it, or built directly in code.
//!
//! # Example
//!
//! ```
//! use depot::config::{ConfigFile, DownloadConfig};
//!
//! let file = ConfigFile::default();
//! let download: DownloadConfig = file.download_config();
//! assert!(download.staging());
//! ```

mod defaults;
mod download;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use download::DownloadConfig;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, DownloadSettings, LoggingSettings, RemoteSettings, StorageSettings,
    UpdateSettings,
};

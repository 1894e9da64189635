//! CLI runner for common setup and operations.
//!
//! Encapsulates config loading, logging initialization and service creation
//! so command handlers only deal with their own logic.

use std::path::{Path, PathBuf};

use depot::config::{config_file_path, ConfigFile};
use depot::logging::{init_logging, LoggingGuard};
use depot::pool::BlobLoader;
use depot::service::ContentService;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    /// Logging guard - keeps logging active while runner exists
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    config_path: PathBuf,
}

impl CliRunner {
    /// Load config, apply overrides and initialize logging.
    ///
    /// * `config_path` - config file to read instead of `~/.depot/config.ini`
    /// * `player` - ledger owner overriding `[update] player`
    /// * `verbose` - also log to stdout
    pub fn new(
        config_path: Option<&Path>,
        player: Option<&str>,
        verbose: bool,
    ) -> Result<Self, CliError> {
        let config_path = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(config_file_path);
        let mut config = ConfigFile::load_from(&config_path)?;
        if let Some(player) = player {
            if player.is_empty() || player.contains(['/', '\\']) {
                return Err(CliError::Config(format!("Invalid player id '{}'", player)));
            }
            config.update.player = player.to_string();
        }

        let logging_guard = init_logging(&config.logging.file, verbose)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            config_path,
        })
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Depot v{}", depot::VERSION);
        info!(
            config = %self.config_path.display(),
            player = %self.config.update.player,
            "Depot CLI: {} command",
            command
        );
    }

    /// Create the content service from the loaded configuration.
    pub fn create_service(&self) -> Result<ContentService<BlobLoader>, CliError> {
        ContentService::from_config(&self.config, BlobLoader)
            .map_err(CliError::ServiceCreation)
            .inspect(|_| info!("Service created successfully"))
    }
}

//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use depot::config::ConfigFileError;
use depot::pool::PoolError;
use depot::service::ServiceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(String),
    /// Failed to create service
    ServiceCreation(ServiceError),
    /// Remote manifest could not be fetched
    Remote(ServiceError),
    /// Some updates failed to install
    Update { failed: usize, total: usize },
    /// A package could not be loaded
    Load { path: String, error: PoolError },
    /// Service operation failed
    Service(ServiceError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::LoggingInit(_) => 2,
            CliError::Remote(_) => 3,
            CliError::Update { .. } => 4,
            CliError::Load { .. } => 5,
            _ => 1,
        }
    }

    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        // Print additional help for specific errors
        match self {
            CliError::Remote(_) => {
                eprintln!();
                eprintln!("Local packages are still usable. Check that:");
                eprintln!("  1. [remote] base_url is set in config.ini");
                eprintln!("  2. The content server is reachable");
            }
            CliError::Load {
                error: PoolError::DependencyCycle { .. },
                ..
            } => {
                eprintln!();
                eprintln!("The manifest declares circular package dependencies.");
            }
            _ => {}
        }

        process::exit(self.exit_code())
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ServiceCreation(e) => write!(f, "Failed to create service: {}", e),
            CliError::Remote(e) => write!(f, "{}", e),
            CliError::Update { failed, total } => {
                write!(f, "{} of {} update(s) failed", failed, total)
            }
            CliError::Load { path, error } => write!(f, "Failed to load '{}': {}", path, error),
            CliError::Service(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ServiceCreation(e) | CliError::Remote(e) | CliError::Service(e) => Some(e),
            CliError::Load { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<ServiceError> for CliError {
    fn from(e: ServiceError) -> Self {
        CliError::Service(e)
    }
}

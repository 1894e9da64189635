//! Configuration management CLI commands.
//!
//! Provides `config path`, `config show` and `config init`.

use std::path::Path;

use clap::Subcommand;
use depot::config::ConfigFile;

use super::output::Output;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Show the effective configuration, defaults included
    Show,

    /// Write a default configuration file if none exists
    Init {
        /// Overwrite an existing file with defaults
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path, output: &dyn Output) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            output.println(&path.display().to_string());
            Ok(())
        }
        ConfigCommands::Show => run_show(path, output),
        ConfigCommands::Init { force } => run_init(path, force, output),
    }
}

fn run_show(path: &Path, output: &dyn Output) -> Result<(), CliError> {
    if !path.exists() {
        output.println(&format!("# {} not found, showing defaults", path.display()));
    }
    let config = ConfigFile::load_from(path)?;
    output.print(&config.to_ini_string());
    Ok(())
}

fn run_init(path: &Path, force: bool, output: &dyn Output) -> Result<(), CliError> {
    let written = if force {
        ConfigFile::default().save_to(path)?;
        true
    } else {
        ConfigFile::ensure_exists_at(path)?
    };

    if written {
        output.success(&format!("Wrote {}", path.display()));
    } else {
        output.println(&format!("{} already exists", path.display()));
        output.println("Use --force to replace it with defaults.");
    }
    Ok(())
}

//! Depot CLI - Command-line interface
//!
//! This binary provides a command-line interface to the Depot library.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use depot::config::config_file_path;

use commands::config::ConfigCommands;
use commands::output::ConsoleOutput;
use commands::packages;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "depot")]
#[command(version = depot::VERSION)]
#[command(about = "Track, update and load versioned content packages", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.depot/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Player id the download ledger is stored under
    #[arg(long, global = true)]
    player: Option<String>,

    /// Also write logs to stdout
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local packages and ledger state
    Status,

    /// List packages with updates available on the remote
    Check,

    /// Download all available updates
    Update,

    /// Load the packages owning the given package or resource paths
    Get {
        /// Package paths or resource paths
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let output = ConsoleOutput;

    let command = match cli.command {
        Commands::Config { command } => {
            let path = cli.config.unwrap_or_else(config_file_path);
            return commands::config::run(command, &path, &output);
        }
        other => other,
    };

    let runner = CliRunner::new(cli.config.as_deref(), cli.player.as_deref(), cli.verbose)?;
    let service = runner.create_service()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::Config(format!("Failed to start async runtime: {}", e)))?;

    runtime.block_on(async {
        match command {
            Commands::Status => {
                runner.log_startup("status");
                packages::status(&service, &output).await
            }
            Commands::Check => {
                runner.log_startup("check");
                packages::check(&service, &output).await
            }
            Commands::Update => {
                runner.log_startup("update");
                packages::update(&service, &output).await
            }
            Commands::Get { paths } => {
                runner.log_startup("get");
                packages::get(&service, &paths, &output).await
            }
            Commands::Config { .. } => Ok(()),
        }
    })
}

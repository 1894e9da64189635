//! High-level service facade.
//!
//! [`ContentService`] wires the tracker, downloader and pool from
//! configuration and runs the startup, update and shutdown sequences.
//!
//! # Example
//!
//! ```no_run
//! use depot::config::ConfigFile;
//! use depot::pool::BlobLoader;
//! use depot::service::ContentService;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigFile::load()?;
//! let service = ContentService::from_config(&config, BlobLoader)?;
//!
//! let startup = service.start().await;
//! service.update_all(&startup.updates).await?;
//!
//! let handle = service.get("textures/ui/button.png").await?;
//! println!("{} loaded", handle.logical_path());
//!
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod content_service;
mod error;

pub use content_service::{ContentService, StartupReport, UpdateReport};
pub use error::ServiceError;

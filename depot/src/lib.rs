//! Depot - versioned package tracking, incremental download and pooled loading
//!
//! This library tracks dependency-linked binary packages across three
//! manifests (bundled with the build, previously downloaded, and the latest
//! remote), downloads only what changed, and loads packages on demand so
//! each one is constructed once and shared by every caller.
//!
//! # High-Level API
//!
//! For most use cases, the [`service`] module provides a simplified facade:
//!
//! ```ignore
//! use depot::config::ConfigFile;
//! use depot::pool::BlobLoader;
//! use depot::service::ContentService;
//!
//! let service = ContentService::from_config(&ConfigFile::load()?, BlobLoader)?;
//! let startup = service.start().await;
//! service.update_all(&startup.updates).await?;
//! let handle = service.get("ui/button.png").await?;
//! ```

pub mod coalesce;
pub mod config;
pub mod download;
pub mod logging;
pub mod package;
pub mod pool;
pub mod service;
pub mod tracker;

/// Version of the Depot library and CLI.
///
/// This is synchronized across all components in the workspace.
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

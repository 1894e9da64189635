//! Package records and manifests.
//!
//! This module provides the core data structures shared by every other
//! component:
//!
//! - [`ManifestRecord`]: metadata for a single package (checksum, version,
//!   paths, resources, dependencies, lifecycle state)
//! - [`Manifest`]: a mapping of logical package path to record, with JSON and
//!   binary encodings
//! - [`checksum`]: the content hash used for change detection and download
//!   verification

pub mod checksum;
mod manifest;
mod record;

pub use manifest::{Manifest, ManifestError, ManifestFormat, BINARY_MAGIC, MANIFEST_SCHEMA};
pub use record::{derive_short_path, normalize_path, LifecycleState, ManifestRecord};

//! Package tracking: bundled, downloaded and remote manifests.
//!
//! The [`PackageTracker`] answers which package owns a resource and where
//! its bytes live, detects updates by checksum, and persists the set of
//! downloaded packages in a per-player ledger.

mod config;
mod diff;
mod error;
mod index;
mod ledger;
mod package_tracker;

pub use config::TrackerConfig;
pub use diff::{apply_update_set, compute_update_set, PendingUpdate, UpdateSet};
pub use error::{TrackerError, TrackerResult};
pub use index::{DuplicateResource, ResourceIndex};
pub use ledger::LedgerFile;
pub use package_tracker::{PackageFetch, PackageTracker, RemoteView, TrackerStats};

//! Persisted set of downloaded packages.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::error::{TrackerError, TrackerResult};
use crate::package::{LifecycleState, Manifest, ManifestFormat};

static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

/// The on-disk ledger file.
///
/// Loading never fails: a missing file is an empty ledger, and an
/// unreadable or corrupt one is treated as empty with a warning. Saving
/// writes a sibling temp file, syncs it, then renames it over the ledger.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    path: PathBuf,
    format: ManifestFormat,
}

impl LedgerFile {
    pub fn new(path: impl Into<PathBuf>, format: ManifestFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the ledger. Every record comes back as `Downloaded`.
    pub async fn load(&self) -> Manifest {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No ledger yet, starting empty");
                return Manifest::new();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read ledger, starting empty");
                return Manifest::new();
            }
        };

        match Manifest::decode(&bytes, None) {
            Ok(manifest) => {
                let manifest: Manifest = manifest
                    .into_records()
                    .map(|r| r.with_state(LifecycleState::Downloaded))
                    .collect();
                info!(path = %self.path.display(), packages = manifest.len(), "Ledger loaded");
                manifest
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ledger is corrupt, treating as empty; downloaded packages will be fetched again"
                );
                Manifest::new()
            }
        }
    }

    /// Atomically replace the ledger with `ledger`.
    pub async fn save(&self, ledger: &Manifest) -> TrackerResult<()> {
        let bytes = ledger
            .encode(self.format)
            .map_err(|e| TrackerError::LedgerEncode(std::sync::Arc::new(e)))?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TrackerError::io(parent, e))?;
        }

        let temp = self.temp_path();
        let result = write_synced(&temp, &bytes).await;
        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(TrackerError::io(&temp, e));
        }
        if let Err(e) = tokio::fs::rename(&temp, &self.path).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(TrackerError::io(&self.path, e));
        }

        debug!(path = %self.path.display(), packages = ledger.len(), "Ledger saved");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let suffix = format!(".tmp.{}.{}", std::process::id(), seq);
        let name = self
            .path
            .file_name()
            .map(|n| format!("{}{}", n.to_string_lossy(), suffix))
            .unwrap_or(suffix);
        self.path.with_file_name(name)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

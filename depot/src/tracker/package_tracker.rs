//! The package tracker.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::config::TrackerConfig;
use super::diff::{self, UpdateSet};
use super::error::{TrackerError, TrackerResult};
use super::index::ResourceIndex;
use super::ledger::LedgerFile;
use crate::coalesce::{Registration, RequestCoalescer};
use crate::download::{AcceptAll, ChecksumVerifier, Downloader, PackageBlob, PackageVerifier};
use crate::package::{normalize_path, LifecycleState, Manifest, ManifestRecord};

/// Where the tracker's remote view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteView {
    /// No fetch has completed yet.
    NotFetched,
    /// The remote manifest was fetched successfully.
    Live,
    /// The last fetch failed; the ledger stands in for the remote manifest.
    LedgerFallback,
}

/// Counts describing the tracker's maps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerStats {
    pub bundled: usize,
    pub downloaded: usize,
    pub remote: usize,
    pub remote_view: RemoteView,
    pub local_resources: usize,
    pub duplicate_resources: usize,
    pub ledger_dirty: bool,
}

/// How a package transfer is verified and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageFetch {
    /// Check size and checksum against the remote record.
    pub verify: bool,
    /// Extra attempts after a resumable failure.
    pub max_retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for PackageFetch {
    fn default() -> Self {
        Self {
            verify: true,
            max_retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }
}

type FetchedPackage = TrackerResult<(ManifestRecord, PackageBlob)>;

struct TrackerState {
    bundled: Manifest,
    downloaded: Manifest,
    local_index: ResourceIndex,
    /// Persisted-ledger write buffer. Changes only when a download completes.
    ledger: Manifest,
    ledger_generation: u64,
    persisted_generation: u64,
    remote: Manifest,
    remote_index: ResourceIndex,
    remote_view: RemoteView,
}

impl TrackerState {
    fn empty() -> Self {
        Self {
            bundled: Manifest::new(),
            downloaded: Manifest::new(),
            local_index: ResourceIndex::new(),
            ledger: Manifest::new(),
            ledger_generation: 0,
            persisted_generation: 0,
            remote: Manifest::new(),
            remote_index: ResourceIndex::new(),
            remote_view: RemoteView::NotFetched,
        }
    }

    /// Downloaded records are registered first so they win resource collisions.
    fn rebuild_local_index(&mut self) {
        self.local_index = ResourceIndex::build(self.downloaded.iter().chain(self.bundled.iter()));
    }

    fn local(&self, logical_path: &str) -> Option<&ManifestRecord> {
        self.downloaded
            .get(logical_path)
            .or_else(|| self.bundled.get(logical_path))
    }

    fn install_remote(&mut self, remote: Manifest, view: RemoteView) {
        self.remote_index = ResourceIndex::build(remote.iter());
        self.remote = remote;
        self.remote_view = view;
    }
}

/// Tracks bundled, downloaded and remote packages.
///
/// All maps live behind one lock that is never held across an await. The
/// remote manifest fetch and every package transfer are coalesced, and run
/// on spawned tasks: concurrent callers share one request, and a caller that
/// stops waiting does not stop it.
pub struct PackageTracker {
    config: TrackerConfig,
    downloader: Arc<Downloader>,
    ledger_file: LedgerFile,
    state: RwLock<TrackerState>,
    remote_fetch: Arc<RequestCoalescer<(), TrackerResult<usize>>>,
    package_fetch: Arc<RequestCoalescer<PathBuf, FetchedPackage>>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for PackageTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageTracker")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl PackageTracker {
    /// Creates a tracker with empty maps. Call [`initialize`](Self::initialize)
    /// to load the bundled manifest and the ledger.
    pub fn new(config: TrackerConfig, downloader: Arc<Downloader>) -> Self {
        let ledger_file = LedgerFile::new(config.ledger_path(), config.ledger_format());
        Self {
            config,
            downloader,
            ledger_file,
            state: RwLock::new(TrackerState::empty()),
            remote_fetch: Arc::new(RequestCoalescer::new()),
            package_fetch: Arc::new(RequestCoalescer::new()),
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The downloader used for manifests and packages.
    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    /// Load the bundled manifest and the ledger, then build the local
    /// resource index.
    ///
    /// Missing or corrupt files degrade to empty maps with a warning.
    pub async fn initialize(&self) {
        let bundled = self.load_bundled().await;
        let downloaded = self.ledger_file.load().await;

        let mut state = self.state.write();
        state.bundled = bundled;
        state.ledger = downloaded.clone();
        state.downloaded = downloaded;
        state.ledger_generation = 0;
        state.persisted_generation = 0;
        state.rebuild_local_index();

        info!(
            bundled = state.bundled.len(),
            downloaded = state.downloaded.len(),
            resources = state.local_index.resource_count(),
            duplicates = state.local_index.duplicates().len(),
            "Tracker initialized"
        );
    }

    async fn load_bundled(&self) -> Manifest {
        let path = self.config.bundled_manifest_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No bundled manifest");
                return Manifest::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read bundled manifest");
                return Manifest::new();
            }
        };

        match Manifest::decode(&bytes, None) {
            Ok(manifest) => manifest
                .into_records()
                .map(|r| r.with_state(LifecycleState::BundledInBuild))
                .collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Bundled manifest is corrupt, ignoring it");
                Manifest::new()
            }
        }
    }

    /// Fetch and install the remote manifest. Returns the number of remote
    /// records.
    ///
    /// Concurrent callers wait for the in-flight fetch. On failure the ledger
    /// becomes the remote view, so the next diff reports no updates, and the
    /// error is returned.
    pub async fn fetch_remote_manifest(self: &Arc<Self>) -> TrackerResult<usize> {
        let mut rx = match self.remote_fetch.register(()) {
            Registration::Leader(in_flight) => {
                let rx = in_flight.subscribe().ok_or(TrackerError::FetchAbandoned)?;
                let tracker = Arc::clone(self);
                tokio::spawn(async move {
                    let result = tracker.fetch_remote_once().await;
                    in_flight.complete(result);
                });
                rx
            }
            Registration::Follower(rx) => rx,
        };

        match rx.recv().await {
            Ok(result) => result,
            Err(_) => {
                self.fall_back_if_unfetched();
                Err(TrackerError::FetchAbandoned)
            }
        }
    }

    /// The fetch task died without a result. Keep the remote view defined.
    fn fall_back_if_unfetched(&self) {
        let mut state = self.state.write();
        if state.remote_view == RemoteView::NotFetched {
            warn!("Remote manifest fetch abandoned, using ledger as remote view");
            let fallback = state.downloaded.clone();
            state.install_remote(fallback, RemoteView::LedgerFallback);
        }
    }

    async fn fetch_remote_once(&self) -> TrackerResult<usize> {
        match self.download_remote().await {
            Ok(manifest) => {
                let count = manifest.len();
                let remote = manifest
                    .into_records()
                    .map(|r| r.with_state(LifecycleState::NotPresent))
                    .collect();
                self.state.write().install_remote(remote, RemoteView::Live);
                info!(packages = count, "Remote manifest fetched");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Remote manifest unavailable, using ledger as remote view");
                let mut state = self.state.write();
                let fallback = state.downloaded.clone();
                state.install_remote(fallback, RemoteView::LedgerFallback);
                Err(e)
            }
        }
    }

    async fn download_remote(&self) -> TrackerResult<Manifest> {
        let url = self
            .config
            .remote_manifest_url()
            .ok_or(TrackerError::NoRemote)?;
        debug!(url = %url, "Fetching remote manifest");
        let bytes = self.downloader.fetch_bytes(&url).await?;
        Manifest::decode(&bytes, self.config.manifest_format())
            .map_err(|e| TrackerError::manifest(url, e))
    }

    /// Download the package described by `remote` and record it as
    /// downloaded under `local_path`.
    ///
    /// Transfers are coalesced by destination file, so an update and an
    /// on-demand load of the same package share one download. Waiters get
    /// the result produced under the first caller's `policy`. Memory-backed
    /// results are not recorded.
    pub async fn download_package(
        self: &Arc<Self>,
        local_path: &str,
        remote: &ManifestRecord,
        policy: PackageFetch,
    ) -> FetchedPackage {
        let dest = self.download_path(remote);
        let mut rx = match self.package_fetch.register(dest.clone()) {
            Registration::Leader(in_flight) => {
                let rx = in_flight
                    .subscribe()
                    .ok_or_else(|| TrackerError::DownloadAbandoned(remote.logical_path.clone()))?;
                let tracker = Arc::clone(self);
                let local_path = normalize_path(local_path);
                let remote = remote.clone();
                tokio::spawn(async move {
                    let result = tracker.download_now(&local_path, remote, dest, policy).await;
                    in_flight.complete(result);
                });
                rx
            }
            Registration::Follower(rx) => {
                debug!(package = %remote.logical_path, "Joining in-flight package download");
                rx
            }
        };

        rx.recv()
            .await
            .unwrap_or_else(|_| Err(TrackerError::DownloadAbandoned(remote.logical_path.clone())))
    }

    async fn download_now(
        &self,
        local_path: &str,
        remote: ManifestRecord,
        dest: PathBuf,
        policy: PackageFetch,
    ) -> FetchedPackage {
        let url = self.remote_url(&remote).ok_or(TrackerError::NoRemote)?;
        let checksum = ChecksumVerifier::for_record(&remote);
        let verifier: &dyn PackageVerifier = if policy.verify { &checksum } else { &AcceptAll };

        let attempts = policy.max_retries + 1;
        let mut attempt = 1;
        let blob = loop {
            match self.downloader.fetch_package(&url, &dest, verifier).await {
                Ok(blob) => break blob,
                Err(e) if e.is_resumable() && attempt < attempts => {
                    debug!(package = %remote.logical_path, attempt, error = %e, "Retrying download");
                    tokio::time::sleep(policy.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(TrackerError::package_download(&remote.logical_path, e)),
            }
        };

        let record = match blob {
            PackageBlob::File { .. } => self.record_downloaded(local_path).await?,
            PackageBlob::Memory(_) => remote,
        };
        Ok((record, blob))
    }

    /// Returns true if a transfer of `record` is running.
    pub fn is_downloading(&self, record: &ManifestRecord) -> bool {
        self.package_fetch.is_in_flight(&self.download_path(record))
    }

    /// Log remote-manifest and package-transfer coalescing.
    pub fn log_stats(&self) {
        self.remote_fetch.log_stats("remote_manifest");
        self.package_fetch.log_stats("package_download");
    }

    /// Compare the remote view with local records, without changing anything.
    pub fn compute_update_set(&self) -> UpdateSet {
        let state = self.state.read();
        diff::compute_update_set(&state.bundled, &state.downloaded, &state.remote)
    }

    /// Invalidate the local records named by `set`. Returns how many were
    /// invalidated.
    pub fn apply_update_set(&self, set: &UpdateSet) -> usize {
        let mut state = self.state.write();
        let state = &mut *state;
        let applied = diff::apply_update_set(set, &mut state.bundled, &mut state.downloaded);
        if applied > 0 {
            state.rebuild_local_index();
            info!(packages = applied, "Invalidated outdated local packages");
        }
        applied
    }

    /// Compute the update set and, when auto-update is enabled, apply it
    /// under the same lock so no loader observes a stale record in between.
    pub fn diff_for_update(&self) -> UpdateSet {
        let mut state = self.state.write();
        let state = &mut *state;
        let set = diff::compute_update_set(&state.bundled, &state.downloaded, &state.remote);
        if self.config.auto_update() && !set.is_empty() {
            let applied = diff::apply_update_set(&set, &mut state.bundled, &mut state.downloaded);
            state.rebuild_local_index();
            debug!(packages = applied, "Auto-update invalidated local packages");
        }
        info!(
            updates = set.len(),
            remote_only = set.remote_only().len(),
            bytes = set.total_bytes(),
            "Update diff computed"
        );
        set
    }

    /// Install a just-downloaded package as `Downloaded`.
    ///
    /// The remote record is found by logical path, or by the short path of
    /// the local record. A previously downloaded file with a different real
    /// path is deleted. Bundled files are never deleted.
    pub async fn record_downloaded(&self, logical_path: &str) -> TrackerResult<ManifestRecord> {
        let path = normalize_path(logical_path);

        let (installed, superseded) = {
            let mut state = self.state.write();

            let local_short = state.local(&path).map(|r| r.short_path.clone());
            let remote = state
                .remote
                .get(&path)
                .or_else(|| {
                    local_short
                        .as_deref()
                        .and_then(|short| state.remote_index.by_short_path(short))
                        .and_then(|logical| state.remote.get(logical))
                })
                .cloned()
                .ok_or_else(|| TrackerError::UnknownPackage(path.clone()))?;

            let target = state
                .downloaded
                .iter()
                .chain(state.bundled.iter())
                .find(|r| r.short_path == remote.short_path)
                .map(|r| r.logical_path.clone())
                .unwrap_or_else(|| remote.logical_path.clone());

            // The write buffer still holds the real path of the old file.
            let superseded: Vec<String> = state
                .ledger
                .iter()
                .filter(|r| r.short_path == remote.short_path && r.real_path != remote.real_path)
                .map(|r| r.real_path.clone())
                .collect();
            let stale: Vec<String> = state
                .ledger
                .iter()
                .filter(|r| r.short_path == remote.short_path && r.logical_path != target)
                .map(|r| r.logical_path.clone())
                .collect();
            for logical in &stale {
                state.ledger.remove(logical);
                state.downloaded.remove(logical);
            }

            let mut installed = remote;
            installed.logical_path = target;
            installed.lifecycle_state = LifecycleState::Downloaded;

            state.downloaded.insert(installed.clone());
            state.ledger.insert(installed.clone());
            state.ledger_generation += 1;
            state.rebuild_local_index();
            (installed, superseded)
        };

        for real_path in superseded {
            let old = self.config.package_dir().join(&real_path);
            match tokio::fs::remove_file(&old).await {
                Ok(()) => debug!(path = %old.display(), "Deleted superseded package"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %old.display(), error = %e, "Failed to delete superseded package")
                }
            }
        }

        info!(
            package = %installed.logical_path,
            checksum = %format!("{:08x}", installed.checksum),
            version = installed.version,
            "Package recorded as downloaded"
        );
        Ok(installed)
    }

    /// Write the ledger if it changed since the last write.
    ///
    /// Safe to call repeatedly; unchanged ledgers are not rewritten.
    pub async fn persist_ledger(&self) -> TrackerResult<()> {
        let _guard = self.persist_lock.lock().await;

        let (snapshot, generation) = {
            let state = self.state.read();
            if state.ledger_generation == state.persisted_generation {
                return Ok(());
            }
            (state.ledger.clone(), state.ledger_generation)
        };

        self.ledger_file.save(&snapshot).await?;
        self.state.write().persisted_generation = generation;
        info!(
            path = %self.ledger_file.path().display(),
            packages = snapshot.len(),
            "Ledger persisted"
        );
        Ok(())
    }

    /// Returns true if the ledger has unpersisted changes.
    pub fn is_ledger_dirty(&self) -> bool {
        let state = self.state.read();
        state.ledger_generation != state.persisted_generation
    }

    /// Local record owning `resource`.
    pub fn resolve_by_resource(&self, resource: &str) -> Option<ManifestRecord> {
        let resource = normalize_path(resource);
        let state = self.state.read();
        let owner = state.local_index.owner(&resource)?;
        state.local(owner).cloned()
    }

    /// Local record for a package path.
    pub fn resolve_by_package(&self, logical_path: &str) -> Option<ManifestRecord> {
        self.state.read().local(&normalize_path(logical_path)).cloned()
    }

    /// Remote record with the given short path.
    pub fn resolve_remote_by_short_path(&self, short_path: &str) -> Option<ManifestRecord> {
        let short_path = normalize_path(short_path);
        let state = self.state.read();
        let logical = state.remote_index.by_short_path(&short_path)?;
        state.remote.get(logical).cloned()
    }

    /// Remote record for a package path.
    pub fn resolve_remote_by_package(&self, logical_path: &str) -> Option<ManifestRecord> {
        self.state
            .read()
            .remote
            .get(&normalize_path(logical_path))
            .cloned()
    }

    /// Remote record owning `resource`.
    pub fn resolve_remote_by_resource(&self, resource: &str) -> Option<ManifestRecord> {
        let resource = normalize_path(resource);
        let state = self.state.read();
        let owner = state.remote_index.owner(&resource)?;
        state.remote.get(owner).cloned()
    }

    /// All local records, downloaded shadowing bundled, in path order.
    pub fn local_records(&self) -> Vec<ManifestRecord> {
        let state = self.state.read();
        let mut merged = state.bundled.clone();
        for record in state.downloaded.iter() {
            merged.insert(record.clone());
        }
        merged.into_records().collect()
    }

    /// File holding the package bytes, or `None` if the package is not present.
    pub fn local_path(&self, record: &ManifestRecord) -> Option<PathBuf> {
        match record.lifecycle_state {
            LifecycleState::BundledInBuild => Some(self.config.bundled_dir().join(&record.real_path)),
            LifecycleState::Downloaded => Some(self.config.package_dir().join(&record.real_path)),
            LifecycleState::NotPresent => None,
        }
    }

    /// Where a download of `record` is stored.
    pub fn download_path(&self, record: &ManifestRecord) -> PathBuf {
        self.config.package_dir().join(&record.real_path)
    }

    /// Remote URL of `record`, if a base URL is configured.
    pub fn remote_url(&self, record: &ManifestRecord) -> Option<String> {
        self.config
            .base_url()
            .map(|base| format!("{}/{}", base, record.real_path))
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.state.read();
        TrackerStats {
            bundled: state.bundled.len(),
            downloaded: state.downloaded.len(),
            remote: state.remote.len(),
            remote_view: state.remote_view,
            local_resources: state.local_index.resource_count(),
            duplicate_resources: state.local_index.duplicates().len(),
            ledger_dirty: state.ledger_generation != state.persisted_generation,
        }
    }

    /// Resource collisions in the local index.
    pub fn duplicate_resources(&self) -> Vec<super::DuplicateResource> {
        self.state.read().local_index.duplicates().to_vec()
    }
}

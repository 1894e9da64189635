//! The package pool.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{join_all, BoxFuture};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::PoolConfig;
use super::error::{PoolError, PoolResult};
use super::handle::PackageHandle;
use super::loader::PackageLoader;
use crate::coalesce::{CoalescerStats, Registration, RequestCoalescer};
use crate::download::PackageBlob;
use crate::package::{normalize_path, ManifestRecord};
use crate::tracker::{PackageFetch, PackageTracker};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

type LoadResult<P> = PoolResult<PackageHandle<P>>;

/// Pool statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Packages currently registered.
    pub loaded: usize,
    /// Loads currently running.
    pub in_flight: usize,
    /// Load request coalescing.
    pub loads: CoalescerStats,
}

struct PoolInner<L: PackageLoader> {
    id: u64,
    tracker: Arc<PackageTracker>,
    loader: Arc<L>,
    config: PoolConfig,
    loaded: DashMap<String, PackageHandle<L::Package>>,
    loads: Arc<RequestCoalescer<String, LoadResult<L::Package>>>,
}

/// Loads packages on demand and shares them between callers.
///
/// At most one load per package runs at a time; concurrent requests for the
/// same package wait for it. Dependencies are loaded first, concurrently.
/// Each load runs on its own task, so a caller that stops waiting does not
/// stop the load for anyone else.
pub struct PackagePool<L: PackageLoader> {
    inner: Arc<PoolInner<L>>,
}

impl<L: PackageLoader> Clone for PackagePool<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: PackageLoader> PackagePool<L> {
    pub fn new(tracker: Arc<PackageTracker>, loader: L) -> Self {
        Self::with_config(tracker, loader, PoolConfig::default())
    }

    pub fn with_config(tracker: Arc<PackageTracker>, loader: L, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
                tracker,
                loader: Arc::new(loader),
                config,
                loaded: DashMap::new(),
                loads: Arc::new(RequestCoalescer::new()),
            }),
        }
    }

    pub fn tracker(&self) -> &Arc<PackageTracker> {
        &self.inner.tracker
    }

    /// Load the package owning `path`, a package path or a resource path.
    ///
    /// Returns the registered handle if the package is already loaded. Does
    /// not add a retain.
    pub async fn get(&self, path: &str) -> LoadResult<L::Package> {
        let record = self.inner.resolve(path)?;
        if let Some(handle) = self.inner.loaded_handle(&record.logical_path) {
            return Ok(handle);
        }
        self.inner.check_cycles(&record)?;
        self.inner.load(record.logical_path).await
    }

    /// Like [`get`](Self::get), but gives up waiting when `cancel` fires.
    ///
    /// The load itself keeps running and is registered for later callers.
    pub async fn get_with_cancel(
        &self,
        path: &str,
        cancel: CancellationToken,
    ) -> LoadResult<L::Package> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(path = %path, "Caller stopped waiting for package");
                Err(PoolError::Cancelled(normalize_path(path)))
            }
            result = self.get(path) => result,
        }
    }

    /// Add a retain to a registered handle. Returns false if the handle is
    /// released or belongs to another pool.
    pub fn retain(&self, handle: &PackageHandle<L::Package>) -> bool {
        handle.pool_id() == self.inner.id && handle.try_retain()
    }

    /// Drop one retain. When none remain the handle is unregistered; with
    /// `unload_dependents` the package storage is freed right away, otherwise
    /// it is freed when the last clone of the handle is dropped.
    ///
    /// Releasing a released or foreign handle does nothing.
    pub fn release(&self, handle: &PackageHandle<L::Package>, unload_dependents: bool) {
        if handle.pool_id() != self.inner.id {
            debug!(package = %handle.logical_path(), "Ignoring release of foreign handle");
            return;
        }
        match handle.release_one() {
            Some(0) => self.inner.unregister(handle, unload_dependents),
            Some(remaining) => {
                debug!(package = %handle.logical_path(), remaining, "Package retain released")
            }
            None => {}
        }
    }

    /// Release every registered package and free its storage.
    ///
    /// Returns the number of packages unloaded.
    pub fn unload_all(&self) -> usize {
        let paths: Vec<String> = self.inner.loaded.iter().map(|e| e.key().clone()).collect();
        let mut unloaded = 0;
        for path in paths {
            if let Some((_, handle)) = self.inner.loaded.remove(&path) {
                if handle.release_all() {
                    handle.mark_released();
                    self.inner.free(&handle);
                    unloaded += 1;
                }
            }
        }
        info!(packages = unloaded, "Unloaded all packages");
        unloaded
    }

    /// Registered handles by logical path.
    pub fn snapshot(&self) -> BTreeMap<String, PackageHandle<L::Package>> {
        self.inner
            .loaded
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Returns true if `logical_path` is registered.
    pub fn is_loaded(&self, logical_path: &str) -> bool {
        self.inner.loaded.contains_key(&normalize_path(logical_path))
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            loaded: self.inner.loaded.len(),
            in_flight: self.inner.loads.in_flight_count(),
            loads: self.inner.loads.stats(),
        }
    }

    /// Log load coalescing statistics.
    pub fn log_stats(&self) {
        self.inner.loads.log_stats("package_load");
    }
}

impl<L: PackageLoader> PoolInner<L> {
    /// Local records first, then the remote view.
    fn resolve(&self, path: &str) -> PoolResult<ManifestRecord> {
        let tracker = &self.tracker;
        tracker
            .resolve_by_package(path)
            .or_else(|| tracker.resolve_by_resource(path))
            .or_else(|| tracker.resolve_remote_by_package(path))
            .or_else(|| tracker.resolve_remote_by_resource(path))
            .ok_or_else(|| PoolError::NotFound(normalize_path(path)))
    }

    fn record_for_package(&self, logical_path: &str) -> Option<ManifestRecord> {
        self.tracker
            .resolve_by_package(logical_path)
            .or_else(|| self.tracker.resolve_remote_by_package(logical_path))
    }

    fn loaded_handle(&self, logical_path: &str) -> Option<PackageHandle<L::Package>> {
        self.loaded.get(logical_path).map(|h| h.value().clone())
    }

    /// Walk the dependency graph from `root` and reject cycles before any
    /// load is issued. Unknown dependencies are left for the load to report.
    fn check_cycles(&self, root: &ManifestRecord) -> PoolResult<()> {
        let mut done: HashSet<String> = HashSet::new();
        let mut path: Vec<String> = Vec::new();
        // (package, dependencies, next dependency index)
        let mut stack: Vec<(String, Vec<String>, usize)> =
            vec![(root.logical_path.clone(), root.dependencies().to_vec(), 0)];
        path.push(root.logical_path.clone());

        while let Some((_, deps, next)) = stack.last_mut() {
            if *next >= deps.len() {
                if let Some((package, _, _)) = stack.pop() {
                    path.pop();
                    done.insert(package);
                }
                continue;
            }
            let dep = deps[*next].clone();
            *next += 1;

            if done.contains(&dep) {
                continue;
            }
            if let Some(start) = path.iter().position(|p| p == &dep) {
                let mut cycle = path[start..].to_vec();
                cycle.push(dep);
                warn!(cycle = ?cycle, "Dependency cycle detected");
                return Err(PoolError::DependencyCycle { cycle });
            }
            match self.record_for_package(&dep) {
                Some(record) => {
                    path.push(dep.clone());
                    stack.push((dep, record.dependencies().to_vec(), 0));
                }
                None => {
                    done.insert(dep);
                }
            }
        }
        Ok(())
    }

    /// Coalesced load of one package. The work runs on a spawned task.
    fn load(self: &Arc<Self>, logical_path: String) -> BoxFuture<'static, LoadResult<L::Package>> {
        let inner = Arc::clone(self);
        Box::pin(async move {
            if let Some(handle) = inner.loaded_handle(&logical_path) {
                return Ok(handle);
            }

            let rx = match inner.loads.register(logical_path.clone()) {
                Registration::Leader(in_flight) => {
                    let rx = in_flight
                        .subscribe()
                        .ok_or_else(|| PoolError::Abandoned(logical_path.clone()))?;
                    let task = Arc::clone(&inner);
                    let path = logical_path.clone();
                    tokio::spawn(async move {
                        let result = task.load_now(&path).await;
                        in_flight.complete(result);
                    });
                    rx
                }
                Registration::Follower(rx) => rx,
            };

            wait(rx, &logical_path).await
        })
    }

    async fn load_now(self: &Arc<Self>, logical_path: &str) -> LoadResult<L::Package> {
        // A load that finished just before this one registered.
        if let Some(handle) = self.loaded_handle(logical_path) {
            return Ok(handle);
        }

        let record = self
            .record_for_package(logical_path)
            .ok_or_else(|| PoolError::NotFound(logical_path.to_string()))?;

        let dependencies = record.dependencies().to_vec();
        let results = join_all(dependencies.iter().map(|dep| self.load(dep.clone()))).await;
        let mut dependency_handles = Vec::with_capacity(results.len());
        for (dependency, result) in dependencies.into_iter().zip(results) {
            match result {
                Ok(handle) => dependency_handles.push(handle),
                Err(e) => {
                    warn!(package = %logical_path, dependency = %dependency, error = %e, "Dependency failed");
                    return Err(PoolError::Dependency {
                        package: logical_path.to_string(),
                        dependency,
                        source: Arc::new(e),
                    });
                }
            }
        }

        let (record, blob) = self.fetch_blob(record).await?;
        let package = self
            .loader
            .load(&record, blob)
            .await
            .map_err(|reason| PoolError::LoadFailed {
                package: logical_path.to_string(),
                reason,
            })?;

        let handle = PackageHandle::new(self.id, record, package, dependency_handles);
        // Registered before the coalescer entry is released.
        self.loaded.insert(logical_path.to_string(), handle.clone());
        debug!(package = %logical_path, "Package loaded");
        Ok(handle)
    }

    /// Local bytes, or a verified download recorded with the tracker.
    async fn fetch_blob(&self, record: ManifestRecord) -> PoolResult<(ManifestRecord, PackageBlob)> {
        if let Some(path) = self.tracker.local_path(&record) {
            let blob = PackageBlob::open(&path)
                .await
                .map_err(|e| PoolError::io(&path, e))?;
            return Ok((record, blob));
        }

        if !self.config.download_missing() {
            return Err(PoolError::NotPresent(record.logical_path));
        }
        if self.tracker.remote_url(&record).is_none() {
            return Err(PoolError::NoRemote(record.logical_path));
        }
        let policy = PackageFetch {
            verify: self.config.verify_downloads(),
            ..PackageFetch::default()
        };

        self.tracker
            .download_package(&record.logical_path, &record, policy)
            .await
            .map_err(PoolError::from_download)
    }

    fn unregister(&self, handle: &PackageHandle<L::Package>, unload_now: bool) {
        let path = handle.logical_path().to_string();
        self.loaded.remove_if(&path, |_, registered| registered.ptr_eq(handle));
        handle.mark_released();
        if unload_now {
            self.free(handle);
        }
        debug!(package = %path, unload_now, "Package released");
    }

    fn free(&self, handle: &PackageHandle<L::Package>) {
        if let Some(package) = handle.take_package() {
            self.loader.unload(handle.record(), &package);
        }
    }
}

async fn wait<P>(
    mut rx: broadcast::Receiver<LoadResult<P>>,
    logical_path: &str,
) -> LoadResult<P> {
    match rx.recv().await {
        Ok(result) => result,
        Err(_) => Err(PoolError::Abandoned(logical_path.to_string())),
    }
}

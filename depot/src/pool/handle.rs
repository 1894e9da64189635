//! Handles to loaded packages.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::package::ManifestRecord;

struct HandleInner<P> {
    pool_id: u64,
    record: ManifestRecord,
    package: RwLock<Option<Arc<P>>>,
    dependencies: Vec<PackageHandle<P>>,
    retains: AtomicUsize,
    released: AtomicBool,
}

/// A loaded package.
///
/// Cloning a handle is cheap and yields the same package. Handles start
/// with one retain, held by the pool's registration; [`PackagePool::retain`]
/// adds more and [`PackagePool::release`] removes them.
///
/// [`PackagePool::retain`]: super::PackagePool::retain
/// [`PackagePool::release`]: super::PackagePool::release
pub struct PackageHandle<P> {
    inner: Arc<HandleInner<P>>,
}

impl<P> PackageHandle<P> {
    pub(crate) fn new(
        pool_id: u64,
        record: ManifestRecord,
        package: P,
        dependencies: Vec<PackageHandle<P>>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                pool_id,
                record,
                package: RwLock::new(Some(Arc::new(package))),
                dependencies,
                retains: AtomicUsize::new(1),
                released: AtomicBool::new(false),
            }),
        }
    }

    /// The record the package was loaded from.
    pub fn record(&self) -> &ManifestRecord {
        &self.inner.record
    }

    pub fn logical_path(&self) -> &str {
        &self.inner.record.logical_path
    }

    /// The loaded package, or `None` once its storage has been freed.
    pub fn package(&self) -> Option<Arc<P>> {
        self.inner.package.read().clone()
    }

    /// Handles of the direct dependencies, kept alive by this handle.
    pub fn dependencies(&self) -> &[PackageHandle<P>] {
        &self.inner.dependencies
    }

    pub fn retain_count(&self) -> usize {
        self.inner.retains.load(Ordering::Acquire)
    }

    /// Returns true once the handle has been released from its pool.
    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Returns true if both handles refer to the same loaded package.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }

    /// Adds a retain unless the handle is already released.
    pub(crate) fn try_retain(&self) -> bool {
        self.inner
            .retains
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then_some(count + 1)
            })
            .is_ok()
    }

    /// Drops one retain. Returns `Some(remaining)`, or `None` if there was
    /// nothing to release.
    pub(crate) fn release_one(&self) -> Option<usize> {
        self.inner
            .retains
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    /// Drops every retain. Returns false if the handle was already released.
    pub(crate) fn release_all(&self) -> bool {
        self.inner.retains.swap(0, Ordering::AcqRel) > 0
    }

    pub(crate) fn mark_released(&self) {
        self.inner.released.store(true, Ordering::Release);
    }

    /// Take the package out of the handle so its storage can be freed.
    pub(crate) fn take_package(&self) -> Option<Arc<P>> {
        self.inner.package.write().take()
    }
}

impl<P> Clone for PackageHandle<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> fmt::Debug for PackageHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageHandle")
            .field("logical_path", &self.inner.record.logical_path)
            .field("checksum", &format_args!("{:08x}", self.inner.record.checksum))
            .field("retains", &self.retain_count())
            .field("released", &self.is_released())
            .finish()
    }
}

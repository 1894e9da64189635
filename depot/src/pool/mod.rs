//! Pooled, deduplicated package loading.
//!
//! [`PackagePool::get`] resolves a resource or package path to its owning
//! package, loads the package and its dependencies at most once, and hands
//! out shared [`PackageHandle`]s. Package construction is delegated to a
//! [`PackageLoader`].

mod config;
mod error;
mod handle;
mod loader;
mod package_pool;

pub use config::PoolConfig;
pub use error::{PoolError, PoolResult};
pub use handle::PackageHandle;
pub use loader::{BlobLoader, PackageLoader};
pub use package_pool::{PackagePool, PoolStats};

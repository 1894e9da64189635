//! Package construction.

use bytes::Bytes;
use futures::future::BoxFuture;

use crate::download::PackageBlob;
use crate::package::ManifestRecord;

/// Turns package bytes into a loaded package.
///
/// How the bytes are interpreted is entirely up to the implementation; the
/// pool only guarantees that each package is loaded at most once at a time
/// and that dependencies are loaded first.
pub trait PackageLoader: Send + Sync + 'static {
    /// The loaded package type.
    type Package: Send + Sync + 'static;

    /// Construct the package. Errors are reported as a reason string.
    fn load<'a>(
        &'a self,
        record: &'a ManifestRecord,
        blob: PackageBlob,
    ) -> BoxFuture<'a, Result<Self::Package, String>>;

    /// Free a package's storage ahead of its last handle being dropped.
    fn unload(&self, _record: &ManifestRecord, _package: &Self::Package) {}
}

/// Reads the whole package into memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlobLoader;

impl PackageLoader for BlobLoader {
    type Package = Bytes;

    fn load<'a>(
        &'a self,
        _record: &'a ManifestRecord,
        blob: PackageBlob,
    ) -> BoxFuture<'a, Result<Bytes, String>> {
        Box::pin(async move { blob.read().await.map_err(|e| e.to_string()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blob_loader_reads_memory() {
        let record = ManifestRecord::new("a.pkg", 0, 1);
        let bytes = BlobLoader
            .load(&record, PackageBlob::Memory(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"abc");
    }

    #[tokio::test]
    async fn test_blob_loader_missing_file() {
        let record = ManifestRecord::new("a.pkg", 0, 1);
        let blob = PackageBlob::File {
            path: "/nonexistent/depot/a.pkg".into(),
            len: 3,
        };
        assert!(BlobLoader.load(&record, blob).await.is_err());
    }
}

//! Network transfer of manifests and packages.
//!
//! The [`Downloader`] fetches plain bytes and text, and performs resumable
//! package transfers staged in `<dest>.temp`. Verification is injected via
//! [`PackageVerifier`]; the network is injected via [`Transport`].

mod blob;
mod downloader;
mod error;
mod transport;
mod verify;

pub use blob::PackageBlob;
pub use downloader::{temp_path, Downloader, ProgressCallback, PromoteStrategy, TEMP_SUFFIX};
pub use error::{DownloadError, DownloadResult};
pub use transport::{MemoryTransport, ReqwestTransport, ResponseKind, Transport, TransportResponse};
pub use verify::{AcceptAll, ChecksumVerifier, PackageVerifier};

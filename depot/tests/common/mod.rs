//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use depot::download::{Downloader, MemoryTransport, PackageBlob};
use depot::package::checksum::checksum_bytes;
use depot::package::{Manifest, ManifestFormat, ManifestRecord};
use depot::pool::PackageLoader;
use depot::tracker::{PackageTracker, TrackerConfig};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tempfile::TempDir;

pub const BASE: &str = "https://cdn.example.com/content";

/// A record whose checksum and size match `data`.
pub fn record(path: &str, data: &[u8]) -> ManifestRecord {
    ManifestRecord::new(path, checksum_bytes(data), 1).with_size(data.len() as i64)
}

/// Temp storage plus an in-memory content server.
pub struct Env {
    pub temp: TempDir,
    pub transport: MemoryTransport,
    pub auto_update: bool,
}

impl Env {
    pub fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
            transport: MemoryTransport::new(),
            auto_update: true,
        }
    }

    pub fn config(&self) -> TrackerConfig {
        TrackerConfig::new(
            self.temp.path().join("bundled"),
            self.temp.path().join("packages"),
            self.temp.path().join("ledger"),
        )
        .with_base_url(BASE)
        .with_auto_update(self.auto_update)
    }

    /// Write bundled package files and the bundled manifest.
    pub fn bundle(&self, packages: &[(ManifestRecord, &[u8])]) {
        let config = self.config();
        std::fs::create_dir_all(config.bundled_dir()).unwrap();
        let mut manifest = Manifest::new();
        for (record, data) in packages {
            let mut record = record.clone();
            record.size_bytes = data.len() as i64;
            manifest.insert(record);
        }
        for record in manifest.iter() {
            let data = packages
                .iter()
                .find(|(r, _)| r.logical_path == record.logical_path)
                .map(|(_, d)| *d)
                .unwrap();
            let dest = config.bundled_dir().join(&record.real_path);
            std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
            std::fs::write(dest, data).unwrap();
        }
        std::fs::write(
            config.bundled_manifest_path(),
            manifest.encode(ManifestFormat::Json).unwrap(),
        )
        .unwrap();
    }

    /// Serve package bytes and the remote manifest. Checksums and sizes are
    /// taken from the data.
    pub fn publish(&self, packages: &[(ManifestRecord, &[u8])]) {
        let mut manifest = Manifest::new();
        for (record, data) in packages {
            let mut record = record.clone();
            record.checksum = checksum_bytes(data);
            record.size_bytes = data.len() as i64;
            manifest.insert(record);
        }
        for record in manifest.iter() {
            let data = packages
                .iter()
                .find(|(r, _)| r.logical_path == record.logical_path)
                .map(|(_, d)| *d)
                .unwrap();
            self.transport
                .insert(format!("{}/{}", BASE, record.real_path), data.to_vec());
        }
        self.transport.insert(
            format!("{}/manifest.json", BASE),
            manifest.encode(ManifestFormat::Json).unwrap(),
        );
    }

    pub fn downloader(&self) -> Arc<Downloader> {
        Arc::new(Downloader::new(Arc::new(self.transport.clone())))
    }

    /// A tracker with the bundled manifest and ledger loaded.
    pub async fn tracker(&self) -> Arc<PackageTracker> {
        let tracker = Arc::new(PackageTracker::new(self.config(), self.downloader()));
        tracker.initialize().await;
        tracker
    }

    pub fn manifest_url(&self) -> String {
        format!("{}/manifest.json", BASE)
    }
}

/// Loader that records every construction and can be told to fail or stall
/// on specific packages.
#[derive(Default)]
pub struct RecordingLoader {
    constructions: AtomicUsize,
    completed: Mutex<Vec<String>>,
    counts: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    delays: Mutex<HashMap<String, Duration>>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    pub fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().insert(path.to_string(), delay);
    }

    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn count(&self, path: &str) -> usize {
        self.counts.lock().get(path).copied().unwrap_or(0)
    }

    /// Packages in the order their construction finished.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }
}

/// Pool-facing wrapper so tests keep their own `Arc` to the loader.
pub struct SharedLoader(pub Arc<RecordingLoader>);

impl PackageLoader for SharedLoader {
    type Package = Bytes;

    fn load<'a>(
        &'a self,
        record: &'a ManifestRecord,
        blob: PackageBlob,
    ) -> BoxFuture<'a, Result<Bytes, String>> {
        Box::pin(async move {
            let loader = &self.0;
            let path = record.logical_path.clone();
            loader.constructions.fetch_add(1, Ordering::SeqCst);
            *loader.counts.lock().entry(path.clone()).or_default() += 1;

            let delay = loader.delays.lock().get(&path).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if loader.failing.lock().contains(&path) {
                return Err(format!("{} is malformed", path));
            }

            let bytes = blob.read().await.map_err(|e| e.to_string())?;
            loader.completed.lock().push(path);
            Ok(bytes)
        })
    }
}

//! Manifest records describing a single package.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a package's bytes currently live.
///
/// The state is tracked per record and drives how the pool realizes a
/// package: bundled and downloaded packages are read from local storage,
/// packages that are not present must be fetched from the remote server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Shipped inside the build, stored in read-only local storage.
    BundledInBuild,
    /// Downloaded earlier and recorded in the ledger.
    Downloaded,
    /// Known from a manifest but not available locally.
    NotPresent,
}

impl LifecycleState {
    /// Returns true if the package bytes are available on local storage.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::BundledInBuild | Self::Downloaded)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::BundledInBuild => write!(f, "bundled"),
            LifecycleState::Downloaded => write!(f, "downloaded"),
            LifecycleState::NotPresent => write!(f, "not-present"),
        }
    }
}

/// Metadata describing one package.
///
/// `contained_resources` and `dependencies` are optional so that a manifest
/// distinguishing an empty list from a missing one survives a round trip
/// through either encoding unchanged. Use [`ManifestRecord::resources`] and
/// [`ManifestRecord::dependencies`] for read access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Content hash of the package bytes (see [`super::checksum`]).
    pub checksum: u32,
    /// Monotonic build version, 0 until assigned.
    pub version: i64,
    /// Normalized package identifier, e.g. `ui/icons.pkg`.
    pub logical_path: String,
    /// Path without the build-hash suffix, stable across versions.
    #[serde(default)]
    pub short_path: String,
    /// File name on disk and on the remote server.
    pub real_path: String,
    /// Logical resource paths provided by this package.
    #[serde(default)]
    pub contained_resources: Option<Vec<String>>,
    /// Logical paths of packages that must be loaded first.
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    /// Package size in bytes.
    pub size_bytes: i64,
    /// Lifecycle of the local copy.
    pub lifecycle_state: LifecycleState,
}

impl ManifestRecord {
    /// Create a record for `logical_path` with no resources or dependencies.
    ///
    /// The real path defaults to the logical path and the short path is
    /// derived from it.
    pub fn new(logical_path: impl AsRef<str>, checksum: u32, version: i64) -> Self {
        let logical_path = normalize_path(logical_path.as_ref());
        Self {
            checksum,
            version,
            short_path: derive_short_path(&logical_path),
            real_path: logical_path.clone(),
            logical_path,
            contained_resources: None,
            dependencies: None,
            size_bytes: 0,
            lifecycle_state: LifecycleState::NotPresent,
        }
    }

    /// Set the real (possibly hash-suffixed) file name and re-derive the short path.
    pub fn with_real_path(mut self, real_path: impl AsRef<str>) -> Self {
        self.real_path = normalize_path(real_path.as_ref());
        self.short_path = derive_short_path(&self.real_path);
        self
    }

    /// Set the contained resources.
    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.contained_resources = Some(
            resources
                .into_iter()
                .map(|r| normalize_path(r.as_ref()))
                .collect(),
        );
        self
    }

    /// Set the dependencies.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dependencies = Some(
            dependencies
                .into_iter()
                .map(|d| normalize_path(d.as_ref()))
                .collect(),
        );
        self
    }

    /// Set the package size.
    pub fn with_size(mut self, size_bytes: i64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Set the lifecycle state.
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.lifecycle_state = state;
        self
    }

    /// Resources provided by this package (empty if absent).
    pub fn resources(&self) -> &[String] {
        self.contained_resources.as_deref().unwrap_or(&[])
    }

    /// Packages this package depends on (empty if absent).
    pub fn dependencies(&self) -> &[String] {
        self.dependencies.as_deref().unwrap_or(&[])
    }

    /// Overwrite the content fields with those of a newer record.
    ///
    /// The logical path is kept so that existing lookups keep pointing at
    /// this record.
    pub fn overwrite_from(&mut self, newer: &ManifestRecord) {
        self.checksum = newer.checksum;
        self.version = newer.version;
        self.short_path = newer.short_path.clone();
        self.real_path = newer.real_path.clone();
        self.contained_resources = newer.contained_resources.clone();
        self.dependencies = newer.dependencies.clone();
        self.size_bytes = newer.size_bytes;
    }

    /// Normalize paths in place and fill in a missing short path.
    pub(crate) fn normalize(&mut self) {
        self.logical_path = normalize_path(&self.logical_path);
        self.real_path = normalize_path(&self.real_path);
        if self.real_path.is_empty() {
            self.real_path = self.logical_path.clone();
        }
        self.short_path = if self.short_path.is_empty() {
            derive_short_path(&self.real_path)
        } else {
            normalize_path(&self.short_path)
        };
        if let Some(resources) = self.contained_resources.as_mut() {
            for r in resources.iter_mut() {
                *r = normalize_path(r);
            }
        }
        if let Some(deps) = self.dependencies.as_mut() {
            for d in deps.iter_mut() {
                *d = normalize_path(d);
            }
        }
    }

    /// Check the record's own invariants.
    ///
    /// Returns a human-readable reason on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.logical_path.is_empty() {
            return Err("empty logical path".to_string());
        }
        if self.version < 0 {
            return Err(format!("negative version {}", self.version));
        }
        if self.size_bytes < 0 {
            return Err(format!("negative size {}", self.size_bytes));
        }
        if self.dependencies().iter().any(|d| d == &self.logical_path) {
            return Err("package depends on itself".to_string());
        }
        let resources = self.resources();
        for (i, r) in resources.iter().enumerate() {
            if resources[..i].contains(r) {
                return Err(format!("resource '{}' listed twice", r));
            }
        }
        Ok(())
    }
}

impl fmt::Display for ManifestRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} (checksum {:08x}, {})",
            self.logical_path, self.version, self.checksum, self.lifecycle_state
        )
    }
}

/// Normalize a package or resource path.
///
/// Lower-cases, converts backslashes to slashes, strips leading `./` and `/`
/// and collapses repeated separators.
pub fn normalize_path(path: &str) -> String {
    let lowered = path.trim().replace('\\', "/").to_lowercase();
    lowered
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Minimum number of hex digits for a build-hash suffix.
const MIN_HASH_SUFFIX_LEN: usize = 8;

/// Strip a build-hash suffix from a file path.
///
/// `ui/icons_3fa2c81b.pkg` becomes `ui/icons.pkg`. Paths without a
/// recognizable suffix are returned normalized but otherwise unchanged.
pub fn derive_short_path(real_path: &str) -> String {
    let path = normalize_path(real_path);
    let (dir, file) = match path.rfind('/') {
        Some(idx) => (&path[..=idx], &path[idx + 1..]),
        None => ("", path.as_str()),
    };
    let (stem, ext) = match file.find('.') {
        Some(idx) => (&file[..idx], &file[idx..]),
        None => (file, ""),
    };

    if let Some(idx) = stem.rfind('_') {
        let suffix = &stem[idx + 1..];
        if idx > 0
            && suffix.len() >= MIN_HASH_SUFFIX_LEN
            && suffix.chars().all(|c| c.is_ascii_hexdigit())
        {
            return format!("{}{}{}", dir, &stem[..idx], ext);
        }
    }

    path
}

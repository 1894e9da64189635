//! Manifest documents and their encodings.
//!
//! A manifest maps logical package paths to [`ManifestRecord`]s. The same
//! schema is used for the bundled manifest, the remote manifest and the
//! download ledger.
//!
//! # Encodings
//!
//! - **JSON**: `{"schema": 1, "packages": {"ui/icons.pkg": {...}}}`
//! - **Binary**: the 4-byte magic `DPKM` followed by the bincode encoding of
//!   the same document.
//!
//! [`ManifestFormat::detect`] tells the two apart by the magic prefix.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::record::{normalize_path, ManifestRecord};

/// Current manifest schema version.
pub const MANIFEST_SCHEMA: u32 = 1;

/// Magic prefix of the binary encoding.
pub const BINARY_MAGIC: &[u8; 4] = b"DPKM";

/// Errors raised while encoding or decoding a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// JSON syntax or shape error.
    #[error("Invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary payload could not be decoded.
    #[error("Invalid binary manifest: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Binary payload could not be encoded.
    #[error("Failed to encode binary manifest: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Binary payload is not prefixed with the manifest magic.
    #[error("Binary manifest is missing the DPKM header")]
    MissingMagic,

    /// Document declares a schema this build does not understand.
    #[error("Unsupported manifest schema {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    /// A record violates its invariants.
    #[error("Invalid record '{path}': {reason}")]
    InvalidRecord { path: String, reason: String },

    /// The payload is not valid UTF-8 text.
    #[error("Manifest is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Manifest encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestFormat {
    /// Textual JSON encoding.
    Json,
    /// Compact binary encoding.
    Binary,
}

impl ManifestFormat {
    /// Detect the encoding of a payload from its first bytes.
    pub fn detect(bytes: &[u8]) -> Self {
        if bytes.starts_with(BINARY_MAGIC) {
            ManifestFormat::Binary
        } else {
            ManifestFormat::Json
        }
    }

    /// File extension used for files in this encoding.
    pub fn extension(&self) -> &'static str {
        match self {
            ManifestFormat::Json => "json",
            ManifestFormat::Binary => "bin",
        }
    }
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestFormat::Json => write!(f, "json"),
            ManifestFormat::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for ManifestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ManifestFormat::Json),
            "binary" | "bin" => Ok(ManifestFormat::Binary),
            other => Err(format!("unknown manifest format '{}'", other)),
        }
    }
}

/// On-the-wire document shared by both encodings.
#[derive(Debug, Serialize, Deserialize)]
struct ManifestDocument {
    schema: u32,
    packages: BTreeMap<String, ManifestRecord>,
}

/// A mapping of logical package path to record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    records: BTreeMap<String, ManifestRecord>,
}

impl Manifest {
    /// Create an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a manifest from records, keyed by their normalized logical path.
    ///
    /// Later records replace earlier ones with the same logical path.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ManifestRecord>,
    {
        let mut manifest = Self::new();
        for record in records {
            manifest.insert(record);
        }
        manifest
    }

    /// Insert a record, returning the record it replaced.
    pub fn insert(&mut self, mut record: ManifestRecord) -> Option<ManifestRecord> {
        record.normalize();
        self.records.insert(record.logical_path.clone(), record)
    }

    /// Remove a record by logical path.
    pub fn remove(&mut self, logical_path: &str) -> Option<ManifestRecord> {
        self.records.remove(&normalize_path(logical_path))
    }

    /// Look up a record by logical path.
    pub fn get(&self, logical_path: &str) -> Option<&ManifestRecord> {
        self.records.get(&normalize_path(logical_path))
    }

    /// Mutable lookup by logical path.
    ///
    /// Callers must not change the record's logical path.
    pub fn get_mut(&mut self, logical_path: &str) -> Option<&mut ManifestRecord> {
        self.records.get_mut(&normalize_path(logical_path))
    }

    /// Returns true if the manifest holds a record for `logical_path`.
    pub fn contains(&self, logical_path: &str) -> bool {
        self.get(logical_path).is_some()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the manifest has no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate records in logical path order.
    pub fn iter(&self) -> impl Iterator<Item = &ManifestRecord> {
        self.records.values()
    }

    /// Consume the manifest, yielding its records.
    pub fn into_records(self) -> impl Iterator<Item = ManifestRecord> {
        self.records.into_values()
    }

    /// Encode the manifest.
    pub fn encode(&self, format: ManifestFormat) -> Result<Vec<u8>, ManifestError> {
        let document = ManifestDocument {
            schema: MANIFEST_SCHEMA,
            packages: self.records.clone(),
        };

        match format {
            ManifestFormat::Json => Ok(serde_json::to_vec_pretty(&document)?),
            ManifestFormat::Binary => {
                let mut out = BINARY_MAGIC.to_vec();
                out.extend(bincode::serde::encode_to_vec(
                    &document,
                    bincode::config::standard(),
                )?);
                Ok(out)
            }
        }
    }

    /// Decode a manifest.
    ///
    /// With `format = None` the encoding is detected from the payload.
    /// Records are normalized and validated; a missing short path is derived
    /// from the real path.
    pub fn decode(bytes: &[u8], format: Option<ManifestFormat>) -> Result<Self, ManifestError> {
        let format = format.unwrap_or_else(|| ManifestFormat::detect(bytes));

        let document: ManifestDocument = match format {
            ManifestFormat::Json => {
                let text = std::str::from_utf8(bytes)?;
                serde_json::from_str(text)?
            }
            ManifestFormat::Binary => {
                let payload = bytes
                    .strip_prefix(BINARY_MAGIC.as_slice())
                    .ok_or(ManifestError::MissingMagic)?;
                let (document, _): (ManifestDocument, usize) =
                    bincode::serde::decode_from_slice(payload, bincode::config::standard())?;
                document
            }
        };

        if document.schema != MANIFEST_SCHEMA {
            return Err(ManifestError::UnsupportedSchema {
                found: document.schema,
                expected: MANIFEST_SCHEMA,
            });
        }

        let mut records = BTreeMap::new();
        for (key, mut record) in document.packages {
            if record.logical_path.trim().is_empty() {
                record.logical_path = key.clone();
            }
            record.normalize();
            record
                .validate()
                .map_err(|reason| ManifestError::InvalidRecord {
                    path: key.clone(),
                    reason,
                })?;
            if records.contains_key(&record.logical_path) {
                return Err(ManifestError::InvalidRecord {
                    path: key,
                    reason: "duplicate logical path".to_string(),
                });
            }
            records.insert(record.logical_path.clone(), record);
        }

        Ok(Self { records })
    }
}

impl FromIterator<ManifestRecord> for Manifest {
    fn from_iter<I: IntoIterator<Item = ManifestRecord>>(iter: I) -> Self {
        Self::from_records(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::LifecycleState;

    fn sample_manifest() -> Manifest {
        Manifest::from_records([
            // absent arrays
            ManifestRecord::new("base.pkg", 1, 1).with_state(LifecycleState::Downloaded),
            // empty arrays
            ManifestRecord::new("ui/icons.pkg", 0xdead_beef, 7)
                .with_real_path("ui/icons_0a1b2c3d.pkg")
                .with_resources(Vec::<String>::new())
                .with_dependencies(Vec::<String>::new())
                .with_size(2048)
                .with_state(LifecycleState::Downloaded),
            // single and multi-element arrays
            ManifestRecord::new("maps/level1.pkg", 42, 3)
                .with_resources(["maps/level1/terrain.bin"])
                .with_dependencies(["base.pkg", "ui/icons.pkg"])
                .with_size(1 << 20)
                .with_state(LifecycleState::Downloaded),
        ])
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = sample_manifest();
        let bytes = manifest.encode(ManifestFormat::Json).unwrap();
        let decoded = Manifest::decode(&bytes, Some(ManifestFormat::Json)).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_binary_round_trip() {
        let manifest = sample_manifest();
        let bytes = manifest.encode(ManifestFormat::Binary).unwrap();
        assert!(bytes.starts_with(BINARY_MAGIC));
        let decoded = Manifest::decode(&bytes, Some(ManifestFormat::Binary)).unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_empty_and_absent_arrays_are_distinct() {
        let manifest = sample_manifest();
        for format in [ManifestFormat::Json, ManifestFormat::Binary] {
            let decoded = Manifest::decode(&manifest.encode(format).unwrap(), None).unwrap();
            assert_eq!(decoded.get("base.pkg").unwrap().dependencies, None);
            assert_eq!(
                decoded.get("ui/icons.pkg").unwrap().dependencies,
                Some(Vec::new())
            );
            assert_eq!(
                decoded.get("ui/icons.pkg").unwrap().contained_resources,
                Some(Vec::new())
            );
        }
    }

    #[test]
    fn test_detect_format() {
        let manifest = sample_manifest();
        let json = manifest.encode(ManifestFormat::Json).unwrap();
        let binary = manifest.encode(ManifestFormat::Binary).unwrap();
        assert_eq!(ManifestFormat::detect(&json), ManifestFormat::Json);
        assert_eq!(ManifestFormat::detect(&binary), ManifestFormat::Binary);
        assert_eq!(Manifest::decode(&binary, None).unwrap(), manifest);
    }

    #[test]
    fn test_decode_normalizes_and_derives_short_path() {
        let json = r#"{
            "schema": 1,
            "packages": {
                "UI/Icons.pkg": {
                    "checksum": 5,
                    "version": 1,
                    "logical_path": "",
                    "real_path": "UI/Icons_0123ABCD.pkg",
                    "contained_resources": ["UI/Icon.PNG"],
                    "size_bytes": 10,
                    "lifecycle_state": "BundledInBuild"
                }
            }
        }"#;

        let manifest = Manifest::decode(json.as_bytes(), None).unwrap();
        let record = manifest.get("ui/icons.pkg").unwrap();
        assert_eq!(record.real_path, "ui/icons_0123abcd.pkg");
        assert_eq!(record.short_path, "ui/icons.pkg");
        assert_eq!(record.resources(), ["ui/icon.png".to_string()]);
        assert_eq!(record.dependencies, None);
    }

    #[test]
    fn test_decode_rejects_unknown_schema() {
        let json = r#"{"schema": 99, "packages": {}}"#;
        let err = Manifest::decode(json.as_bytes(), None).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::UnsupportedSchema { found: 99, .. }
        ));
    }

    #[test]
    fn test_decode_rejects_self_dependency() {
        let manifest = Manifest::from_records([ManifestRecord {
            dependencies: Some(vec!["loop.pkg".to_string()]),
            ..ManifestRecord::new("loop.pkg", 1, 1)
        }]);
        let bytes = manifest.encode(ManifestFormat::Json).unwrap();
        let err = Manifest::decode(&bytes, None).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidRecord { .. }));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(Manifest::decode(b"not a manifest", None).is_err());
        assert!(matches!(
            Manifest::decode(b"garbage", Some(ManifestFormat::Binary)),
            Err(ManifestError::MissingMagic)
        ));
        assert!(Manifest::decode(b"DPKM\x01", None).is_err());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("JSON".parse::<ManifestFormat>(), Ok(ManifestFormat::Json));
        assert_eq!("bin".parse::<ManifestFormat>(), Ok(ManifestFormat::Binary));
        assert!("yaml".parse::<ManifestFormat>().is_err());
    }

    #[test]
    fn test_insert_and_remove_normalize_keys() {
        let mut manifest = Manifest::new();
        assert!(manifest.insert(ManifestRecord::new("A.pkg", 1, 1)).is_none());
        assert!(manifest.contains("a.pkg"));
        assert!(manifest.contains("A.PKG"));
        assert!(manifest.remove("A.pkg").is_some());
        assert!(manifest.is_empty());
    }
}

//! Lookup indexes over manifest records.

use std::collections::HashMap;

use tracing::warn;

use crate::package::ManifestRecord;

/// A resource claimed by more than one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateResource {
    /// The contested resource path.
    pub resource: String,
    /// Package that keeps the mapping (first seen).
    pub kept: String,
    /// Package whose claim was ignored.
    pub ignored: String,
}

/// Maps resource paths and short paths to owning packages.
///
/// On a resource collision the first registered package wins; the collision
/// is logged and kept in [`ResourceIndex::duplicates`].
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    resources: HashMap<String, String>,
    short_paths: HashMap<String, String>,
    duplicates: Vec<DuplicateResource>,
}

impl ResourceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index, registering records in iteration order.
    pub fn build<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a ManifestRecord>,
    {
        let mut index = Self::new();
        for record in records {
            index.insert(record);
        }
        index
    }

    /// Register a record's resources and short path.
    pub fn insert(&mut self, record: &ManifestRecord) {
        for resource in record.resources() {
            match self.resources.get(resource) {
                Some(owner) if owner != &record.logical_path => {
                    warn!(
                        resource = %resource,
                        kept = %owner,
                        ignored = %record.logical_path,
                        "Duplicate resource mapping, keeping first package"
                    );
                    self.duplicates.push(DuplicateResource {
                        resource: resource.clone(),
                        kept: owner.clone(),
                        ignored: record.logical_path.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    self.resources
                        .insert(resource.clone(), record.logical_path.clone());
                }
            }
        }
        self.short_paths
            .entry(record.short_path.clone())
            .or_insert_with(|| record.logical_path.clone());
    }

    /// Logical path of the package owning `resource`.
    pub fn owner(&self, resource: &str) -> Option<&str> {
        self.resources.get(resource).map(String::as_str)
    }

    /// Logical path of the package with `short_path`.
    pub fn by_short_path(&self, short_path: &str) -> Option<&str> {
        self.short_paths.get(short_path).map(String::as_str)
    }

    /// Collisions seen while building.
    pub fn duplicates(&self) -> &[DuplicateResource] {
        &self.duplicates
    }

    /// Number of indexed resources.
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let a = ManifestRecord::new("a.pkg", 1, 1).with_resources(["tex/x.png", "tex/y.png"]);
        let b = ManifestRecord::new("b.pkg", 2, 1).with_resources(["tex/y.png", "tex/z.png"]);

        let index = ResourceIndex::build([&a, &b]);

        assert_eq!(index.owner("tex/x.png"), Some("a.pkg"));
        assert_eq!(index.owner("tex/y.png"), Some("a.pkg"));
        assert_eq!(index.owner("tex/z.png"), Some("b.pkg"));
        assert_eq!(index.resource_count(), 3);
        assert_eq!(
            index.duplicates(),
            &[DuplicateResource {
                resource: "tex/y.png".to_string(),
                kept: "a.pkg".to_string(),
                ignored: "b.pkg".to_string(),
            }]
        );
    }

    #[test]
    fn test_same_package_twice_is_not_duplicate() {
        let a = ManifestRecord::new("a.pkg", 1, 1).with_resources(["r"]);
        let index = ResourceIndex::build([&a, &a]);
        assert!(index.duplicates().is_empty());
    }

    #[test]
    fn test_short_path_lookup() {
        let a = ManifestRecord::new("ui/icons.pkg", 1, 1).with_real_path("ui/icons_3fa2c81b.pkg");
        let index = ResourceIndex::build([&a]);
        assert_eq!(index.by_short_path("ui/icons.pkg"), Some("ui/icons.pkg"));
        assert_eq!(index.owner("missing"), None);
    }
}

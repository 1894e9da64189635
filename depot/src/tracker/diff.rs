//! Update detection between local and remote manifests.
//!
//! Computing the set of changed packages is a pure function of the three
//! manifests; applying it invalidates the affected local records.

use std::collections::HashMap;

use crate::package::{LifecycleState, Manifest, ManifestRecord};

/// A local package whose remote counterpart has different content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// Logical path of the local record being replaced.
    pub local_path: String,
    /// Checksum of the local copy.
    pub local_checksum: u32,
    /// Lifecycle of the local copy before the update.
    pub local_state: LifecycleState,
    /// The remote record.
    pub remote: ManifestRecord,
}

/// Packages due for update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSet {
    updates: Vec<PendingUpdate>,
    remote_only: Vec<String>,
}

impl UpdateSet {
    /// Changed packages, in remote manifest order.
    pub fn updates(&self) -> &[PendingUpdate] {
        &self.updates
    }

    /// Remote records, as they will be installed.
    pub fn records(&self) -> Vec<ManifestRecord> {
        self.updates.iter().map(|u| u.remote.clone()).collect()
    }

    /// Remote packages with no local counterpart. They are fetched on demand
    /// and are not part of the update.
    pub fn remote_only(&self) -> &[String] {
        &self.remote_only
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Total bytes to download, as declared by the remote manifest.
    pub fn total_bytes(&self) -> u64 {
        self.updates
            .iter()
            .map(|u| u.remote.size_bytes.max(0) as u64)
            .sum()
    }
}

/// Compare every remote record against the local record with the same short
/// path. Downloaded records shadow bundled ones.
pub fn compute_update_set(bundled: &Manifest, downloaded: &Manifest, remote: &Manifest) -> UpdateSet {
    let mut by_short: HashMap<&str, &ManifestRecord> = HashMap::new();
    for record in bundled.iter() {
        by_short.entry(record.short_path.as_str()).or_insert(record);
    }
    for record in downloaded.iter() {
        by_short.insert(record.short_path.as_str(), record);
    }

    let mut set = UpdateSet::default();
    for remote_record in remote.iter() {
        match by_short.get(remote_record.short_path.as_str()) {
            Some(local) if local.checksum != remote_record.checksum => {
                set.updates.push(PendingUpdate {
                    local_path: local.logical_path.clone(),
                    local_checksum: local.checksum,
                    local_state: local.lifecycle_state,
                    remote: remote_record.clone(),
                });
            }
            Some(_) => {}
            None => set.remote_only.push(remote_record.logical_path.clone()),
        }
    }
    set
}

/// Overwrite each affected local record with the remote fields and mark it
/// `NotPresent`, so loaders stop serving the stale copy. Records whose
/// checksum no longer matches the computed set are left alone.
///
/// Returns the number of records invalidated.
pub fn apply_update_set(set: &UpdateSet, bundled: &mut Manifest, downloaded: &mut Manifest) -> usize {
    let mut applied = 0;
    for update in &set.updates {
        let target = if downloaded.contains(&update.local_path) {
            downloaded.get_mut(&update.local_path)
        } else {
            bundled.get_mut(&update.local_path)
        };
        if let Some(record) = target {
            // Already replaced since the set was computed.
            if record.checksum != update.local_checksum {
                continue;
            }
            record.overwrite_from(&update.remote);
            record.lifecycle_state = LifecycleState::NotPresent;
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundled(records: Vec<ManifestRecord>) -> Manifest {
        records
            .into_iter()
            .map(|r| r.with_state(LifecycleState::BundledInBuild))
            .collect()
    }

    #[test]
    fn test_changed_checksum_included() {
        let local = bundled(vec![ManifestRecord::new("a.pkg", 5, 1)]);
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 2)]);

        let set = compute_update_set(&local, &Manifest::new(), &remote);

        assert_eq!(set.len(), 1);
        assert_eq!(set.updates()[0].local_checksum, 5);
        assert_eq!(set.records()[0].checksum, 9);
    }

    #[test]
    fn test_equal_checksum_excluded() {
        let local = bundled(vec![ManifestRecord::new("a.pkg", 5, 1)]);
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 5, 7)]);

        assert!(compute_update_set(&local, &Manifest::new(), &remote).is_empty());
    }

    #[test]
    fn test_match_by_short_path_across_hashes() {
        let local = bundled(vec![
            ManifestRecord::new("ui/icons.pkg", 1, 1).with_real_path("ui/icons_11111111.pkg")
        ]);
        let remote = Manifest::from_records([ManifestRecord::new("ui/icons.pkg", 2, 2)
            .with_real_path("ui/icons_22222222.pkg")
            .with_size(100)]);

        let set = compute_update_set(&local, &Manifest::new(), &remote);
        assert_eq!(set.len(), 1);
        assert_eq!(set.total_bytes(), 100);
    }

    #[test]
    fn test_downloaded_shadows_bundled() {
        let local = bundled(vec![ManifestRecord::new("a.pkg", 1, 1)]);
        let downloaded = Manifest::from_records([
            ManifestRecord::new("a.pkg", 9, 2).with_state(LifecycleState::Downloaded)
        ]);
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 2)]);

        assert!(compute_update_set(&local, &downloaded, &remote).is_empty());
    }

    #[test]
    fn test_remote_only_reported_separately() {
        let remote = Manifest::from_records([ManifestRecord::new("new.pkg", 1, 1)]);
        let set = compute_update_set(&Manifest::new(), &Manifest::new(), &remote);
        assert!(set.is_empty());
        assert_eq!(set.remote_only(), &["new.pkg".to_string()]);
    }

    #[test]
    fn test_compute_is_pure() {
        let local = bundled(vec![ManifestRecord::new("a.pkg", 5, 1)]);
        let before = local.clone();
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 2)]);

        let _ = compute_update_set(&local, &Manifest::new(), &remote);
        assert_eq!(local, before);
    }

    #[test]
    fn test_apply_invalidates_local_record() {
        let mut local = bundled(vec![ManifestRecord::new("a.pkg", 5, 1)]);
        let mut downloaded = Manifest::new();
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 2)
            .with_dependencies(["b.pkg"])]);

        let set = compute_update_set(&local, &downloaded, &remote);
        assert_eq!(apply_update_set(&set, &mut local, &mut downloaded), 1);

        let record = local.get("a.pkg").unwrap();
        assert_eq!(record.checksum, 9);
        assert_eq!(record.version, 2);
        assert_eq!(record.dependencies(), &["b.pkg".to_string()]);
        assert_eq!(record.lifecycle_state, LifecycleState::NotPresent);
    }

    #[test]
    fn test_apply_prefers_downloaded_record() {
        let mut local = bundled(vec![ManifestRecord::new("a.pkg", 1, 1)]);
        let mut downloaded = Manifest::from_records([
            ManifestRecord::new("a.pkg", 5, 2).with_state(LifecycleState::Downloaded)
        ]);
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 3)]);

        let set = compute_update_set(&local, &downloaded, &remote);
        apply_update_set(&set, &mut local, &mut downloaded);

        assert_eq!(downloaded.get("a.pkg").unwrap().checksum, 9);
        assert_eq!(local.get("a.pkg").unwrap().checksum, 1);
    }

    #[test]
    fn test_apply_skips_records_changed_since_compute() {
        let mut local = bundled(vec![ManifestRecord::new("a.pkg", 5, 1)]);
        let mut downloaded = Manifest::new();
        let remote = Manifest::from_records([ManifestRecord::new("a.pkg", 9, 2)]);
        let set = compute_update_set(&local, &downloaded, &remote);

        local.get_mut("a.pkg").unwrap().checksum = 9;

        assert_eq!(apply_update_set(&set, &mut local, &mut downloaded), 0);
        assert_eq!(
            local.get("a.pkg").unwrap().lifecycle_state,
            LifecycleState::BundledInBuild
        );
    }
}

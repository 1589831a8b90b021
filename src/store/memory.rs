//! In-memory artifact store for testing
//!
//! Stores blobs and version records in maps behind a mutex. No persistence.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;

use super::{content_address, ArtifactStore, Lineage, ModelVersion, Result, StoreError, VersionFilter};

/// In-memory content-addressed store.
///
/// Interior mutability so it can be shared across promotion and drift
/// workers; a single mutex guards both maps to keep blob and metadata
/// writes atomic relative to each other.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Maps>,
}

#[derive(Debug, Default)]
struct Maps {
    blobs: BTreeMap<String, Vec<u8>>,
    versions: BTreeMap<String, ModelVersion>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct stored blobs
    pub fn blob_count(&self) -> usize {
        self.inner.lock().map(|m| m.blobs.len()).unwrap_or(0)
    }
}

impl ArtifactStore for InMemoryStore {
    fn put(&self, bytes: &[u8], lineage: Lineage) -> Result<ModelVersion> {
        let version_id = content_address(bytes, &lineage);
        let mut maps = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store lock poisoned".into() })?;

        if let Some(existing) = maps.versions.get(&version_id) {
            return Ok(existing.clone());
        }

        let version = ModelVersion {
            version_id: version_id.clone(),
            artifact_reference: format!("mem://{version_id}"),
            lineage,
            created_at: Utc::now(),
        };
        maps.blobs.insert(version_id.clone(), bytes.to_vec());
        maps.versions.insert(version_id, version.clone());
        Ok(version)
    }

    fn get(&self, version_id: &str) -> Result<Vec<u8>> {
        let maps = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store lock poisoned".into() })?;
        maps.blobs
            .get(version_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(version_id.to_string()))
    }

    fn list(&self, filter: &VersionFilter) -> Result<Vec<ModelVersion>> {
        let maps = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store lock poisoned".into() })?;
        let mut versions: Vec<ModelVersion> =
            maps.versions.values().filter(|v| filter.matches(v)).cloned().collect();
        versions.sort_by_key(|v| v.created_at);
        Ok(versions)
    }

    fn head(&self, version_id: &str) -> Result<ModelVersion> {
        let maps = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store lock poisoned".into() })?;
        maps.versions
            .get(version_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(version_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let store = InMemoryStore::new();
        let v = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        assert_eq!(store.get(&v.version_id).unwrap(), b"weights");
    }

    #[test]
    fn test_get_missing() {
        let store = InMemoryStore::new();
        assert!(matches!(store.get("nope"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_put_idempotent_no_duplicate_blob() {
        let store = InMemoryStore::new();
        let v1 = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        let v2 = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        assert_eq!(v1.version_id, v2.version_id);
        assert_eq!(v1.created_at, v2.created_at); // original record returned
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn test_list_sorted_oldest_first() {
        let store = InMemoryStore::new();
        let a = store.put(b"a", Lineage::new("ds", "r1")).unwrap();
        let b = store.put(b"b", Lineage::new("ds", "r2")).unwrap();
        let all = store.list(&VersionFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].created_at <= all[1].created_at);
        let ids: Vec<_> = all.iter().map(|v| v.version_id.clone()).collect();
        assert!(ids.contains(&a.version_id));
        assert!(ids.contains(&b.version_id));
    }
}

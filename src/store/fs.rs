//! Filesystem artifact store
//!
//! Stores each artifact as `{version_id}.bin` next to a `{version_id}.json`
//! metadata record in a single directory. Metadata is written after the
//! blob so a crash between the two writes leaves no listable version.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use super::{content_address, ArtifactStore, Lineage, ModelVersion, Result, StoreError, VersionFilter};

/// Directory-backed content-addressed store.
#[derive(Debug)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Create a store rooted at `dir`, creating the directory lazily on
    /// first write.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn blob_path(&self, version_id: &str) -> PathBuf {
        self.dir.join(format!("{version_id}.bin"))
    }

    fn meta_path(&self, version_id: &str) -> PathBuf {
        self.dir.join(format!("{version_id}.json"))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn read_meta(&self, path: &Path) -> Result<ModelVersion> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl ArtifactStore for FsStore {
    fn put(&self, bytes: &[u8], lineage: Lineage) -> Result<ModelVersion> {
        self.ensure_dir()?;
        let version_id = content_address(bytes, &lineage);

        let meta_path = self.meta_path(&version_id);
        if meta_path.exists() {
            return self.read_meta(&meta_path);
        }

        let version = ModelVersion {
            version_id: version_id.clone(),
            artifact_reference: self.blob_path(&version_id).display().to_string(),
            lineage,
            created_at: Utc::now(),
        };

        fs::write(self.blob_path(&version_id), bytes)?;
        fs::write(&meta_path, serde_json::to_string_pretty(&version)?)?;
        Ok(version)
    }

    fn get(&self, version_id: &str) -> Result<Vec<u8>> {
        let path = self.blob_path(version_id);
        if !path.exists() {
            return Err(StoreError::NotFound(version_id.to_string()));
        }
        Ok(fs::read(path)?)
    }

    fn list(&self, filter: &VersionFilter) -> Result<Vec<ModelVersion>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let version = self.read_meta(&path)?;
                if filter.matches(&version) {
                    versions.push(version);
                }
            }
        }
        versions.sort_by_key(|v| v.created_at);
        Ok(versions)
    }

    fn head(&self, version_id: &str) -> Result<ModelVersion> {
        let path = self.meta_path(version_id);
        if !path.exists() {
            return Err(StoreError::NotFound(version_id.to_string()));
        }
        self.read_meta(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let v = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        assert_eq!(store.get(&v.version_id).unwrap(), b"weights");
        assert_eq!(store.head(&v.version_id).unwrap().version_id, v.version_id);
    }

    #[test]
    fn test_put_idempotent_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path());
        let v1 = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        let v2 = store.put(b"weights", Lineage::new("ds", "rev")).unwrap();
        assert_eq!(v1.version_id, v2.version_id);

        let files: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(files.len(), 2); // one .bin + one .json
    }

    #[test]
    fn test_list_empty_dir_absent() {
        let tmp = TempDir::new().unwrap();
        let store = FsStore::new(tmp.path().join("never-created"));
        assert!(store.list(&VersionFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn test_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let id = {
            let store = FsStore::new(tmp.path());
            store.put(b"weights", Lineage::new("ds", "rev")).unwrap().version_id
        };
        let reopened = FsStore::new(tmp.path());
        assert_eq!(reopened.get(&id).unwrap(), b"weights");
    }
}

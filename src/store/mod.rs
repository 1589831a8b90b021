//! Artifact Store (PRM-001)
//!
//! Content-addressed storage for trained model artifacts plus lineage
//! metadata. Version identifiers are derived from a SHA-256 hash over the
//! artifact bytes and the canonical JSON encoding of the lineage record, so
//! an identical retraining with identical inputs produces the same id and
//! stores no duplicate blob.
//!
//! Backends are pluggable via [`ArtifactStore`]: an in-memory store for
//! tests and a JSON-file store for on-disk deployments.

mod fs;
mod memory;
pub mod retry;

pub use fs::FsStore;
pub use memory::InMemoryStore;
pub use retry::BackoffPolicy;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Training lineage for a model artifact.
///
/// Hyperparameters use a `BTreeMap` so the canonical JSON encoding (and
/// therefore the derived version id) is independent of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lineage {
    /// Identifier of the training dataset
    pub dataset_id: String,
    /// Source code revision the training run used
    pub code_revision: String,
    /// Hyperparameters as string key-value pairs
    pub hyperparameters: BTreeMap<String, String>,
}

impl Lineage {
    /// Create a lineage record with no hyperparameters
    pub fn new(dataset_id: impl Into<String>, code_revision: impl Into<String>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            code_revision: code_revision.into(),
            hyperparameters: BTreeMap::new(),
        }
    }

    /// Add a hyperparameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hyperparameters.insert(key.into(), value.into());
        self
    }
}

/// Immutable record of a stored model artifact.
///
/// Created once when the artifact enters the store; never mutated. All
/// downstream records (evaluation reports, stage transitions, baselines,
/// verdicts) reference it by `version_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    /// Content-derived identifier (hex SHA-256 of bytes + lineage)
    pub version_id: String,
    /// Reference to the stored artifact (backend-specific)
    pub artifact_reference: String,
    /// Training lineage
    pub lineage: Lineage,
    /// When the artifact entered the store
    pub created_at: DateTime<Utc>,
}

/// Compute the content address for an artifact and its lineage.
///
/// The lineage is hashed through its canonical JSON encoding; the artifact
/// bytes are hashed raw.
pub fn content_address(bytes: &[u8], lineage: &Lineage) -> String {
    let lineage_json =
        serde_json::to_string(lineage).expect("Lineage is a plain struct and always serializes");
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.update(lineage_json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Errors from artifact store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable; transient by assumption, retried with backoff.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// No artifact with the given version id exists.
    #[error("version not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Filter for listing stored versions.
///
/// All populated fields must match; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct VersionFilter {
    /// Restrict to versions trained on this dataset
    pub dataset_id: Option<String>,
    /// Restrict to versions created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
}

impl VersionFilter {
    /// Check whether a version matches this filter
    pub fn matches(&self, version: &ModelVersion) -> bool {
        if let Some(ref ds) = self.dataset_id {
            if &version.lineage.dataset_id != ds {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if version.created_at < after {
                return false;
            }
        }
        true
    }
}

/// Content-addressed artifact storage.
///
/// `put` is idempotent: storing identical bytes with identical lineage
/// returns the already-stored version without writing a second blob.
pub trait ArtifactStore: Send + Sync {
    /// Store an artifact, returning its version record
    fn put(&self, bytes: &[u8], lineage: Lineage) -> Result<ModelVersion>;

    /// Fetch the raw artifact bytes for a version
    fn get(&self, version_id: &str) -> Result<Vec<u8>>;

    /// List stored versions matching the filter, oldest first
    fn list(&self, filter: &VersionFilter) -> Result<Vec<ModelVersion>>;

    /// Fetch the version record without the blob
    fn head(&self, version_id: &str) -> Result<ModelVersion>;
}

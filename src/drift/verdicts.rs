//! Verdict retention
//!
//! Drift verdicts are retained per deployment slot for audit queries and
//! for debounce derivation: the controller counts consecutive Critical
//! verdicts from the stored sequence rather than keeping a mutable counter,
//! so the decision survives a crash and restart.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::DriftVerdict;

/// Errors from verdict storage
#[derive(Debug, Error)]
pub enum VerdictStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("verdict store lock poisoned")]
    Poisoned,
}

/// Result type for verdict storage operations
pub type Result<T> = std::result::Result<T, VerdictStoreError>;

/// A stored verdict, tagged with the slot it was produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub slot: String,
    pub verdict: DriftVerdict,
}

/// Append-only verdict retention per slot.
pub trait VerdictStore: Send + Sync {
    /// Append a verdict for a slot
    fn append(&self, slot: &str, verdict: DriftVerdict) -> Result<()>;

    /// All verdicts for a slot, oldest first
    fn for_slot(&self, slot: &str) -> Result<Vec<DriftVerdict>>;

    /// The most recent verdict for a slot
    fn latest(&self, slot: &str) -> Result<Option<DriftVerdict>> {
        Ok(self.for_slot(slot)?.pop())
    }

    /// Whether a version has any unresolved Critical verdict on record
    fn has_critical(&self, model_version_id: &str) -> Result<bool>;
}

/// In-memory verdict store for tests.
#[derive(Debug, Default)]
pub struct InMemoryVerdicts {
    records: Mutex<Vec<VerdictRecord>>,
}

impl InMemoryVerdicts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VerdictStore for InMemoryVerdicts {
    fn append(&self, slot: &str, verdict: DriftVerdict) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| VerdictStoreError::Poisoned)?;
        records.push(VerdictRecord { slot: slot.to_string(), verdict });
        Ok(())
    }

    fn for_slot(&self, slot: &str) -> Result<Vec<DriftVerdict>> {
        let records = self.records.lock().map_err(|_| VerdictStoreError::Poisoned)?;
        Ok(records.iter().filter(|r| r.slot == slot).map(|r| r.verdict.clone()).collect())
    }

    fn has_critical(&self, model_version_id: &str) -> Result<bool> {
        let records = self.records.lock().map_err(|_| VerdictStoreError::Poisoned)?;
        Ok(records.iter().any(|r| {
            r.verdict.model_version_id == model_version_id
                && r.verdict.status == super::DriftStatus::Critical
        }))
    }
}

/// JSON-lines verdict store, one file per slot.
#[derive(Debug)]
pub struct JsonFileVerdicts {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileVerdicts {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    fn slot_path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("verdicts-{slot}.jsonl"))
    }

    fn read_all(&self) -> Result<HashMap<String, Vec<DriftVerdict>>> {
        let mut by_slot: HashMap<String, Vec<DriftVerdict>> = HashMap::new();
        if !self.dir.exists() {
            return Ok(by_slot);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !name.starts_with("verdicts-") || !name.ends_with(".jsonl") {
                continue;
            }
            for line in fs::read_to_string(&path)?.lines() {
                let record: VerdictRecord = serde_json::from_str(line)?;
                by_slot.entry(record.slot).or_default().push(record.verdict);
            }
        }
        Ok(by_slot)
    }
}

impl VerdictStore for JsonFileVerdicts {
    fn append(&self, slot: &str, verdict: DriftVerdict) -> Result<()> {
        let _guard = self.write_lock.lock().map_err(|_| VerdictStoreError::Poisoned)?;
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)?;
        }
        let record = VerdictRecord { slot: slot.to_string(), verdict };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        use std::io::Write;
        let mut file =
            fs::OpenOptions::new().create(true).append(true).open(self.slot_path(slot))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn for_slot(&self, slot: &str) -> Result<Vec<DriftVerdict>> {
        let path = self.slot_path(slot);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut verdicts = Vec::new();
        for line in fs::read_to_string(path)?.lines() {
            let record: VerdictRecord = serde_json::from_str(line)?;
            verdicts.push(record.verdict);
        }
        Ok(verdicts)
    }

    fn has_critical(&self, model_version_id: &str) -> Result<bool> {
        let by_slot = self.read_all()?;
        Ok(by_slot.values().flatten().any(|v| {
            v.model_version_id == model_version_id && v.status == super::DriftStatus::Critical
        }))
    }
}

//! Audit log backends
//!
//! An in-memory log for tests and a JSON-lines file log for deployments.
//! Both append a batch through a single guarded write so a transition's
//! events become visible together or not at all.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::{AuditEvent, AuditLog};

/// Errors from audit log operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit log lock poisoned")]
    Poisoned,

    /// Injected or backend-reported append failure; the transition that
    /// attempted the append must report failure with no partial state.
    #[error("audit append failed: {0}")]
    AppendFailed(String),
}

/// Result type for audit log operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// In-memory audit log for tests. Append-only; no persistence.
#[derive(Debug, Default)]
pub struct InMemoryLog {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for InMemoryLog {
    fn append_batch(&self, events: &[AuditEvent]) -> Result<()> {
        let mut log = self.events.lock().map_err(|_| AuditError::Poisoned)?;
        log.extend_from_slice(events);
        Ok(())
    }

    fn events(&self) -> Result<Vec<AuditEvent>> {
        let log = self.events.lock().map_err(|_| AuditError::Poisoned)?;
        Ok(log.clone())
    }
}

/// JSON-lines audit log, one event per line in a single append-only file.
///
/// A batch is serialized to one buffer and written with a single call, so
/// the events of one transition land together.
#[derive(Debug)]
pub struct JsonFileLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileLog {
    /// Open (or lazily create) the log file at `path`
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), write_lock: Mutex::new(()) }
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for JsonFileLog {
    fn append_batch(&self, events: &[AuditEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().map_err(|_| AuditError::Poisoned)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut buf = String::new();
        for event in events {
            buf.push_str(&serde_json::to_string(event)?);
            buf.push('\n');
        }

        let mut file = fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(buf.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn events(&self) -> Result<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut events = Vec::new();
        for line in fs::read_to_string(&self.path)?.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }
        Ok(events)
    }
}

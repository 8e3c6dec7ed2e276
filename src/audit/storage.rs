//! Durable storage for the audit log: one blob holding the whole
//! fingerprint -> entry mapping, read in full at startup and written in full.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use super::entry::AuditEntry;
use crate::error::StorageError;

pub type AuditMap = HashMap<String, AuditEntry>;

pub const DEFAULT_AUDIT_LOG_PATH: &str = "state/audit_log.json";
pub const ENV_AUDIT_LOG_PATH: &str = "AUDIT_LOG_PATH";

#[async_trait]
pub trait AuditStorage: Send + Sync {
    /// Missing state is an empty map, not an error.
    async fn load(&self) -> Result<AuditMap, StorageError>;
    async fn save(&self, entries: &AuditMap) -> Result<(), StorageError>;
}

/// JSON file on disk, written via tmp file + rename.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$AUDIT_LOG_PATH` or `state/audit_log.json`.
    pub fn from_env() -> Self {
        let path = std::env::var(ENV_AUDIT_LOG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AUDIT_LOG_PATH));
        Self::new(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AuditStorage for JsonFileStorage {
    async fn load(&self) -> Result<AuditMap, StorageError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AuditMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &AuditMap) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-process storage; counts saves so tests can observe batching.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<Option<AuditMap>>,
    saves: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: AuditMap) -> Self {
        Self {
            state: Mutex::new(Some(entries)),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().expect("storage mutex poisoned")
    }

    pub fn persisted(&self) -> Option<AuditMap> {
        self.state.lock().expect("storage mutex poisoned").clone()
    }
}

#[async_trait]
impl AuditStorage for MemoryStorage {
    async fn load(&self) -> Result<AuditMap, StorageError> {
        Ok(self.persisted().unwrap_or_default())
    }

    async fn save(&self, entries: &AuditMap) -> Result<(), StorageError> {
        *self.state.lock().expect("storage mutex poisoned") = Some(entries.clone());
        *self.saves.lock().expect("storage mutex poisoned") += 1;
        Ok(())
    }
}

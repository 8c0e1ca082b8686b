use crate::error::RelayError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Key-value facility backing one token tier.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), RelayError>;
    fn remove(&self, key: &str) -> Result<(), RelayError>;
}

/// Session-lifetime tier: lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), RelayError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    entries: BTreeMap<String, String>,
}

/// Durable tier: a small JSON document on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> StoredTokens {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Token file is not valid JSON; treating as empty"
                );
                StoredTokens::default()
            }),
            Err(_) => StoredTokens::default(),
        }
    }

    fn write(&self, mut doc: StoredTokens) -> Result<(), RelayError> {
        if doc.entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err.into()),
            };
        }
        doc.updated_at = Some(Utc::now());
        let bytes = serde_json::to_vec_pretty(&doc)?;
        std::fs::write(&self.path, bytes)?;
        Ok(())
    }
}

impl TokenStorage for FileTokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.read().entries.remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), RelayError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.read();
        doc.entries.insert(key.to_string(), value.to_string());
        self.write(doc)
    }

    fn remove(&self, key: &str) -> Result<(), RelayError> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut doc = self.read();
        if doc.entries.remove(key).is_none() {
            return Ok(());
        }
        self.write(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokens.json");

        FileTokenStorage::new(&path)
            .set("authToken", "access-1")
            .expect("write token");

        let reopened = FileTokenStorage::new(&path);
        assert_eq!(reopened.get("authToken").as_deref(), Some("access-1"));

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read file")).expect("json");
        assert!(raw.get("updated_at").is_some());
    }

    #[test]
    fn removing_last_key_deletes_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tokens.json");
        let storage = FileTokenStorage::new(&path);

        storage.set("refreshToken", "r-1").expect("write");
        storage.remove("refreshToken").expect("remove");

        assert!(!path.exists());
        assert_eq!(storage.get("refreshToken"), None);
    }
}

//! services/api/src/adapters/preferences.rs
//!
//! A `PreferenceStore` backed by a small JSON object on disk, standing in for
//! the browser's local storage.

use async_trait::async_trait;
use doc_library_core::ports::{PortError, PortResult, PreferenceStore};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

pub struct FilePreferenceStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the file.
    write_lock: Mutex<()>,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> PortResult<HashMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) if raw.is_empty() => Ok(HashMap::new()),
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                PortError::Unexpected(format!(
                    "Preferences file {} is malformed: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(PortError::Unavailable(e.to_string())),
        }
    }
}

#[async_trait]
impl PreferenceStore for FilePreferenceStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());

        let raw = serde_json::to_vec_pretty(&values)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        tokio::fs::write(&self.path, raw)
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        debug!(key, path = %self.path.display(), "Preference saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePreferenceStore::new(dir.path().join("prefs.json"));
        assert_eq!(store.get("theme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_a_new_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let store = FilePreferenceStore::new(&path);
        store.set("theme", "light").await.unwrap();
        store.set("layout", "grid").await.unwrap();
        store.set("theme", "dark").await.unwrap();

        let reopened = FilePreferenceStore::new(&path);
        assert_eq!(reopened.get("theme").await.unwrap().as_deref(), Some("dark"));
        assert_eq!(reopened.get("layout").await.unwrap().as_deref(), Some("grid"));
    }

    #[tokio::test]
    async fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FilePreferenceStore::new(&path);
        assert!(matches!(store.get("theme").await, Err(PortError::Unexpected(_))));
    }
}

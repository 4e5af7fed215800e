//! JSON-file-backed key/value store.
//!
//! The whole map lives in one pretty-printed JSON object. Every mutation
//! rewrites the file atomically (temp file → fsync → rename) and is applied
//! to the in-memory map only after the write succeeded.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use super::KeyValueStore;
use crate::error::{Result, TexSauceError};

/// Key/value store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store; it is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`TexSauceError::Storage`] if the file exists but cannot be
    /// read or is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                TexSauceError::Storage(format!(
                    "failed to read store file '{}': {e}",
                    path.display()
                ))
            })?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    TexSauceError::Storage(format!(
                        "failed to parse store file '{}': {e}",
                        path.display()
                    ))
                })?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "opened key/value store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| TexSauceError::Storage(format!("store lock poisoned: {e}")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock()?;
        let mut next = entries.clone();
        next.insert(key.to_owned(), value.to_owned());
        write_atomic(&self.path, &next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock()?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        write_atomic(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

/// Serialize `entries` and write them atomically to `path`.
fn write_atomic(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(entries)
        .map_err(|e| TexSauceError::Storage(format!("failed to serialize store: {e}")))?;
    let tmp_path = path.with_extension("json.tmp");

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TexSauceError::Storage(format!(
                "failed to create store directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let mut file = std::fs::File::create(&tmp_path).map_err(|e| {
        TexSauceError::Storage(format!(
            "failed to create temp file '{}': {e}",
            tmp_path.display()
        ))
    })?;
    file.write_all(json.as_bytes())
        .map_err(|e| TexSauceError::Storage(format!("failed to write temp file: {e}")))?;
    file.sync_all()
        .map_err(|e| TexSauceError::Storage(format!("failed to sync temp file: {e}")))?;

    std::fs::rename(&tmp_path, path).map_err(|e| {
        TexSauceError::Storage(format!(
            "failed to rename '{}' to '{}': {e}",
            tmp_path.display(),
            path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test_dir() -> tempfile::TempDir {
        match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir creation should not fail"),
        }
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = make_test_dir();
        let store = FileStore::open(dir.path().join("storage.json"));
        assert!(store.is_ok());
        let store = store.unwrap_or_else(|_| unreachable!());
        assert_eq!(store.get("anything").ok().flatten(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = make_test_dir();
        let path = dir.path().join("nested").join("storage.json");
        {
            let store = FileStore::open(&path).unwrap_or_else(|_| unreachable!());
            assert!(store.set("tex_sauce_api_key", "abc").is_ok());
            assert!(store.set("other", "x").is_ok());
            assert!(store.remove("other").is_ok());
        }
        let reopened = FileStore::open(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(
            reopened.get("tex_sauce_api_key").ok().flatten().as_deref(),
            Some("abc")
        );
        assert_eq!(reopened.get("other").ok().flatten(), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_is_error() {
        let dir = make_test_dir();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{{ not json").unwrap_or_default();
        let result = FileStore::open(&path);
        assert!(matches!(result, Err(TexSauceError::Storage(_))));
    }

    #[test]
    fn failed_write_keeps_previous_values() {
        let dir = make_test_dir();
        let path = dir.path().join("storage.json");
        let store = FileStore::open(&path).unwrap_or_else(|_| unreachable!());
        assert!(store.set("k", "old").is_ok());

        // A directory where the temp file goes makes every write fail.
        std::fs::create_dir(path.with_extension("json.tmp")).unwrap_or_default();
        assert!(matches!(store.set("k", "new"), Err(TexSauceError::Storage(_))));
        assert!(store.remove("k").is_err());

        assert_eq!(store.get("k").ok().flatten().as_deref(), Some("old"));
        let reopened = FileStore::open(&path).unwrap_or_else(|_| unreachable!());
        assert_eq!(reopened.get("k").ok().flatten().as_deref(), Some("old"));
    }
}

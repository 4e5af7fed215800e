//! Local key/value persistence.
//!
//! [`KeyValueStore`] is a flat string-to-string store. [`FileStore`] keeps
//! it in one JSON document on disk; [`MemoryStore`] is for tests and
//! ephemeral sessions.

mod file_store;

pub use file_store::FileStore;

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{Result, TexSauceError};

/// Storage keys used by the settings and prompt stores.
pub mod keys {
    /// JSON array of prompt templates.
    pub const PROMPTS: &str = "tex_sauce_prompts";
    /// Gemini API key.
    pub const API_KEY: &str = "tex_sauce_api_key";
    /// Id of the selected prompt template.
    pub const SELECTED_PROMPT: &str = "tex_sauce_selected_prompt_id";
    /// Model identifier.
    pub const MODEL_NAME: &str = "tex_sauce_model_name";
    /// `"true"` / `"false"`.
    pub const SOUND_ENABLED: &str = "tex_sauce_sound_enabled";
}

/// Flat string key/value store.
///
/// Implementations must be safe to share between the foreground session and
/// the auto-save task.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `None` when the key was never written or was removed.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`remove` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    fn bump_writes(&self) -> Result<()> {
        let mut writes = self
            .writes
            .lock()
            .map_err(|e| TexSauceError::Storage(format!("write counter poisoned: {e}")))?;
        *writes += 1;
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| TexSauceError::Storage(format!("store lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| TexSauceError::Storage(format!("store lock poisoned: {e}")))?;
            entries.insert(key.to_owned(), value.to_owned());
        }
        self.bump_writes()
    }

    fn remove(&self, key: &str) -> Result<()> {
        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|e| TexSauceError::Storage(format!("store lock poisoned: {e}")))?;
            entries.remove(key);
        }
        self.bump_writes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").ok().flatten(), None);

        assert!(store.set("k", "v1").is_ok());
        assert!(store.set("k", "v2").is_ok());
        assert_eq!(store.get("k").ok().flatten().as_deref(), Some("v2"));

        assert!(store.remove("k").is_ok());
        assert_eq!(store.get("k").ok().flatten(), None);
        assert_eq!(store.write_count(), 3);
    }

    #[test]
    fn removing_missing_key_is_ok() {
        let store = MemoryStore::new();
        assert!(store.remove("never-written").is_ok());
    }
}

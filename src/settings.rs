//! Persisted user settings: API key, model identifier, sound flag.

use tracing::info;

use crate::error::{Result, TexSauceError};
use crate::storage::{KeyValueStore, keys};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "gemini-3.1-pro-preview";

/// User settings.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    /// Gemini API key. Empty when not configured.
    pub api_key: String,
    /// Model identifier, never blank after [`Settings::load`].
    pub model: String,
    /// Play a cue when a generation succeeds.
    pub sound_enabled: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &redact_key(&self.api_key))
            .field("model", &self.model)
            .field("sound_enabled", &self.sound_enabled)
            .finish()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_owned(),
            sound_enabled: true,
        }
    }
}

impl Settings {
    /// Load settings from the store.
    ///
    /// A missing model falls back to [`DEFAULT_MODEL`]; a missing sound flag
    /// means enabled.
    ///
    /// # Errors
    ///
    /// Propagates store read failures.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let api_key = store.get(keys::API_KEY)?.unwrap_or_default();
        let model = store
            .get(keys::MODEL_NAME)?
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_owned());
        let sound_enabled = match store.get(keys::SOUND_ENABLED)? {
            None => true,
            Some(v) => v == "true",
        };
        Ok(Self {
            api_key,
            model,
            sound_enabled,
        })
    }

    /// Validate and persist new settings, returning the stored values.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Validation`] when the trimmed API key is empty;
    /// store write failures otherwise.
    pub fn save(
        store: &dyn KeyValueStore,
        api_key: &str,
        model: &str,
        sound_enabled: bool,
    ) -> Result<Self> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(TexSauceError::Validation("API key is required".into()));
        }
        let model = match model.trim() {
            "" => DEFAULT_MODEL,
            m => m,
        };

        store.set(keys::API_KEY, api_key)?;
        store.set(keys::MODEL_NAME, model)?;
        store.set(
            keys::SOUND_ENABLED,
            if sound_enabled { "true" } else { "false" },
        )?;
        info!(model, sound_enabled, "settings saved");

        Ok(Self {
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            sound_enabled,
        })
    }

    /// Whether an API key is configured.
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// API key with everything but the last four characters masked.
    pub fn masked_api_key(&self) -> String {
        redact_key(&self.api_key)
    }
}

fn redact_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{tail}", "*".repeat(chars.len() - 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn empty_store_loads_defaults() {
        let store = MemoryStore::new();
        let settings = Settings::load(&store).unwrap_or_default();
        assert_eq!(settings.api_key, "");
        assert_eq!(settings.model, DEFAULT_MODEL);
        assert!(settings.sound_enabled);
        assert!(!settings.has_api_key());
    }

    #[test]
    fn sound_flag_only_true_for_literal_true() {
        let store = MemoryStore::new();
        let _ = store.set(keys::SOUND_ENABLED, "false");
        assert!(!Settings::load(&store).unwrap_or_default().sound_enabled);
        let _ = store.set(keys::SOUND_ENABLED, "yes");
        assert!(!Settings::load(&store).unwrap_or_default().sound_enabled);
        let _ = store.set(keys::SOUND_ENABLED, "true");
        assert!(Settings::load(&store).unwrap_or_default().sound_enabled);
    }

    #[test]
    fn blank_model_loads_default() {
        let store = MemoryStore::new();
        let _ = store.set(keys::MODEL_NAME, "   ");
        assert_eq!(Settings::load(&store).unwrap_or_default().model, DEFAULT_MODEL);
    }

    #[test]
    fn save_requires_api_key() {
        let store = MemoryStore::new();
        let result = Settings::save(&store, "   ", "gemini-2.5-flash", true);
        assert!(matches!(result, Err(TexSauceError::Validation(_))));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn save_trims_and_defaults_model() {
        let store = MemoryStore::new();
        let saved = Settings::save(&store, "  key-123  ", "", false).unwrap_or_default();
        assert_eq!(saved.api_key, "key-123");
        assert_eq!(saved.model, DEFAULT_MODEL);

        let loaded = Settings::load(&store).unwrap_or_default();
        assert_eq!(loaded, saved);
        assert_eq!(
            store.get(keys::SOUND_ENABLED).ok().flatten().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn debug_output_masks_api_key() {
        let settings = Settings {
            api_key: "AIzaSecretKey9876".into(),
            ..Settings::default()
        };
        let debug = format!("{settings:?}");
        assert!(!debug.contains("AIzaSecretKey"));
        assert!(debug.contains("9876"));
    }
}

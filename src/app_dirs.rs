//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/tex-sauce/` | `~/.local/share/tex-sauce/` |
//! | Config | `~/Library/Application Support/tex-sauce/` | `~/.config/tex-sauce/` |
//!
//! Overrides: `TEX_SAUCE_DATA_DIR` for [`data_dir`], `TEX_SAUCE_CONFIG_DIR`
//! for [`config_dir`].

use std::path::PathBuf;

const APP_DIR_NAME: &str = "tex-sauce";

/// Application data root (key/value store, logs).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TEX_SAUCE_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/tex-sauce-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TEX_SAUCE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("/tmp/tex-sauce-config"))
}

/// Key/value store file (`data_dir()/storage.json`).
#[must_use]
pub fn storage_file() -> PathBuf {
    data_dir().join("storage.json")
}

/// Config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_file_lives_in_data_dir() {
        assert!(storage_file().starts_with(data_dir()));
        assert!(storage_file().ends_with("storage.json"));
    }

    #[test]
    fn config_file_is_toml() {
        let path = config_file();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}

//! Configuration types loaded from `config.toml`.
//!
//! Every field has a default, so an empty or missing file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, TexSauceError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote API settings.
    pub api: ApiConfig,
    /// File intake settings.
    pub intake: IntakeConfig,
    /// Prompt store settings.
    pub prompts: PromptsConfig,
    /// Output rendering settings.
    pub render: RenderConfig,
}

/// Generation endpoint configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL up to and including the API version segment.
    pub base_url: String,
    /// Sampling temperature. Low values favor faithful transcription.
    pub temperature: f32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_owned(),
            temperature: 0.2,
        }
    }
}

/// Image and PDF intake configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    /// Upscale factor applied when rasterizing a PDF page (1.0 = 72 dpi).
    pub pdf_scale: f32,
    /// JPEG quality (1-100) for rasterized PDF pages.
    pub jpeg_quality: u8,
    /// Explicit path to `pdftoppm`. `None` searches `PATH`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdftoppm_path: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            pdf_scale: 2.0,
            jpeg_quality: 90,
            pdftoppm_path: None,
        }
    }
}

/// Prompt store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Quiet period after the last live edit before it is persisted.
    pub autosave_debounce_ms: u64,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            autosave_debounce_ms: 500,
        }
    }
}

/// Output rendering configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// syntect theme name.
    pub theme: String,
    /// syntect syntax token used for the first highlighting pass.
    pub language: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            theme: "base16-ocean.dark".to_owned(),
            language: "latex".to_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            TexSauceError::Config(format!(
                "failed to parse config file '{}': {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TexSauceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TexSauceError::Config`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            return Err(TexSauceError::Config("api.base_url must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(TexSauceError::Config(format!(
                "api.temperature must be within 0.0..=2.0, got {}",
                self.api.temperature
            )));
        }
        if !(self.intake.pdf_scale > 0.0 && self.intake.pdf_scale <= 8.0) {
            return Err(TexSauceError::Config(format!(
                "intake.pdf_scale must be within (0, 8], got {}",
                self.intake.pdf_scale
            )));
        }
        if !(1..=100).contains(&self.intake.jpeg_quality) {
            return Err(TexSauceError::Config(format!(
                "intake.jpeg_quality must be within 1..=100, got {}",
                self.intake.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(
            config.api.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert!((config.api.temperature - 0.2).abs() < f32::EPSILON);
        assert!((config.intake.pdf_scale - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.intake.jpeg_quality, 90);
        assert_eq!(config.prompts.autosave_debounce_ms, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir creation should not fail"),
        };
        let path = dir.path().join("sub").join("config.toml");

        let mut config = AppConfig::default();
        config.api.base_url = "http://localhost:9999/v1beta".into();
        config.intake.pdftoppm_path = Some(PathBuf::from("/opt/poppler/bin/pdftoppm"));
        config.render.theme = "InspiredGitHub".into();

        assert!(config.save_to_file(&path).is_ok());
        let loaded = AppConfig::from_file(&path);
        assert!(loaded.is_ok());
        assert_eq!(loaded.unwrap_or_default(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: std::result::Result<AppConfig, _> =
            toml::from_str("[api]\ntemperature = 0.5\n");
        let config = parsed.unwrap_or_default();
        assert!((config.api.temperature - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.intake.jpeg_quality, 90);
    }

    #[test]
    fn missing_file_loads_defaults() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/tex-sauce/config.toml"));
        assert!(config.is_ok());
    }

    #[test]
    fn from_file_invalid_toml_returns_error() {
        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(_) => unreachable!("tempdir creation should not fail"),
        };
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "this is not valid toml {{{").ok();
        assert!(AppConfig::from_file(&path).is_err());
    }

    #[test]
    fn out_of_range_quality_is_rejected() {
        let mut config = AppConfig::default();
        config.intake.jpeg_quality = 0;
        assert!(matches!(config.validate(), Err(TexSauceError::Config(_))));
    }
}

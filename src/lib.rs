//! TeX Sauce: turn photos and scans of handwritten or printed math into
//! LaTeX with a vision-language model.
//!
//! # Architecture
//!
//! - **Storage**: a string key/value store backing settings and templates
//! - **Prompts**: named prompt templates with import/export and auto-save
//! - **Intake**: images and PDFs (first page) normalized to inline base64
//! - **Gemini**: one `generateContent` request per generation
//! - **Generation**: session state and the guarded generate/regenerate flow
//! - **Render**: syntax and TeX-token highlighting for HTML or the terminal

pub mod app_dirs;
pub mod config;
pub mod cue;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod intake;
pub mod prompts;
pub mod render;
pub mod settings;
pub mod storage;

pub use config::AppConfig;
pub use error::{Result, TexSauceError};
pub use generation::{GenerateOutcome, Orchestrator, Session};
pub use settings::Settings;

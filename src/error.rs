//! Error types for tex-sauce.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`TexSauceError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// A required field was empty or referenced an unknown entry.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

    /// A file was neither an image nor a PDF.
    pub const UNSUPPORTED_INPUT: &str = "UNSUPPORTED_INPUT";

    /// Network or HTTP failure talking to the generation endpoint.
    pub const TRANSPORT_FAILED: &str = "TRANSPORT_FAILED";

    /// An import document was not an array of template records.
    pub const MALFORMED_IMPORT: &str = "MALFORMED_IMPORT";

    /// Image decode/encode or PDF rasterization failed.
    pub const IMAGE_FAILED: &str = "IMAGE_FAILED";

    /// The key/value store could not be read or written.
    pub const STORAGE_FAILED: &str = "STORAGE_FAILED";

    /// Invalid or unreadable configuration.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// Plain I/O failure.
    pub const IO_ERROR: &str = "IO_ERROR";
}

/// Top-level error type.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum TexSauceError {
    /// Empty required field, unknown id, or similar user input problem.
    #[error("[{}] {}", error_codes::VALIDATION_FAILED, .0)]
    Validation(String),

    /// File type neither `image/*` nor `application/pdf`.
    #[error("[{}] {}", error_codes::UNSUPPORTED_INPUT, .0)]
    UnsupportedInput(String),

    /// Network or HTTP failure. `status` is set when the server answered.
    #[error("[{}] {message}", error_codes::TRANSPORT_FAILED)]
    Transport {
        /// HTTP status code, if a response was received.
        status: Option<u16>,
        /// Server-reported status name such as `INVALID_ARGUMENT`.
        reason: Option<String>,
        /// Server-reported message, or the status reason.
        message: String,
    },

    /// Import document is not a well-formed list of templates.
    #[error("[{}] {}", error_codes::MALFORMED_IMPORT, .0)]
    MalformedImport(String),

    /// Image decode, encode, or PDF rasterization failure.
    #[error("[{}] {}", error_codes::IMAGE_FAILED, .0)]
    Image(String),

    /// Key/value store failure.
    #[error("[{}] {}", error_codes::STORAGE_FAILED, .0)]
    Storage(String),

    /// Configuration failure.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    Config(String),

    /// I/O error.
    #[error("[{}] {}", error_codes::IO_ERROR, .0)]
    Io(#[from] std::io::Error),
}

impl TexSauceError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => error_codes::VALIDATION_FAILED,
            Self::UnsupportedInput(_) => error_codes::UNSUPPORTED_INPUT,
            Self::Transport { .. } => error_codes::TRANSPORT_FAILED,
            Self::MalformedImport(_) => error_codes::MALFORMED_IMPORT,
            Self::Image(_) => error_codes::IMAGE_FAILED,
            Self::Storage(_) => error_codes::STORAGE_FAILED,
            Self::Config(_) => error_codes::CONFIG_INVALID,
            Self::Io(_) => error_codes::IO_ERROR,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::UnsupportedInput(m)
            | Self::MalformedImport(m)
            | Self::Image(m)
            | Self::Storage(m)
            | Self::Config(m) => m.clone(),
            Self::Transport { message, .. } => message.clone(),
            Self::Io(e) => e.to_string(),
        }
    }

    /// HTTP status attached to a transport failure, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Server-reported status name attached to a transport failure, if any.
    pub fn api_reason(&self) -> Option<&str> {
        match self {
            Self::Transport { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TexSauceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_code() {
        let err = TexSauceError::Validation("name is empty".into());
        assert_eq!(err.code(), "VALIDATION_FAILED");
    }

    #[test]
    fn transport_error_carries_status() {
        let err = TexSauceError::Transport {
            status: Some(401),
            reason: Some("UNAUTHENTICATED".into()),
            message: "API key not valid".into(),
        };
        assert_eq!(err.code(), "TRANSPORT_FAILED");
        assert_eq!(err.http_status(), Some(401));
        assert_eq!(err.api_reason(), Some("UNAUTHENTICATED"));
        assert_eq!(err.message(), "API key not valid");
    }

    #[test]
    fn display_includes_code_prefix() {
        let err = TexSauceError::MalformedImport("expected an array".into());
        let display = format!("{err}");
        assert!(display.starts_with("[MALFORMED_IMPORT]"));
        assert!(display.contains("expected an array"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TexSauceError = io.into();
        assert_eq!(err.code(), "IO_ERROR");
        assert!(err.message().contains("gone"));
    }

    #[test]
    fn all_codes_are_screaming_snake_case() {
        let errors: Vec<TexSauceError> = vec![
            TexSauceError::Validation("x".into()),
            TexSauceError::UnsupportedInput("x".into()),
            TexSauceError::Transport {
                status: None,
                reason: None,
                message: "x".into(),
            },
            TexSauceError::MalformedImport("x".into()),
            TexSauceError::Image("x".into()),
            TexSauceError::Storage("x".into()),
            TexSauceError::Config("x".into()),
        ];
        for err in &errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "code {code:?} is not SCREAMING_SNAKE_CASE"
            );
        }
    }

    #[test]
    fn error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TexSauceError>();
    }
}

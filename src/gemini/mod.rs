//! Gemini `generateContent` client.
//!
//! One request per generation: a text part followed by one inline image part
//! per pending image, in intake order. Non-2xx responses and transport
//! failures are normalized into [`TexSauceError::Transport`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use tex_sauce::config::ApiConfig;
//! use tex_sauce::gemini::{GeminiClient, VisionClient};
//! use tex_sauce::settings::Settings;
//!
//! # async fn example() -> tex_sauce::Result<()> {
//! let client = GeminiClient::new(&ApiConfig::default());
//! let settings = Settings { api_key: "AIza...".into(), ..Settings::default() };
//! let text = client.generate(&settings, "Transcribe the formula.", &[]).await?;
//! # Ok(())
//! # }
//! ```

mod types;

pub use types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::error::{Result, TexSauceError};
use crate::intake::PendingImage;
use crate::settings::Settings;

/// Sends a prompt plus images to a vision-language model.
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Return the model's text for `prompt_text` and `images`.
    async fn generate(
        &self,
        settings: &Settings,
        prompt_text: &str,
        images: &[PendingImage],
    ) -> Result<String>;
}

/// HTTP client for the Gemini generative-language API.
pub struct GeminiClient {
    base_url: String,
    temperature: f32,
    client: reqwest::Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl GeminiClient {
    /// Create a client for the configured endpoint.
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            temperature: config.temperature,
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint URL for `model`, without the credential.
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    /// Map an HTTP error status and body to a transport error.
    fn map_http_error(status: reqwest::StatusCode, body: &str) -> TexSauceError {
        let detail = extract_error_detail(body);
        let message = detail.message.unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_owned)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        });
        TexSauceError::Transport {
            status: Some(status.as_u16()),
            reason: detail.status,
            message,
        }
    }
}

/// Build the request body.
pub fn build_request<'a>(
    prompt_text: &'a str,
    images: &'a [PendingImage],
    temperature: f32,
) -> GenerateContentRequest<'a> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(Part::Text { text: prompt_text });
    parts.extend(images.iter().map(|img| Part::InlineData {
        inline_data: InlineData {
            mime_type: &img.mime_type,
            data: &img.base64_data,
        },
    }));
    GenerateContentRequest {
        contents: vec![Content { parts }],
        generation_config: GenerationConfig { temperature },
    }
}

/// `error.message` and `error.status` from an error body.
#[derive(Debug, Default)]
struct ErrorDetail {
    message: Option<String>,
    status: Option<String>,
}

fn extract_error_detail(body: &str) -> ErrorDetail {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return ErrorDetail::default();
    };
    let field = |name: &str| {
        value
            .get("error")
            .and_then(|e| e.get(name))
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(String::from)
    };
    ErrorDetail {
        message: field("message"),
        status: field("status"),
    }
}

/// Whether a failure looks like a bad or missing API key.
///
/// The API does not guarantee a structured code for this, so it is a
/// heuristic over the status and message text.
pub fn looks_like_auth_failure(status: Option<u16>, message: &str) -> bool {
    status == Some(401) || message.contains("401") || message.contains("INVALID_ARGUMENT")
}

/// [`looks_like_auth_failure`] over an error, also checking the
/// server-reported status name. Gemini answers a bad key with HTTP 400,
/// `status: "INVALID_ARGUMENT"` and a message that names neither.
pub fn is_auth_failure(err: &TexSauceError) -> bool {
    let reason = err.api_reason().unwrap_or_default();
    looks_like_auth_failure(err.http_status(), &err.message())
        || matches!(reason, "INVALID_ARGUMENT" | "UNAUTHENTICATED")
}

#[async_trait]
impl VisionClient for GeminiClient {
    async fn generate(
        &self,
        settings: &Settings,
        prompt_text: &str,
        images: &[PendingImage],
    ) -> Result<String> {
        let url = self.endpoint(&settings.model);
        let body = build_request(prompt_text, images, self.temperature);
        info!(model = %settings.model, images = images.len(), "sending generation request");
        debug!(%url, prompt_chars = prompt_text.chars().count(), "request target");

        let response = self
            .client
            .post(&url)
            .query(&[("key", settings.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TexSauceError::Transport {
                status: None,
                reason: None,
                // Strip the URL so the key in the query never leaks into output.
                message: format!("request failed: {}", e.without_url()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let err = Self::map_http_error(status, &body_text);
            warn!(status = status.as_u16(), "generation request rejected: {err}");
            return Err(err);
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| TexSauceError::Transport {
                status: Some(status.as_u16()),
                reason: None,
                message: format!("invalid response body: {}", e.without_url()),
            })?;

        parsed.first_text().ok_or_else(|| TexSauceError::Transport {
            status: Some(status.as_u16()),
            reason: None,
            message: "response contained no text".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IncomingFile;

    fn image(mime: &str, data: &str) -> PendingImage {
        PendingImage::new(
            IncomingFile::new("/tmp/x", "x", mime),
            data.to_owned(),
            mime.to_owned(),
        )
    }

    #[test]
    fn request_body_shape() {
        let images = vec![image("image/png", "AAA"), image("image/jpeg", "BBB")];
        let body = serde_json::to_value(build_request("prompt", &images, 0.2))
            .unwrap_or_default();

        let parts = &body["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "prompt");
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
        assert_eq!(parts[1]["inline_data"]["data"], "AAA");
        assert_eq!(parts[2]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(parts.as_array().map(Vec::len), Some(3));
        let temp = body["generationConfig"]["temperature"].as_f64().unwrap_or(0.0);
        assert!((temp - 0.2).abs() < 1e-6);
    }

    #[test]
    fn endpoint_includes_model_and_trims_slash() {
        let config = ApiConfig {
            base_url: "http://localhost:1234/v1beta/".into(),
            ..ApiConfig::default()
        };
        let client = GeminiClient::new(&config);
        assert_eq!(
            client.endpoint("gemini-2.5-pro"),
            "http://localhost:1234/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn http_error_uses_server_message() {
        let err = GeminiClient::map_http_error(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#,
        );
        assert_eq!(err.http_status(), Some(400));
        assert_eq!(err.message(), "API key not valid.");
        assert_eq!(err.api_reason(), Some("INVALID_ARGUMENT"));
        assert!(is_auth_failure(&err));
    }

    #[test]
    fn http_error_falls_back_to_status_text() {
        let err = GeminiClient::map_http_error(
            reqwest::StatusCode::SERVICE_UNAVAILABLE,
            "<html>upstream down</html>",
        );
        assert_eq!(err.message(), "Service Unavailable");
        assert_eq!(err.api_reason(), None);
        assert!(!is_auth_failure(&err));
    }

    #[test]
    fn auth_heuristic() {
        assert!(looks_like_auth_failure(Some(401), "Unauthorized"));
        assert!(looks_like_auth_failure(None, "Request had INVALID_ARGUMENT"));
        assert!(looks_like_auth_failure(None, "HTTP 401"));
        assert!(!looks_like_auth_failure(Some(500), "Internal error"));
    }

    #[test]
    fn quota_errors_are_not_auth_failures() {
        let err = GeminiClient::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"code":429,"message":"Quota exceeded.","status":"RESOURCE_EXHAUSTED"}}"#,
        );
        assert!(!is_auth_failure(&err));
    }
}

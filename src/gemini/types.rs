//! Wire types for `models/{model}:generateContent`.

use serde::{Deserialize, Serialize};

/// Request body.
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest<'a> {
    /// A single content entry holding all parts.
    pub contents: Vec<Content<'a>>,
    /// Sampling settings.
    #[serde(rename = "generationConfig")]
    pub generation_config: GenerationConfig,
}

/// One content entry.
#[derive(Debug, Serialize)]
pub struct Content<'a> {
    /// Text first, then images.
    pub parts: Vec<Part<'a>>,
}

/// A request part.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Part<'a> {
    /// Prompt text.
    Text {
        /// The text.
        text: &'a str,
    },
    /// Base64 image.
    InlineData {
        /// The payload.
        inline_data: InlineData<'a>,
    },
}

/// Inline image payload.
#[derive(Debug, Serialize)]
pub struct InlineData<'a> {
    /// e.g. `image/png`.
    pub mime_type: &'a str,
    /// Standard base64.
    pub data: &'a str,
}

/// Sampling settings.
#[derive(Debug, Serialize)]
pub struct GenerationConfig {
    /// Sampling temperature.
    pub temperature: f32,
}

/// Success response body. Only the fields we read are modeled.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// `candidates[0].content.parts[0].text`.
    pub fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_text_reads_first_candidate_part() {
        let body = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "first"}, {"text": "second"}], "role": "model"},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "other candidate"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 10}
        }"#;
        let parsed: GenerateContentResponse =
            serde_json::from_str(body).unwrap_or_default();
        assert_eq!(parsed.first_text().as_deref(), Some("first"));
    }

    #[test]
    fn missing_candidates_yield_none() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
                .unwrap_or_default();
        assert_eq!(parsed.first_text(), None);
    }
}

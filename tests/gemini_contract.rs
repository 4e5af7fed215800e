//! Gemini client contract tests
//!
//! Verify the HTTP shape of `generateContent` calls against a mock server:
//! request body and credential placement, success parsing, and how error
//! responses are normalized into `TexSauceError::Transport`.

use serde_json::{Value, json};
use tex_sauce::TexSauceError;
use tex_sauce::config::ApiConfig;
use tex_sauce::gemini::{GeminiClient, VisionClient, is_auth_failure};
use tex_sauce::intake::{IncomingFile, PendingImage};
use tex_sauce::settings::Settings;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL_PATH: &str = "/v1beta/models/gemini-test:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    GeminiClient::new(&ApiConfig {
        base_url: format!("{}/v1beta", server.uri()),
        ..ApiConfig::default()
    })
}

fn settings() -> Settings {
    Settings {
        api_key: "test-key".into(),
        model: "gemini-test".into(),
        sound_enabled: false,
    }
}

fn image(name: &str, mime: &str, data: &str) -> PendingImage {
    PendingImage::new(
        IncomingFile::new(format!("/tmp/{name}"), name, mime),
        data.to_owned(),
        mime.to_owned(),
    )
}

fn success_body(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Request format
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_carries_key_prompt_and_images_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(query_param("key", "test-key"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let images = vec![
        image("first.png", "image/png", "AAAA"),
        image("second.pdf", "image/jpeg", "BBBB"),
    ];
    let result = client_for(&server)
        .generate(&settings(), "Transcribe both.", &images)
        .await;
    assert!(result.is_ok(), "request should succeed: {result:?}");

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap_or_default();

    let parts = &body["contents"][0]["parts"];
    assert_eq!(parts[0]["text"], "Transcribe both.");
    assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
    assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
    assert_eq!(parts[2]["inline_data"]["mime_type"], "image/jpeg");
    assert_eq!(parts[2]["inline_data"]["data"], "BBBB");
    assert_eq!(body["contents"].as_array().map(Vec::len), Some(1));

    let temperature = body["generationConfig"]["temperature"]
        .as_f64()
        .unwrap_or(f64::NAN);
    assert!((temperature - 0.2).abs() < 1e-6);
}

#[tokio::test]
async fn test_model_name_selects_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-other:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let settings = Settings {
        model: "gemini-other".into(),
        ..settings()
    };
    let result = client_for(&server).generate(&settings, "p", &[]).await;
    assert!(result.is_ok());
}

// ────────────────────────────────────────────────────────────────────────────
// Response parsing
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_returns_first_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(success_body("```texsauce\n\\frac{a}{b}\n```")),
        )
        .mount(&server)
        .await;

    let text = client_for(&server)
        .generate(&settings(), "p", &[image("a.png", "image/png", "AA")])
        .await;
    assert_eq!(text.ok().as_deref(), Some("```texsauce\n\\frac{a}{b}\n```"));
}

#[tokio::test]
async fn test_missing_candidates_is_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"promptFeedback": {"blockReason": "SAFETY"}})),
        )
        .mount(&server)
        .await;

    let result = client_for(&server).generate(&settings(), "p", &[]).await;
    match result {
        Err(TexSauceError::Transport {
            status, message, ..
        }) => {
            assert_eq!(status, Some(200));
            assert!(message.contains("no text"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Error mapping
// ────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_error_message_comes_from_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        })))
        .mount(&server)
        .await;

    let err = match client_for(&server).generate(&settings(), "p", &[]).await {
        Err(e) => e,
        Ok(text) => panic!("expected error, got {text}"),
    };
    assert_eq!(err.code(), "TRANSPORT_FAILED");
    assert_eq!(err.http_status(), Some(400));
    assert_eq!(
        err.message(),
        "API key not valid. Please pass a valid API key."
    );
    assert_eq!(err.api_reason(), Some("INVALID_ARGUMENT"));
    assert!(is_auth_failure(&err));
}

#[tokio::test]
async fn test_error_without_json_uses_status_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
        .mount(&server)
        .await;

    let err = match client_for(&server).generate(&settings(), "p", &[]).await {
        Err(e) => e,
        Ok(text) => panic!("expected error, got {text}"),
    };
    assert_eq!(err.http_status(), Some(503));
    assert_eq!(err.message(), "Service Unavailable");
}

#[tokio::test]
async fn test_unauthorized_is_flagged_as_auth_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": {"code": 401, "message": "Request is missing credentials.", "status": "UNAUTHENTICATED"}
        })))
        .mount(&server)
        .await;

    let err = match client_for(&server).generate(&settings(), "p", &[]).await {
        Err(e) => e,
        Ok(text) => panic!("expected error, got {text}"),
    };
    assert!(is_auth_failure(&err));
}

#[tokio::test]
async fn test_connection_failure_does_not_leak_key() {
    let client = GeminiClient::new(&ApiConfig {
        base_url: "http://127.0.0.1:1/v1beta".into(),
        ..ApiConfig::default()
    });

    let err = match client.generate(&settings(), "p", &[]).await {
        Err(e) => e,
        Ok(text) => panic!("expected error, got {text}"),
    };
    assert_eq!(err.http_status(), None);
    assert!(!err.to_string().contains("test-key"));
}

use assert_matches::assert_matches;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use techcode::api::{ApiClient, CodeModel, ModelRequest, Source};
use techcode::error::GenerationError;
use techcode::generator::{GenerateOptions, GenerationClient, Progress};
use tokio::sync::mpsc;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MODEL: &str = "gemini-test";

fn sse(events: &[serde_json::Value]) -> String {
    events.iter().map(|e| format!("data: {}\n\n", e)).collect()
}

fn gemini_delta(text: &str) -> serde_json::Value {
    json!({ "candidates": [{ "content": { "role": "model", "parts": [{ "text": text }] } }] })
}

fn openai_delta(text: &str) -> serde_json::Value {
    json!({ "choices": [{ "index": 0, "delta": { "content": text } }] })
}

fn gemini(server: &MockServer, key: &str) -> ApiClient {
    ApiClient::new("gemini", &server.uri(), key, MODEL, Duration::from_secs(5)).unwrap()
}

fn openai(server: &MockServer) -> ApiClient {
    ApiClient::new("openai", &server.uri(), "sk-test", "gpt-test", Duration::from_secs(5)).unwrap()
}

fn event_stream(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

#[tokio::test]
async fn gemini_stream_yields_text_deltas() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{}:streamGenerateContent", MODEL)))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(event_stream(sse(&[gemini_delta("<html>"), gemini_delta("</html>")])))
        .expect(1)
        .mount(&server)
        .await;

    let client = gemini(&server, "g-key");
    let deltas: Vec<_> = client
        .stream(ModelRequest::new("system", "a page"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(deltas, vec![Ok("<html>".to_string()), Ok("</html>".to_string())]);
}

#[tokio::test]
async fn openai_stream_stops_at_done() {
    let server = MockServer::start().await;
    let mut body = sse(&[openai_delta("<p>"), openai_delta("hi</p>")]);
    body.push_str("data: [DONE]\n\n");
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({ "model": "gpt-test", "stream": true })))
        .respond_with(event_stream(body))
        .mount(&server)
        .await;

    let deltas: Vec<_> = openai(&server)
        .stream(ModelRequest::new("system", "a page"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(deltas, vec![Ok("<p>".to_string()), Ok("hi</p>".to_string())]);
}

#[tokio::test]
async fn quota_errors_map_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(429)
                .set_body_json(json!({ "error": { "code": 429, "message": "Resource has been exhausted" } })),
        )
        .mount(&server)
        .await;

    let err = gemini(&server, "g-key").complete(ModelRequest::new("s", "p")).await.unwrap_err();

    assert_eq!(err, GenerationError::RateLimited);
}

#[tokio::test]
async fn rejected_keys_map_to_auth_config() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": { "message": "Incorrect API key provided" } })),
        )
        .mount(&server)
        .await;

    let err = openai(&server).stream(ModelRequest::new("s", "p")).await.err().unwrap();
    assert_matches!(err, GenerationError::AuthConfig(_));
}

#[tokio::test]
async fn missing_gemini_key_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = gemini(&server, "").complete(ModelRequest::new("s", "p")).await.unwrap_err();
    assert_matches!(err, GenerationError::AuthConfig(_));
}

#[tokio::test]
async fn safety_finish_reason_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{}:generateContent", MODEL)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "finishReason": "SAFETY", "content": { "parts": [] } }]
        })))
        .mount(&server)
        .await;

    let err = gemini(&server, "g-key").complete(ModelRequest::new("s", "p")).await.unwrap_err();
    assert_eq!(err, GenerationError::SafetyBlocked);
}

#[tokio::test]
async fn research_returns_grounding_sources() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{}:generateContent", MODEL)))
        .and(body_partial_json(json!({ "tools": [{ "google_search": {} }] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Open daily from 8." }] },
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://example.com/hours", "title": "Opening hours" } },
                    { "web": { "uri": "https://example.com/menu" } },
                    { "web": { "uri": "", "title": "blank" } }
                ] }
            }]
        })))
        .mount(&server)
        .await;

    let grounding = gemini(&server, "g-key").research("bakery hours").await.unwrap();

    assert_eq!(grounding.text, "Open daily from 8.");
    assert_eq!(
        grounding.sources,
        vec![
            Source { title: "Opening hours".into(), uri: "https://example.com/hours".into() },
            Source { title: "https://example.com/menu".into(), uri: "https://example.com/menu".into() },
        ]
    );
}

#[tokio::test]
async fn generation_over_http_strips_fences() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1beta/models/{}:streamGenerateContent", MODEL)))
        .respond_with(event_stream(sse(&[
            gemini_delta("Here you go:\n```html\n<html>"),
            gemini_delta("<body>ok</body></html>\n```\nEnjoy!"),
        ])))
        .mount(&server)
        .await;

    let client = GenerationClient::new(Arc::new(gemini(&server, "g-key")));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let site = client.generate("a page", &GenerateOptions::default(), tx).await.unwrap();

    assert_eq!(site.code, "<html><body>ok</body></html>");
    let mut last_seq = 0;
    while let Some(progress) = rx.recv().await {
        if let Progress::Chunk { seq, text } = progress {
            assert_eq!(seq, last_seq + 1);
            assert!(!text.contains("```"));
            last_seq = seq;
        }
    }
    assert_eq!(last_seq, 2);
}

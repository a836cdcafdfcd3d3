//! HTTP transport to the generative-model service.
//!
//! [`CodeModel`] is the seam the rest of the crate talks to; [`ApiClient`]
//! implements it for Gemini and OpenAI-compatible endpoints.

use crate::config::AiConfig;
use crate::error::{GenerationError, GenerationResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use eventsource_stream::Eventsource;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;

/// A citation returned by a grounding search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

/// An image or document attached to a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub data_base64: String,
    pub mime_type: String,
}

impl MediaAttachment {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading attachment {}", path.display()))?;
        Ok(Self::from_bytes(&bytes, mime_for_path(path)))
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_base64)
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "html" | "htm" => "text/html",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub media: Vec<MediaAttachment>,
}

impl ModelRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            prompt: prompt.into(),
            media: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: Vec<MediaAttachment>) -> Self {
        self.media = media;
        self
    }
}

/// Result of a research pass: summary text plus the pages it cites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grounding {
    pub text: String,
    pub sources: Vec<Source>,
}

/// Stream of text deltas, in arrival order.
pub type DeltaStream = BoxStream<'static, GenerationResult<String>>;

#[async_trait]
pub trait CodeModel: Send + Sync {
    async fn stream(&self, request: ModelRequest) -> GenerationResult<DeltaStream>;

    async fn complete(&self, request: ModelRequest) -> GenerationResult<String>;

    /// Search-backed answer to `query`, with citations when the provider has them.
    async fn research(&self, query: &str) -> GenerationResult<Grounding>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIProvider {
    Gemini,
    OpenAI,
}

impl AIProvider {
    pub fn parse(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "gemini" | "google" => AIProvider::Gemini,
            _ => AIProvider::OpenAI,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    pub provider: AIProvider,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ApiClient {
    pub fn new(provider: &str, endpoint: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("techcode/0.1")
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            client,
            provider: AIProvider::parse(provider),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &AiConfig) -> Result<Self> {
        Self::new(
            &config.provider,
            &config.api_url,
            &config.resolved_api_key(),
            &config.model,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn require_key(&self) -> GenerationResult<()> {
        if self.api_key.is_empty() && self.provider == AIProvider::Gemini {
            return Err(GenerationError::AuthConfig(
                "no API key configured (set GEMINI_API_KEY or ai.api_key)".to_string(),
            ));
        }
        Ok(())
    }

    async fn post(&self, url: String, body: &Value, streaming: bool) -> GenerationResult<reqwest::Response> {
        self.require_key()?;
        let mut request = self.client.post(&url).json(body);

        request = match self.provider {
            AIProvider::Gemini => request.header("x-goog-api-key", &self.api_key),
            AIProvider::OpenAI if !self.api_key.is_empty() => request.bearer_auth(&self.api_key),
            AIProvider::OpenAI => request,
        };
        if streaming {
            request = request.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        tracing::debug!(%url, streaming, "sending model request");
        let response = request.send().await.map_err(GenerationError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(status = status.as_u16(), "model request failed");
        Err(GenerationError::classify(Some(status.as_u16()), &error_message(&body)))
    }

    fn gemini_url(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.endpoint, self.model, method)
    }

    fn gemini_body(request: &ModelRequest, search: bool) -> Value {
        let mut parts = vec![json!({ "text": request.prompt })];
        for media in &request.media {
            parts.push(json!({
                "inline_data": { "mime_type": media.mime_type, "data": media.data_base64 }
            }));
        }

        let mut body = json!({
            "contents": [{ "role": "user", "parts": parts }],
        });
        if let Some(system) = &request.system {
            body["system_instruction"] = json!({ "parts": [{ "text": system }] });
        }
        if search {
            body["tools"] = json!([{ "google_search": {} }]);
        }
        body
    }

    fn openai_body(&self, request: &ModelRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({ "role": "system", "content": system }));
        }

        let user_content = if request.media.is_empty() {
            json!(request.prompt)
        } else {
            let mut content = vec![json!({ "type": "text", "text": request.prompt })];
            for media in &request.media {
                content.push(json!({ "type": "image_url", "image_url": { "url": media.data_uri() } }));
            }
            Value::Array(content)
        };
        messages.push(json!({ "role": "user", "content": user_content }));

        json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7,
            "stream": stream,
        })
    }
}

#[async_trait]
impl CodeModel for ApiClient {
    async fn stream(&self, request: ModelRequest) -> GenerationResult<DeltaStream> {
        let (url, body) = match self.provider {
            AIProvider::Gemini => (
                format!("{}?alt=sse", self.gemini_url("streamGenerateContent")),
                Self::gemini_body(&request, false),
            ),
            AIProvider::OpenAI => (
                format!("{}/chat/completions", self.endpoint),
                self.openai_body(&request, true),
            ),
        };

        let response = self.post(url, &body, true).await?;
        let provider = self.provider;

        let deltas = response
            .bytes_stream()
            .eventsource()
            .filter_map(move |event| async move {
                match event {
                    Ok(event) => match provider {
                        AIProvider::Gemini => parse_gemini_chunk(&event.data).transpose(),
                        AIProvider::OpenAI => parse_openai_chunk(&event.data).transpose(),
                    },
                    Err(e) => Some(Err(GenerationError::Unknown(format!("stream error: {}", e)))),
                }
            });

        Ok(deltas.boxed())
    }

    async fn complete(&self, request: ModelRequest) -> GenerationResult<String> {
        match self.provider {
            AIProvider::Gemini => {
                let body = Self::gemini_body(&request, false);
                let value = self.post(self.gemini_url("generateContent"), &body, false).await?
                    .json::<Value>()
                    .await
                    .map_err(GenerationError::from_transport)?;
                Ok(gemini_text(&value)?.unwrap_or_default())
            }
            AIProvider::OpenAI => {
                let body = self.openai_body(&request, false);
                let value = self.post(format!("{}/chat/completions", self.endpoint), &body, false).await?
                    .json::<Value>()
                    .await
                    .map_err(GenerationError::from_transport)?;
                openai_message(&value)
            }
        }
    }

    async fn research(&self, query: &str) -> GenerationResult<Grounding> {
        let request = ModelRequest::new(crate::prompts::RESEARCH_SYSTEM, query);
        match self.provider {
            AIProvider::Gemini => {
                let body = Self::gemini_body(&request, true);
                let value = self.post(self.gemini_url("generateContent"), &body, false).await?
                    .json::<Value>()
                    .await
                    .map_err(GenerationError::from_transport)?;
                Ok(Grounding {
                    text: gemini_text(&value)?.unwrap_or_default(),
                    sources: gemini_sources(&value),
                })
            }
            // No search tool on the chat completions API; answer from model knowledge.
            AIProvider::OpenAI => Ok(Grounding {
                text: self.complete(request).await?,
                sources: Vec::new(),
            }),
        }
    }
}

/// Pull a readable message out of a JSON error body, if it is one.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.to_string())
}

fn gemini_text(value: &Value) -> GenerationResult<Option<String>> {
    if let Some(reason) = value.pointer("/promptFeedback/blockReason").and_then(Value::as_str) {
        tracing::warn!(reason, "prompt blocked");
        return Err(GenerationError::SafetyBlocked);
    }
    if let Some(err) = value.get("error") {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        let code = err.get("code").and_then(Value::as_u64).map(|c| c as u16);
        return Err(GenerationError::classify(code, message));
    }

    let Some(candidate) = value.pointer("/candidates/0") else {
        return Ok(None);
    };
    if matches!(
        candidate.get("finishReason").and_then(Value::as_str),
        Some("SAFETY") | Some("PROHIBITED_CONTENT") | Some("BLOCKLIST")
    ) {
        return Err(GenerationError::SafetyBlocked);
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| parts.iter().filter_map(|p| p.get("text").and_then(Value::as_str)).collect())
        .unwrap_or_default();

    Ok(if text.is_empty() { None } else { Some(text) })
}

fn gemini_sources(value: &Value) -> Vec<Source> {
    value
        .pointer("/candidates/0/groundingMetadata/groundingChunks")
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|chunk| {
                    let web = chunk.get("web")?;
                    let uri = web.get("uri").and_then(Value::as_str)?.trim();
                    if uri.is_empty() {
                        return None;
                    }
                    let title = web.get("title").and_then(Value::as_str).unwrap_or(uri);
                    Some(Source { title: title.to_string(), uri: uri.to_string() })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn parse_gemini_chunk(data: &str) -> GenerationResult<Option<String>> {
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    gemini_text(&value)
}

pub(crate) fn parse_openai_chunk(data: &str) -> GenerationResult<Option<String>> {
    // OpenAI Chat streaming sends a literal "[DONE]" when finished.
    if data.trim() == "[DONE]" {
        return Ok(None);
    }
    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    if let Some(err) = value.get("error") {
        let message = err.get("message").and_then(Value::as_str).unwrap_or("unknown error");
        return Err(GenerationError::classify(None, message));
    }
    if value.pointer("/choices/0/finish_reason").and_then(Value::as_str) == Some("content_filter") {
        return Err(GenerationError::SafetyBlocked);
    }
    Ok(value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string))
}

fn openai_message(value: &Value) -> GenerationResult<String> {
    if value.pointer("/choices/0/finish_reason").and_then(Value::as_str) == Some("content_filter") {
        return Err(GenerationError::SafetyBlocked);
    }
    value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationError::Unknown("no choices in response".to_string()))
}

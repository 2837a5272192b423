//! Gemini adapter.
//!
//! Speaks the `generateContent` API. Streaming responses arrive as
//! newline-delimited JSON objects, each carrying a partial candidate.

use crate::frame::{decode_frames, Frame};
use crate::http;
use async_trait::async_trait;
use runway_core::error::RuntimeError;
use runway_core::provider::{ChunkStream, Provider};
use runway_core::types::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Public Gemini API endpoint
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Adapter for Gemini models, registered under the `google` provider
#[derive(Clone)]
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    top_p: Option<f32>,
    top_k: Option<u32>,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("info", &self.info)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl GeminiProvider {
    /// Create a provider for the public endpoint
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::builder().api_key(api_key).build()
    }

    /// Create a builder for more configuration options
    pub fn builder() -> GeminiBuilder {
        GeminiBuilder::default()
    }

    /// Read `GEMINI_API_KEY` (and optionally `GEMINI_BASE_URL`).
    ///
    /// A missing key is not an error here; `validate` reports it so the
    /// executor can skip the candidate.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            builder = builder.api_key(key);
        }
        if let Ok(url) = std::env::var("GEMINI_BASE_URL") {
            builder = builder.base_url(url);
        }
        builder.build()
    }

    fn api_key(&self) -> Result<&str, RuntimeError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RuntimeError::configuration("GEMINI_API_KEY is not set"))
    }

    fn endpoint(&self, model: &ModelRef, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model.model, method)
    }

    fn build_body(&self, req: &RuntimeRequest) -> GenerateRequest {
        let mut parts = Vec::with_capacity(2);
        if !req.context.is_empty() {
            parts.push(Part::text(&req.context));
        }
        parts.push(Part::text(&req.prompt));

        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: req.temperature,
                max_output_tokens: req.max_tokens,
                top_p: self.top_p,
                top_k: self.top_k,
            },
        }
    }

    fn convert_response(
        response: GenerateResponse,
        model: &ModelRef,
        started: Instant,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let candidate = response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::parse("response contained no candidates"))?;

        let (content, reasoning) = candidate.split_text();
        let usage = response.usage_metadata.unwrap_or_default();
        let usage = Usage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        };

        Ok(RuntimeResponse {
            content,
            model: model.clone(),
            tokens_used: usage.total_tokens,
            latency_ms: started.elapsed().as_millis() as u64,
            usage,
            finish_reason: candidate
                .finish_reason
                .as_deref()
                .map_or(FinishReason::Stop, FinishReason::from_wire),
            reasoning,
        })
    }
}

fn decode_stream_line(line: &str) -> Result<Frame, RuntimeError> {
    // tolerate the JSON-array framing some deployments still use
    let line = line.trim_start_matches(['[', ',']).trim_end_matches([',', ']']).trim();
    if line.is_empty() {
        return Ok(Frame::Ignore);
    }

    let response: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| RuntimeError::parse(format!("invalid stream record: {e}")))?;

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Ok(Frame::Ignore);
    };
    let (text, reasoning) = candidate.split_text();
    Ok(Frame::Chunk(StreamChunk { text, reasoning }))
}

#[async_trait]
impl Provider for GeminiProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        self.api_key().map(|_| ())
    }

    async fn call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let started = Instant::now();
        let request = self
            .client
            .post(self.endpoint(model, "generateContent"))
            .query(&[("key", self.api_key()?)])
            .json(&self.build_body(req));

        let response = http::send(request, cancel).await?;
        let body: GenerateResponse = http::read_json(response, cancel).await?;
        Self::convert_response(body, model, started)
    }

    async fn stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        let request = self
            .client
            .post(self.endpoint(model, "streamGenerateContent"))
            .query(&[("key", self.api_key()?)])
            .json(&self.build_body(req));

        let response = http::send(request, cancel).await?;
        Ok(decode_frames(
            response.bytes_stream(),
            decode_stream_line,
            cancel.clone(),
        ))
    }
}

/// Builder for [`GeminiProvider`]
#[derive(Default)]
pub struct GeminiBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    top_p: Option<f32>,
    top_k: Option<u32>,
    client: Option<reqwest::Client>,
}

impl GeminiBuilder {
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Override the API base (proxies, test servers)
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Share an existing HTTP client
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> GeminiProvider {
        GeminiProvider {
            client: self.client.unwrap_or_default(),
            api_key: self.api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            top_p: self.top_p,
            top_k: self.top_k,
            info: Arc::new(ProviderInfo {
                id: "google".to_string(),
                name: "Google Gemini".to_string(),
            }),
        }
    }
}

// Wire types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            thought: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

impl Candidate {
    /// Concatenate answer parts and thought parts separately
    fn split_text(&self) -> (String, Option<String>) {
        let mut text = String::new();
        let mut thoughts = String::new();
        for part in self.content.iter().flat_map(|c| &c.parts) {
            let Some(t) = part.text.as_deref() else {
                continue;
            };
            if part.thought == Some(true) {
                thoughts.push_str(t);
            } else {
                text.push_str(t);
            }
        }
        (text, (!thoughts.is_empty()).then_some(thoughts))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::provider::collect_stream;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> GeminiProvider {
        GeminiProvider::builder()
            .api_key("test-key")
            .base_url(server.uri())
            .top_k(40)
            .build()
    }

    fn flash() -> ModelRef {
        ModelRef::new("google", "gemini-2.5-flash")
    }

    #[tokio::test]
    async fn test_generate_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(json!({
                "contents": [{
                    "role": "user",
                    "parts": [{ "text": "You are terse." }, { "text": "Say hi" }]
                }],
                "generationConfig": { "temperature": 0.2, "maxOutputTokens": 64, "topK": 40 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [
                            { "text": "planning", "thought": true },
                            { "text": "Hi" },
                            { "text": " there" }
                        ]
                    },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {
                    "promptTokenCount": 5,
                    "candidatesTokenCount": 2,
                    "totalTokenCount": 7
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let req = RuntimeRequest::new("Say hi")
            .with_context("You are terse.")
            .with_temperature(0.2)
            .with_max_tokens(64);
        let response = provider(&server)
            .call(&req, &flash(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content, "Hi there");
        assert_eq!(response.reasoning.as_deref(), Some("planning"));
        assert_eq!(response.tokens_used, 7);
        assert_eq!(response.usage.prompt_tokens, 5);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.model, flash());
    }

    #[tokio::test]
    async fn test_error_status_is_transport_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:generateContent"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model overloaded"))
            .mount(&server)
            .await;

        let err = provider(&server)
            .call(&RuntimeRequest::new("hi"), &flash(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            RuntimeError::Transport { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "model overloaded");
            }
            other => panic!("expected Transport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stream_ndjson() {
        let server = MockServer::start().await;
        let body = concat!(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}]}"#, "\n",
            "{broken\n",
            r#"{"candidates":[{"content":{"parts":[{"text":"lo"}]},"finishReason":"STOP"}]}"#, "\n",
            r#"{"usageMetadata":{"totalTokenCount":9}}"#, "\n",
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.5-flash:streamGenerateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
            .mount(&server)
            .await;

        let stream = provider(&server)
            .stream(&RuntimeRequest::new("hi"), &flash(), &CancellationToken::new())
            .await
            .unwrap();
        let collected = collect_stream(stream).await.unwrap();
        assert_eq!(collected.content, "Hello");
    }

    #[test]
    fn test_missing_key_fails_validation() {
        let provider = GeminiProvider::builder().build();
        assert!(matches!(
            provider.validate(),
            Err(RuntimeError::Configuration(_))
        ));
        assert!(GeminiProvider::new("k").validate().is_ok());
    }

    #[test]
    fn test_decode_array_framed_record() {
        let frame = decode_stream_line(r#",{"candidates":[{"content":{"parts":[{"text":"x"}]}}]}"#).unwrap();
        assert_eq!(frame, Frame::Chunk(StreamChunk::text("x")));
        assert_eq!(decode_stream_line("]").unwrap(), Frame::Ignore);
    }
}

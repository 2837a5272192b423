//! Chat-completions adapter.
//!
//! Serves two flavours of the same protocol:
//! - Azure OpenAI deployments (`api-key` header, `api-version` query)
//! - OpenAI-compatible endpoints (bearer auth), e.g. OpenAI or DeepSeek
//!
//! Streaming responses are `data:` frames terminated by `data: [DONE]`.

use crate::frame::{decode_frames, Frame};
use crate::http;
use async_trait::async_trait;
use runway_core::error::RuntimeError;
use runway_core::provider::{ChunkStream, Provider};
use runway_core::types::*;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Effort hint forwarded to reasoning models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningEffort {
    Low,
    Medium,
    High,
}

impl FromStr for ReasoningEffort {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(RuntimeError::configuration(format!(
                "invalid reasoning effort '{other}', expected low, medium or high"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum Endpoint {
    Azure {
        endpoint: Option<String>,
        deployment: Option<String>,
        api_version: String,
    },
    Compatible {
        base_url: String,
    },
}

/// Adapter for chat-completions backends
#[derive(Clone)]
pub struct ChatProvider {
    client: reqwest::Client,
    endpoint: Endpoint,
    api_key: Option<String>,
    reasoning_effort: Option<ReasoningEffort>,
    info: Arc<ProviderInfo>,
}

impl std::fmt::Debug for ChatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatProvider")
            .field("info", &self.info)
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .field("reasoning_effort", &self.reasoning_effort)
            .finish()
    }
}

impl ChatProvider {
    /// Azure OpenAI resource, registered under the `azure` provider.
    ///
    /// Requests go to `deployment` when set, else to a deployment named
    /// after the model.
    pub fn azure(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(
            Endpoint::Azure {
                endpoint: Some(endpoint.into()),
                deployment: None,
                api_version: DEFAULT_AZURE_API_VERSION.to_string(),
            },
            Some(api_key.into()),
            "azure",
            "Azure OpenAI",
        )
    }

    /// Azure settings from `AZURE_OPENAI_*` variables.
    ///
    /// Missing endpoint or key is reported by `validate`, not here.
    pub fn azure_from_env() -> Result<Self, RuntimeError> {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let mut provider = Self::new(
            Endpoint::Azure {
                endpoint: var("AZURE_OPENAI_ENDPOINT"),
                deployment: var("AZURE_OPENAI_DEPLOYMENT"),
                api_version: var("AZURE_OPENAI_API_VERSION")
                    .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_string()),
            },
            var("AZURE_OPENAI_API_KEY"),
            "azure",
            "Azure OpenAI",
        );
        if let Some(effort) = var("AZURE_OPENAI_REASONING_EFFORT") {
            provider.reasoning_effort = Some(effort.parse()?);
        }
        Ok(provider)
    }

    /// OpenAI itself, registered under the `openai` provider
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::compatible("openai", "OpenAI", OPENAI_BASE_URL, api_key)
    }

    /// Any endpoint speaking the OpenAI protocol
    pub fn compatible(
        provider_id: impl Into<String>,
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self::new(
            Endpoint::Compatible {
                base_url: base_url.into(),
            },
            Some(api_key.into()),
            provider_id,
            provider_name,
        )
    }

    fn new(
        endpoint: Endpoint,
        api_key: Option<String>,
        id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            reasoning_effort: None,
            info: Arc::new(ProviderInfo {
                id: id.into(),
                name: name.into(),
            }),
        }
    }

    /// Pin every request to one Azure deployment
    pub fn deployment(mut self, deployment: impl Into<String>) -> Self {
        if let Endpoint::Azure { deployment: d, .. } = &mut self.endpoint {
            *d = Some(deployment.into());
        }
        self
    }

    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        if let Endpoint::Azure { api_version, .. } = &mut self.endpoint {
            *api_version = version.into();
        }
        self
    }

    pub fn reasoning_effort(mut self, effort: ReasoningEffort) -> Self {
        self.reasoning_effort = Some(effort);
        self
    }

    /// Share an existing HTTP client
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn api_key(&self) -> Result<&str, RuntimeError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| RuntimeError::configuration(format!("{} API key is not set", self.info.name)))
    }

    fn request(&self, model: &ModelRef, body: &ChatRequest<'_>) -> Result<reqwest::RequestBuilder, RuntimeError> {
        let key = self.api_key()?;
        let request = match &self.endpoint {
            Endpoint::Azure {
                endpoint,
                deployment,
                api_version,
            } => {
                let endpoint = endpoint
                    .as_deref()
                    .ok_or_else(|| RuntimeError::configuration("AZURE_OPENAI_ENDPOINT is not set"))?;
                let deployment = deployment.as_deref().unwrap_or(&model.model);
                let url = format!(
                    "{}/openai/deployments/{}/chat/completions",
                    endpoint.trim_end_matches('/'),
                    deployment
                );
                self.client
                    .post(url)
                    .query(&[("api-version", api_version.as_str())])
                    .header("api-key", key)
            }
            Endpoint::Compatible { base_url } => {
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                self.client.post(url).bearer_auth(key)
            }
        };
        Ok(request.json(body))
    }

    fn build_body<'a>(&self, req: &'a RuntimeRequest, model: &'a ModelRef, stream: bool) -> ChatRequest<'a> {
        let mut messages = Vec::with_capacity(2);
        if !req.context.is_empty() {
            messages.push(Message {
                role: "system",
                content: &req.context,
            });
        }
        messages.push(Message {
            role: "user",
            content: &req.prompt,
        });

        ChatRequest {
            // Azure routes by deployment and ignores the field
            model: match self.endpoint {
                Endpoint::Azure { .. } => None,
                Endpoint::Compatible { .. } => Some(model.model.as_str()),
            },
            messages,
            max_tokens: req.max_tokens,
            temperature: req.temperature,
            reasoning_effort: self.reasoning_effort,
            stream: stream.then_some(true),
        }
    }

    fn convert_response(
        response: ChatResponse,
        model: &ModelRef,
        started: Instant,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RuntimeError::parse("response contained no choices"))?;

        let usage = response.usage.unwrap_or_default();
        Ok(RuntimeResponse {
            content: choice.message.content.unwrap_or_default(),
            model: model.clone(),
            tokens_used: usage.total_tokens,
            latency_ms: started.elapsed().as_millis() as u64,
            usage,
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map_or(FinishReason::Stop, FinishReason::from_wire),
            reasoning: choice
                .message
                .reasoning_content
                .or(choice.message.reasoning),
        })
    }
}

fn decode_stream_line(line: &str) -> Result<Frame, RuntimeError> {
    // `event:`, `id:` and `:` comment lines carry nothing we use
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(Frame::Ignore);
    };
    let payload = payload.trim();
    if payload == DONE_SENTINEL {
        return Ok(Frame::Done);
    }

    let chunk: ChatChunk = serde_json::from_str(payload)
        .map_err(|e| RuntimeError::parse(format!("invalid stream frame: {e}")))?;

    // Azure sends content-filter preambles with no choices
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(Frame::Ignore);
    };
    Ok(Frame::Chunk(StreamChunk {
        text: choice.delta.content.unwrap_or_default(),
        reasoning: choice.delta.reasoning_content.or(choice.delta.reasoning),
    }))
}

#[async_trait]
impl Provider for ChatProvider {
    fn info(&self) -> Arc<ProviderInfo> {
        self.info.clone()
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        self.api_key()?;
        if let Endpoint::Azure { endpoint: None, .. } = self.endpoint {
            return Err(RuntimeError::configuration("AZURE_OPENAI_ENDPOINT is not set"));
        }
        Ok(())
    }

    async fn call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        let started = Instant::now();
        let request = self.request(model, &self.build_body(req, model, false))?;

        let response = http::send(request, cancel).await?;
        let body: ChatResponse = http::read_json(response, cancel).await?;
        Self::convert_response(body, model, started)
    }

    async fn stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        let request = self.request(model, &self.build_body(req, model, true))?;

        let response = http::send(request, cancel).await?;
        Ok(decode_frames(
            response.bytes_stream(),
            decode_stream_line,
            cancel.clone(),
        ))
    }
}

// Wire types

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::provider::collect_stream;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(message: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{ "index": 0, "message": message, "finish_reason": "length" }],
            "usage": { "prompt_tokens": 9, "completion_tokens": 12, "total_tokens": 21 }
        })
    }

    #[tokio::test]
    async fn test_azure_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/prod-gpt4o/chat/completions"))
            .and(query_param("api-version", DEFAULT_AZURE_API_VERSION))
            .and(header("api-key", "azure-key"))
            .and(body_json(json!({
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "Hello" }
                ],
                "max_tokens": 100,
                "reasoning_effort": "medium"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "role": "assistant",
                "content": "Hi!",
                "reasoning_content": "greeting"
            }))))
            .expect(1)
            .mount(&server)
            .await;

        let provider = ChatProvider::azure(server.uri(), "azure-key")
            .deployment("prod-gpt4o")
            .reasoning_effort(ReasoningEffort::Medium);
        let req = RuntimeRequest::new("Hello")
            .with_context("Be brief.")
            .with_max_tokens(100);
        let model = ModelRef::new("azure", "gpt-4o");
        let response = provider
            .call(&req, &model, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content, "Hi!");
        assert_eq!(response.reasoning.as_deref(), Some("greeting"));
        assert_eq!(response.tokens_used, 21);
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_compatible_call_reads_alternate_reasoning_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "deepseek-reasoner" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(json!({
                "role": "assistant",
                "content": "42",
                "reasoning": "thought about it"
            }))))
            .mount(&server)
            .await;

        let provider = ChatProvider::compatible("deepseek", "DeepSeek", server.uri(), "sk-test");
        let model = ModelRef::new("deepseek", "deepseek-reasoner");
        let response = provider
            .call(&RuntimeRequest::new("?"), &model, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content, "42");
        assert_eq!(response.reasoning.as_deref(), Some("thought about it"));
    }

    #[tokio::test]
    async fn test_rate_limited_status_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"error":"slow down"}"#))
            .mount(&server)
            .await;

        let provider = ChatProvider::compatible("openai", "OpenAI", server.uri(), "sk-test");
        let err = provider
            .call(
                &RuntimeRequest::new("hi"),
                &ModelRef::new("openai", "gpt-4o"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn test_stream_frames_until_done() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hmm\"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {oops\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-4o/chat/completions"))
            .and(body_partial_json(json!({ "stream": true })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let provider = ChatProvider::azure(server.uri(), "azure-key");
        let stream = provider
            .stream(
                &RuntimeRequest::new("hi"),
                &ModelRef::new("azure", "gpt-4o"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        let collected = collect_stream(stream).await.unwrap();

        assert_eq!(collected.content, "Hello");
        assert_eq!(collected.reasoning.as_deref(), Some("hmm"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let provider = ChatProvider::openai("sk-test");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = provider
            .call(&RuntimeRequest::new("hi"), &ModelRef::new("openai", "gpt-4o"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_validation() {
        assert!(ChatProvider::openai("").validate().is_err());
        assert!(ChatProvider::openai("sk").validate().is_ok());

        let mut azure = ChatProvider::azure("https://example.openai.azure.com", "k");
        assert!(azure.validate().is_ok());
        azure.endpoint = Endpoint::Azure {
            endpoint: None,
            deployment: None,
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        };
        assert!(matches!(azure.validate(), Err(RuntimeError::Configuration(_))));
    }

    #[test]
    fn test_reasoning_effort_parse() {
        assert_eq!("HIGH".parse::<ReasoningEffort>().unwrap(), ReasoningEffort::High);
        assert!("extreme".parse::<ReasoningEffort>().is_err());
    }
}

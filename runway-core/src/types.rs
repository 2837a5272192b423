//! Core types for routing operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuntimeError;

/// Identity of one addressable backend model.
///
/// Two refs are the same model when their `provider:model` keys are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider: String,
    pub model: String,
}

impl ModelRef {
    /// Create a new model reference
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
        }
    }

    /// The `provider:model` identity key
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider, self.model)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

impl FromStr for ModelRef {
    type Err = RuntimeError;

    /// Parse `provider:model`. Only the first `:` separates, so model ids
    /// such as `llama3.2:3b` survive intact.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(RuntimeError::configuration(format!(
                "invalid model reference '{}', expected provider:model",
                s
            ))),
        }
    }
}

/// Coarse ranking used to order fallback candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    High,
    Premium,
}

impl Tier {
    /// Sort position, best first
    pub fn rank(self) -> u8 {
        match self {
            Tier::Premium => 0,
            Tier::High => 1,
            Tier::Standard => 2,
        }
    }
}

/// What a model is good at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub code: bool,
    pub reasoning: bool,
    pub general: bool,
    pub vision: bool,
    pub tools: bool,
}

/// Cost, speed and quality tiers of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Characteristics {
    pub cost_tier: Tier,
    pub speed_tier: Tier,
    pub quality_tier: Tier,
}

/// A generic generation request. Owned by the caller; the runtime only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeRequest {
    pub prompt: String,
    #[serde(default)]
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl RuntimeRequest {
    /// Create a new request with a prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Set context text sent ahead of the prompt
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Set max output tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Finish reason
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Normalize a backend finish reason (`stop`, `STOP`, `MAX_TOKENS`, ...)
    pub fn from_wire(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "stop" | "end_turn" => FinishReason::Stop,
            "length" | "max_tokens" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolCalls,
            "content_filter" | "safety" | "recitation" => FinishReason::ContentFilter,
            _ => FinishReason::Other(raw.to_string()),
        }
    }
}

/// Normalized response from any backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub content: String,
    pub model: ModelRef,
    pub tokens_used: u32,
    pub latency_ms: u64,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// Incremental piece of a streamed response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamChunk {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl StreamChunk {
    /// Create a text-only chunk
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.as_deref().map_or(true, str::is_empty)
    }
}

/// Provider information
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_ref_key_and_parse() {
        let model: ModelRef = "ollama:llama3.2:3b".parse().unwrap();
        assert_eq!(model.provider, "ollama");
        assert_eq!(model.model, "llama3.2:3b");
        assert_eq!(model.key(), "ollama:llama3.2:3b");
        assert_eq!(model.to_string(), model.key());

        assert!("no-separator".parse::<ModelRef>().is_err());
        assert!(":model".parse::<ModelRef>().is_err());
    }

    #[test]
    fn test_tier_rank_orders_best_first() {
        let mut tiers = vec![Tier::Standard, Tier::Premium, Tier::High];
        tiers.sort_by_key(|t| t.rank());
        assert_eq!(tiers, vec![Tier::Premium, Tier::High, Tier::Standard]);
    }

    #[test]
    fn test_finish_reason_from_wire() {
        assert_eq!(FinishReason::from_wire("STOP"), FinishReason::Stop);
        assert_eq!(FinishReason::from_wire("MAX_TOKENS"), FinishReason::Length);
        assert_eq!(FinishReason::from_wire("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_wire("SAFETY"),
            FinishReason::ContentFilter
        );
        assert_eq!(
            FinishReason::from_wire("weird"),
            FinishReason::Other("weird".to_string())
        );
    }
}

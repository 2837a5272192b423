//! Runtime configuration.
//!
//! Every policy value the router depends on lives here with a named default,
//! so a deployment can see and override what it is getting.

use crate::error::RuntimeError;
use crate::types::ModelRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Default policy values.
pub mod defaults {
    /// Used when neither an override, the catalog, nor the config knows a window
    pub const CONTEXT_WINDOW: u32 = 128_000;
    /// Model used when the caller does not name one
    pub const MODEL: &str = "anthropic:claude-sonnet-4";
    /// Fallbacks appended when a chain config names none
    pub const FALLBACKS: &[&str] = &[
        "anthropic:claude-sonnet-4",
        "openai:gpt-4o",
        "google:gemini-2.5-flash",
    ];
    pub const ATTEMPT_TIMEOUT_MS: u64 = 120_000;
    pub const MAX_OUTPUT_TOKENS: u32 = 4_096;
    pub const BREAKER_FAILURE_THRESHOLD: u32 = 3;
    pub const BREAKER_COOLDOWN_MS: u64 = 60_000;
    pub const RATE_LIMIT_WINDOW_MS: u64 = 60_000;
    pub const RATE_LIMIT_MAX_CALLS: u32 = 60;
    pub const USAGE_HISTORY_SIZE: usize = 1_000;
}

/// Sources for resolving a model's context window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextWindowConfig {
    /// Flat overrides keyed by `provider:model`
    pub overrides: HashMap<String, u32>,
    /// Nested overrides keyed by provider, then model
    pub provider_overrides: HashMap<String, HashMap<String, u32>>,
    /// Window for models nobody knows about
    pub default_context_window: Option<u32>,
    /// Upper bound applied to every resolved window
    pub agent_context_token_cap: Option<u32>,
}

/// How a fallback chain is assembled for one request or agent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackChainConfig {
    pub explicit_fallbacks: Option<Vec<ModelRef>>,
    pub default_fallbacks: Option<Vec<ModelRef>>,
    pub allowed_providers: Option<Vec<String>>,
    pub excluded_providers: Option<Vec<String>>,
    pub max_chain_length: Option<usize>,
    pub cross_provider_fallback: Option<bool>,
}

impl FallbackChainConfig {
    pub fn with_explicit_fallbacks(mut self, fallbacks: Vec<ModelRef>) -> Self {
        self.explicit_fallbacks = Some(fallbacks);
        self
    }

    pub fn with_default_fallbacks(mut self, fallbacks: Vec<ModelRef>) -> Self {
        self.default_fallbacks = Some(fallbacks);
        self
    }

    pub fn with_allowed_providers(mut self, providers: &[&str]) -> Self {
        self.allowed_providers = Some(providers.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_excluded_providers(mut self, providers: &[&str]) -> Self {
        self.excluded_providers = Some(providers.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_max_chain_length(mut self, max: usize) -> Self {
        self.max_chain_length = Some(max);
        self
    }

    pub fn with_cross_provider_fallback(mut self, enabled: bool) -> Self {
        self.cross_provider_fallback = Some(enabled);
        self
    }
}

/// Circuit breaker policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    /// Consecutive network failures before the breaker opens
    pub failure_threshold: u32,
    /// How long an open breaker rejects attempts
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: defaults::BREAKER_FAILURE_THRESHOLD,
            cooldown_ms: defaults::BREAKER_COOLDOWN_MS,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// What the rate limiter counts against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitScope {
    Model,
    Provider,
    Global,
}

/// What happens when the limiter is saturated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitMode {
    /// Skip the candidate
    Skip,
    /// Wait for a slot, bounded by the attempt timeout
    Wait,
}

/// Sliding-window rate limit policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window_ms: u64,
    pub max_calls: u32,
    pub scope: RateLimitScope,
    pub mode: RateLimitMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_ms: defaults::RATE_LIMIT_WINDOW_MS,
            max_calls: defaults::RATE_LIMIT_MAX_CALLS,
            scope: RateLimitScope::Model,
            mode: RateLimitMode::Skip,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Top-level configuration for the cascading executor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub default_model: ModelRef,
    pub attempt_timeout_ms: u64,
    pub default_max_output_tokens: u32,
    pub usage_history_size: usize,
    pub context: ContextWindowConfig,
    pub fallback: FallbackChainConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            attempt_timeout_ms: defaults::ATTEMPT_TIMEOUT_MS,
            default_max_output_tokens: defaults::MAX_OUTPUT_TOKENS,
            usage_history_size: defaults::USAGE_HISTORY_SIZE,
            context: ContextWindowConfig::default(),
            fallback: FallbackChainConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Layer `RUNWAY_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, RuntimeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`RuntimeConfig::from_env`], reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RuntimeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("RUNWAY_DEFAULT_MODEL") {
            config.default_model = model.parse()?;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_ATTEMPT_TIMEOUT_MS")? {
            config.attempt_timeout_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_MAX_OUTPUT_TOKENS")? {
            config.default_max_output_tokens = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_USAGE_HISTORY_SIZE")? {
            config.usage_history_size = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_CONTEXT_WINDOW_DEFAULT")? {
            config.context.default_context_window = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_AGENT_CONTEXT_TOKEN_CAP")? {
            config.context.agent_context_token_cap = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_CIRCUIT_BREAKER_ENABLED")? {
            config.circuit_breaker.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_CIRCUIT_BREAKER_THRESHOLD")? {
            config.circuit_breaker.failure_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_CIRCUIT_BREAKER_COOLDOWN_MS")? {
            config.circuit_breaker.cooldown_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_RATE_LIMIT_ENABLED")? {
            config.rate_limit.enabled = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_RATE_LIMIT_WINDOW_MS")? {
            config.rate_limit.window_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "RUNWAY_RATE_LIMIT_MAX_CALLS")? {
            config.rate_limit.max_calls = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.context.default_context_window == Some(0) {
            return Err(RuntimeError::configuration(
                "default_context_window must be positive",
            ));
        }
        if self.context.agent_context_token_cap == Some(0) {
            return Err(RuntimeError::configuration(
                "agent_context_token_cap must be positive",
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RuntimeError::configuration(
                "circuit breaker failure_threshold must be at least 1",
            ));
        }
        if self.rate_limit.enabled && (self.rate_limit.max_calls == 0 || self.rate_limit.window_ms == 0) {
            return Err(RuntimeError::configuration(
                "rate limit needs a non-zero window and call cap",
            ));
        }
        Ok(())
    }
}

fn default_model() -> ModelRef {
    let (provider, model) = defaults::MODEL.split_once(':').unwrap_or(("anthropic", "claude-sonnet-4"));
    ModelRef::new(provider, model)
}

/// Parse the built-in default fallback list
pub fn default_fallbacks() -> Vec<ModelRef> {
    defaults::FALLBACKS
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, RuntimeError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RuntimeError::configuration(format!("{}: invalid value '{}': {}", key, raw, e))),
    }
}

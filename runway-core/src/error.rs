//! Error types for Runway operations.

use crate::types::ModelRef;
use std::fmt;
use std::time::Duration;

/// The main error type for routing and provider operations.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Missing or invalid credentials / endpoint settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-success HTTP status from a backend
    #[error("Transport error (status {status}): {body}")]
    Transport { status: u16, body: String },

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed backend payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Per-attempt deadline exceeded
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Circuit breaker is open for the model
    #[error("Circuit open for {model}, retry in {retry_in:?}")]
    CircuitOpen { model: String, retry_in: Duration },

    /// Rate limiter saturated for the scope
    #[error("Rate limited on {scope}, retry in {retry_in:?}")]
    RateLimited { scope: String, retry_in: Duration },

    /// Request does not fit in the model's context window
    #[error("Context overflow for {model}: needs {required} tokens, window is {available}")]
    ContextOverflow {
        model: String,
        required: u32,
        available: u32,
    },

    /// No adapter registered for the provider
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// Every candidate in the fallback chain failed
    #[error("All {} candidates failed: {}", .failures.len(), FailureList(.failures))]
    ChainExhausted { failures: Vec<AttemptFailure> },

    /// Caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,
}

/// One candidate that was passed over, and why.
#[derive(Debug)]
pub struct AttemptFailure {
    pub model: ModelRef,
    pub error: RuntimeError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.model, self.error)
    }
}

struct FailureList<'a>(&'a [AttemptFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

impl RuntimeError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a transport error from a status code and raw body
    pub fn transport(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            status,
            body: body.into(),
        }
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Check if this failure should count against the model's circuit breaker
    pub fn trips_breaker(&self) -> bool {
        matches!(
            self,
            RuntimeError::Transport { .. } | RuntimeError::Network(_) | RuntimeError::Timeout(_)
        )
    }

    /// HTTP status carried by a transport error
    pub fn status(&self) -> Option<u16> {
        match self {
            RuntimeError::Transport { status, .. } => Some(*status),
            RuntimeError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuntimeError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaker_classification() {
        assert!(RuntimeError::transport(500, "").trips_breaker());
        assert!(RuntimeError::timeout("slow").trips_breaker());
        assert!(!RuntimeError::Cancelled.trips_breaker());
        assert!(!RuntimeError::parse("bad json").trips_breaker());
        assert!(!RuntimeError::configuration("no key").trips_breaker());
    }

    #[test]
    fn test_chain_exhausted_lists_every_model() {
        let err = RuntimeError::ChainExhausted {
            failures: vec![
                AttemptFailure {
                    model: ModelRef::new("anthropic", "claude-sonnet-4"),
                    error: RuntimeError::transport(503, "overloaded"),
                },
                AttemptFailure {
                    model: ModelRef::new("google", "gemini-2.5-flash"),
                    error: RuntimeError::configuration("GEMINI_API_KEY is not set"),
                },
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("All 2 candidates failed"));
        assert!(text.contains("anthropic:claude-sonnet-4 (Transport error (status 503): overloaded)"));
        assert!(text.contains("google:gemini-2.5-flash (Configuration error"));
    }
}

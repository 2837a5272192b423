//! # Runway Core
//!
//! Core abstractions and runtime for routing generation requests across
//! language model providers.
//!
//! This crate provides the model catalog, context window resolution, token
//! estimation, fallback chain construction, the provider and layer traits,
//! and the cascading executor that ties them together.

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod layer;
pub mod provider;
pub mod runtime;
pub mod tokens;
pub mod types;

// Re-exports
pub use catalog::{CatalogEntry, ModelCatalog, SharedCatalog, StaticCatalog};
pub use config::{
    CircuitBreakerConfig, ContextWindowConfig, FallbackChainConfig, RateLimitConfig,
    RateLimitMode, RateLimitScope, RuntimeConfig,
};
pub use context::{ContextWindowResolution, ContextWindowResolver, ContextWindowSource};
pub use error::{AttemptFailure, RuntimeError};
pub use fallback::FallbackChainBuilder;
pub use layer::{Layer, LayeredProvider};
pub use provider::{collect_stream, ChunkStream, CollectedStream, Provider};
pub use runtime::{
    CascadingExecutor, ChainStrategy, CircuitBreakerRegistry, CircuitState, ExecuteOptions,
    Execution, RateLimiter, StreamExecution,
};
pub use tokens::{TokenEstimate, TokenUsage, UsageStats, UsageTracker};
pub use tokio_util::sync::CancellationToken;
pub use types::*;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

//! # Runway
//!
//! Cascading model routing for Rust.
//!
//! Runway sends a generation request to a primary model and, when that
//! model fails, walks an ordered fallback chain until one succeeds. Each
//! model is guarded by a circuit breaker and a sliding-window rate limiter,
//! and every candidate is checked against its context window before any
//! network call is made.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! runway = { version = "0.1", features = ["full"] }
//! ```
//!
//! ```ignore
//! use runway::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let executor = CascadingExecutor::builder(Arc::new(StaticCatalog::builtin()))
//!     .config(RuntimeConfig::from_env()?)
//!     .provider("google", LoggingLayer::new().layer(GeminiProvider::from_env()))
//!     .provider("azure", ChatProvider::azure_from_env()?)
//!     .provider("deepseek", deepseek("your-api-key"))
//!     .finish();
//!
//! let request = RuntimeRequest::new("What is Rust?").with_max_tokens(512);
//! let options = ExecuteOptions::new()
//!     .model("google:gemini-2.5-flash".parse()?)
//!     .fallback(FallbackChainConfig::default().with_explicit_fallbacks(vec![
//!         "azure:gpt-4o".parse()?,
//!         "deepseek:deepseek-chat".parse()?,
//!     ]));
//!
//! let execution = executor.execute(&request, options).await?;
//! println!("{} (served by {}, {} attempts)", execution.response.content,
//!     execution.served_by(), execution.attempts);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `default`: `providers` and `layers`
//! - `providers`: Gemini and chat-completions adapters
//! - `layers`: Built-in layers (logging)
//! - `full`: All features enabled

// Re-export core types and traits
pub use runway_core::*;

// Re-export providers under `provider` module
#[cfg(feature = "runway-provider")]
pub mod provider {
    //! Backend adapters.
    pub use runway_provider::*;
}

// Re-export layers under `layer` module
#[cfg(feature = "runway-layer")]
pub mod layer {
    //! Built-in provider layers.
    pub use runway_layer::*;
}

/// Prelude module for convenient imports
pub mod prelude {
    //! Prelude module containing the most commonly used types and traits.
    //!
    //! ```
    //! use runway::prelude::*;
    //! ```

    pub use crate::{
        CancellationToken, CascadingExecutor, ExecuteOptions, Execution, FallbackChainConfig,
        Layer, ModelRef, Provider, Result, RuntimeConfig, RuntimeError, RuntimeRequest,
        RuntimeResponse, StaticCatalog, StreamChunk,
    };

    #[cfg(feature = "runway-provider")]
    pub use crate::provider::{deepseek, ChatProvider, GeminiProvider, ReasoningEffort};

    #[cfg(feature = "runway-layer")]
    pub use crate::layer::LoggingLayer;
}

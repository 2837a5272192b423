//! # Runway Layers
//!
//! Built-in layers for Runway adapters.
//!
//! Currently implemented layers:
//! - `LoggingLayer`: Logs all provider operations with timing information
//!
//! Retries and fallback are not layers: the cascading executor owns every
//! advance decision.
//!
//! ## Usage
//!
//! ```ignore
//! use runway_core::{CascadingExecutor, Layer, StaticCatalog};
//! use runway_layer::LoggingLayer;
//! use runway_provider::GeminiProvider;
//!
//! let gemini = LoggingLayer::new().layer(GeminiProvider::from_env());
//! let executor = CascadingExecutor::builder(Arc::new(StaticCatalog::builtin()))
//!     .provider("google", gemini)
//!     .finish();
//! ```

pub mod logging;

// Re-exports
pub use logging::{LoggingLayer, LoggingProvider};

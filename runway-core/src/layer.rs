//! Layer trait and abstractions.
//!
//! Layers wrap an adapter with cross-cutting concerns (logging, metrics)
//! without touching its wire logic. Routing decisions such as retries and
//! fallbacks stay in the executor, not in layers.

use crate::error::RuntimeError;
use crate::provider::{ChunkStream, Provider};
use crate::types::*;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Layer trait for wrapping providers.
///
/// Each layer wraps an inner provider and returns a new provider with
/// enhanced capabilities.
pub trait Layer<P: Provider> {
    /// The type of the layered provider
    type LayeredProvider: Provider;

    /// Wrap the inner provider with this layer
    fn layer(&self, inner: P) -> Self::LayeredProvider;
}

/// Helper trait for layered providers.
///
/// Provides forwarding implementations for every provider method.
/// Implementers only override the methods they want to intercept.
#[async_trait]
pub trait LayeredProvider: Sized + Provider {
    /// The inner provider type
    type Inner: Provider;

    /// Get a reference to the inner provider
    fn inner(&self) -> &Self::Inner;

    /// Default implementation for info - forwards to inner
    fn layered_info(&self) -> Arc<ProviderInfo> {
        self.inner().info()
    }

    /// Default implementation for validate - forwards to inner
    fn layered_validate(&self) -> Result<(), RuntimeError> {
        self.inner().validate()
    }

    /// Default implementation for call - forwards to inner
    async fn layered_call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        self.inner().call(req, model, cancel).await
    }

    /// Default implementation for stream - forwards to inner
    async fn layered_stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        self.inner().stream(req, model, cancel).await
    }
}

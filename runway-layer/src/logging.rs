//! Logging layer for provider operations.

use async_trait::async_trait;
use runway_core::error::RuntimeError;
use runway_core::layer::{Layer, LayeredProvider};
use runway_core::provider::{ChunkStream, Provider};
use runway_core::types::*;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Logging layer that logs provider operations.
#[derive(Debug, Clone)]
pub struct LoggingLayer {
    prefix: String,
}

impl LoggingLayer {
    /// Create a new logging layer
    pub fn new() -> Self {
        Self {
            prefix: "[runway]".to_string(),
        }
    }

    /// Create a logging layer with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Provider> Layer<P> for LoggingLayer {
    type LayeredProvider = LoggingProvider<P>;

    fn layer(&self, inner: P) -> Self::LayeredProvider {
        LoggingProvider {
            inner,
            prefix: self.prefix.clone(),
        }
    }
}

/// Provider wrapped with logging
#[derive(Debug)]
pub struct LoggingProvider<P> {
    inner: P,
    prefix: String,
}

impl<P> LoggingProvider<P> {
    fn log_failure(&self, op: &'static str, model: &ModelRef, error: &RuntimeError, start: Instant) {
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if error.is_cancelled() {
            tracing::debug!(prefix = %self.prefix, op, model = %model, elapsed_ms, "cancelled");
        } else {
            tracing::error!(
                prefix = %self.prefix,
                op,
                model = %model,
                status = ?error.status(),
                elapsed_ms,
                error = %error,
                "provider error"
            );
        }
    }
}

#[async_trait]
impl<P: Provider> LayeredProvider for LoggingProvider<P> {
    type Inner = P;

    fn inner(&self) -> &Self::Inner {
        &self.inner
    }

    fn layered_validate(&self) -> Result<(), RuntimeError> {
        let result = self.inner.validate();
        if let Err(e) = &result {
            tracing::debug!(prefix = %self.prefix, provider = %self.inner.info().id, error = %e, "provider not usable");
        }
        result
    }

    async fn layered_call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        tracing::debug!(
            prefix = %self.prefix,
            model = %model,
            prompt_chars = req.prompt.len(),
            max_tokens = ?req.max_tokens,
            "call request"
        );

        let start = Instant::now();
        let result = self.inner.call(req, model, cancel).await;

        match &result {
            Ok(response) => {
                tracing::debug!(
                    prefix = %self.prefix,
                    model = %model,
                    tokens = response.tokens_used,
                    finish_reason = ?response.finish_reason,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "call success"
                );
            }
            Err(e) => self.log_failure("call", model, e, start),
        }

        result
    }

    async fn layered_stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        tracing::debug!(prefix = %self.prefix, model = %model, "stream request");

        let start = Instant::now();
        let result = self.inner.stream(req, model, cancel).await;

        match &result {
            Ok(_) => {
                tracing::debug!(
                    prefix = %self.prefix,
                    model = %model,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "stream established"
                );
            }
            Err(e) => self.log_failure("stream", model, e, start),
        }

        result
    }
}

#[async_trait]
impl<P: Provider> Provider for LoggingProvider<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        LayeredProvider::layered_info(self)
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        LayeredProvider::layered_validate(self)
    }

    async fn call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        LayeredProvider::layered_call(self, req, model, cancel).await
    }

    async fn stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        LayeredProvider::layered_stream(self, req, model, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runway_core::provider::collect_stream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct EchoProvider {
        calls: AtomicUsize,
        fail_with: Option<u16>,
    }

    #[async_trait]
    impl Provider for EchoProvider {
        fn info(&self) -> Arc<ProviderInfo> {
            Arc::new(ProviderInfo {
                id: "echo".to_string(),
                name: "Echo".to_string(),
            })
        }

        async fn call(
            &self,
            req: &RuntimeRequest,
            model: &ModelRef,
            _cancel: &CancellationToken,
        ) -> Result<RuntimeResponse, RuntimeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(status) = self.fail_with {
                return Err(RuntimeError::transport(status, "nope"));
            }
            Ok(RuntimeResponse {
                content: req.prompt.clone(),
                model: model.clone(),
                tokens_used: 1,
                latency_ms: 0,
                usage: Usage::default(),
                finish_reason: FinishReason::Stop,
                reasoning: None,
            })
        }

        async fn stream(
            &self,
            req: &RuntimeRequest,
            _model: &ModelRef,
            _cancel: &CancellationToken,
        ) -> Result<Box<ChunkStream>, RuntimeError> {
            let chunk = StreamChunk::text(req.prompt.clone());
            Ok(Box::new(futures::stream::iter(vec![Ok(chunk)])))
        }
    }

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }

    #[tokio::test]
    async fn test_logging_layer_forwards_call() {
        init_tracing();
        let provider = LoggingLayer::with_prefix("[test]").layer(EchoProvider::default());
        let model = ModelRef::new("echo", "v1");

        let response = provider
            .call(&RuntimeRequest::new("ping"), &model, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.content, "ping");
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.info().id, "echo");
    }

    #[tokio::test]
    async fn test_logging_layer_passes_errors_through() {
        init_tracing();
        let provider = LoggingLayer::new().layer(EchoProvider {
            fail_with: Some(502),
            ..Default::default()
        });

        let err = provider
            .call(
                &RuntimeRequest::new("ping"),
                &ModelRef::new("echo", "v1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(502));
    }

    #[tokio::test]
    async fn test_logging_layer_forwards_stream() {
        let provider = LoggingLayer::new().layer(Arc::new(EchoProvider::default()));
        let stream = provider
            .stream(
                &RuntimeRequest::new("chunk"),
                &ModelRef::new("echo", "v1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(collect_stream(stream).await.unwrap().content, "chunk");
        assert!(provider.validate().is_ok());
    }
}

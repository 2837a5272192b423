//! Provider trait and core abstractions.

use crate::error::RuntimeError;
use crate::types::*;
use async_trait::async_trait;
use futures::Stream;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stream type alias for incremental response chunks
pub type ChunkStream = dyn Stream<Item = Result<StreamChunk, RuntimeError>> + Send + Unpin;

/// Core trait implemented by every backend adapter.
///
/// An adapter issues exactly one network call per invocation and never
/// retries; moving on to another model is the executor's job. Backend
/// settings (endpoint, credentials, deployment) live on the adapter itself.
#[async_trait]
pub trait Provider: Send + Sync + Debug + 'static {
    /// Get provider information
    fn info(&self) -> Arc<ProviderInfo>;

    /// Static usability check, run before any network call.
    ///
    /// Returns `RuntimeError::Configuration` when credentials or endpoints
    /// are missing.
    fn validate(&self) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Generate a full response
    async fn call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError>;

    /// Generate an incrementally delivered response.
    ///
    /// Resolves once the backend has accepted the request; body frames are
    /// then delivered through the returned stream.
    async fn stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn info(&self) -> Arc<ProviderInfo> {
        (**self).info()
    }

    fn validate(&self) -> Result<(), RuntimeError> {
        (**self).validate()
    }

    async fn call(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<RuntimeResponse, RuntimeError> {
        (**self).call(req, model, cancel).await
    }

    async fn stream(
        &self,
        req: &RuntimeRequest,
        model: &ModelRef,
        cancel: &CancellationToken,
    ) -> Result<Box<ChunkStream>, RuntimeError> {
        (**self).stream(req, model, cancel).await
    }
}

/// Concatenated output of a finished stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedStream {
    pub content: String,
    pub reasoning: Option<String>,
}

/// Helper function to drain a chunk stream
pub async fn collect_stream(mut stream: Box<ChunkStream>) -> Result<CollectedStream, RuntimeError> {
    use futures::StreamExt;

    let mut collected = CollectedStream::default();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        collected.content.push_str(&chunk.text);

        if let Some(reasoning) = chunk.reasoning {
            collected
                .reasoning
                .get_or_insert_with(String::new)
                .push_str(&reasoning);
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_stream_concatenates() {
        let chunks = vec![
            Ok(StreamChunk {
                text: String::new(),
                reasoning: Some("think ".into()),
            }),
            Ok(StreamChunk {
                text: "Hel".into(),
                reasoning: Some("more".into()),
            }),
            Ok(StreamChunk::text("lo")),
        ];
        let stream: Box<ChunkStream> = Box::new(futures::stream::iter(chunks));

        let out = collect_stream(stream).await.unwrap();
        assert_eq!(out.content, "Hello");
        assert_eq!(out.reasoning.as_deref(), Some("think more"));
    }

    #[tokio::test]
    async fn test_collect_stream_stops_on_error() {
        let chunks = vec![Ok(StreamChunk::text("partial")), Err(RuntimeError::Cancelled)];
        let stream: Box<ChunkStream> = Box::new(futures::stream::iter(chunks));

        assert!(collect_stream(stream).await.unwrap_err().is_cancelled());
    }
}

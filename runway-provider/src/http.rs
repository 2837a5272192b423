//! Request plumbing shared by the adapters.

use runway_core::error::RuntimeError;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

/// Send a request, racing it against cancellation.
///
/// Non-2xx responses become `Transport` errors carrying the status and the
/// body text verbatim.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, RuntimeError> {
    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(RuntimeError::Cancelled),
        response = request.send() => response?,
    };

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = read_text(response, cancel).await?;
    tracing::debug!(status = status.as_u16(), "backend returned error status");
    Err(RuntimeError::transport(status.as_u16(), body))
}

/// Read and decode a JSON body
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    cancel: &CancellationToken,
) -> Result<T, RuntimeError> {
    let text = read_text(response, cancel).await?;
    Ok(serde_json::from_str(&text)?)
}

async fn read_text(response: reqwest::Response, cancel: &CancellationToken) -> Result<String, RuntimeError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RuntimeError::Cancelled),
        text = response.text() => Ok(text?),
    }
}

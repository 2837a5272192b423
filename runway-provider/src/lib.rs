//! # Runway Providers
//!
//! Backend adapters for the cascading executor. Each adapter issues one
//! network call per invocation and leaves retries and fallback to the
//! executor.

pub mod chat;
mod frame;
pub mod gemini;
mod http;

// Re-exports
pub use chat::{ChatProvider, ReasoningEffort};
pub use gemini::{GeminiBuilder, GeminiProvider};

/// DeepSeek's OpenAI-compatible endpoint
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

/// Create a DeepSeek provider (OpenAI-compatible)
///
/// DeepSeek uses the OpenAI chat protocol with a different endpoint, so this
/// is a chat adapter registered under the `deepseek` provider id.
///
/// # Example
///
/// ```ignore
/// use runway_provider::deepseek;
///
/// let executor = CascadingExecutor::builder(catalog)
///     .provider("deepseek", deepseek("your-api-key"))
///     .finish();
/// ```
pub fn deepseek(api_key: impl Into<String>) -> ChatProvider {
    ChatProvider::compatible("deepseek", "DeepSeek", DEEPSEEK_BASE_URL, api_key)
}

//! LlmProvider trait definition.
//!
//! This is the core abstraction that model backends implement. Uses RPITIT
//! for `complete`; see `BoxLlmProvider` for the object-safe wrapper.

use threadbot_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for model backends (OpenAI, any OpenAI-compatible endpoint, mocks).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). Implementations
/// live in threadbot-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "openai", "mistral").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}

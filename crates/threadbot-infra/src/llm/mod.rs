//! LLM provider construction.
//!
//! Every supported backend speaks the OpenAI chat completions protocol, so
//! provider selection reduces to picking a base URL.

pub mod openai_compat;

use secrecy::SecretString;

use threadbot_core::llm::box_provider::BoxLlmProvider;
use threadbot_types::config::ModelConfig;
use threadbot_types::llm::{CompletionRequest, LlmError, Message, MessageRole};

use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::{OpenAiCompatConfig, known_base_url};

/// Create a provider from model configuration.
///
/// An explicit `base_url` wins; otherwise the provider name selects a
/// well-known endpoint. Unknown names without a `base_url` are rejected.
pub fn create_provider(
    config: &ModelConfig,
    api_key: SecretString,
) -> Result<BoxLlmProvider, LlmError> {
    let base_url = match config.base_url.as_deref() {
        Some(url) => url.to_string(),
        None => known_base_url(&config.provider)
            .ok_or_else(|| {
                LlmError::InvalidRequest(format!(
                    "unknown provider '{}' (set model.base_url for custom endpoints)",
                    config.provider
                ))
            })?
            .to_string(),
    };

    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig {
        provider_name: config.provider.clone(),
        base_url,
        api_key,
        model: config.model.clone(),
    });
    Ok(BoxLlmProvider::new(provider))
}

/// Test provider connectivity by sending a minimal completion request.
///
/// Sends a tiny "Hello" message with minimal token budget.
pub async fn test_provider_connection(provider: &BoxLlmProvider) -> Result<(), LlmError> {
    let request = CompletionRequest {
        model: String::new(), // Provider uses its configured default
        messages: vec![Message::new(MessageRole::User, "Hello")],
        max_tokens: 10,
        temperature: Some(0.0),
    };
    provider.complete(&request).await?;
    Ok(())
}

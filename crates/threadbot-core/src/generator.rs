//! Response generator: one model call per context window, never failing.
//!
//! Backend failures (errors, timeouts, empty replies) are logged and replaced
//! by a fixed fallback text so a single model error never ends a conversation.

use std::time::Duration;

use tracing::{Instrument, debug, error, info_span};

use threadbot_types::context::ContextWindow;
use threadbot_types::llm::{CompletionRequest, LlmError};

use crate::llm::box_provider::BoxLlmProvider;

/// Outcome of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    /// `true` when `text` is the fallback reply rather than model output.
    pub fallback: bool,
}

/// Invokes the model backend for assembled context windows.
pub struct ResponseGenerator {
    provider: BoxLlmProvider,
    model: String,
    max_tokens: u32,
    temperature: Option<f64>,
    timeout: Duration,
    fallback_text: String,
}

impl ResponseGenerator {
    pub fn new(
        provider: BoxLlmProvider,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
        fallback_text: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            temperature: None,
            timeout,
            fallback_text: fallback_text.into(),
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn fallback_text(&self) -> &str {
        &self.fallback_text
    }

    /// Generate reply text for `window`, or the fallback text on failure.
    pub async fn generate(&self, window: &ContextWindow) -> String {
        self.generate_detailed(window).await.text
    }

    /// Like [`generate`](Self::generate), but reports whether the fallback
    /// was used.
    pub async fn generate_detailed(&self, window: &ContextWindow) -> Generated {
        match self.try_generate(window).await {
            Ok(text) => Generated {
                text,
                fallback: false,
            },
            Err(e) => {
                error!(
                    provider = self.provider.name(),
                    model = %self.model,
                    error = %e,
                    "Model call failed, replying with fallback text"
                );
                Generated {
                    text: self.fallback_text.clone(),
                    fallback: true,
                }
            }
        }
    }

    /// Single model call with timeout. Empty replies count as failures.
    pub async fn try_generate(&self, window: &ContextWindow) -> Result<String, LlmError> {
        let request = self.build_request(window);

        let span = info_span!(
            "gen_ai.complete",
            gen_ai.system = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.request.temperature = ?request.temperature,
            context.messages = request.messages.len(),
            context.history_bytes = window.history_bytes(),
        );

        let response = tokio::time::timeout(self.timeout, self.provider.complete(&request))
            .instrument(span)
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_secs()))??;

        debug!(
            response_id = %response.id,
            stop_reason = %response.stop_reason,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Model call completed"
        );

        let text = response.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(text.to_string())
    }

    fn build_request(&self, window: &ContextWindow) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages: window.messages().to_vec(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

impl std::fmt::Debug for ResponseGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseGenerator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::LlmProvider;
    use std::sync::Mutex;
    use threadbot_types::llm::{CompletionResponse, Message, MessageRole, StopReason, Usage};

    enum MockResult {
        Reply(String),
        Error(fn() -> LlmError),
        Hang,
    }

    struct MockProvider {
        result: MockResult,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl MockProvider {
        fn new(result: MockResult) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmProvider for std::sync::Arc<MockProvider> {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.seen.lock().unwrap().push(request.clone());
            match &self.result {
                MockResult::Reply(text) => Ok(CompletionResponse {
                    id: "resp-1".to_string(),
                    content: text.clone(),
                    model: request.model.clone(),
                    stop_reason: StopReason::EndTurn,
                    usage: Usage::default(),
                }),
                MockResult::Error(make) => Err(make()),
                MockResult::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    fn generator(result: MockResult) -> (ResponseGenerator, std::sync::Arc<MockProvider>) {
        let mock = std::sync::Arc::new(MockProvider::new(result));
        let generator = ResponseGenerator::new(
            BoxLlmProvider::new(mock.clone()),
            "gpt-4",
            256,
            Duration::from_secs(60),
            "fallback text",
        );
        (generator, mock)
    }

    fn window() -> ContextWindow {
        ContextWindow::new(
            "directive",
            vec![Message::new(MessageRole::Assistant, "earlier reply")],
            30,
            "question",
        )
    }

    #[tokio::test]
    async fn success_returns_model_text() {
        let (generator, mock) = generator(MockResult::Reply("  the answer \n".to_string()));

        let generated = generator.generate_detailed(&window()).await;

        assert_eq!(generated.text, "the answer");
        assert!(!generated.fallback);

        let seen = mock.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].model, "gpt-4");
        assert_eq!(seen[0].max_tokens, 256);
        assert_eq!(seen[0].messages[0].role, MessageRole::System);
        assert_eq!(seen[0].messages[1].role, MessageRole::Assistant);
        assert_eq!(seen[0].messages[2].content, "question");
    }

    #[tokio::test]
    async fn provider_error_returns_fallback() {
        let (generator, _) = generator(MockResult::Error(|| LlmError::RateLimited {
            retry_after_ms: Some(1000),
        }));

        let generated = generator.generate_detailed(&window()).await;
        assert_eq!(generated.text, "fallback text");
        assert!(generated.fallback);
        assert_eq!(generator.generate(&window()).await, "fallback text");
    }

    #[tokio::test]
    async fn empty_reply_returns_fallback() {
        let (generator, _) = generator(MockResult::Reply("   ".to_string()));

        let err = generator.try_generate(&window()).await.unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse));
        assert!(generator.generate_detailed(&window()).await.fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_returns_fallback() {
        let (generator, _) = generator(MockResult::Hang);

        let err = generator.try_generate(&window()).await.unwrap_err();
        assert!(matches!(err, LlmError::Timeout(60)));

        let generated = generator.generate_detailed(&window()).await;
        assert_eq!(generated.text, "fallback text");
    }

    #[tokio::test]
    async fn temperature_is_forwarded() {
        let (generator, mock) = generator(MockResult::Reply("ok".to_string()));
        let generator = generator.with_temperature(Some(0.3));

        generator.generate(&window()).await;
        assert_eq!(mock.seen.lock().unwrap()[0].temperature, Some(0.3));
    }
}

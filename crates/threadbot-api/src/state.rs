//! Application state wiring the engine together.
//!
//! `AppState` holds the loaded configuration. `Engine` pins the core
//! services to one concrete transport.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use threadbot_core::command::CommandService;
use threadbot_core::context::assembler::ContextAssembler;
use threadbot_core::dispatch::Dispatcher;
use threadbot_core::event::EventBus;
use threadbot_core::generator::ResponseGenerator;
use threadbot_core::llm::box_provider::BoxLlmProvider;
use threadbot_core::session::{SessionRegistry, TurnRunner};
use threadbot_core::transport::Transport;
use threadbot_infra::config::{resolve_config, resolve_data_dir};
use threadbot_infra::llm::create_provider;
use threadbot_infra::secret::require_secret;
use threadbot_types::config::BridgeConfig;

pub struct AppState {
    pub config: BridgeConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory and load configuration.
    pub async fn init(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        let config = resolve_config(&data_dir, config_path).await?;
        Ok(Self { config, data_dir })
    }

    /// Build the model provider from `[model]` and its API key.
    pub fn provider(&self) -> anyhow::Result<BoxLlmProvider> {
        let api_key = require_secret(&self.config.model.api_key_env)?;
        let provider = create_provider(&self.config.model, api_key)
            .context("failed to create model provider")?;
        Ok(provider)
    }

    /// Wire the engine on top of `transport`.
    pub fn build_engine<T: Transport + 'static>(
        &self,
        transport: Arc<T>,
    ) -> anyhow::Result<Engine<T>> {
        Ok(Engine::new(&self.config, self.provider()?, transport))
    }
}

/// The session engine bound to one transport.
pub struct Engine<T> {
    pub registry: Arc<SessionRegistry<T>>,
    pub commands: Arc<CommandService<T>>,
    pub events: EventBus,
}

impl<T: Transport + 'static> Engine<T> {
    pub fn new(config: &BridgeConfig, provider: BoxLlmProvider, transport: Arc<T>) -> Self {
        let events = EventBus::default();

        let generator = ResponseGenerator::new(
            provider,
            config.model.model.clone(),
            config.model.max_tokens,
            config.model.request_timeout(),
            config.fallback_reply.clone(),
        )
        .with_temperature(config.model.temperature);

        let runner = Arc::new(TurnRunner::new(
            transport,
            ContextAssembler::new(config.max_bytes, config.system_directive.clone()),
            generator,
            config.history_fetch_limit,
            config.fetch_retry_delay(),
            events.clone(),
        )
        .with_dropped_notice(config.dropped_notice.clone()));

        let registry = SessionRegistry::new(
            runner,
            config.idle_timeout(),
            config.idle_notice.clone(),
            events.clone(),
        );

        let commands = Arc::new(CommandService::new(
            registry.clone(),
            config.thread_name_prefix.clone(),
            config.assistant_label.clone(),
        ));

        Self {
            registry,
            commands,
            events,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher<T> {
        Dispatcher::new(self.registry.clone(), self.commands.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use threadbot_core::llm::provider::LlmProvider;
    use threadbot_infra::memory::{MemoryOutput, MemoryTransport};
    use threadbot_types::command::{BotCommand, CommandInteraction, CommandInvocation};
    use threadbot_types::llm::{
        CompletionRequest, CompletionResponse, LlmError, StopReason, Usage,
    };
    use threadbot_types::message::ChannelId;

    struct EchoProvider;

    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let last = request
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(CompletionResponse {
                id: "r".to_string(),
                content: format!("echo: {last}"),
                model: request.model.clone(),
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_init_with_explicit_config() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("threadbot.toml");
        tokio::fs::write(&path, "idle_timeout_secs = 42\n[model]\nmodel = \"gpt-4o\"\n")
            .await
            .unwrap();

        let state = AppState::init(Some(&path)).await.unwrap();
        assert_eq!(state.config.idle_timeout_secs, 42);
        assert_eq!(state.config.model.model, "gpt-4o");
    }

    #[tokio::test]
    async fn test_engine_starts_and_continues_a_conversation() {
        let transport = Arc::new(MemoryTransport::new());
        let mut outputs = transport.subscribe();
        let engine = Engine::new(
            &BridgeConfig::default(),
            BoxLlmProvider::new(EchoProvider),
            transport.clone(),
        );

        let reply = engine
            .commands
            .handle(CommandInvocation {
                interaction: CommandInteraction {
                    id: "i1".to_string(),
                    token: "t1".to_string(),
                    deferred: false,
                },
                command: BotCommand::Start {
                    message: "hello".to_string(),
                },
                channel_id: ChannelId::new("console"),
                conversation_id: None,
                user_id: "u1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply.content, "Created a thread");

        let conversation_id = match outputs.recv().await.unwrap() {
            MemoryOutput::Opened {
                conversation_id, ..
            } => conversation_id,
            other => panic!("expected Opened, got {other:?}"),
        };
        match outputs.recv().await.unwrap() {
            MemoryOutput::Posted { content, .. } => {
                assert_eq!(content, "<@u1>: hello\nChatGPT: echo: hello");
            }
            other => panic!("expected seed post, got {other:?}"),
        }
        assert_eq!(engine.registry.len(), 1);

        let message = transport
            .user_says(&conversation_id, "u1", "and then?")
            .await
            .unwrap();
        let outcome = engine.dispatcher().on_message(message);
        assert_eq!(outcome, threadbot_core::dispatch::MessageOutcome::Accepted);

        let posted = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(MemoryOutput::Posted { content, .. }) = outputs.recv().await {
                    return content;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(posted, "echo: and then?");

        engine.registry.shutdown();
        assert!(engine.registry.is_empty());
    }
}

//! Shared test doubles: an in-memory transport and a scripted provider.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use threadbot_core::command::CommandService;
use threadbot_core::context::ContextAssembler;
use threadbot_core::dispatch::Dispatcher;
use threadbot_core::event::EventBus;
use threadbot_core::generator::ResponseGenerator;
use threadbot_core::llm::box_provider::BoxLlmProvider;
use threadbot_core::llm::provider::LlmProvider;
use threadbot_core::session::{SessionRegistry, TurnRunner};
use threadbot_core::transport::Transport;
use threadbot_types::command::{
    BotCommand, CommandInteraction, CommandInvocation, CommandReply,
};
use threadbot_types::error::TransportError;
use threadbot_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, StopReason, Usage,
};
use threadbot_types::message::{ChannelId, ConversationId, InboundMessage, ThreadMessage};

pub const IDLE_NOTICE: &str = "idle notice";
pub const FALLBACK: &str = "fallback reply";
pub const DROPPED_NOTICE: &str = "dropped notice";

// --- Transport ---

#[derive(Default)]
pub struct MockTransport {
    logs: Mutex<HashMap<ConversationId, Vec<ThreadMessage>>>,
    posts: Mutex<Vec<(ConversationId, String)>>,
    archived: Mutex<HashMap<ConversationId, bool>>,
    opened: Mutex<Vec<(ChannelId, String, ConversationId)>>,
    deferred: Mutex<Vec<CommandInteraction>>,
    command_replies: Mutex<Vec<(CommandInteraction, CommandReply)>>,
    fetch_failures: AtomicUsize,
    fetch_calls: AtomicUsize,
    typing_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl MockTransport {
    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}{}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Append a human message to the log and return the inbound event.
    pub fn user_says(&self, conversation: &ConversationId, content: &str) -> InboundMessage {
        let id = self.next_id("m");
        let created_at = Utc::now();
        self.logs
            .lock()
            .unwrap()
            .entry(conversation.clone())
            .or_default()
            .push(ThreadMessage {
                id: id.clone(),
                author_is_model: false,
                content: content.to_string(),
                created_at,
            });
        InboundMessage {
            id,
            conversation_id: conversation.clone(),
            author_id: "user-1".to_string(),
            author_is_model: false,
            content: content.to_string(),
            created_at,
        }
    }

    pub fn fail_next_fetches(&self, count: usize) {
        self.fetch_failures.store(count, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<(ConversationId, String)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn posts_in(&self, conversation: &ConversationId) -> Vec<String> {
        self.posts()
            .into_iter()
            .filter(|(c, _)| c == conversation)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn is_archived(&self, conversation: &ConversationId) -> Option<bool> {
        self.archived.lock().unwrap().get(conversation).copied()
    }

    pub fn opened(&self) -> Vec<(ChannelId, String, ConversationId)> {
        self.opened.lock().unwrap().clone()
    }

    pub fn deferred(&self) -> Vec<CommandInteraction> {
        self.deferred.lock().unwrap().clone()
    }

    pub fn command_replies(&self) -> Vec<(CommandInteraction, CommandReply)> {
        self.command_replies.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn typing_calls(&self) -> usize {
        self.typing_calls.load(Ordering::SeqCst)
    }

    /// Poll until `count` messages have been posted in total.
    pub async fn wait_for_posts(&self, count: usize) {
        for _ in 0..2000 {
            if self.posts.lock().unwrap().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "timed out waiting for {count} posts, have {:?}",
            self.posts()
        );
    }
}

impl Transport for MockTransport {
    async fn open_conversation(
        &self,
        parent: &ChannelId,
        name: &str,
    ) -> Result<ConversationId, TransportError> {
        let id = ConversationId::new(self.next_id("thread-"));
        self.logs.lock().unwrap().insert(id.clone(), Vec::new());
        self.opened
            .lock()
            .unwrap()
            .push((parent.clone(), name.to_string(), id.clone()));
        Ok(id)
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .fetch_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TransportError::Http("connection reset".to_string()));
        }

        let logs = self.logs.lock().unwrap();
        let log = logs.get(conversation).cloned().unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        // Newest first, like most chat APIs.
        Ok(log[start..].iter().rev().cloned().collect())
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<(), TransportError> {
        let id = self.next_id("b");
        self.logs
            .lock()
            .unwrap()
            .entry(conversation.clone())
            .or_default()
            .push(ThreadMessage {
                id,
                author_is_model: true,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        self.posts
            .lock()
            .unwrap()
            .push((conversation.clone(), content.to_string()));
        Ok(())
    }

    async fn set_archived(
        &self,
        conversation: &ConversationId,
        archived: bool,
    ) -> Result<(), TransportError> {
        self.archived
            .lock()
            .unwrap()
            .insert(conversation.clone(), archived);
        Ok(())
    }

    async fn send_typing(&self, _conversation: &ConversationId) -> Result<(), TransportError> {
        self.typing_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn defer_command(
        &self,
        interaction: &CommandInteraction,
        _ephemeral: bool,
    ) -> Result<(), TransportError> {
        self.deferred.lock().unwrap().push(interaction.clone());
        Ok(())
    }

    async fn reply_to_command(
        &self,
        interaction: &CommandInteraction,
        reply: &CommandReply,
    ) -> Result<(), TransportError> {
        self.command_replies
            .lock()
            .unwrap()
            .push((interaction.clone(), reply.clone()));
        Ok(())
    }
}

// --- Provider ---

/// Replies `"reply to: {last user message}"`. Optionally blocks every call
/// until a permit is released, to hold a generation in flight.
#[derive(Default)]
pub struct ScriptedProvider {
    requests: Mutex<Vec<CompletionRequest>>,
    started: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    failing: AtomicBool,
}

impl ScriptedProvider {
    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Default::default()
        }
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub async fn wait_for_started(&self, count: usize) {
        for _ in 0..2000 {
            if self.started() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {count} generations to start");
    }
}

pub struct SharedProvider(pub Arc<ScriptedProvider>);

impl LlmProvider for SharedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let provider = &self.0;
        provider.requests.lock().unwrap().push(request.clone());
        provider.started.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &provider.gate {
            gate.acquire().await.map_err(|e| LlmError::Provider {
                message: e.to_string(),
            })?
            .forget();
        }

        if provider.failing.load(Ordering::SeqCst) {
            return Err(LlmError::Overloaded("scripted failure".to_string()));
        }

        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: format!("resp-{}", provider.started()),
            content: format!("reply to: {last_user}"),
            model: request.model.clone(),
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}

// --- Harness ---

pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub provider: Arc<ScriptedProvider>,
    pub events: EventBus,
    pub registry: Arc<SessionRegistry<MockTransport>>,
    pub commands: Arc<CommandService<MockTransport>>,
}

impl Harness {
    pub fn new(provider: ScriptedProvider, idle_timeout: Duration) -> Self {
        let transport = Arc::new(MockTransport::default());
        let provider = Arc::new(provider);
        let events = EventBus::new(256);

        let generator = ResponseGenerator::new(
            BoxLlmProvider::new(SharedProvider(provider.clone())),
            "test-model",
            128,
            Duration::from_secs(24 * 3600),
            FALLBACK,
        );
        let runner = Arc::new(TurnRunner::new(
            transport.clone(),
            ContextAssembler::new(4096, "test directive"),
            generator,
            100,
            Duration::from_millis(1000),
            events.clone(),
        )
        .with_dropped_notice(DROPPED_NOTICE));
        let registry = SessionRegistry::new(runner, idle_timeout, IDLE_NOTICE, events.clone());
        let commands = Arc::new(CommandService::new(registry.clone(), "chatgpt", "ChatGPT"));

        Self {
            transport,
            provider,
            events,
            registry,
            commands,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher<MockTransport> {
        Dispatcher::new(self.registry.clone(), self.commands.clone())
    }
}

pub fn invocation(command: BotCommand, conversation_id: Option<&str>) -> CommandInvocation {
    CommandInvocation {
        interaction: CommandInteraction {
            id: "interaction-1".to_string(),
            token: "token-1".to_string(),
            deferred: false,
        },
        command,
        channel_id: ChannelId::new("general"),
        conversation_id: conversation_id.map(ConversationId::new),
        user_id: "42".to_string(),
    }
}

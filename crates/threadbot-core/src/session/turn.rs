//! One generation turn: typing indicator, history fetch, context assembly,
//! model call, reply.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use threadbot_types::error::TransportError;
use threadbot_types::event::SessionEvent;
use threadbot_types::message::{ConversationId, ThreadMessage, Trigger};

use crate::context::ContextAssembler;
use crate::event::EventBus;
use crate::generator::{Generated, ResponseGenerator};
use crate::transport::Transport;

use super::actor::Session;

/// Runs turns for every session of one registry.
pub struct TurnRunner<T> {
    transport: Arc<T>,
    assembler: ContextAssembler,
    generator: ResponseGenerator,
    history_fetch_limit: usize,
    fetch_retry_delay: Duration,
    dropped_notice: String,
    events: EventBus,
}

/// Posted once when a retired session drops triggers it had accepted.
pub const DEFAULT_DROPPED_NOTICE: &str = "The conversation was restarted before your last \
     message could be answered. Please send it again.";

impl<T: Transport> TurnRunner<T> {
    pub fn new(
        transport: Arc<T>,
        assembler: ContextAssembler,
        generator: ResponseGenerator,
        history_fetch_limit: usize,
        fetch_retry_delay: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            assembler,
            generator,
            history_fetch_limit,
            fetch_retry_delay,
            dropped_notice: DEFAULT_DROPPED_NOTICE.to_string(),
            events,
        }
    }

    pub fn with_dropped_notice(mut self, notice: impl Into<String>) -> Self {
        self.dropped_notice = notice.into();
        self
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn generator(&self) -> &ResponseGenerator {
        &self.generator
    }

    /// Process one trigger to completion and post the reply.
    ///
    /// Every trigger gets a reply: the model's, or the fallback text when the
    /// history cannot be fetched or the model call fails.
    pub async fn run(&self, session: &Session, trigger: Trigger) -> Generated {
        let conversation = session.conversation_id();
        debug!(
            conversation_id = %conversation,
            session_id = %session.session_id(),
            message_id = %trigger.message_id,
            "Turn started"
        );

        if let Err(e) = self.transport.send_typing(conversation).await {
            debug!(conversation_id = %conversation, error = %e, "Typing indicator failed");
        }

        let generated = match self.fetch_history(conversation).await {
            Ok(history) => self.reply_to(&history, &trigger.content).await,
            Err(e) => {
                warn!(
                    conversation_id = %conversation,
                    error = %e,
                    "History unavailable after retry, replying with fallback text"
                );
                Generated {
                    text: self.generator.fallback_text().to_string(),
                    fallback: true,
                }
            }
        };

        if let Err(e) = self.transport.post_message(conversation, &generated.text).await {
            error!(
                conversation_id = %conversation,
                session_id = %session.session_id(),
                message_id = %trigger.message_id,
                error = %e,
                "Failed to post reply"
            );
        } else {
            self.events.publish(SessionEvent::ReplyPosted {
                conversation_id: conversation.clone(),
                session_id: session.session_id(),
                message_id: trigger.message_id.clone(),
                fallback: generated.fallback,
            });
        }

        session.touch();
        generated
    }

    /// Tell the conversation that accepted triggers will not be answered.
    pub async fn post_dropped_notice(&self, conversation: &ConversationId) {
        if let Err(e) = self
            .transport
            .post_message(conversation, &self.dropped_notice)
            .await
        {
            error!(conversation_id = %conversation, error = %e, "Failed to post dropped notice");
        }
    }

    /// Assemble a window from `history` and generate a reply to `content`.
    pub async fn reply_to(&self, history: &[ThreadMessage], content: &str) -> Generated {
        let window = self.assembler.assemble(history, content);
        self.generator.generate_detailed(&window).await
    }

    /// Fetch history, retrying once after `fetch_retry_delay`.
    async fn fetch_history(
        &self,
        conversation: &ConversationId,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        match self
            .transport
            .fetch_history(conversation, self.history_fetch_limit)
            .await
        {
            Ok(history) => Ok(history),
            Err(e) => {
                warn!(
                    conversation_id = %conversation,
                    error = %e,
                    retry_in_ms = self.fetch_retry_delay.as_millis() as u64,
                    "History fetch failed, retrying"
                );
                tokio::time::sleep(self.fetch_retry_delay).await;
                self.transport
                    .fetch_history(conversation, self.history_fetch_limit)
                    .await
            }
        }
    }
}

impl<T> std::fmt::Debug for TurnRunner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnRunner")
            .field("assembler", &self.assembler)
            .field("generator", &self.generator)
            .field("history_fetch_limit", &self.history_fetch_limit)
            .finish()
    }
}

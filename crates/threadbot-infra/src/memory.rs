//! In-memory transport for the interactive console.
//!
//! Keeps conversation logs in process and publishes everything the engine
//! posts as [`MemoryOutput`] on a broadcast channel for the console to render.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::{Mutex, broadcast};

use threadbot_core::transport::Transport;
use threadbot_types::command::{CommandInteraction, CommandReply};
use threadbot_types::error::TransportError;
use threadbot_types::message::{ChannelId, ConversationId, InboundMessage, ThreadMessage};

/// Something the engine did on the in-memory transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryOutput {
    Opened {
        conversation_id: ConversationId,
        name: String,
    },
    Posted {
        conversation_id: ConversationId,
        content: String,
    },
    Archived {
        conversation_id: ConversationId,
        archived: bool,
    },
    CommandReply(CommandReply),
}

#[derive(Debug, Default)]
struct Conversation {
    messages: Vec<ThreadMessage>,
    archived: bool,
}

#[derive(Debug)]
pub struct MemoryTransport {
    conversations: Mutex<HashMap<ConversationId, Conversation>>,
    next_id: AtomicU64,
    output: broadcast::Sender<MemoryOutput>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (output, _) = broadcast::channel(256);
        Self {
            conversations: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            output,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryOutput> {
        self.output.subscribe()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn emit(&self, output: MemoryOutput) {
        // No subscribers is fine.
        let _ = self.output.send(output);
    }

    /// Append a human message to a conversation and return it as an
    /// inbound event for the dispatcher. Unarchives the conversation.
    pub async fn user_says(
        &self,
        conversation_id: &ConversationId,
        author_id: &str,
        content: &str,
    ) -> Result<InboundMessage, TransportError> {
        let mut conversations = self.conversations.lock().await;
        let conversation = conversations
            .get_mut(conversation_id)
            .ok_or_else(|| TransportError::UnknownConversation(conversation_id.to_string()))?;

        let message = ThreadMessage {
            id: self.next_id("msg"),
            author_is_model: false,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        conversation.archived = false;
        conversation.messages.push(message.clone());

        Ok(InboundMessage {
            id: message.id,
            conversation_id: conversation_id.clone(),
            author_id: author_id.to_string(),
            author_is_model: false,
            content: message.content,
            created_at: message.created_at,
        })
    }

    pub async fn is_archived(&self, conversation_id: &ConversationId) -> Option<bool> {
        self.conversations
            .lock()
            .await
            .get(conversation_id)
            .map(|c| c.archived)
    }

    pub async fn message_count(&self, conversation_id: &ConversationId) -> usize {
        self.conversations
            .lock()
            .await
            .get(conversation_id)
            .map_or(0, |c| c.messages.len())
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    async fn open_conversation(
        &self,
        _parent: &ChannelId,
        name: &str,
    ) -> Result<ConversationId, TransportError> {
        let conversation_id = ConversationId::new(self.next_id("thread"));
        self.conversations
            .lock()
            .await
            .insert(conversation_id.clone(), Conversation::default());
        self.emit(MemoryOutput::Opened {
            conversation_id: conversation_id.clone(),
            name: name.to_string(),
        });
        Ok(conversation_id)
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        let conversations = self.conversations.lock().await;
        let log = &conversations
            .get(conversation)
            .ok_or_else(|| TransportError::UnknownConversation(conversation.to_string()))?
            .messages;
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<(), TransportError> {
        {
            let mut conversations = self.conversations.lock().await;
            let entry = conversations
                .get_mut(conversation)
                .ok_or_else(|| TransportError::UnknownConversation(conversation.to_string()))?;
            entry.archived = false;
            entry.messages.push(ThreadMessage {
                id: self.next_id("msg"),
                author_is_model: true,
                content: content.to_string(),
                created_at: Utc::now(),
            });
        }
        self.emit(MemoryOutput::Posted {
            conversation_id: conversation.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn set_archived(
        &self,
        conversation: &ConversationId,
        archived: bool,
    ) -> Result<(), TransportError> {
        {
            let mut conversations = self.conversations.lock().await;
            let entry = conversations
                .get_mut(conversation)
                .ok_or_else(|| TransportError::UnknownConversation(conversation.to_string()))?;
            entry.archived = archived;
        }
        self.emit(MemoryOutput::Archived {
            conversation_id: conversation.clone(),
            archived,
        });
        Ok(())
    }

    async fn send_typing(&self, _conversation: &ConversationId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn defer_command(
        &self,
        _interaction: &CommandInteraction,
        _ephemeral: bool,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn reply_to_command(
        &self,
        _interaction: &CommandInteraction,
        reply: &CommandReply,
    ) -> Result<(), TransportError> {
        self.emit(MemoryOutput::CommandReply(reply.clone()));
        Ok(())
    }
}

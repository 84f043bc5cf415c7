//! Conversation identity and thread message types.
//!
//! A conversation is a thread-like sub-channel on the chat transport. The
//! transport owns the message log; the engine only ever reads it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport identifier of a conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Transport identifier of a parent channel under which conversations open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as observed in a conversation's log.
///
/// Immutable once observed. `id` is carried for logging and tie-breaking only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    /// Whether the model (any bot account) authored this message.
    pub author_is_model: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// An inbound message event from the transport's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub author_id: String,
    pub author_is_model: bool,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A human-authored message accepted by a session for generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub message_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl From<InboundMessage> for Trigger {
    fn from(msg: InboundMessage) -> Self {
        Self {
            message_id: msg.id,
            content: msg.content,
            received_at: msg.created_at,
        }
    }
}

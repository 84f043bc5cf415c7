//! Events flowing into and out of the session engine.
//!
//! `TransportEvent` is what the chat transport delivers to the dispatcher.
//! `SessionEvent` is what the engine publishes on its event bus for
//! observers (console output, tests, logs).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::command::CommandInvocation;
use crate::message::{ConversationId, InboundMessage};
use crate::session::TerminationReason;

/// An inbound event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportEvent {
    /// A message was posted in some channel or conversation.
    MessageCreated(InboundMessage),
    /// A user invoked one of the registered commands.
    CommandInvoked(CommandInvocation),
}

/// Lifecycle and turn events published by the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        conversation_id: ConversationId,
        session_id: Uuid,
    },

    TriggerAccepted {
        conversation_id: ConversationId,
        session_id: Uuid,
        message_id: String,
    },

    /// A trigger arrived for a session that no longer accepts work.
    TriggerRejected {
        conversation_id: ConversationId,
        session_id: Uuid,
        message_id: String,
    },

    ReplyPosted {
        conversation_id: ConversationId,
        session_id: Uuid,
        message_id: String,
        /// Whether the fixed fallback text was posted instead of a model reply.
        fallback: bool,
    },

    SessionTerminated {
        conversation_id: ConversationId,
        session_id: Uuid,
        reason: TerminationReason,
    },

    /// Queued triggers discarded when their session was retired.
    TriggersDropped {
        conversation_id: ConversationId,
        session_id: Uuid,
        count: usize,
    },
}

impl SessionEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            SessionEvent::SessionStarted {
                conversation_id, ..
            }
            | SessionEvent::TriggerAccepted {
                conversation_id, ..
            }
            | SessionEvent::TriggerRejected {
                conversation_id, ..
            }
            | SessionEvent::ReplyPosted {
                conversation_id, ..
            }
            | SessionEvent::SessionTerminated {
                conversation_id, ..
            }
            | SessionEvent::TriggersDropped {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

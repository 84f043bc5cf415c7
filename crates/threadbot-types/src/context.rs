//! Bounded, role-tagged context window sent to the model for one turn.

use serde::{Deserialize, Serialize};

use crate::llm::{Message, MessageRole};

/// The ordered message list for one generation call.
///
/// Layout is always `[system directive, history..., trigger]`. Built fresh per
/// call and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    messages: Vec<Message>,
    history_len: usize,
    history_bytes: usize,
}

impl ContextWindow {
    /// Build a window from its three parts.
    ///
    /// `history_bytes` is the budgeted size of `history` as computed by the
    /// assembler.
    pub fn new(
        directive: impl Into<String>,
        history: Vec<Message>,
        history_bytes: usize,
        trigger: impl Into<String>,
    ) -> Self {
        let history_len = history.len();
        let mut messages = Vec::with_capacity(history_len + 2);
        messages.push(Message::new(MessageRole::System, directive));
        messages.extend(history);
        messages.push(Message::new(MessageRole::User, trigger));
        Self {
            messages,
            history_len,
            history_bytes,
        }
    }

    /// The full role-tagged list, directive first and trigger last.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// The system directive entry.
    pub fn directive(&self) -> &Message {
        &self.messages[0]
    }

    /// The history entries between the directive and the trigger.
    pub fn history(&self) -> &[Message] {
        &self.messages[1..1 + self.history_len]
    }

    /// The final user turn.
    pub fn trigger(&self) -> &Message {
        &self.messages[self.messages.len() - 1]
    }

    /// Serialized size of the history portion.
    pub fn history_bytes(&self) -> usize {
        self.history_bytes
    }
}

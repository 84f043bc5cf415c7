//! Context assembler that turns a conversation's message log into a bounded,
//! role-tagged context window.
//!
//! The history portion of the window never exceeds `max_bytes`. Truncation
//! drops the oldest messages first and never touches the system directive or
//! the triggering message.

use threadbot_types::context::ContextWindow;
use threadbot_types::llm::{Message, MessageRole};
use threadbot_types::message::ThreadMessage;
use tracing::debug;

/// Fixed per-entry overhead added to the role and content lengths.
pub const ENTRY_OVERHEAD_BYTES: usize = 4;

/// Budgeted size of one history entry: `len(role) + len(content) + 4`,
/// measured in UTF-8 bytes.
pub fn entry_bytes(role: MessageRole, content: &str) -> usize {
    role.as_str().len() + content.len() + ENTRY_OVERHEAD_BYTES
}

/// Builds context windows for one configured budget and directive.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_bytes: usize,
    directive: String,
}

/// Snowflake-style ids grow in length over time, so shorter ids are older.
fn id_order_key(id: &str) -> (usize, &str) {
    (id.len(), id)
}

impl ContextAssembler {
    pub fn new(max_bytes: usize, directive: impl Into<String>) -> Self {
        Self {
            max_bytes,
            directive: directive.into(),
        }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn directive(&self) -> &str {
        &self.directive
    }

    /// Assemble the context window for one turn.
    ///
    /// `history` may arrive in any order and may already contain the
    /// triggering message as its newest entry.
    pub fn assemble(&self, history: &[ThreadMessage], trigger: &str) -> ContextWindow {
        let mut sorted: Vec<&ThreadMessage> = history.iter().collect();
        sorted.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| id_order_key(&a.id).cmp(&id_order_key(&b.id)))
        });

        if sorted.last().is_some_and(|newest| newest.content == trigger) {
            sorted.pop();
        }

        let (kept, history_bytes) = self.truncate_history(&sorted);

        debug!(
            fetched = history.len(),
            kept = kept.len(),
            history_bytes,
            max_bytes = self.max_bytes,
            "Assembled context window"
        );

        ContextWindow::new(self.directive.clone(), kept, history_bytes, trigger)
    }

    /// Keep the newest contiguous suffix of `sorted` that fits the budget.
    ///
    /// Returns the kept entries in chronological order and their total size.
    pub fn truncate_history(&self, sorted: &[&ThreadMessage]) -> (Vec<Message>, usize) {
        let mut total = 0usize;
        let mut kept = Vec::new();

        for msg in sorted.iter().rev() {
            let role = MessageRole::from_author(msg.author_is_model);
            let size = entry_bytes(role, &msg.content);
            if total + size > self.max_bytes {
                break;
            }
            total += size;
            kept.push(Message::new(role, msg.content.clone()));
        }

        kept.reverse();
        (kept, total)
    }
}

//! Transport trait: the chat platform the engine reads from and posts to.
//!
//! The transport owns the message log. The engine only reads history, posts
//! replies, archives threads and answers commands. Implementations live in
//! threadbot-infra (Discord REST, in-memory).

use std::future::Future;

use threadbot_types::command::{CommandInteraction, CommandReply};
use threadbot_types::error::TransportError;
use threadbot_types::message::{ChannelId, ConversationId, ThreadMessage};

/// Operations the session engine needs from a chat platform.
///
/// Uses native async fn in traits (RPITIT). Every returned future is `Send`
/// so session workers can run on any tokio runtime.
pub trait Transport: Send + Sync {
    /// Open a new thread-like conversation under `parent`.
    fn open_conversation(
        &self,
        parent: &ChannelId,
        name: &str,
    ) -> impl Future<Output = Result<ConversationId, TransportError>> + Send;

    /// Fetch up to `limit` of the most recent messages of a conversation.
    ///
    /// Order is unspecified; callers sort.
    fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ThreadMessage>, TransportError>> + Send;

    /// Post a message. Content longer than the platform limit is split.
    fn post_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Archive (close) or unarchive a conversation.
    fn set_archived(
        &self,
        conversation: &ConversationId,
        archived: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Show a typing indicator. Best effort.
    fn send_typing(
        &self,
        conversation: &ConversationId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Acknowledge a command now and answer it later.
    fn defer_command(
        &self,
        interaction: &CommandInteraction,
        ephemeral: bool,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Answer a command. Deferred interactions receive a follow-up.
    fn reply_to_command(
        &self,
        interaction: &CommandInteraction,
        reply: &CommandReply,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

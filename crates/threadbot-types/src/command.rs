//! Slash-command types exposed to users.
//!
//! Two commands exist: `chat` starts a conversation with an initial message,
//! `restart` renews the session of the conversation it is invoked in.

use serde::{Deserialize, Serialize};

use crate::message::{ChannelId, ConversationId};

/// Registered name of the start-conversation command.
pub const CHAT_COMMAND: &str = "chat";

/// Registered name of the restart command.
pub const RESTART_COMMAND: &str = "restart";

/// Name of the `chat` command's required text option.
pub const CHAT_MESSAGE_OPTION: &str = "message";

/// A parsed user command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BotCommand {
    /// Open a new conversation seeded with a reply to `message`.
    Start { message: String },
    /// Restart the session of the current conversation.
    Restart,
}

impl BotCommand {
    /// Parse a command from its registered name and optional text argument.
    pub fn parse(name: &str, message: Option<&str>) -> Option<Self> {
        match name {
            CHAT_COMMAND => message.map(|m| BotCommand::Start {
                message: m.to_string(),
            }),
            RESTART_COMMAND => Some(BotCommand::Restart),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BotCommand::Start { .. } => CHAT_COMMAND,
            BotCommand::Restart => RESTART_COMMAND,
        }
    }
}

/// Handle used to answer a command on the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInteraction {
    pub id: String,
    pub token: String,
    /// Set once the transport has acknowledged the command with a deferred
    /// response; later replies become follow-ups.
    #[serde(default)]
    pub deferred: bool,
}

/// A command invocation as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub interaction: CommandInteraction,
    pub command: BotCommand,
    /// Channel the command was invoked in.
    pub channel_id: ChannelId,
    /// Set when the invoking channel is itself a conversation thread.
    pub conversation_id: Option<ConversationId>,
    pub user_id: String,
}

impl CommandInvocation {
    /// Mention markup for the invoking user.
    pub fn user_mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

/// User-visible answer to a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub content: String,
    /// Visible only to the invoking user.
    pub ephemeral: bool,
}

impl CommandReply {
    pub fn public(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: false,
        }
    }

    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ephemeral: true,
        }
    }
}

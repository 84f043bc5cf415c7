//! Discord wire payloads and their mapping to transport events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use threadbot_types::command::{
    BotCommand, CHAT_COMMAND, CHAT_MESSAGE_OPTION, CommandInteraction, CommandInvocation,
    RESTART_COMMAND,
};
use threadbot_types::config::DiscordConfig;
use threadbot_types::message::{ChannelId, ConversationId, InboundMessage, ThreadMessage};

/// Gateway opcodes used by the listener.
pub mod opcode {
    pub const DISPATCH: u8 = 0;
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RECONNECT: u8 = 7;
    pub const INVALID_SESSION: u8 = 9;
    pub const HELLO: u8 = 10;
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// GUILDS | GUILD_MESSAGES | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 15);

/// Channel types that are threads (announcement, public, private).
const THREAD_CHANNEL_TYPES: [u8; 3] = [10, 11, 12];

/// Public thread channel type, used when opening conversations.
pub const PUBLIC_THREAD: u8 = 11;

/// Interaction type for application (slash) commands.
const APPLICATION_COMMAND: u8 = 2;

/// Interaction callback: respond with a message.
pub const CALLBACK_CHANNEL_MESSAGE: u8 = 4;
/// Interaction callback: acknowledge now, respond later.
pub const CALLBACK_DEFERRED_CHANNEL_MESSAGE: u8 = 5;
/// Message flag: visible only to the invoking user.
pub const FLAG_EPHEMERAL: u64 = 1 << 6;

/// A raw gateway frame.
#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

/// A message as returned by REST and `MESSAGE_CREATE`.
#[derive(Debug, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: User,
    #[serde(default)]
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl DiscordMessage {
    pub fn into_thread_message(self) -> ThreadMessage {
        ThreadMessage {
            id: self.id,
            author_is_model: self.author.bot,
            content: self.content,
            created_at: self.timestamp,
        }
    }

    pub fn into_inbound(self) -> InboundMessage {
        InboundMessage {
            id: self.id,
            conversation_id: ConversationId::new(self.channel_id),
            author_id: self.author.id,
            author_is_model: self.author.bot,
            content: self.content,
            created_at: self.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PartialChannel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
}

#[derive(Debug, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Deserialize)]
pub struct CommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

/// An `INTERACTION_CREATE` payload.
#[derive(Debug, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub token: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel: Option<PartialChannel>,
    #[serde(default)]
    pub member: Option<Member>,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub data: Option<CommandData>,
}

impl Interaction {
    fn invoker(&self) -> Option<&User> {
        self.member.as_ref().map(|m| &m.user).or(self.user.as_ref())
    }

    /// Map an application command to a [`CommandInvocation`].
    ///
    /// Returns `None` for other interaction kinds and unknown commands.
    pub fn into_invocation(self) -> Option<CommandInvocation> {
        if self.kind != APPLICATION_COMMAND {
            return None;
        }
        let data = self.data.as_ref()?;
        let message = data
            .options
            .iter()
            .find(|o| o.name == CHAT_MESSAGE_OPTION)
            .and_then(|o| o.value.as_str());
        let command = BotCommand::parse(&data.name, message)?;

        let user_id = self.invoker()?.id.clone();
        let channel_id = self
            .channel
            .as_ref()
            .map(|c| c.id.clone())
            .or_else(|| self.channel_id.clone())?;
        let in_thread = self
            .channel
            .as_ref()
            .is_some_and(|c| THREAD_CHANNEL_TYPES.contains(&c.kind));

        Some(CommandInvocation {
            interaction: CommandInteraction {
                id: self.id,
                token: self.token,
                deferred: false,
            },
            command,
            conversation_id: in_thread.then(|| ConversationId::new(channel_id.clone())),
            channel_id: ChannelId::new(channel_id),
            user_id,
        })
    }
}

/// Fields of `READY` the listener needs.
#[derive(Debug, Deserialize)]
pub struct Ready {
    pub user: User,
    pub application: ReadyApplication,
}

#[derive(Debug, Deserialize)]
pub struct ReadyApplication {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatedChannel {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct GatewayBot {
    pub url: String,
}

/// Whether an inbound message passes the guild and user filters.
///
/// Bot-authored messages always pass; the dispatcher ignores them.
pub fn accept_message(message: &DiscordMessage, config: &DiscordConfig) -> bool {
    if let Some(ref gid) = config.guild_id {
        if message.guild_id.as_deref() != Some(gid.as_str()) {
            return false;
        }
    }
    message.author.bot || config.is_user_allowed(&message.author.id)
}

/// Identify frame for the gateway handshake.
pub fn identify(token: &str) -> Value {
    json!({
        "op": opcode::IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "threadbot",
                "device": "threadbot"
            }
        }
    })
}

pub fn heartbeat(sequence: Option<u64>) -> Value {
    json!({ "op": opcode::HEARTBEAT, "d": sequence })
}

/// Slash command definitions registered on `READY`.
pub fn command_definitions(assistant_label: &str) -> Value {
    json!([
        {
            "name": CHAT_COMMAND,
            "description": format!("Start a conversation with {assistant_label}."),
            "options": [{
                "name": CHAT_MESSAGE_OPTION,
                "description": format!("The message you want to send to {assistant_label}."),
                "type": 3,
                "required": true
            }]
        },
        {
            "name": RESTART_COMMAND,
            "description": format!("Restart the conversation with {assistant_label} in the thread.")
        }
    ])
}

pub fn message_flags(ephemeral: bool) -> u64 {
    if ephemeral { FLAG_EPHEMERAL } else { 0 }
}

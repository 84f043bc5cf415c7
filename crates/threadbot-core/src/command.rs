//! Command service: the `chat` (start) and `restart` entry points.
//!
//! Context is validated before anything else happens, so a rejected command
//! never touches the registry or the transport beyond its reply.

use std::sync::Arc;

use tracing::{error, info, warn};

use threadbot_types::command::{BotCommand, CommandInteraction, CommandInvocation, CommandReply};
use threadbot_types::error::CommandError;
use threadbot_types::message::ConversationId;

use crate::session::SessionRegistry;
use crate::transport::Transport;

pub const START_IN_THREAD_MESSAGE: &str = "This command cannot be used in a thread.";
pub const RESTART_OUTSIDE_THREAD_MESSAGE: &str = "This command can only be used in a thread.";
pub const THREAD_CREATED_MESSAGE: &str = "Created a thread";
pub const RESTARTED_MESSAGE: &str = "Conversation restarted. You can continue your conversation now.";

/// Longest slice of the initial message used in a thread name.
const THREAD_NAME_MESSAGE_CHARS: usize = 90;

/// Handles user commands against one registry.
pub struct CommandService<T> {
    registry: Arc<SessionRegistry<T>>,
    thread_name_prefix: String,
    assistant_label: String,
}

impl<T: Transport + 'static> CommandService<T> {
    pub fn new(
        registry: Arc<SessionRegistry<T>>,
        thread_name_prefix: impl Into<String>,
        assistant_label: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            thread_name_prefix: thread_name_prefix.into(),
            assistant_label: assistant_label.into(),
        }
    }

    /// Check that the command is valid where it was invoked.
    pub fn validate(invocation: &CommandInvocation) -> Result<(), CommandError> {
        match (&invocation.command, &invocation.conversation_id) {
            (BotCommand::Start { .. }, Some(_)) => Err(CommandError::InvalidContext(
                START_IN_THREAD_MESSAGE.to_string(),
            )),
            (BotCommand::Restart, None) => Err(CommandError::InvalidContext(
                RESTART_OUTSIDE_THREAD_MESSAGE.to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Run a command and answer it on the transport.
    ///
    /// The reply is always sent: the command's own reply on success, the
    /// error's user message on failure.
    pub async fn handle(&self, invocation: CommandInvocation) -> Result<CommandReply, CommandError> {
        let mut interaction = invocation.interaction.clone();
        let result = self.execute(&invocation, &mut interaction).await;

        let reply = match &result {
            Ok(reply) => reply.clone(),
            Err(e) => CommandReply::ephemeral(e.user_message()),
        };
        if let Err(e) = self
            .registry
            .runner()
            .transport()
            .reply_to_command(&interaction, &reply)
            .await
        {
            error!(
                command = invocation.command.name(),
                user_id = %invocation.user_id,
                error = %e,
                "Failed to answer command"
            );
        }
        result
    }

    async fn execute(
        &self,
        invocation: &CommandInvocation,
        interaction: &mut CommandInteraction,
    ) -> Result<CommandReply, CommandError> {
        Self::validate(invocation)?;
        match (&invocation.command, &invocation.conversation_id) {
            (BotCommand::Start { message }, _) => self.start(invocation, interaction, message).await,
            (BotCommand::Restart, Some(conversation_id)) => self.restart(conversation_id).await,
            (BotCommand::Restart, None) => Err(CommandError::InvalidContext(
                RESTART_OUTSIDE_THREAD_MESSAGE.to_string(),
            )),
        }
    }

    /// Open a conversation seeded with a reply to `message`.
    async fn start(
        &self,
        invocation: &CommandInvocation,
        interaction: &mut CommandInteraction,
        message: &str,
    ) -> Result<CommandReply, CommandError> {
        let runner = self.registry.runner();
        let transport = runner.transport();

        transport.defer_command(interaction, true).await?;
        interaction.deferred = true;

        let seed = runner.reply_to(&[], message).await;

        let name = self.thread_name(message);
        let conversation_id = transport
            .open_conversation(&invocation.channel_id, &name)
            .await?;

        let opening = format!(
            "{}: {}\n{}: {}",
            invocation.user_mention(),
            message,
            self.assistant_label,
            seed.text
        );
        transport.post_message(&conversation_id, &opening).await?;

        let session = self.registry.get_or_create(&conversation_id);
        info!(
            conversation_id = %conversation_id,
            session_id = %session.session_id(),
            user_id = %invocation.user_id,
            seed_fallback = seed.fallback,
            "Conversation started"
        );
        Ok(CommandReply::ephemeral(THREAD_CREATED_MESSAGE))
    }

    async fn restart(&self, conversation_id: &ConversationId) -> Result<CommandReply, CommandError> {
        if let Err(e) = self
            .registry
            .runner()
            .transport()
            .set_archived(conversation_id, false)
            .await
        {
            warn!(
                conversation_id = %conversation_id,
                error = %e,
                "Failed to unarchive conversation"
            );
        }
        self.registry.restart(conversation_id);
        Ok(CommandReply::ephemeral(RESTARTED_MESSAGE))
    }

    /// `"{prefix}-{first 90 chars of message}"`.
    pub fn thread_name(&self, message: &str) -> String {
        let head: String = message.chars().take(THREAD_NAME_MESSAGE_CHARS).collect();
        format!("{}-{}", self.thread_name_prefix, head)
    }
}

impl<T> std::fmt::Debug for CommandService<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandService")
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("assistant_label", &self.assistant_label)
            .finish()
    }
}

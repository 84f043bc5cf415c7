//! Dispatcher: routes transport events to sessions and the command service.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use threadbot_types::command::CommandInvocation;
use threadbot_types::event::TransportEvent;
use threadbot_types::message::{InboundMessage, Trigger};

use crate::command::CommandService;
use crate::session::SessionRegistry;
use crate::transport::Transport;

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Accepted,
    /// Authored by the model (or any bot).
    IgnoredBot,
    /// No live session for the conversation.
    NoSession,
    /// The session stopped accepting triggers.
    Rejected,
}

/// Consumes the transport's event stream.
pub struct Dispatcher<T> {
    registry: Arc<SessionRegistry<T>>,
    commands: Arc<CommandService<T>>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    pub fn new(registry: Arc<SessionRegistry<T>>, commands: Arc<CommandService<T>>) -> Self {
        Self { registry, commands }
    }

    /// Route events until the channel closes or `cancel` fires.
    pub async fn run(self, mut events: mpsc::Receiver<TransportEvent>, cancel: CancellationToken) {
        info!("Dispatcher started");
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = events.recv() => match next {
                    Some(event) => event,
                    None => break,
                },
            };
            self.dispatch(event);
        }
        info!("Dispatcher stopped");
    }

    /// Route one event. Messages are submitted synchronously, so arrival
    /// order is preserved; commands run on their own task.
    pub fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::MessageCreated(message) => {
                self.on_message(message);
            }
            TransportEvent::CommandInvoked(invocation) => {
                self.spawn_command(invocation);
            }
        }
    }

    pub fn on_message(&self, message: InboundMessage) -> MessageOutcome {
        if message.author_is_model {
            return MessageOutcome::IgnoredBot;
        }
        let Some(session) = self.registry.get(&message.conversation_id) else {
            debug!(
                conversation_id = %message.conversation_id,
                message_id = %message.id,
                "No live session, message ignored"
            );
            return MessageOutcome::NoSession;
        };
        match session.submit(Trigger::from(message)) {
            Ok(()) => MessageOutcome::Accepted,
            Err(_) => MessageOutcome::Rejected,
        }
    }

    fn spawn_command(&self, invocation: CommandInvocation) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let name = invocation.command.name();
            let user_id = invocation.user_id.clone();
            if let Err(e) = commands.handle(invocation).await {
                warn!(command = name, user_id = %user_id, error = %e, "Command failed");
            }
        });
    }
}

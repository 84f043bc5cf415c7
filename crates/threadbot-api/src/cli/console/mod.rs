//! `threadbot console`: drive the engine from the terminal.
//!
//! Runs against [`MemoryTransport`], so conversations, idle timeouts and
//! restarts behave as on Discord without a network connection.

pub mod commands;
pub mod input;
pub mod render;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use console::style;
use rustyline_async::SharedWriter;
use tokio::sync::broadcast::error::RecvError;

use threadbot_core::dispatch::{Dispatcher, MessageOutcome};
use threadbot_infra::memory::{MemoryOutput, MemoryTransport};
use threadbot_types::command::{BotCommand, CommandInteraction, CommandInvocation};
use threadbot_types::event::TransportEvent;
use threadbot_types::message::{ChannelId, ConversationId};

use crate::state::{AppState, Engine};

use self::commands::ConsoleCommand;
use self::input::{ConsoleInput, InputEvent};
use self::render::{render_event, render_output, snapshot_table};

/// The single parent channel of the console transport.
const CONSOLE_CHANNEL: &str = "console";
const CONSOLE_USER: &str = "console-user";

struct Console {
    transport: Arc<MemoryTransport>,
    engine: Engine<MemoryTransport>,
    dispatcher: Dispatcher<MemoryTransport>,
    stdout: SharedWriter,
    current: Option<ConversationId>,
    interactions: u64,
    json: bool,
}

pub async fn run(state: &AppState, json: bool) -> Result<()> {
    let transport = Arc::new(MemoryTransport::new());
    let engine = state.build_engine(transport.clone())?;
    let label = state.config.assistant_label.clone();

    let (mut input, stdout) = ConsoleInput::new(prompt(None))?;
    let mut outputs = transport.subscribe();
    let mut events = engine.events.subscribe();

    let mut console = Console {
        dispatcher: engine.dispatcher(),
        transport,
        engine,
        stdout,
        current: None,
        interactions: 0,
        json,
    };

    writeln!(
        console.stdout,
        "\n  {} Threadbot console ({} via {})\n  Type {} for commands.\n",
        style("⚡").bold(),
        style(&state.config.model.model).cyan(),
        state.config.model.provider,
        style("/help").cyan()
    )?;

    loop {
        tokio::select! {
            output = outputs.recv() => match output {
                Ok(output) => {
                    if let MemoryOutput::Opened { conversation_id, .. } = &output {
                        console.current = Some(conversation_id.clone());
                        input.update_prompt(&prompt(console.current.as_ref()));
                    }
                    writeln!(console.stdout, "{}", render_output(&output, &label))?;
                }
                Err(RecvError::Lagged(skipped)) => {
                    writeln!(console.stdout, "{}", style(format!("({skipped} outputs skipped)")).dim())?;
                }
                Err(RecvError::Closed) => break,
            },
            event = events.recv() => {
                if let Ok(event) = event {
                    if let Some(line) = render_event(&event) {
                        writeln!(console.stdout, "{line}")?;
                    }
                }
            },
            event = input.read_line() => match event {
                InputEvent::Eof | InputEvent::Interrupted => break,
                InputEvent::Line(line) if line.is_empty() => {}
                InputEvent::Line(line) => match commands::parse(&line) {
                    Some(ConsoleCommand::Exit) => break,
                    Some(command) => {
                        console.on_command(command).await?;
                        input.update_prompt(&prompt(console.current.as_ref()));
                    }
                    None => console.on_message(&line).await?,
                },
            },
        }
    }

    input.flush();
    console.engine.registry.shutdown();
    Ok(())
}

fn prompt(current: Option<&ConversationId>) -> String {
    format!("{}> ", current.map_or("threadbot", ConversationId::as_str))
}

impl Console {
    async fn on_command(&mut self, command: ConsoleCommand) -> Result<()> {
        match command {
            ConsoleCommand::Chat(message) => {
                let invocation = self.invocation(BotCommand::Start { message }, None);
                self.dispatcher
                    .dispatch(TransportEvent::CommandInvoked(invocation));
            }
            ConsoleCommand::Restart => {
                let invocation = self.invocation(BotCommand::Restart, self.current.clone());
                self.dispatcher
                    .dispatch(TransportEvent::CommandInvoked(invocation));
            }
            ConsoleCommand::Status => self.print_status()?,
            ConsoleCommand::Switch(id) => {
                let id = ConversationId::new(id);
                if self.transport.is_archived(&id).await.is_some() {
                    self.current = Some(id);
                } else {
                    writeln!(self.stdout, "{}", style(format!("No conversation {id}")).red())?;
                }
            }
            ConsoleCommand::Help => write!(self.stdout, "{}", commands::help_text())?,
            ConsoleCommand::Unknown(reason) => {
                writeln!(self.stdout, "{}", style(reason).red())?;
            }
            ConsoleCommand::Exit => {}
        }
        Ok(())
    }

    async fn on_message(&mut self, line: &str) -> Result<()> {
        let Some(conversation_id) = self.current.clone() else {
            writeln!(
                self.stdout,
                "{}",
                style("Start a conversation with /chat <message>.").yellow()
            )?;
            return Ok(());
        };

        let message = self
            .transport
            .user_says(&conversation_id, CONSOLE_USER, line)
            .await?;
        match self.dispatcher.on_message(message) {
            MessageOutcome::Accepted | MessageOutcome::IgnoredBot => {}
            MessageOutcome::NoSession | MessageOutcome::Rejected => {
                writeln!(
                    self.stdout,
                    "{}",
                    style(format!(
                        "The conversation in {conversation_id} has ended. Use /restart to continue."
                    ))
                    .yellow()
                )?;
            }
        }
        Ok(())
    }

    fn print_status(&mut self) -> Result<()> {
        let snapshots = self.engine.registry.snapshots();
        if self.json {
            writeln!(self.stdout, "{}", serde_json::to_string_pretty(&snapshots)?)?;
        } else if snapshots.is_empty() {
            writeln!(self.stdout, "{}", style("No live sessions.").dim())?;
        } else {
            writeln!(self.stdout, "{}", snapshot_table(&snapshots, Utc::now()))?;
        }
        Ok(())
    }

    fn invocation(
        &mut self,
        command: BotCommand,
        conversation_id: Option<ConversationId>,
    ) -> CommandInvocation {
        self.interactions += 1;
        let id = format!("console-{}", self.interactions);
        CommandInvocation {
            interaction: CommandInteraction {
                id: id.clone(),
                token: id,
                deferred: false,
            },
            command,
            channel_id: ChannelId::new(CONSOLE_CHANNEL),
            conversation_id,
            user_id: CONSOLE_USER.to_string(),
        }
    }
}

//! Slash command parsing for the console loop.

use console::style;

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Start a new conversation seeded with a message.
    Chat(String),
    /// Restart the current conversation.
    Restart,
    /// Print live session snapshots.
    Status,
    /// Switch to another conversation by id.
    Switch(String),
    Help,
    Exit,
    /// Unknown command or missing argument.
    Unknown(String),
}

/// Parse user input as a slash command.
///
/// Returns `None` if the input doesn't start with `/`.
pub fn parse(input: &str) -> Option<ConsoleCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (cmd, arg) = match trimmed.split_once(' ') {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (trimmed, ""),
    };

    let command = match cmd.to_lowercase().as_str() {
        "/chat" if arg.is_empty() => ConsoleCommand::Unknown("/chat requires a message".to_string()),
        "/chat" => ConsoleCommand::Chat(arg.to_string()),
        "/restart" => ConsoleCommand::Restart,
        "/status" => ConsoleCommand::Status,
        "/switch" if arg.is_empty() => {
            ConsoleCommand::Unknown("/switch requires a conversation id".to_string())
        }
        "/switch" => ConsoleCommand::Switch(arg.to_string()),
        "/help" | "/h" | "/?" => ConsoleCommand::Help,
        "/exit" | "/quit" | "/q" => ConsoleCommand::Exit,
        other => ConsoleCommand::Unknown(format!("unknown command {other}")),
    };
    Some(command)
}

pub fn help_text() -> String {
    let rows = [
        ("/chat <message>", "Start a new conversation"),
        ("/restart", "Restart the current conversation"),
        ("/status", "Show live sessions"),
        ("/switch <id>", "Switch to another conversation"),
        ("/help", "Show this help message"),
        ("/exit", "Leave the console"),
    ];
    let mut text = format!("\n  {}\n\n", style("Available commands:").bold());
    for (cmd, desc) in rows {
        text.push_str(&format!("  {} {desc}\n", style(format!("{cmd:<18}")).cyan()));
    }
    text.push_str("\n  Anything else is sent as a message in the current conversation.\n");
    text
}

//! Rendering of transport output and session snapshots.

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use threadbot_infra::memory::MemoryOutput;
use threadbot_types::event::SessionEvent;
use threadbot_types::session::{SessionSnapshot, SessionState};

/// One line (or block) of console output for a transport event.
pub fn render_output(output: &MemoryOutput, assistant_label: &str) -> String {
    match output {
        MemoryOutput::Opened {
            conversation_id,
            name,
        } => format!(
            "{} opened {} ({})",
            style("»").dim(),
            style(conversation_id).bold(),
            style(name).dim()
        ),
        MemoryOutput::Posted {
            conversation_id,
            content,
        } => format!(
            "{} {}: {content}",
            style(format!("[{conversation_id}]")).dim(),
            style(assistant_label).cyan().bold()
        ),
        MemoryOutput::Archived {
            conversation_id,
            archived,
        } => {
            let verb = if *archived { "archived" } else { "unarchived" };
            format!("{} {conversation_id} {verb}", style("»").dim())
        }
        MemoryOutput::CommandReply(reply) => {
            let marker = if reply.ephemeral { " (only you)" } else { "" };
            format!(
                "{} {}{}",
                style("»").dim(),
                reply.content,
                style(marker).dim()
            )
        }
    }
}

/// Lifecycle events worth showing; per-turn events stay in the logs.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::SessionTerminated {
            conversation_id,
            reason,
            ..
        } => Some(format!(
            "{} session in {conversation_id} ended ({reason})",
            style("»").dim()
        )),
        SessionEvent::TriggersDropped {
            conversation_id,
            count,
            ..
        } => Some(format!(
            "{} {count} queued message(s) in {conversation_id} dropped",
            style("»").dim()
        )),
        _ => None,
    }
}

pub fn snapshot_table(snapshots: &[SessionSnapshot], now: DateTime<Utc>) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Conversation").fg(Color::White),
        Cell::new("Session").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Idle").fg(Color::White),
        Cell::new("In flight").fg(Color::White),
        Cell::new("Pending").fg(Color::White),
    ]);

    for snapshot in snapshots {
        let state_cell = match snapshot.state {
            SessionState::Active => Cell::new("active").fg(Color::Green),
            SessionState::Terminated => Cell::new("terminated").fg(Color::Red),
        };
        let session = snapshot.session_id.to_string();
        table.add_row(vec![
            Cell::new(snapshot.conversation_id.as_str()),
            Cell::new(&session[..8]),
            state_cell,
            Cell::new(format_idle(now - snapshot.last_activity_at)),
            Cell::new(if snapshot.in_flight { "yes" } else { "-" }),
            Cell::new(snapshot.pending),
        ]);
    }

    table
}

fn format_idle(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

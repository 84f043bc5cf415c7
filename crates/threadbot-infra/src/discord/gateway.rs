//! Discord gateway listener.
//!
//! Keeps one WebSocket session open, answers heartbeats, and forwards
//! `MESSAGE_CREATE` / `INTERACTION_CREATE` as [`TransportEvent`]s.
//! Reconnects with exponential backoff until cancelled.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use threadbot_types::config::DiscordConfig;
use threadbot_types::error::TransportError;
use threadbot_types::event::TransportEvent;

use super::DiscordTransport;
use super::payload::{
    DiscordMessage, GatewayPayload, Interaction, Ready, accept_message, command_definitions,
    heartbeat, identify, opcode,
};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);
const DEFAULT_HEARTBEAT_MS: u64 = 41_250;

/// How a gateway session ended.
enum SessionEnd {
    /// The server asked us to reconnect, or the socket closed.
    Reconnect,
    /// Cancelled, or nobody is listening for events anymore.
    Stop,
}

pub struct GatewayListener {
    transport: Arc<DiscordTransport>,
    config: DiscordConfig,
    assistant_label: String,
}

impl GatewayListener {
    pub fn new(
        transport: Arc<DiscordTransport>,
        config: DiscordConfig,
        assistant_label: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            config,
            assistant_label: assistant_label.into(),
        }
    }

    /// Run until `cancel` fires or `events` is closed.
    pub async fn run(self, events: mpsc::Sender<TransportEvent>, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            match self.session(&events, &cancel).await {
                Ok(SessionEnd::Stop) => break,
                Ok(SessionEnd::Reconnect) => {
                    info!("Discord gateway reconnecting");
                    backoff = INITIAL_BACKOFF;
                }
                Err(e) => {
                    warn!(error = %e, backoff_secs = backoff.as_secs(), "Discord gateway session failed");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        info!("Discord gateway stopped");
    }

    async fn session(
        &self,
        events: &mpsc::Sender<TransportEvent>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, TransportError> {
        let url = self.transport.gateway_url().await?;
        debug!(%url, "Connecting to Discord gateway");

        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Http(format!("WebSocket connection failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        // Hello (opcode 10)
        let hello = match read.next().await {
            Some(Ok(Message::Text(text))) => parse_frame(&text)?,
            Some(Ok(other)) => {
                return Err(TransportError::Decode(format!("unexpected hello frame: {other:?}")));
            }
            Some(Err(e)) => return Err(TransportError::Http(format!("WebSocket error: {e}"))),
            None => return Err(TransportError::NotConnected),
        };
        if hello.op != opcode::HELLO {
            return Err(TransportError::Decode(format!("expected hello, got op {}", hello.op)));
        }
        let heartbeat_ms = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_HEARTBEAT_MS);

        write
            .send(Message::Text(identify(self.transport.token()).to_string()))
            .await
            .map_err(|e| TransportError::Http(format!("Failed to identify: {e}")))?;

        let mut sequence: Option<u64> = None;
        let mut ticker = tokio::time::interval(Duration::from_millis(heartbeat_ms));
        // First tick completes immediately; skip it so the first heartbeat
        // lands one interval after identify.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Stop);
                }
                _ = ticker.tick() => {
                    write
                        .send(Message::Text(heartbeat(sequence).to_string()))
                        .await
                        .map_err(|e| TransportError::Http(format!("Failed to heartbeat: {e}")))?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(close))) => {
                            debug!(?close, "Discord gateway closed the socket");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(TransportError::Http(format!("WebSocket error: {e}"))),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let frame = match parse_frame(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            debug!(error = %e, "Skipping undecodable gateway frame");
                            continue;
                        }
                    };
                    if frame.s.is_some() {
                        sequence = frame.s;
                    }

                    match frame.op {
                        opcode::DISPATCH => {
                            let Some(event) = self.on_dispatch(frame).await else {
                                continue;
                            };
                            if events.send(event).await.is_err() {
                                return Ok(SessionEnd::Stop);
                            }
                        }
                        opcode::HEARTBEAT => {
                            write
                                .send(Message::Text(heartbeat(sequence).to_string()))
                                .await
                                .map_err(|e| TransportError::Http(format!("Failed to heartbeat: {e}")))?;
                        }
                        opcode::RECONNECT | opcode::INVALID_SESSION => {
                            debug!(op = frame.op, "Discord gateway requested a new session");
                            return Ok(SessionEnd::Reconnect);
                        }
                        opcode::HEARTBEAT_ACK => {}
                        other => debug!(op = other, "Ignoring gateway opcode"),
                    }
                }
            }
        }
    }

    /// Handle a dispatch frame, returning the event to forward, if any.
    async fn on_dispatch(&self, frame: GatewayPayload) -> Option<TransportEvent> {
        match frame.t.as_deref()? {
            "READY" => {
                match serde_json::from_value::<Ready>(frame.d) {
                    Ok(ready) => self.on_ready(ready).await,
                    Err(e) => warn!(error = %e, "Failed to decode READY"),
                }
                None
            }
            "MESSAGE_CREATE" => {
                let message: DiscordMessage = match serde_json::from_value(frame.d) {
                    Ok(message) => message,
                    Err(e) => {
                        debug!(error = %e, "Failed to decode MESSAGE_CREATE");
                        return None;
                    }
                };
                if !accept_message(&message, &self.config) {
                    debug!(author_id = %message.author.id, "Ignoring message from filtered author");
                    return None;
                }
                Some(TransportEvent::MessageCreated(message.into_inbound()))
            }
            "INTERACTION_CREATE" => {
                let interaction: Interaction = match serde_json::from_value(frame.d) {
                    Ok(interaction) => interaction,
                    Err(e) => {
                        debug!(error = %e, "Failed to decode INTERACTION_CREATE");
                        return None;
                    }
                };
                if let Some(ref gid) = self.config.guild_id {
                    if interaction.guild_id.as_deref() != Some(gid.as_str()) {
                        return None;
                    }
                }
                let invocation = interaction.into_invocation()?;
                if !self.config.is_user_allowed(&invocation.user_id) {
                    warn!(user_id = %invocation.user_id, "Ignoring command from unauthorized user");
                    return None;
                }
                Some(TransportEvent::CommandInvoked(invocation))
            }
            _ => None,
        }
    }

    async fn on_ready(&self, ready: Ready) {
        info!(
            user = %ready.user.username,
            application_id = %ready.application.id,
            "Discord gateway ready"
        );
        self.transport.set_application_id(ready.application.id);

        let definitions = command_definitions(&self.assistant_label);
        match self
            .transport
            .register_commands(self.config.guild_id.as_deref(), definitions)
            .await
        {
            Ok(()) => info!("Slash commands registered"),
            Err(e) => warn!(error = %e, "Failed to register slash commands"),
        }
    }
}

fn parse_frame(text: &str) -> Result<GatewayPayload, TransportError> {
    serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    fn listener(config: DiscordConfig) -> GatewayListener {
        let transport = Arc::new(DiscordTransport::new(SecretString::from("t".to_string())));
        GatewayListener::new(transport, config, "ChatGPT")
    }

    fn dispatch(t: &str, d: Value) -> GatewayPayload {
        serde_json::from_value(json!({ "op": 0, "s": 3, "t": t, "d": d })).unwrap()
    }

    #[tokio::test]
    async fn test_message_create_is_forwarded() {
        let l = listener(DiscordConfig::default());
        let frame = dispatch(
            "MESSAGE_CREATE",
            json!({
                "id": "m1", "channel_id": "t1", "guild_id": "g1",
                "author": { "id": "u1", "username": "alice" },
                "content": "hello",
                "timestamp": "2024-05-01T12:00:00+00:00"
            }),
        );
        let event = l.on_dispatch(frame).await.unwrap();
        let TransportEvent::MessageCreated(msg) = event else {
            panic!("expected a message event");
        };
        assert_eq!(msg.conversation_id.as_str(), "t1");
        assert!(!msg.author_is_model);
    }

    #[tokio::test]
    async fn test_interaction_from_disallowed_user_is_dropped() {
        let l = listener(DiscordConfig {
            allowed_users: vec!["someone-else".to_string()],
            ..DiscordConfig::default()
        });
        let frame = dispatch(
            "INTERACTION_CREATE",
            json!({
                "id": "i", "token": "tok", "type": 2,
                "channel": { "id": "c1", "type": 0 },
                "member": { "user": { "id": "u1" } },
                "data": { "name": "restart" }
            }),
        );
        assert!(l.on_dispatch(frame).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_dispatch_is_ignored() {
        let l = listener(DiscordConfig::default());
        assert!(l.on_dispatch(dispatch("TYPING_START", json!({}))).await.is_none());
    }
}

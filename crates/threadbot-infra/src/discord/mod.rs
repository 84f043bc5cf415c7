//! Discord transport for Threadbot.
//!
//! REST calls go through [`DiscordTransport`]; real-time events arrive via
//! the gateway WebSocket in [`gateway::GatewayListener`].

pub mod format;
pub mod gateway;
pub mod payload;

use std::sync::OnceLock;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use threadbot_core::transport::Transport;
use threadbot_types::command::{CommandInteraction, CommandReply};
use threadbot_types::error::TransportError;
use threadbot_types::message::{ChannelId, ConversationId, ThreadMessage};

use self::payload::{
    CALLBACK_CHANNEL_MESSAGE, CALLBACK_DEFERRED_CHANNEL_MESSAGE, CreatedChannel, DiscordMessage,
    GatewayBot, PUBLIC_THREAD, User, message_flags,
};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Minutes of inactivity after which Discord auto-archives new threads.
const AUTO_ARCHIVE_MINUTES: u32 = 60;

/// Longest server-requested wait honored before retrying a rate-limited call.
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(5);

/// Discord REST client implementing [`Transport`].
///
/// Does NOT derive Debug: it holds the bot token.
pub struct DiscordTransport {
    client: Client,
    token: SecretString,
    api_base: String,
    /// Learned from `READY`, or fetched lazily for follow-ups.
    application_id: OnceLock<String>,
}

impl DiscordTransport {
    pub fn new(token: SecretString) -> Self {
        Self {
            client: Client::new(),
            token,
            api_base: DISCORD_API_BASE.to_string(),
            application_id: OnceLock::new(),
        }
    }

    pub(crate) fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn set_application_id(&self, id: impl Into<String>) {
        let _ = self.application_id.set(id.into());
    }

    async fn application_id(&self) -> Result<String, TransportError> {
        if let Some(id) = self.application_id.get() {
            return Ok(id.clone());
        }
        let app: Value = self.call(Method::GET, "/applications/@me", None).await?;
        let id = app
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| TransportError::Decode("application without id".to_string()))?
            .to_string();
        self.set_application_id(id.clone());
        Ok(id)
    }

    /// The bot's own user. Used as a token health check.
    pub async fn current_user(&self) -> Result<User, TransportError> {
        self.call(Method::GET, "/users/@me", None).await
    }

    /// WebSocket URL for the gateway.
    pub async fn gateway_url(&self) -> Result<String, TransportError> {
        let gateway: GatewayBot = self.call(Method::GET, "/gateway/bot", None).await?;
        Ok(format!("{}/?v=10&encoding=json", gateway.url))
    }

    /// Overwrite the registered slash commands (guild-scoped if `guild_id`).
    pub async fn register_commands(
        &self,
        guild_id: Option<&str>,
        definitions: Value,
    ) -> Result<(), TransportError> {
        let app_id = self.application_id().await?;
        let path = match guild_id {
            Some(gid) => format!("/applications/{app_id}/guilds/{gid}/commands"),
            None => format!("/applications/{app_id}/commands"),
        };
        self.send(Method::PUT, &path, Some(definitions)).await
    }

    /// Issue a request, retrying once when rate limited for a short time.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, TransportError> {
        let url = format!("{}{}", self.api_base, path);
        let mut retried = false;

        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token()));
            if let Some(body) = body {
                req = req.json(body);
            }

            let resp = req
                .send()
                .await
                .map_err(|e| TransportError::Http(e.to_string()))?;

            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after_ms = retry_after_ms(&resp);
                match retry_after_ms {
                    Some(ms) if !retried && Duration::from_millis(ms) <= MAX_RATE_LIMIT_WAIT => {
                        tracing::debug!(path, retry_after_ms = ms, "Discord rate limited, retrying");
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        retried = true;
                        continue;
                    }
                    _ => return Err(TransportError::RateLimited { retry_after_ms }),
                }
            }

            let text = resp.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, TransportError> {
        self.request(method, path, body.as_ref())
            .await?
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), TransportError> {
        self.request(method, path, body.as_ref()).await?;
        Ok(())
    }
}

fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|secs| (secs * 1000.0).ceil() as u64)
}

impl Transport for DiscordTransport {
    async fn open_conversation(
        &self,
        parent: &ChannelId,
        name: &str,
    ) -> Result<ConversationId, TransportError> {
        let body = json!({
            "name": name,
            "type": PUBLIC_THREAD,
            "auto_archive_duration": AUTO_ARCHIVE_MINUTES,
        });
        let channel: CreatedChannel = self
            .call(Method::POST, &format!("/channels/{parent}/threads"), Some(body))
            .await?;
        tracing::debug!(parent = %parent, thread = %channel.id, "Opened thread");
        Ok(ConversationId::new(channel.id))
    }

    async fn fetch_history(
        &self,
        conversation: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ThreadMessage>, TransportError> {
        let messages: Vec<DiscordMessage> = self
            .call(
                Method::GET,
                &format!("/channels/{conversation}/messages?limit={limit}"),
                None,
            )
            .await?;
        Ok(messages
            .into_iter()
            .map(DiscordMessage::into_thread_message)
            .collect())
    }

    async fn post_message(
        &self,
        conversation: &ConversationId,
        content: &str,
    ) -> Result<(), TransportError> {
        let path = format!("/channels/{conversation}/messages");
        for chunk in format::split_message(content) {
            if chunk.trim().is_empty() {
                continue;
            }
            self.send(Method::POST, &path, Some(json!({ "content": chunk })))
                .await?;
        }
        Ok(())
    }

    async fn set_archived(
        &self,
        conversation: &ConversationId,
        archived: bool,
    ) -> Result<(), TransportError> {
        self.send(
            Method::PATCH,
            &format!("/channels/{conversation}"),
            Some(json!({ "archived": archived })),
        )
        .await
    }

    async fn send_typing(&self, conversation: &ConversationId) -> Result<(), TransportError> {
        self.send(Method::POST, &format!("/channels/{conversation}/typing"), None)
            .await
    }

    async fn defer_command(
        &self,
        interaction: &CommandInteraction,
        ephemeral: bool,
    ) -> Result<(), TransportError> {
        let body = json!({
            "type": CALLBACK_DEFERRED_CHANNEL_MESSAGE,
            "data": { "flags": message_flags(ephemeral) },
        });
        self.send(
            Method::POST,
            &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
            Some(body),
        )
        .await
    }

    async fn reply_to_command(
        &self,
        interaction: &CommandInteraction,
        reply: &CommandReply,
    ) -> Result<(), TransportError> {
        let data = json!({
            "content": reply.content,
            "flags": message_flags(reply.ephemeral),
        });

        if interaction.deferred {
            let app_id = self.application_id().await?;
            self.send(
                Method::POST,
                &format!("/webhooks/{app_id}/{}", interaction.token),
                Some(data),
            )
            .await
        } else {
            let body = json!({ "type": CALLBACK_CHANNEL_MESSAGE, "data": data });
            self.send(
                Method::POST,
                &format!("/interactions/{}/{}/callback", interaction.id, interaction.token),
                Some(body),
            )
            .await
        }
    }
}

//! Configuration types for Threadbot.
//!
//! `BridgeConfig` represents the top-level `config.toml`. Every field has a
//! default, so an empty file (or no file) yields a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Largest page the transport will return for one history fetch.
pub const MAX_HISTORY_FETCH_LIMIT: usize = 100;

/// Top-level configuration for the conversation bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Byte budget for the history portion of each context window.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Inactivity (seconds) after which a session is terminated.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Directive prefixed to every context window as the system message.
    #[serde(default = "default_system_directive")]
    pub system_directive: String,

    /// Maximum number of messages fetched per turn.
    #[serde(default = "default_history_fetch_limit")]
    pub history_fetch_limit: usize,

    /// Reply posted when generation fails.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,

    /// Notice posted before an idle conversation is closed.
    #[serde(default = "default_idle_notice")]
    pub idle_notice: String,

    /// Notice posted when a restart drops messages that were still queued.
    #[serde(default = "default_dropped_notice")]
    pub dropped_notice: String,

    /// Delay before retrying a failed history fetch.
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,

    /// Label used for the model in the seed message of a new conversation.
    #[serde(default = "default_assistant_label")]
    pub assistant_label: String,

    /// Prefix of new conversation thread names.
    #[serde(default = "default_thread_name_prefix")]
    pub thread_name_prefix: String,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub discord: DiscordConfig,
}

fn default_max_bytes() -> usize {
    4096
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_system_directive() -> String {
    "You are a helpful assistant. Reply to messages briefly and clearly.".to_string()
}

fn default_history_fetch_limit() -> usize {
    MAX_HISTORY_FETCH_LIMIT
}

fn default_fallback_reply() -> String {
    "An error occurred while generating a response. Please try again.".to_string()
}

fn default_idle_notice() -> String {
    "The conversation with ChatGPT has ended due to inactivity. To restart the conversation, \
     please use the `/restart` command within the thread."
        .to_string()
}

fn default_dropped_notice() -> String {
    "The conversation was restarted before your last message could be answered. \
     Please send it again."
        .to_string()
}

fn default_fetch_retry_delay_ms() -> u64 {
    1000
}

fn default_assistant_label() -> String {
    "ChatGPT".to_string()
}

fn default_thread_name_prefix() -> String {
    "chatgpt".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            idle_timeout_secs: default_idle_timeout_secs(),
            system_directive: default_system_directive(),
            history_fetch_limit: default_history_fetch_limit(),
            fallback_reply: default_fallback_reply(),
            idle_notice: default_idle_notice(),
            dropped_notice: default_dropped_notice(),
            fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
            assistant_label: default_assistant_label(),
            thread_name_prefix: default_thread_name_prefix(),
            model: ModelConfig::default(),
            discord: DiscordConfig::default(),
        }
    }
}

impl BridgeConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn fetch_retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch_retry_delay_ms)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid("max_bytes must be > 0".to_string()));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "idle_timeout_secs must be > 0".to_string(),
            ));
        }
        if self.history_fetch_limit == 0 || self.history_fetch_limit > MAX_HISTORY_FETCH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "history_fetch_limit must be between 1 and {MAX_HISTORY_FETCH_LIMIT}"
            )));
        }
        if self.model.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "model.request_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Model backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider name: "openai", "gemini", "mistral", or any name with a `base_url`.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the provider's default base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Discord transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Environment variable holding the bot token.
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Register commands in this guild only (instant) instead of globally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,

    /// User IDs allowed to talk to the bot. Empty or `"*"` allows everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
}

fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token_env: default_token_env(),
            guild_id: None,
            allowed_users: Vec::new(),
        }
    }
}

impl DiscordConfig {
    pub fn is_user_allowed(&self, user_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == "*" || u == user_id)
    }
}

use thiserror::Error;

/// Errors from chat transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("http error: {0}")]
    Http(String),

    #[error("transport api error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("failed to decode transport payload: {0}")]
    Decode(String),

    #[error("transport not connected")]
    NotConnected,

    #[error("unknown conversation '{0}'")]
    UnknownConversation(String),
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session has been retired and no longer accepts triggers.
    #[error("session is terminated")]
    Terminated,
}

/// Errors from handling a user command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command was invoked where it is not valid. The message is shown
    /// to the user as-is.
    #[error("{0}")]
    InvalidContext(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// Text shown to the invoking user.
    pub fn user_message(&self) -> String {
        match self {
            CommandError::InvalidContext(msg) => msg.clone(),
            CommandError::Transport(_) => {
                "Something went wrong while handling the command. Please try again.".to_string()
            }
        }
    }
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config file '{path}': {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing secret: environment variable '{0}' is not set")]
    MissingSecret(String),
}

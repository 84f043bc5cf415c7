//! Secret resolution from environment variables.
//!
//! API keys and the bot token are read from the environment variables named
//! in config and immediately wrapped in [`SecretString`].

use secrecy::SecretString;

use threadbot_types::error::ConfigError;

/// Read an environment variable as a secret.
///
/// Unset, empty and non-Unicode values all count as missing.
pub fn lookup_secret(var: &str) -> Option<SecretString> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(SecretString::from(value)),
        Ok(_) => None,
        Err(std::env::VarError::NotPresent) => None,
        Err(std::env::VarError::NotUnicode(_)) => None,
    }
}

/// Like [`lookup_secret`], but a missing value is an error.
pub fn require_secret(var: &str) -> Result<SecretString, ConfigError> {
    lookup_secret(var).ok_or_else(|| ConfigError::MissingSecret(var.to_string()))
}

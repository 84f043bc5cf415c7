//! Configuration loader for Threadbot.
//!
//! Reads `config.toml` from the data directory (`~/.threadbot/` in
//! production) and deserializes it into [`BridgeConfig`]. The implicit file
//! falls back to defaults when missing or malformed; an explicitly requested
//! file must load.

use std::path::{Path, PathBuf};

use threadbot_types::config::BridgeConfig;
use threadbot_types::error::ConfigError;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "THREADBOT_DATA_DIR";

/// Resolve the data directory.
///
/// `$THREADBOT_DATA_DIR` if set, else `~/.threadbot`, else `./.threadbot`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".threadbot");
    }

    PathBuf::from(".threadbot")
}

/// Path of the implicit config file inside `data_dir`.
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`BridgeConfig::default()`].
/// - If the file cannot be read or parsed, logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> BridgeConfig {
    let path = config_path(data_dir);

    let content = match tokio::fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", path.display());
            return BridgeConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return BridgeConfig::default();
        }
    };

    match toml::from_str::<BridgeConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            BridgeConfig::default()
        }
    }
}

/// Load configuration from an explicit path. Any failure is an error.
pub async fn load_config_file(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    toml::from_str::<BridgeConfig>(&content).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load from `explicit` if given, else from the data directory, then validate.
pub async fn resolve_config(
    data_dir: &Path,
    explicit: Option<&Path>,
) -> Result<BridgeConfig, ConfigError> {
    let config = match explicit {
        Some(path) => load_config_file(path).await?,
        None => load_config(data_dir).await,
    };
    config.validate()?;
    Ok(config)
}

/// Render a configuration as TOML.
pub fn render_config(config: &BridgeConfig) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(|e| ConfigError::Invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_bytes, 4096);
        assert_eq!(config.idle_timeout_secs, 1800);
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            config_path(tmp.path()),
            r#"
max_bytes = 8192
idle_timeout_secs = 120

[model]
model = "gpt-4o"
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_bytes, 8192);
        assert_eq!(config.idle_timeout_secs, 120);
        assert_eq!(config.model.model, "gpt-4o");
        assert_eq!(config.history_fetch_limit, 100);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(config_path(tmp.path()), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_bytes, 4096);
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope.toml");

        let err = resolve_config(tmp.path(), Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn explicit_malformed_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.toml");
        tokio::fs::write(&path, "max_bytes = \"lots\"").await.unwrap();

        let err = load_config_file(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn resolve_config_validates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("zero.toml");
        tokio::fs::write(&path, "max_bytes = 0").await.unwrap();

        let err = resolve_config(tmp.path(), Some(&path)).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn render_config_roundtrips_through_toml() {
        let rendered = render_config(&BridgeConfig::default()).unwrap();
        assert!(rendered.contains("max_bytes = 4096"));
        assert!(rendered.contains("[model]"));

        let parsed: BridgeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.system_directive, BridgeConfig::default().system_directive);
    }
}

//! Bot configuration
//!
//! Loaded from an optional YAML file. Secrets come from the environment.

use crate::appearance::ActivitySpec;
use crate::error::{BotError, BotResult};
use crate::events::EventKind;
use poise::serenity_prelude::GatewayIntents;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default location of the configuration file
pub const CONFIG_FILE: &str = "config/bot.yaml";
/// Environment variable overriding [`CONFIG_FILE`]
pub const CONFIG_ENV: &str = "GATEKEEPER_CONFIG";
/// Environment variable holding the bot token
pub const TOKEN_ENV: &str = "DISCORD_TOKEN";

/// Presence applied once the bot is ready
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// One of `online`, `idle`, `dnd`, `invisible`
    pub status: String,
    pub activity: ActivitySpec,
}

/// Top-level bot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Bot token; `DISCORD_TOKEN` takes precedence
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Raw gateway intent bits
    pub intents: Option<u64>,
    /// Events bound with their default callbacks
    pub default_events: Vec<EventKind>,
    /// Push command definitions to the API on startup
    pub register_commands: bool,
    pub presence: Option<PresenceConfig>,
    /// Directory for rolling log files
    pub log_dir: String,
    /// Seconds between cooldown sweeps
    pub sweep_interval_secs: u64,
    /// Seconds after which a running command is reported as stuck
    pub stale_invocation_secs: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            token: None,
            intents: None,
            default_events: vec![EventKind::Ready],
            register_commands: false,
            presence: None,
            log_dir: "logs".to_string(),
            sweep_interval_secs: 60,
            stale_invocation_secs: 900,
        }
    }
}

impl BotConfig {
    /// Load from `GATEKEEPER_CONFIG` or the default path, then apply env overrides.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read or parsed.
    pub async fn load() -> BotResult<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());
        let mut config = Self::load_from(&path).await?;
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            config.token = Some(token);
        }
        Ok(config)
    }

    /// Load from a YAML file; a missing file yields the defaults.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read or parsed.
    pub async fn load_from(path: impl AsRef<Path>) -> BotResult<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let config = Self::from_yaml(&contents).map_err(|e| {
                    BotError::Config(format!("Failed to parse {}: {e}", path.display()))
                })?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(BotError::Io(e)),
        }
    }

    /// Parse a YAML document
    ///
    /// # Errors
    /// Returns the YAML error for malformed input.
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// The bot token
    ///
    /// # Errors
    /// Fails when neither the file nor the environment provides one.
    pub fn token(&self) -> BotResult<&str> {
        self.token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| BotError::Config(format!("{TOKEN_ENV} must be set")))
    }

    /// Gateway intents, defaulting to guilds plus voice states
    #[must_use]
    pub fn intents(&self) -> GatewayIntents {
        self.intents.map_or(
            GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES,
            GatewayIntents::from_bits_truncate,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::appearance::ActivityKind;

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.default_events, vec![EventKind::Ready]);
        assert!(!config.register_commands);
        assert_eq!(config.log_dir, "logs");
        assert!(config.token().is_err());
        assert!(config.intents().contains(GatewayIntents::GUILD_VOICE_STATES));
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
default_events: [ready, cache_ready, voice_state_update]
register_commands: true
intents: 1
presence:
  status: dnd
  activity:
    name: the gates
    kind: watching
";
        let config = BotConfig::from_yaml(yaml).expect("Failed to parse");
        assert_eq!(
            config.default_events,
            vec![
                EventKind::Ready,
                EventKind::CacheReady,
                EventKind::VoiceStateUpdate
            ]
        );
        assert!(config.register_commands);
        assert_eq!(config.intents(), GatewayIntents::GUILDS);
        assert_eq!(config.log_dir, "logs");

        let presence = config.presence.expect("Expected presence");
        assert_eq!(presence.status, "dnd");
        assert_eq!(presence.activity.name, "the gates");
        assert_eq!(presence.activity.kind, ActivityKind::Watching);
    }

    #[test]
    fn test_token_is_not_serialized() {
        let config = BotConfig {
            token: Some("secret".to_string()),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(!yaml.contains("secret"));
        assert_eq!(config.token().unwrap(), "secret");
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let config = BotConfig::load_from("does/not/exist.yaml").await.unwrap();
        assert_eq!(config.sweep_interval_secs, 60);
    }
}

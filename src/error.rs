//! Error types for the convenience layer around the gate

use crate::gate::GateError;
use thiserror::Error;

/// Errors raised by configuration, replies, appearance and voice helpers
#[derive(Debug, Error)]
pub enum BotError {
    /// Caller passed something unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The cache has not been populated yet
    #[error("The client is not ready yet")]
    NotReady,

    /// Guild missing from the cache
    #[error("Guild not found: {0}")]
    GuildNotFound(u64),

    /// No channel context has been set
    #[error("The channel is not set")]
    ChannelNotSet,

    /// Channel lookup failed
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(Box<poise::serenity_prelude::Error>),

    /// Gate bookkeeping failure
    #[error(transparent)]
    Gate(#[from] GateError),
}

impl From<poise::serenity_prelude::Error> for BotError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

impl BotError {
    /// Shorthand for an input-validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Result type for the convenience layer
pub type BotResult<T> = Result<T, BotError>;

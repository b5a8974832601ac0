//! Presence, username and avatar of the bot user

use crate::error::{BotError, BotResult};
use derive_more::Display;
use poise::serenity_prelude::{
    self as serenity, ActivityData, CreateAttachment, EditProfile, OnlineStatus,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Presence status accepted by [`Appearance::set_presence`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PresenceStatus {
    #[display("online")]
    Online,
    #[display("idle")]
    Idle,
    #[display("dnd")]
    DoNotDisturb,
    #[display("invisible")]
    Invisible,
}

impl FromStr for PresenceStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "idle" => Ok(Self::Idle),
            "dnd" => Ok(Self::DoNotDisturb),
            "invisible" => Ok(Self::Invisible),
            other => Err(BotError::invalid(format!("Invalid status provided: {other:?}"))),
        }
    }
}

impl From<PresenceStatus> for OnlineStatus {
    fn from(status: PresenceStatus) -> Self {
        match status {
            PresenceStatus::Online => Self::Online,
            PresenceStatus::Idle => Self::Idle,
            PresenceStatus::DoNotDisturb => Self::DoNotDisturb,
            PresenceStatus::Invisible => Self::Invisible,
        }
    }
}

/// Kind of activity shown under the bot's name
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    #[default]
    Playing,
    Streaming,
    Listening,
    Watching,
    Competing,
    Custom,
}

/// Activity description, convertible from a bare name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySpec {
    pub name: String,
    #[serde(default)]
    pub kind: ActivityKind,
    /// Stream URL, required for [`ActivityKind::Streaming`]
    #[serde(default)]
    pub url: Option<String>,
}

impl From<&str> for ActivitySpec {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ActivityKind::Playing,
            url: None,
        }
    }
}

impl From<String> for ActivitySpec {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl ActivitySpec {
    /// Build the gateway activity payload
    ///
    /// # Errors
    /// Fails on a blank name, or a streaming activity without a valid URL.
    pub fn to_activity_data(&self) -> BotResult<ActivityData> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(BotError::invalid("Invalid activity provided."));
        }

        Ok(match self.kind {
            ActivityKind::Playing => ActivityData::playing(name),
            ActivityKind::Listening => ActivityData::listening(name),
            ActivityKind::Watching => ActivityData::watching(name),
            ActivityKind::Competing => ActivityData::competing(name),
            ActivityKind::Custom => ActivityData::custom(name),
            ActivityKind::Streaming => {
                let url = self
                    .url
                    .as_deref()
                    .ok_or_else(|| BotError::invalid("Streaming activity requires a URL."))?;
                ActivityData::streaming(name, url)
                    .map_err(|e| BotError::invalid(format!("Invalid stream URL: {e}")))?
            }
        })
    }
}

/// Where to read a new avatar from
#[derive(Debug, Clone)]
pub enum AvatarSource {
    Path(PathBuf),
    Bytes { data: Vec<u8>, filename: String },
}

/// Appearance controls bound to a gateway context
pub struct Appearance<'a> {
    ctx: &'a serenity::Context,
}

impl<'a> Appearance<'a> {
    #[must_use]
    pub fn new(ctx: &'a serenity::Context) -> Self {
        Self { ctx }
    }

    /// Set status and activity on the context's shard
    ///
    /// # Errors
    /// Fails on an unknown status or an invalid activity.
    pub fn set_presence(&self, status: &str, activity: impl Into<ActivitySpec>) -> BotResult<()> {
        let status: PresenceStatus = status.parse()?;
        let activity = activity.into().to_activity_data()?;

        info!(status = %status, activity = %activity.name, "Setting presence");
        self.ctx.set_presence(Some(activity), status.into());
        Ok(())
    }

    /// Change the bot username
    ///
    /// # Errors
    /// Fails on a blank name or when the API rejects the change.
    pub async fn set_username(&self, username: &str) -> BotResult<()> {
        let username = username.trim();
        if username.is_empty() {
            return Err(BotError::invalid("Invalid username provided."));
        }

        let mut user = self.ctx.cache.current_user().clone();
        user.edit(self.ctx, EditProfile::new().username(username))
            .await?;
        info!("Username changed to {username}");
        Ok(())
    }

    /// Change the bot avatar
    ///
    /// # Errors
    /// Fails when the file cannot be read, the payload is empty, or the API
    /// rejects the change.
    pub async fn set_avatar(&self, source: AvatarSource) -> BotResult<()> {
        let attachment = match source {
            AvatarSource::Path(path) => CreateAttachment::path(&path).await?,
            AvatarSource::Bytes { data, filename } => {
                if data.is_empty() {
                    return Err(BotError::invalid("Invalid avatar provided."));
                }
                CreateAttachment::bytes(data, filename)
            }
        };

        let mut user = self.ctx.cache.current_user().clone();
        user.edit(self.ctx, EditProfile::new().avatar(&attachment))
            .await?;
        info!("Avatar updated");
        Ok(())
    }
}

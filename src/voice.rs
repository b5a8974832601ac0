//! Voice channel helpers over the gateway cache

use crate::error::{BotError, BotResult};
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, Member, UserId, VoiceState};
use tracing::info;

/// Pick a channel by id, falling back to a case-insensitive name match
pub fn resolve_channel<'a, I>(candidates: I, selector: &str) -> Option<ChannelId>
where
    I: IntoIterator<Item = (ChannelId, &'a str)>,
{
    let selector = selector.trim();
    let candidates: Vec<_> = candidates.into_iter().collect();

    if let Ok(id) = selector.parse::<u64>() {
        if let Some((channel_id, _)) = candidates.iter().find(|(c, _)| c.get() == id) {
            return Some(*channel_id);
        }
    }
    candidates
        .into_iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(selector))
        .map(|(channel_id, _)| channel_id)
}

/// Users whose voice state places them in `channel_id`
pub fn users_in_channel<'a, I>(states: I, channel_id: ChannelId) -> Vec<UserId>
where
    I: IntoIterator<Item = &'a VoiceState>,
{
    states
        .into_iter()
        .filter(|state| state.channel_id == Some(channel_id))
        .map(|state| state.user_id)
        .collect()
}

/// Voice operations within a guild and channel context
pub struct VoiceHelper<'a> {
    ctx: &'a serenity::Context,
    guild_id: Option<GuildId>,
    channel: Option<String>,
}

impl<'a> VoiceHelper<'a> {
    #[must_use]
    pub fn new(ctx: &'a serenity::Context) -> Self {
        Self {
            ctx,
            guild_id: None,
            channel: None,
        }
    }

    pub fn set_guild(&mut self, guild_id: GuildId) -> &mut Self {
        self.guild_id = Some(guild_id);
        self
    }

    /// Channel context, given as an id or a channel name
    pub fn set_channel(&mut self, selector: impl Into<String>) -> &mut Self {
        self.channel = Some(selector.into());
        self
    }

    /// The guild context, defaulting to the first cached guild
    ///
    /// # Errors
    /// Fails when no guild is set and none is cached yet.
    pub fn guild_id(&mut self) -> BotResult<GuildId> {
        if let Some(guild_id) = self.guild_id {
            return Ok(guild_id);
        }
        let guild_id = *self.ctx.cache.guilds().first().ok_or(BotError::NotReady)?;
        self.guild_id = Some(guild_id);
        Ok(guild_id)
    }

    /// Resolve the channel context against the cached guild
    ///
    /// # Errors
    /// Fails when no channel is set, the guild is not cached, or no channel
    /// matches.
    pub fn channel_id(&mut self) -> BotResult<ChannelId> {
        let guild_id = self.guild_id()?;
        let selector = self.channel.as_deref().ok_or(BotError::ChannelNotSet)?;
        let guild = self
            .ctx
            .cache
            .guild(guild_id)
            .ok_or(BotError::GuildNotFound(guild_id.get()))?;

        resolve_channel(
            guild
                .channels
                .iter()
                .map(|(id, channel)| (*id, channel.name.as_str())),
            selector,
        )
        .ok_or_else(|| BotError::ChannelNotFound(selector.to_string()))
    }

    /// Users connected to `channel`, or to the channel context
    ///
    /// # Errors
    /// Fails like [`VoiceHelper::channel_id`].
    pub fn members(&mut self, channel: Option<&str>) -> BotResult<Vec<UserId>> {
        if let Some(channel) = channel {
            self.set_channel(channel);
        }
        let channel_id = self.channel_id()?;
        let guild_id = self.guild_id()?;
        let guild = self
            .ctx
            .cache
            .guild(guild_id)
            .ok_or(BotError::GuildNotFound(guild_id.get()))?;
        Ok(users_in_channel(guild.voice_states.values(), channel_id))
    }

    /// Move a connected member to `channel`
    ///
    /// # Errors
    /// Fails when the channel cannot be resolved or the API rejects the move.
    pub async fn move_member(&mut self, user_id: UserId, channel: &str) -> BotResult<Member> {
        self.set_channel(channel);
        let channel_id = self.channel_id()?;
        let guild_id = self.guild_id()?;

        let member = guild_id.move_member(self.ctx, user_id, channel_id).await?;
        info!(%user_id, %channel_id, "Moved member");
        Ok(member)
    }

    /// Disconnect a member from voice
    ///
    /// # Errors
    /// Fails when no guild is known or the API rejects the request.
    pub async fn disconnect(&mut self, user_id: UserId) -> BotResult<Member> {
        let guild_id = self.guild_id()?;
        let member = guild_id.disconnect_member(self.ctx, user_id).await?;
        info!(%user_id, %guild_id, "Disconnected member");
        Ok(member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<(ChannelId, &'static str)> {
        vec![
            (ChannelId::new(10), "Lobby"),
            (ChannelId::new(20), "Gaming"),
            (ChannelId::new(30), "20"),
        ]
    }

    #[test]
    fn test_resolve_by_id() {
        assert_eq!(resolve_channel(channels(), "20"), Some(ChannelId::new(20)));
        assert_eq!(resolve_channel(channels(), " 10 "), Some(ChannelId::new(10)));
    }

    #[test]
    fn test_resolve_by_name() {
        assert_eq!(resolve_channel(channels(), "gaming"), Some(ChannelId::new(20)));
        assert_eq!(resolve_channel(channels(), "LOBBY"), Some(ChannelId::new(10)));
    }

    #[test]
    fn test_unknown_id_falls_back_to_name() {
        let candidates = vec![(ChannelId::new(10), "1234")];
        assert_eq!(resolve_channel(candidates, "1234"), Some(ChannelId::new(10)));
        assert_eq!(resolve_channel(channels(), "99"), None);
        assert_eq!(resolve_channel(channels(), "music"), None);
    }
}

use crate::appearance::Appearance;
use crate::events::EventCallback;
use crate::{Data, EVENT_TARGET, Error};
use poise::serenity_prelude::{self as serenity, FullEvent};
use tracing::{debug, info, warn};

/// Logs the connection and applies the configured presence.
pub struct ReadyHandler;

#[async_trait::async_trait]
impl EventCallback for ReadyHandler {
    async fn call(
        &self,
        ctx: &serenity::Context,
        event: &FullEvent,
        data: &Data,
    ) -> Result<(), Error> {
        let FullEvent::Ready { data_about_bot } = event else {
            return Ok(());
        };
        let user_name = &data_about_bot.user.name;
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");

        if let Some(presence) = &data.config.presence {
            Appearance::new(ctx).set_presence(&presence.status, presence.activity.clone())?;
        }
        Ok(())
    }
}

/// Called when the cache is fully populated.
pub struct CacheReadyHandler;

#[async_trait::async_trait]
impl EventCallback for CacheReadyHandler {
    async fn call(
        &self,
        ctx: &serenity::Context,
        event: &FullEvent,
        _data: &Data,
    ) -> Result<(), Error> {
        let FullEvent::CacheReady { guilds } = event else {
            return Ok(());
        };
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
        Ok(())
    }
}

pub struct VoiceStateLogger;

#[async_trait::async_trait]
impl EventCallback for VoiceStateLogger {
    async fn call(
        &self,
        _ctx: &serenity::Context,
        event: &FullEvent,
        _data: &Data,
    ) -> Result<(), Error> {
        if let FullEvent::VoiceStateUpdate { old, new } = event {
            debug!(
                target: EVENT_TARGET,
                user_id = %new.user_id,
                from = ?old.as_ref().and_then(|s| s.channel_id),
                to = ?new.channel_id,
                "Voice state changed"
            );
        }
        Ok(())
    }
}

/// Accepts the event and does nothing
pub struct NoopHandler;

#[async_trait::async_trait]
impl EventCallback for NoopHandler {
    async fn call(
        &self,
        _ctx: &serenity::Context,
        _event: &FullEvent,
        _data: &Data,
    ) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handlers_implement_event_callback() {
        fn assert_impl<T: EventCallback>() {}
        assert_impl::<ReadyHandler>();
        assert_impl::<CacheReadyHandler>();
        assert_impl::<VoiceStateLogger>();
        assert_impl::<NoopHandler>();
    }
}

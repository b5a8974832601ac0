use crate::voice::VoiceHelper;
use crate::{Context, Error};
use poise::command;
use std::fmt::Write as _;
use tracing::warn;

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// List the members connected to a voice channel
#[command(slash_command, guild_only)]
pub async fn members(
    ctx: Context<'_>,
    #[description = "Channel name or id"] channel: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a guild")?;
    let users = {
        let mut voice = VoiceHelper::new(ctx.serenity_context());
        voice.set_guild(guild_id);
        voice.members(Some(channel.as_str()))?
    };

    let reply = if users.is_empty() {
        format!("Nobody is connected to **{channel}**.")
    } else {
        let mut reply = format!("Connected to **{channel}** ({}):", users.len());
        for user_id in &users {
            write!(reply, " <@{user_id}>")?;
        }
        reply
    };
    ctx.say(reply).await?;
    Ok(())
}

/// Move everyone from one voice channel to another
#[command(slash_command, guild_only)]
pub async fn gather(
    ctx: Context<'_>,
    #[description = "Channel to move members out of"] from: String,
    #[description = "Channel to move members into"] to: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("This command only works in a guild")?;
    ctx.defer_ephemeral().await?;

    let mut voice = VoiceHelper::new(ctx.serenity_context());
    voice.set_guild(guild_id);
    let users = voice.members(Some(from.as_str()))?;

    let mut moved = 0_usize;
    for user_id in users {
        match voice.move_member(user_id, &to).await {
            Ok(_) => moved += 1,
            Err(e) => warn!(%user_id, error = %e, "Failed to move member"),
        }
    }

    ctx.data().end_invocation(ctx);
    ctx.say(format!("Moved {moved} member(s) from **{from}** to **{to}**."))
        .await?;
    Ok(())
}

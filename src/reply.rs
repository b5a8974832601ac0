//! Embed alerts sent back to the invoking user

use crate::error::{BotError, BotResult};
use crate::gate::Rejection;
use crate::{Context, Error};
use derive_more::Display;
use poise::CreateReply;
use poise::serenity_prelude::{CreateEmbed, CreateEmbedAuthor, Timestamp};

/// Longest description an embed accepts
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// Title of every rejection alert
pub const REJECTION_TITLE: &str = "Oops!";

/// Color scheme of an alert
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
pub enum AlertStyle {
    #[default]
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    White,
}

impl AlertStyle {
    #[must_use]
    pub fn color(self) -> u32 {
        match self {
            Self::Red => 0x00ff_4848,
            Self::Orange => 0x00ff_7526,
            Self::Yellow => 0x00ff_ec80,
            Self::Green => 0x0036_ff6d,
            Self::Blue => 0x0045_4bff,
            Self::White => 0x00eb_ebeb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertAuthor {
    pub name: String,
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTimestamp {
    Now,
    /// Unix seconds
    At(i64),
}

/// Unix seconds as an embed timestamp, rejecting values the millisecond
/// representation cannot hold
fn unix_timestamp(secs: i64) -> BotResult<Timestamp> {
    secs.checked_mul(1000)
        .and_then(|millis| Timestamp::from_millis(millis).ok())
        .ok_or_else(|| BotError::invalid("Invalid timestamp for embed alert."))
}

/// Content of an embed alert
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub description: String,
    pub author: Option<AlertAuthor>,
    /// Image URL
    pub image: Option<String>,
    /// Thumbnail URL
    pub thumbnail: Option<String>,
    pub timestamp: Option<AlertTimestamp>,
}

impl Alert {
    #[must_use]
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn author(mut self, name: impl Into<String>, icon_url: Option<String>) -> Self {
        self.author = Some(AlertAuthor {
            name: name.into(),
            icon_url,
        });
        self
    }

    #[must_use]
    pub fn image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    #[must_use]
    pub fn thumbnail(mut self, url: impl Into<String>) -> Self {
        self.thumbnail = Some(url.into());
        self
    }

    #[must_use]
    pub fn timestamp(mut self, timestamp: AlertTimestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Check that the alert can be rendered
    ///
    /// # Errors
    /// Fails on a blank title, a blank description, a blank author name or an
    /// out-of-range timestamp.
    pub fn validate(&self) -> BotResult<()> {
        if self.title.trim().is_empty() {
            return Err(BotError::invalid("No title passed, but necessary."));
        }
        if self.description.trim().is_empty() {
            return Err(BotError::invalid("No description passed, but necessary."));
        }
        if self.author.as_ref().is_some_and(|a| a.name.trim().is_empty()) {
            return Err(BotError::invalid("Invalid author for embed alert."));
        }
        if let Some(AlertTimestamp::At(secs)) = self.timestamp {
            unix_timestamp(secs)?;
        }
        Ok(())
    }

    /// Description cut to [`MAX_DESCRIPTION_LEN`] characters
    #[must_use]
    pub fn truncated_description(&self) -> String {
        self.description.chars().take(MAX_DESCRIPTION_LEN).collect()
    }

    /// Render as an embed
    ///
    /// # Errors
    /// Fails when [`Alert::validate`] does.
    pub fn to_embed(&self, style: AlertStyle) -> BotResult<CreateEmbed> {
        self.validate()?;

        let mut embed = CreateEmbed::new()
            .title(&self.title)
            .description(self.truncated_description())
            .colour(style.color());

        if let Some(author) = &self.author {
            let mut embed_author = CreateEmbedAuthor::new(&author.name);
            if let Some(icon_url) = &author.icon_url {
                embed_author = embed_author.icon_url(icon_url);
            }
            embed = embed.author(embed_author);
        }
        if let Some(image) = &self.image {
            embed = embed.image(image);
        }
        if let Some(thumbnail) = &self.thumbnail {
            embed = embed.thumbnail(thumbnail);
        }
        match self.timestamp {
            Some(AlertTimestamp::Now) => embed = embed.timestamp(Timestamp::now()),
            Some(AlertTimestamp::At(secs)) => embed = embed.timestamp(unix_timestamp(secs)?),
            None => {}
        }
        Ok(embed)
    }
}

/// Reply to the invoking user with an ephemeral embed alert
///
/// # Errors
/// Fails when the alert is invalid or the reply cannot be sent.
pub async fn send_alert(ctx: Context<'_>, alert: &Alert, style: AlertStyle) -> Result<(), Error> {
    let embed = alert.to_embed(style)?;
    ctx.send(CreateReply::default().embed(embed).ephemeral(true))
        .await?;
    Ok(())
}

/// User-facing text explaining a refused invocation
#[must_use]
pub fn rejection_message(command_name: &str, rejection: &Rejection) -> String {
    match rejection {
        Rejection::Cooldown { retry_at } => format!(
            "Slow down! Command **/{command_name}** can't be run again, waiting time: <t:{}:R>",
            retry_at.timestamp()
        ),
        Rejection::Interfering { blockers } => format!(
            "You can't run this command while **/{}** is running.",
            blockers.join("**, **/")
        ),
    }
}

/// The alert shown for a refused invocation
#[must_use]
pub fn rejection_alert(command_name: &str, rejection: &Rejection) -> Alert {
    Alert::new(REJECTION_TITLE, rejection_message(command_name, rejection))
}

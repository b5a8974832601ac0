//! Per-command admission policy

use crate::error::{BotError, BotResult};
use crate::gate::{validate_command_name, validate_duration};
use poise::serenity_prelude::{GuildId, Permissions};

/// Where a command is registered with the API
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CommandLocation {
    /// Registered once, available everywhere
    #[default]
    Global,
    /// Registered in each listed guild only
    GuildOnly,
    /// Registered globally and in each listed guild
    Both,
}

impl CommandLocation {
    #[must_use]
    pub fn is_global(self) -> bool {
        matches!(self, Self::Global | Self::Both)
    }

    #[must_use]
    pub fn is_guild_scoped(self) -> bool {
        matches!(self, Self::GuildOnly | Self::Both)
    }
}

/// Admission rules attached to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    pub name: String,
    /// Commands that must not be running for the user when this one starts
    pub interfering: Vec<String>,
    pub cooldown_secs: u32,
    pub required_permissions: Permissions,
    pub location: CommandLocation,
    pub guilds: Vec<GuildId>,
}

impl CommandPolicy {
    /// Policy with no cooldown, no interference and global registration
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interfering: Vec::new(),
            cooldown_secs: 0,
            required_permissions: Permissions::empty(),
            location: CommandLocation::Global,
            guilds: Vec::new(),
        }
    }

    #[must_use]
    pub fn cooldown(mut self, secs: u32) -> Self {
        self.cooldown_secs = secs;
        self
    }

    #[must_use]
    pub fn interferes_with<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interfering.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn permissions(mut self, permissions: Permissions) -> Self {
        self.required_permissions = permissions;
        self
    }

    #[must_use]
    pub fn location(mut self, location: CommandLocation) -> Self {
        self.location = location;
        self
    }

    #[must_use]
    pub fn guilds(mut self, guilds: impl IntoIterator<Item = GuildId>) -> Self {
        self.guilds.extend(guilds);
        self
    }

    /// # Errors
    /// Fails on a blank name, an out-of-range cooldown, a blank interfering
    /// name, or a guild-scoped location without guilds.
    pub fn validate(&self) -> BotResult<()> {
        validate_command_name(&self.name)?;
        validate_duration(self.cooldown_secs)?;
        for name in &self.interfering {
            validate_command_name(name)?;
        }
        if self.location.is_guild_scoped() && self.guilds.is_empty() {
            return Err(BotError::invalid(format!(
                "Command {} is guild-scoped but lists no guilds",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether a member holding `granted` may run the command
    #[must_use]
    pub fn permits(&self, granted: Permissions) -> bool {
        granted.administrator() || granted.contains(self.required_permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateError;

    #[test]
    fn test_default_policy() {
        let policy = CommandPolicy::new("ping");
        assert!(policy.interfering.is_empty());
        assert_eq!(policy.cooldown_secs, 0);
        assert_eq!(policy.location, CommandLocation::Global);
        assert!(policy.validate().is_ok());
        assert!(policy.permits(Permissions::empty()));
    }

    #[test]
    fn test_builder() {
        let policy = CommandPolicy::new("gather")
            .cooldown(30)
            .interferes_with(["gather", "members"])
            .permissions(Permissions::MOVE_MEMBERS)
            .location(CommandLocation::Both)
            .guilds([GuildId::new(7)]);
        assert_eq!(policy.interfering, ["gather", "members"]);
        assert!(policy.validate().is_ok());
        assert!(policy.location.is_global());
        assert!(policy.location.is_guild_scoped());
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            CommandPolicy::new("x").cooldown(301).validate(),
            Err(BotError::Gate(GateError::InvalidDuration(301)))
        ));
        assert!(CommandPolicy::new(" ").validate().is_err());
        assert!(
            CommandPolicy::new("x")
                .interferes_with([""])
                .validate()
                .is_err()
        );
        assert!(
            CommandPolicy::new("x")
                .location(CommandLocation::GuildOnly)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_permits() {
        let policy = CommandPolicy::new("gather").permissions(Permissions::MOVE_MEMBERS);
        assert!(!policy.permits(Permissions::SEND_MESSAGES));
        assert!(policy.permits(Permissions::MOVE_MEMBERS | Permissions::SEND_MESSAGES));
        assert!(policy.permits(Permissions::ADMINISTRATOR));
    }
}

//! Bundled commands and the machinery to register them

mod general;
mod manager;
mod policy;

pub use general::{gather, members, ping};
pub use manager::{
    BotCommand, CommandManager, CommandPolicies, DEFAULT_DESCRIPTION, RegistrationPlan,
    fetch_registered, register_commands,
};
pub use policy::{CommandLocation, CommandPolicy};

use crate::error::BotResult;
use poise::serenity_prelude::Permissions;

/// Manager holding the bundled commands with their policies
///
/// # Errors
/// Fails only if a bundled policy is invalid.
pub fn bundled() -> BotResult<CommandManager> {
    let mut manager = CommandManager::new();
    manager
        .add(ping(), CommandPolicy::new("ping").cooldown(5))?
        .add(
            members(),
            CommandPolicy::new("members").interferes_with(["gather"]),
        )?
        .add(
            gather(),
            CommandPolicy::new("gather")
                .cooldown(30)
                .interferes_with(["gather", "members"])
                .permissions(Permissions::MOVE_MEMBERS),
        )?;
    Ok(manager)
}

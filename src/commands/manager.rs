//! Command collection and API registration

use crate::commands::{CommandLocation, CommandPolicy};
use crate::error::{BotError, BotResult};
use crate::{COMMAND_TARGET, Data, Error};
use poise::serenity_prelude::{self as serenity, CreateCommand, GuildId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Description given to commands that declare none
pub const DEFAULT_DESCRIPTION: &str = "No description provided.";

pub type BotCommand = poise::Command<Data, Error>;

/// Read-only policy table shared with the framework hooks
#[derive(Debug, Clone, Default)]
pub struct CommandPolicies(Arc<HashMap<String, CommandPolicy>>);

impl CommandPolicies {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandPolicy> {
        self.0.get(name)
    }

    /// Policy for `name`, or the default policy for unknown commands
    #[must_use]
    pub fn resolve(&self, name: &str) -> CommandPolicy {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| CommandPolicy::new(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Where each command goes when registered with the API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationPlan {
    pub global: Vec<String>,
    pub guilds: BTreeMap<GuildId, Vec<String>>,
}

impl RegistrationPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.guilds.is_empty()
    }
}

/// Commands with their admission policies
#[derive(Default)]
pub struct CommandManager {
    commands: Vec<BotCommand>,
    policies: HashMap<String, CommandPolicy>,
    register: bool,
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("commands", &self.names())
            .field("register", &self.register)
            .finish()
    }
}

impl CommandManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command, replacing any command of the same name
    ///
    /// # Errors
    /// Fails when the policy is invalid or names a different command.
    pub fn add(&mut self, mut command: BotCommand, policy: CommandPolicy) -> BotResult<&mut Self> {
        policy.validate()?;
        if policy.name != command.name {
            return Err(BotError::invalid(format!(
                "Policy for {} attached to command {}",
                policy.name, command.name
            )));
        }
        if command
            .description
            .as_deref()
            .is_none_or(|d| d.trim().is_empty())
        {
            command.description = Some(DEFAULT_DESCRIPTION.to_string());
        }

        self.commands.retain(|c| c.name != command.name);
        self.policies.insert(command.name.clone(), policy);
        self.commands.push(command);
        Ok(self)
    }

    /// Add a command under the default policy
    ///
    /// # Errors
    /// Fails when the command name is blank.
    pub fn add_default(&mut self, command: BotCommand) -> BotResult<&mut Self> {
        let policy = CommandPolicy::new(command.name.clone());
        self.add(command, policy)
    }

    /// Remove a command and its policy
    pub fn remove(&mut self, name: &str) -> Option<BotCommand> {
        self.policies.remove(name);
        let index = self.commands.iter().position(|c| c.name == name)?;
        Some(self.commands.remove(index))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BotCommand> {
        self.commands.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn policy(&self, name: &str) -> Option<&CommandPolicy> {
        self.policies.get(name)
    }

    #[must_use]
    pub fn commands(&self) -> &[BotCommand] {
        &self.commands
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name.as_str()).collect()
    }

    /// Push command definitions to the API once the client is ready
    pub fn load(&mut self) -> &mut Self {
        self.register = true;
        self
    }

    #[must_use]
    pub fn should_register(&self) -> bool {
        self.register
    }

    /// Split each command by its registration location
    #[must_use]
    pub fn plan_registration(&self) -> RegistrationPlan {
        let mut plan = RegistrationPlan::default();
        for command in &self.commands {
            let location = self
                .policies
                .get(&command.name)
                .map_or(CommandLocation::Global, |p| p.location);

            if location.is_global() {
                plan.global.push(command.name.clone());
            }
            if location.is_guild_scoped() {
                let guilds = self.policies.get(&command.name).map(|p| p.guilds.as_slice());
                for guild_id in guilds.unwrap_or_default() {
                    plan.guilds
                        .entry(*guild_id)
                        .or_default()
                        .push(command.name.clone());
                }
            }
        }
        plan
    }

    /// Hand the commands to the framework and the policies to the hooks
    #[must_use]
    pub fn into_parts(self) -> (Vec<BotCommand>, CommandPolicies) {
        (self.commands, CommandPolicies(Arc::new(self.policies)))
    }
}

fn builders_for(commands: &[BotCommand], names: &[String]) -> Vec<CreateCommand> {
    commands
        .iter()
        .filter(|c| names.contains(&c.name))
        .flat_map(|c| {
            c.create_as_slash_command()
                .into_iter()
                .chain(c.create_as_context_menu_command())
        })
        .collect()
}

/// Register commands with the API according to `plan`
///
/// # Errors
/// Returns the API error of the first failed request.
pub async fn register_commands(
    http: &serenity::Http,
    commands: &[BotCommand],
    plan: &RegistrationPlan,
) -> Result<(), Error> {
    let global = builders_for(commands, &plan.global);
    info!(
        target: COMMAND_TARGET,
        count = global.len(),
        "Registering global commands"
    );
    serenity::Command::set_global_commands(http, global).await?;

    for (guild_id, names) in &plan.guilds {
        let builders = builders_for(commands, names);
        info!(
            target: COMMAND_TARGET,
            guild_id = %guild_id,
            count = builders.len(),
            "Registering guild commands"
        );
        guild_id.set_commands(http, builders).await?;
    }
    Ok(())
}

/// Global commands currently registered with the API
///
/// # Errors
/// Returns the API error.
pub async fn fetch_registered(http: &serenity::Http) -> BotResult<Vec<serenity::Command>> {
    Ok(serenity::Command::get_global_commands(http).await?)
}

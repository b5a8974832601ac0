use std::{ops::Deref, sync::Arc};

use crate::commands::{CommandPolicies, CommandPolicy};
use crate::config::BotConfig;
use crate::events::EventRegistry;
use crate::gate::{Admission, CommandGate, GateResult, Invocation, Rejection};
use crate::{COMMAND_TARGET, Context};
use dashmap::DashMap;
use serenity::prelude::TypeMapKey;
use tracing::debug;

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl Default for Data {
    fn default() -> Self {
        Self::new(
            BotConfig::default(),
            CommandPolicies::default(),
            EventRegistry::new(),
        )
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("gate", &self.gate)
            .field("policies", &self.policies)
            .field("events", &self.events)
            .field("running", &self.running.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    #[must_use]
    pub fn new(config: BotConfig, policies: CommandPolicies, events: EventRegistry) -> Self {
        Self(Arc::new(DataInner {
            gate: CommandGate::new(),
            policies,
            events: Arc::new(events),
            running: DashMap::new(),
            config,
        }))
    }

    /// Keep an admitted invocation alive until its command finishes
    pub fn park(&self, context_id: u64, invocation: Invocation) {
        debug!(
            target: COMMAND_TARGET,
            context_id,
            invocation_id = %invocation.id(),
            "Parked invocation"
        );
        self.running.insert(context_id, invocation);
    }

    /// Admit the invocation behind `context_id` and park it.
    ///
    /// Poise runs the command check once per command in a subcommand chain,
    /// all with the same context, so an already parked context is admitted
    /// again without touching the gate.
    ///
    /// # Errors
    /// Returns a validation error for bad gate input.
    pub fn admit_context(
        &self,
        context_id: u64,
        user_id: u64,
        policy: &CommandPolicy,
    ) -> GateResult<Option<Rejection>> {
        if self.running.contains_key(&context_id) {
            return Ok(None);
        }
        match self.gate.admit_with_id(
            user_id,
            &policy.name,
            policy.interfering.as_slice(),
            policy.cooldown_secs,
            context_id.to_string(),
        )? {
            Admission::Allowed(invocation) => {
                self.park(context_id, invocation);
                Ok(None)
            }
            Admission::Rejected(rejection) => Ok(Some(rejection)),
        }
    }

    /// Drop the invocation parked under `context_id`, releasing it
    pub fn release(&self, context_id: u64) -> bool {
        self.running.remove(&context_id).is_some()
    }

    /// End the current command's invocation before its handler returns
    pub fn end_invocation(&self, ctx: Context<'_>) -> bool {
        self.release(ctx.id())
    }

    /// Take ownership of the current invocation, so it outlives the handler
    #[must_use]
    pub fn detach_invocation(&self, ctx: Context<'_>) -> Option<Invocation> {
        self.running.remove(&ctx.id()).map(|(_, invocation)| invocation)
    }
}

/// Main centralized data structure for the bot
pub struct DataInner {
    pub gate: CommandGate,
    pub policies: CommandPolicies,
    pub events: Arc<EventRegistry>,
    /// Context id -> admitted invocation
    pub running: DashMap<u64, Invocation>,
    pub config: BotConfig,
}

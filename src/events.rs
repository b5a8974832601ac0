//! Gateway event bindings
//!
//! Each [`EventKind`] has at most one callback. The registry is frozen once the
//! framework is built, so bindings made after launch are never seen.

use crate::{Data, ERROR_TARGET, EVENT_TARGET, Error, handlers};
use derive_more::Display;
use poise::serenity_prelude::{self as serenity, FullEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

/// Gateway events a callback can be bound to
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[display("ready")]
    Ready,
    #[display("cache_ready")]
    CacheReady,
    #[display("interaction_create")]
    InteractionCreate,
    #[display("message")]
    Message,
    #[display("guild_create")]
    GuildCreate,
    #[display("guild_delete")]
    GuildDelete,
    #[display("guild_member_addition")]
    GuildMemberAddition,
    #[display("guild_member_removal")]
    GuildMemberRemoval,
    #[display("voice_state_update")]
    VoiceStateUpdate,
    #[display("presence_update")]
    PresenceUpdate,
    #[display("reaction_add")]
    ReactionAdd,
    #[display("reaction_remove")]
    ReactionRemove,
    #[display("channel_create")]
    ChannelCreate,
    #[display("channel_delete")]
    ChannelDelete,
}

impl EventKind {
    pub const ALL: [Self; 14] = [
        Self::Ready,
        Self::CacheReady,
        Self::InteractionCreate,
        Self::Message,
        Self::GuildCreate,
        Self::GuildDelete,
        Self::GuildMemberAddition,
        Self::GuildMemberRemoval,
        Self::VoiceStateUpdate,
        Self::PresenceUpdate,
        Self::ReactionAdd,
        Self::ReactionRemove,
        Self::ChannelCreate,
        Self::ChannelDelete,
    ];

    /// Kind of a gateway event, if it is one we bind to
    #[must_use]
    pub fn of(event: &FullEvent) -> Option<Self> {
        Some(match event {
            FullEvent::Ready { .. } => Self::Ready,
            FullEvent::CacheReady { .. } => Self::CacheReady,
            FullEvent::InteractionCreate { .. } => Self::InteractionCreate,
            FullEvent::Message { .. } => Self::Message,
            FullEvent::GuildCreate { .. } => Self::GuildCreate,
            FullEvent::GuildDelete { .. } => Self::GuildDelete,
            FullEvent::GuildMemberAddition { .. } => Self::GuildMemberAddition,
            FullEvent::GuildMemberRemoval { .. } => Self::GuildMemberRemoval,
            FullEvent::VoiceStateUpdate { .. } => Self::VoiceStateUpdate,
            FullEvent::PresenceUpdate { .. } => Self::PresenceUpdate,
            FullEvent::ReactionAdd { .. } => Self::ReactionAdd,
            FullEvent::ReactionRemove { .. } => Self::ReactionRemove,
            FullEvent::ChannelCreate { .. } => Self::ChannelCreate,
            FullEvent::ChannelDelete { .. } => Self::ChannelDelete,
            _ => return None,
        })
    }

    /// Whether the event fires only once per process
    #[must_use]
    pub fn is_once(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown event: {s:?}"))
    }
}

/// Callback bound to an event
#[async_trait::async_trait]
pub trait EventCallback: Send + Sync {
    async fn call(
        &self,
        ctx: &serenity::Context,
        event: &FullEvent,
        data: &Data,
    ) -> Result<(), Error>;
}

/// Event to callback bindings
#[derive(Default)]
pub struct EventRegistry {
    callbacks: HashMap<EventKind, Box<dyn EventCallback>>,
    ready_fired: AtomicBool,
}

impl std::fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRegistry")
            .field("events", &self.events())
            .finish_non_exhaustive()
    }
}

impl EventRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the default callback bound for each of `kinds`
    #[must_use]
    pub fn with_defaults(kinds: &[EventKind]) -> Self {
        let mut registry = Self::new();
        for kind in kinds {
            registry.bind_default(*kind);
        }
        registry
    }

    /// Bind `callback` to `kind`, replacing any existing binding
    pub fn bind(&mut self, kind: EventKind, callback: Box<dyn EventCallback>) {
        if self.callbacks.insert(kind, callback).is_some() {
            debug!(target: EVENT_TARGET, event = %kind, "Replaced event binding");
        }
    }

    /// Bind the built-in callback for `kind`
    pub fn bind_default(&mut self, kind: EventKind) {
        let callback: Box<dyn EventCallback> = match kind {
            EventKind::Ready => Box::new(handlers::ReadyHandler),
            EventKind::CacheReady => Box::new(handlers::CacheReadyHandler),
            EventKind::VoiceStateUpdate => Box::new(handlers::VoiceStateLogger),
            _ => Box::new(handlers::NoopHandler),
        };
        self.bind(kind, callback);
    }

    /// Remove the binding for `kind`; returns whether one existed
    pub fn unbind(&mut self, kind: EventKind) -> bool {
        self.callbacks.remove(&kind).is_some()
    }

    #[must_use]
    pub fn is_bound(&self, kind: EventKind) -> bool {
        self.callbacks.contains_key(&kind)
    }

    /// Bound events, sorted
    #[must_use]
    pub fn events(&self) -> Vec<EventKind> {
        let mut events: Vec<_> = self.callbacks.keys().copied().collect();
        events.sort_unstable();
        events
    }

    /// Claim the right to fire `kind`. Once-only events succeed a single time.
    fn claim(&self, kind: EventKind) -> bool {
        !kind.is_once() || !self.ready_fired.swap(true, Ordering::SeqCst)
    }

    /// Run the callback bound to the event, if any
    ///
    /// # Errors
    /// Returns the callback's error.
    pub async fn dispatch(
        &self,
        ctx: &serenity::Context,
        event: &FullEvent,
        data: &Data,
    ) -> Result<(), Error> {
        let Some(kind) = EventKind::of(event) else {
            return Ok(());
        };
        let Some(callback) = self.callbacks.get(&kind) else {
            return Ok(());
        };
        if !self.claim(kind) {
            debug!(target: EVENT_TARGET, event = %kind, "Skipping repeated once-only event");
            return Ok(());
        }

        callback.call(ctx, event, data).await.inspect_err(|e| {
            error!(target: ERROR_TARGET, event = %kind, error = %e, "Event callback failed");
        })
    }
}

pub mod appearance;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod events;
pub mod framework;
pub mod gate;
pub mod handlers;
pub mod logging;
pub mod reply;
pub mod voice;

// Customize these constants for your bot
pub const BOT_NAME: &str = "gatekeeper";
pub const COMMAND_TARGET: &str = "gatekeeper::command";
pub const ERROR_TARGET: &str = "gatekeeper::error";
pub const EVENT_TARGET: &str = "gatekeeper::handlers";
pub const GATE_TARGET: &str = "gatekeeper::gate";
pub const CONSOLE_TARGET: &str = "gatekeeper";

pub use data::{Data, DataInner};
pub use error::{BotError, BotResult};
pub use gate::{Admission, CommandGate, Invocation, Outcome, Rejection};
pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

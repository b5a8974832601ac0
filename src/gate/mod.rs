//! Command admission gate
//!
//! Per-user cooldown windows and per-user mutual exclusion between running
//! commands. All state is in memory and lives as long as the owning
//! [`CommandGate`].

mod admission;
mod clock;
mod cooldown;
mod error;
mod interference;

pub use admission::{Admission, CommandGate, Invocation, Outcome, Rejection};
pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::{CooldownEntry, CooldownTracker};
pub use error::{GateError, GateResult};
pub(crate) use error::{validate_command_name, validate_duration};
pub use interference::{InterferenceEntry, InterferenceTracker};

/// Longest cooldown a command may declare, in seconds
pub const MAX_COOLDOWN_SECS: u32 = 300;

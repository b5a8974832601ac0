//! Per-user command cooldowns
//!
//! Entries are kept per user in insertion order and pruned lazily: every read
//! drops the entries whose window has closed and writes the survivors back.

use crate::GATE_TARGET;
use crate::gate::error::{validate_command_name, validate_duration, validate_user};
use crate::gate::{Clock, GateResult};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One cooldown window for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CooldownEntry {
    /// Command the window applies to
    pub command_name: String,
    /// First instant at which the command may run again
    pub expires_at: DateTime<Utc>,
    /// Length of the window in seconds
    pub duration_secs: u32,
}

impl CooldownEntry {
    /// Whether the window has closed at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left before the window closes, zero once expired
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_expired_at(now) {
            Duration::zero()
        } else {
            self.expires_at - now
        }
    }
}

/// Tracker for active cooldowns, keyed by user id
#[derive(Clone)]
pub struct CooldownTracker {
    entries: Arc<DashMap<u64, Vec<CooldownEntry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CooldownTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownTracker")
            .field("users", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl CooldownTracker {
    /// Create an empty tracker reading time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Open a cooldown window for `command_name`.
    ///
    /// A duration of zero produces an entry that is already expired on the
    /// next read.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id, a blank command name or
    /// a duration above the maximum.
    pub fn register(
        &self,
        user_id: u64,
        command_name: &str,
        duration_secs: u32,
    ) -> GateResult<CooldownEntry> {
        validate_user(user_id)?;
        validate_command_name(command_name)?;
        validate_duration(duration_secs)?;

        let now = self.clock.now();
        let entry = CooldownEntry {
            command_name: command_name.to_string(),
            expires_at: now + Duration::milliseconds(i64::from(duration_secs) * 1000),
            duration_secs,
        };

        let mut slot = self.entries.entry(user_id).or_default();
        slot.retain(|e| !e.is_expired_at(now));
        slot.push(entry.clone());

        debug!(
            target: GATE_TARGET,
            user_id,
            command = %command_name,
            expires_at = %entry.expires_at,
            "Cooldown registered"
        );
        Ok(entry)
    }

    /// Live cooldowns for a user, optionally narrowed to one command.
    ///
    /// Prunes expired entries for the user as a side effect.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id or a blank command name.
    pub fn query(
        &self,
        user_id: u64,
        command_name: Option<&str>,
    ) -> GateResult<Vec<CooldownEntry>> {
        validate_user(user_id)?;
        if let Some(name) = command_name {
            validate_command_name(name)?;
        }

        let now = self.clock.now();
        let live = {
            let Some(mut slot) = self.entries.get_mut(&user_id) else {
                return Ok(Vec::new());
            };
            let before = slot.len();
            slot.retain(|e| !e.is_expired_at(now));
            if slot.len() != before {
                debug!(
                    target: GATE_TARGET,
                    user_id,
                    pruned = before - slot.len(),
                    "Expired cooldowns pruned"
                );
            }
            slot.clone()
        };

        if live.is_empty() {
            self.entries.remove_if(&user_id, |_, v| v.is_empty());
        }

        Ok(match command_name {
            Some(name) => live
                .into_iter()
                .filter(|e| e.command_name == name)
                .collect(),
            None => live,
        })
    }

    /// Prune every user's expired entries, returning how many were dropped
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut pruned = 0;
        self.entries.retain(|_, slot| {
            let before = slot.len();
            slot.retain(|e| !e.is_expired_at(now));
            pruned += before - slot.len();
            !slot.is_empty()
        });
        pruned
    }

    /// Number of users with at least one stored entry
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::clock::MockClock;
    use crate::gate::{GateError, ManualClock};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn tracker() -> (CooldownTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        (CooldownTracker::new(clock.clone()), clock)
    }

    #[test]
    fn test_entry_lives_until_expiry() {
        let (tracker, clock) = tracker();
        let entry = tracker.register(1, "ping", 5).unwrap();
        assert_eq!(entry.expires_at, t0() + Duration::seconds(5));
        assert_eq!(entry.duration_secs, 5);

        clock.advance(Duration::seconds(3));
        let live = tracker.query(1, Some("ping")).unwrap();
        assert_eq!(live, vec![entry.clone()]);
        assert_eq!(live[0].remaining_at(clock.now()), Duration::seconds(2));

        clock.advance(Duration::seconds(3));
        assert!(tracker.query(1, Some("ping")).unwrap().is_empty());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let (tracker, clock) = tracker();
        tracker.register(1, "ping", 5).unwrap();

        clock.advance(Duration::milliseconds(4_999));
        assert_eq!(tracker.query(1, Some("ping")).unwrap().len(), 1);

        clock.advance(Duration::milliseconds(1));
        assert!(tracker.query(1, Some("ping")).unwrap().is_empty());
    }

    #[test]
    fn test_zero_duration_is_immediately_expired() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "ping", 0).unwrap();
        assert!(tracker.query(1, Some("ping")).unwrap().is_empty());
        assert_eq!(tracker.tracked_users(), 0);
    }

    #[test]
    fn test_query_filters_and_keeps_insertion_order() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "ping", 30).unwrap();
        tracker.register(1, "roll", 10).unwrap();
        tracker.register(1, "ping", 20).unwrap();
        tracker.register(2, "ping", 30).unwrap();

        let all = tracker.query(1, None).unwrap();
        let names: Vec<_> = all.iter().map(|e| e.command_name.as_str()).collect();
        assert_eq!(names, ["ping", "roll", "ping"]);

        let pings = tracker.query(1, Some("ping")).unwrap();
        let durations: Vec<_> = pings.iter().map(|e| e.duration_secs).collect();
        assert_eq!(durations, [30, 20]);

        assert!(tracker.query(3, None).unwrap().is_empty());
    }

    #[test]
    fn test_query_persists_pruned_set() {
        let (tracker, clock) = tracker();
        tracker.register(1, "short", 1).unwrap();
        tracker.register(1, "long", 60).unwrap();

        clock.advance(Duration::seconds(2));
        let live = tracker.query(1, Some("long")).unwrap();
        assert_eq!(live.len(), 1);

        // Rewinding the clock cannot resurrect a pruned entry
        clock.set(t0());
        let all = tracker.query(1, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].command_name, "long");
    }

    #[test]
    fn test_register_and_query_read_clock_once_each() {
        let mut clock = MockClock::new();
        clock.expect_now().times(2).returning(t0);
        let tracker = CooldownTracker::new(Arc::new(clock));

        tracker.register(1, "ping", 5).unwrap();
        tracker.query(1, Some("ping")).unwrap();
    }

    #[test]
    fn test_sweep_expired() {
        let (tracker, clock) = tracker();
        tracker.register(1, "ping", 1).unwrap();
        tracker.register(2, "ping", 1).unwrap();
        tracker.register(2, "roll", 60).unwrap();

        clock.advance(Duration::seconds(5));
        assert_eq!(tracker.sweep_expired(), 2);
        assert_eq!(tracker.tracked_users(), 1);
        assert_eq!(tracker.query(2, None).unwrap().len(), 1);
    }

    #[test]
    fn test_validation() {
        let (tracker, _clock) = tracker();
        assert_eq!(
            tracker.register(0, "ping", 5),
            Err(GateError::InvalidUserId(0))
        );
        assert!(matches!(
            tracker.register(1, "", 5),
            Err(GateError::InvalidCommandName(_))
        ));
        assert_eq!(
            tracker.register(1, "ping", 301),
            Err(GateError::InvalidDuration(301))
        );
        assert!(tracker.query(0, None).is_err());
        assert!(tracker.query(1, Some(" ")).is_err());
    }
}

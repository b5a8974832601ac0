//! Per-user registry of running commands
//!
//! Entries never expire on their own. They leave only through `remove`.

use crate::GATE_TARGET;
use crate::gate::error::{validate_command_name, validate_user};
use crate::gate::{Clock, GateError, GateResult};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One running command invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterferenceEntry {
    /// Name of the running command
    pub command_name: String,
    /// When the invocation was admitted
    pub started_at: DateTime<Utc>,
    /// Unique id of the invocation
    pub invocation_id: String,
}

/// Tracker for running commands, keyed by user id
#[derive(Clone)]
pub struct InterferenceTracker {
    entries: Arc<DashMap<u64, Vec<InterferenceEntry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InterferenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterferenceTracker")
            .field("users", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl InterferenceTracker {
    /// Create an empty tracker reading time from `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Record that `command_name` started running for the user
    ///
    /// # Errors
    /// Returns a validation error for a zero user id, a blank command name or
    /// an empty invocation id.
    pub fn register(
        &self,
        user_id: u64,
        command_name: &str,
        invocation_id: &str,
    ) -> GateResult<InterferenceEntry> {
        validate_user(user_id)?;
        validate_command_name(command_name)?;
        if invocation_id.is_empty() {
            return Err(GateError::InvalidInvocationId);
        }

        let entry = InterferenceEntry {
            command_name: command_name.to_string(),
            started_at: self.clock.now(),
            invocation_id: invocation_id.to_string(),
        };
        self.entries
            .entry(user_id)
            .or_default()
            .push(entry.clone());

        debug!(
            target: GATE_TARGET,
            user_id,
            command = %command_name,
            invocation_id = %invocation_id,
            "Running command registered"
        );
        Ok(entry)
    }

    /// Running commands for a user in registration order.
    ///
    /// With an empty `names` slice every entry is returned; otherwise only
    /// entries whose command name is listed.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id.
    pub fn query<S: AsRef<str>>(
        &self,
        user_id: u64,
        names: &[S],
    ) -> GateResult<Vec<InterferenceEntry>> {
        validate_user(user_id)?;

        let Some(slot) = self.entries.get(&user_id) else {
            return Ok(Vec::new());
        };
        Ok(slot
            .iter()
            .filter(|e| names.is_empty() || names.iter().any(|n| n.as_ref() == e.command_name))
            .cloned()
            .collect())
    }

    /// Remove entries by command name or by invocation id.
    ///
    /// If any entry carries `key` as its command name, every entry with that
    /// name is removed and invocation ids are not consulted. Otherwise the
    /// entries whose invocation id equals `key` are removed. A command name
    /// that collides with an invocation id therefore shadows the id.
    ///
    /// Returns the removed entries.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id or an empty key.
    pub fn remove(&self, user_id: u64, key: &str) -> GateResult<Vec<InterferenceEntry>> {
        validate_user(user_id)?;
        if key.is_empty() {
            return Err(GateError::InvalidKey);
        }

        let removed = {
            let Some(mut slot) = self.entries.get_mut(&user_id) else {
                return Ok(Vec::new());
            };
            let by_name = slot.iter().any(|e| e.command_name == key);
            let (removed, kept): (Vec<_>, Vec<_>) = slot.drain(..).partition(|e| {
                if by_name {
                    e.command_name == key
                } else {
                    e.invocation_id == key
                }
            });
            *slot = kept;

            debug!(
                target: GATE_TARGET,
                user_id,
                key = %key,
                by_name,
                removed = removed.len(),
                "Running commands removed"
            );
            removed
        };

        self.entries.remove_if(&user_id, |_, v| v.is_empty());
        Ok(removed)
    }

    /// Entries that have been running for longer than `older_than`, paired
    /// with their user id
    #[must_use]
    pub fn stale(&self, older_than: Duration) -> Vec<(u64, InterferenceEntry)> {
        let cutoff = self.clock.now() - older_than;
        self.entries
            .iter()
            .flat_map(|slot| {
                let user_id = *slot.key();
                slot.value()
                    .iter()
                    .filter(|e| e.started_at <= cutoff)
                    .cloned()
                    .map(|e| (user_id, e))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Total number of running invocations across users
    #[must_use]
    pub fn running(&self) -> usize {
        self.entries.iter().map(|slot| slot.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ManualClock;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn tracker() -> (InterferenceTracker, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        (InterferenceTracker::new(clock.clone()), clock)
    }

    const NONE: &[&str] = &[];

    #[test]
    fn test_query_registration_order_and_filter() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "a", "i1").unwrap();
        tracker.register(1, "b", "i2").unwrap();
        tracker.register(1, "c", "i3").unwrap();

        let all = tracker.query(1, NONE).unwrap();
        let ids: Vec<_> = all.iter().map(|e| e.invocation_id.as_str()).collect();
        assert_eq!(ids, ["i1", "i2", "i3"]);
        assert!(all.iter().all(|e| e.started_at == t0()));

        let subset = tracker.query(1, &["c", "a"]).unwrap();
        let names: Vec<_> = subset.iter().map(|e| e.command_name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);

        assert!(tracker.query(1, &["z"]).unwrap().is_empty());
        assert!(tracker.query(2, NONE).unwrap().is_empty());
    }

    #[test]
    fn test_remove_by_name_drops_every_match() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "a", "i1").unwrap();
        tracker.register(1, "b", "i2").unwrap();
        tracker.register(1, "a", "i3").unwrap();

        let removed = tracker.remove(1, "a").unwrap();
        assert_eq!(removed.len(), 2);

        let left = tracker.query(1, NONE).unwrap();
        assert_eq!(
            left,
            vec![InterferenceEntry {
                command_name: "b".to_string(),
                started_at: t0(),
                invocation_id: "i2".to_string(),
            }]
        );
    }

    #[test]
    fn test_remove_by_invocation_id_drops_one() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "a", "i1").unwrap();
        tracker.register(1, "a", "i2").unwrap();

        let removed = tracker.remove(1, "i2").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].invocation_id, "i2");

        let left = tracker.query(1, NONE).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].invocation_id, "i1");
    }

    #[test]
    fn test_name_shadows_colliding_invocation_id() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "42", "i1").unwrap();
        tracker.register(1, "other", "42").unwrap();

        let removed = tracker.remove(1, "42").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].command_name, "42");

        let left = tracker.query(1, NONE).unwrap();
        assert_eq!(left[0].invocation_id, "42");
    }

    #[test]
    fn test_remove_unknown_key_is_noop() {
        let (tracker, _clock) = tracker();
        tracker.register(1, "a", "i1").unwrap();
        assert!(tracker.remove(1, "nope").unwrap().is_empty());
        assert!(tracker.remove(9, "a").unwrap().is_empty());
        assert_eq!(tracker.running(), 1);
    }

    #[test]
    fn test_stale_entries() {
        let (tracker, clock) = tracker();
        tracker.register(1, "a", "i1").unwrap();
        clock.advance(Duration::minutes(10));
        tracker.register(2, "b", "i2").unwrap();

        let stale = tracker.stale(Duration::minutes(5));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].0, 1);
        assert_eq!(stale[0].1.invocation_id, "i1");
    }

    #[test]
    fn test_validation() {
        let (tracker, _clock) = tracker();
        assert!(tracker.register(0, "a", "i1").is_err());
        assert!(tracker.register(1, "", "i1").is_err());
        assert_eq!(
            tracker.register(1, "a", ""),
            Err(GateError::InvalidInvocationId)
        );
        assert_eq!(tracker.remove(1, ""), Err(GateError::InvalidKey));
        assert!(tracker.query(0, NONE).is_err());
    }
}

//! Two-step admission control for command invocations
//!
//! A command is admitted when it is not cooling down for the user and none of
//! its interfering commands is running for the user. Cooldown is checked
//! first. Admission registers both a cooldown window and a running entry, and
//! hands back an [`Invocation`] guard that releases the running entry when it
//! is ended or dropped.

use crate::GATE_TARGET;
use crate::gate::error::{validate_command_name, validate_duration, validate_user};
use crate::gate::{
    Clock, CooldownTracker, GateError, GateResult, InterferenceTracker, SystemClock,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use derive_more::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Shortest period accepted by [`CommandGate::spawn_sweeper`]
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Why an invocation was refused
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum Rejection {
    /// The command is still cooling down for this user
    #[display("cooldown")]
    Cooldown {
        /// Earliest instant at which the command may run again
        retry_at: DateTime<Utc>,
    },
    /// Commands that must not overlap with this one are running
    #[display("interfering")]
    Interfering {
        /// Names of the running commands, first-seen order, without repeats
        blockers: Vec<String>,
    },
}

/// Result of an admission attempt
#[derive(Debug)]
pub enum Admission {
    /// Admitted; the guard keeps the invocation registered as running
    Allowed(Invocation),
    /// Refused; nothing was registered
    Rejected(Rejection),
}

impl Admission {
    /// Whether the invocation was admitted
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed(_))
    }
}

/// Result of running a handler through the gate
#[derive(Debug)]
pub enum Outcome<T> {
    /// The handler ran to completion
    Completed(T),
    /// The handler was never invoked
    Rejected(Rejection),
}

/// Guard for an admitted invocation.
///
/// The running entry is released by [`Invocation::end`] or, failing that, when
/// the guard is dropped. Both paths remove by invocation id.
#[must_use = "dropping the invocation releases it immediately"]
pub struct Invocation {
    tracker: InterferenceTracker,
    user_id: u64,
    command_name: String,
    id: String,
    released: bool,
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("user_id", &self.user_id)
            .field("command_name", &self.command_name)
            .field("id", &self.id)
            .field("released", &self.released)
            .finish()
    }
}

impl Invocation {
    /// Invocation id
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// User who issued the command
    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Name of the admitted command
    #[must_use]
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Mark the command finished and release its running entry
    ///
    /// # Errors
    /// Only fails on invalid bookkeeping input, which an admitted invocation
    /// cannot carry.
    pub fn end(mut self) -> GateResult<()> {
        self.release()
    }

    fn release(&mut self) -> GateResult<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.tracker.remove(self.user_id, &self.id)?;
        debug!(
            target: GATE_TARGET,
            user_id = self.user_id,
            command = %self.command_name,
            invocation_id = %self.id,
            "Invocation released"
        );
        Ok(())
    }
}

impl Drop for Invocation {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                target: GATE_TARGET,
                invocation_id = %self.id,
                error = %e,
                "Failed to release invocation"
            );
        }
    }
}

/// Admission gate composing the cooldown and interference trackers
#[derive(Clone, Debug)]
pub struct CommandGate {
    cooldowns: CooldownTracker,
    interference: InterferenceTracker,
    /// Per-user lock held across check and register
    admissions: Arc<DashMap<u64, ()>>,
}

impl Default for CommandGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandGate {
    /// Create a gate on the wall clock
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a gate reading time from `clock`
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            cooldowns: CooldownTracker::new(Arc::clone(&clock)),
            interference: InterferenceTracker::new(clock),
            admissions: Arc::new(DashMap::new()),
        }
    }

    /// The cooldown tracker
    #[must_use]
    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// The interference tracker
    #[must_use]
    pub fn interference(&self) -> &InterferenceTracker {
        &self.interference
    }

    /// Evaluate both gates without registering anything.
    ///
    /// An empty `interfering` set skips the interference gate.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id or a blank command name.
    pub fn check<S: AsRef<str>>(
        &self,
        user_id: u64,
        command_name: &str,
        interfering: &[S],
    ) -> GateResult<Option<Rejection>> {
        validate_user(user_id)?;
        validate_command_name(command_name)?;

        let cooling = self.cooldowns.query(user_id, Some(command_name))?;
        if let Some(retry_at) = cooling.iter().map(|e| e.expires_at).min() {
            return Ok(Some(Rejection::Cooldown { retry_at }));
        }

        if interfering.is_empty() {
            return Ok(None);
        }
        let running = self.interference.query(user_id, interfering)?;
        if running.is_empty() {
            return Ok(None);
        }
        let mut blockers: Vec<String> = Vec::new();
        for entry in running {
            if !blockers.contains(&entry.command_name) {
                blockers.push(entry.command_name);
            }
        }
        Ok(Some(Rejection::Interfering { blockers }))
    }

    /// Admit an invocation under a freshly generated id
    ///
    /// # Errors
    /// Returns a validation error for bad input; a refusal is not an error.
    pub fn admit<S: AsRef<str>>(
        &self,
        user_id: u64,
        command_name: &str,
        interfering: &[S],
        cooldown_secs: u32,
    ) -> GateResult<Admission> {
        self.admit_with_id(
            user_id,
            command_name,
            interfering,
            cooldown_secs,
            Uuid::new_v4().to_string(),
        )
    }

    /// Admit an invocation under a caller-supplied id, such as an interaction id
    ///
    /// # Errors
    /// Returns a validation error for bad input; a refusal is not an error.
    pub fn admit_with_id<S: AsRef<str>>(
        &self,
        user_id: u64,
        command_name: &str,
        interfering: &[S],
        cooldown_secs: u32,
        invocation_id: impl Into<String>,
    ) -> GateResult<Admission> {
        let invocation_id = invocation_id.into();
        validate_user(user_id)?;
        validate_command_name(command_name)?;
        validate_duration(cooldown_secs)?;
        if invocation_id.is_empty() {
            return Err(GateError::InvalidInvocationId);
        }

        let _lock = self.admissions.entry(user_id).or_default();

        if let Some(rejection) = self.check(user_id, command_name, interfering)? {
            debug!(
                target: GATE_TARGET,
                user_id,
                command = %command_name,
                reason = %rejection,
                "Invocation rejected"
            );
            return Ok(Admission::Rejected(rejection));
        }

        self.cooldowns
            .register(user_id, command_name, cooldown_secs)?;
        self.interference
            .register(user_id, command_name, &invocation_id)?;

        Ok(Admission::Allowed(Invocation {
            tracker: self.interference.clone(),
            user_id,
            command_name: command_name.to_string(),
            id: invocation_id,
            released: false,
        }))
    }

    /// Release the running entry for an invocation by id.
    ///
    /// Goes through the tracker's name-or-id removal, so an id equal to a
    /// running command's name removes that command's entries instead.
    ///
    /// # Errors
    /// Returns a validation error for a zero user id or an empty id.
    pub fn complete(&self, user_id: u64, invocation_id: &str) -> GateResult<()> {
        self.interference.remove(user_id, invocation_id)?;
        Ok(())
    }

    /// Admit, then run `handler` with the invocation guard.
    ///
    /// The handler is not called when admission is refused. The guard releases
    /// on every exit path, including a panicking handler; a handler that needs
    /// to stay registered beyond its own future can move the guard elsewhere.
    ///
    /// # Errors
    /// Returns a validation error for bad input.
    pub async fn run<S, F, Fut, T>(
        &self,
        user_id: u64,
        command_name: &str,
        interfering: &[S],
        cooldown_secs: u32,
        handler: F,
    ) -> GateResult<Outcome<T>>
    where
        S: AsRef<str>,
        F: FnOnce(Invocation) -> Fut,
        Fut: Future<Output = T>,
    {
        match self.admit(user_id, command_name, interfering, cooldown_secs)? {
            Admission::Allowed(invocation) => Ok(Outcome::Completed(handler(invocation).await)),
            Admission::Rejected(rejection) => Ok(Outcome::Rejected(rejection)),
        }
    }

    /// Periodically prune expired cooldowns and report long-running invocations.
    ///
    /// Stale running entries are logged, never removed. The interval is at
    /// least one millisecond.
    pub fn spawn_sweeper(&self, interval: Duration, stale_after: Duration) -> JoinHandle<()> {
        let gate = self.clone();
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        let stale_after =
            chrono::Duration::from_std(stale_after).unwrap_or_else(|_| chrono::Duration::hours(1));

        info!(
            target: GATE_TARGET,
            interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            "Starting gate sweeper"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let pruned = gate.cooldowns.sweep_expired();
                if pruned > 0 {
                    debug!(target: GATE_TARGET, pruned, "Swept expired cooldowns");
                }
                for (user_id, entry) in gate.interference.stale(stale_after) {
                    warn!(
                        target: GATE_TARGET,
                        user_id,
                        command = %entry.command_name,
                        invocation_id = %entry.invocation_id,
                        started_at = %entry.started_at,
                        "Invocation still registered as running"
                    );
                }
                gate.admissions.clear();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ManualClock;
    use chrono::TimeZone;

    const NONE: &[&str] = &[];

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn gate() -> (CommandGate, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(t0()));
        (CommandGate::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_admit_registers_both_trackers() {
        let (gate, _clock) = gate();
        let Admission::Allowed(invocation) = gate.admit(1, "ping", NONE, 5).unwrap() else {
            panic!("Expected admission");
        };
        assert_eq!(invocation.command_name(), "ping");
        assert_eq!(invocation.user_id(), 1);

        assert_eq!(gate.cooldowns().query(1, Some("ping")).unwrap().len(), 1);
        let running = gate.interference().query(1, NONE).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].invocation_id, invocation.id());
    }

    #[test]
    fn test_cooldown_rejects_with_earliest_expiry() {
        let (gate, clock) = gate();
        gate.cooldowns().register(1, "ping", 30).unwrap();
        clock.advance(chrono::Duration::seconds(1));
        gate.cooldowns().register(1, "ping", 5).unwrap();

        let admission = gate.admit(1, "ping", NONE, 5).unwrap();
        match admission {
            Admission::Rejected(Rejection::Cooldown { retry_at }) => {
                assert_eq!(retry_at, t0() + chrono::Duration::seconds(6));
            }
            other => panic!("Expected cooldown rejection, got {other:?}"),
        }
        assert!(gate.interference().query(1, NONE).unwrap().is_empty());
    }

    #[test]
    fn test_cooldown_checked_before_interference() {
        let (gate, _clock) = gate();
        gate.cooldowns().register(1, "gather", 30).unwrap();
        gate.interference().register(1, "members", "i1").unwrap();

        let admission = gate.admit(1, "gather", &["members"], 0).unwrap();
        assert!(matches!(
            admission,
            Admission::Rejected(Rejection::Cooldown { .. })
        ));
    }

    #[test]
    fn test_interfering_rejection_names_blockers_once() {
        let (gate, _clock) = gate();
        gate.interference().register(1, "a", "i1").unwrap();
        gate.interference().register(1, "b", "i2").unwrap();
        gate.interference().register(1, "a", "i3").unwrap();
        gate.interference().register(1, "c", "i4").unwrap();

        let admission = gate.admit(1, "x", &["a", "b"], 0).unwrap();
        match admission {
            Admission::Rejected(Rejection::Interfering { blockers }) => {
                assert_eq!(blockers, ["a", "b"]);
            }
            other => panic!("Expected interfering rejection, got {other:?}"),
        }
        assert!(gate.cooldowns().query(1, Some("x")).unwrap().is_empty());
    }

    #[test]
    fn test_empty_interfering_set_ignores_running_commands() {
        let (gate, _clock) = gate();
        gate.interference().register(1, "a", "i1").unwrap();
        assert!(gate.admit(1, "b", NONE, 0).unwrap().is_allowed());
    }

    #[test]
    fn test_self_interference_blocks_concurrent_run() {
        let (gate, _clock) = gate();
        let first = gate.admit(1, "gather", &["gather"], 0).unwrap();
        assert!(first.is_allowed());
        let second = gate.admit(1, "gather", &["gather"], 0).unwrap();
        assert!(!second.is_allowed());

        drop(first);
        assert!(gate.admit(1, "gather", &["gather"], 0).unwrap().is_allowed());
    }

    #[test]
    fn test_users_are_isolated() {
        let (gate, _clock) = gate();
        let _held = gate.admit(1, "ping", &["ping"], 30).unwrap();
        assert!(gate.admit(2, "ping", &["ping"], 30).unwrap().is_allowed());
    }

    #[test]
    fn test_end_and_drop_release_once() {
        let (gate, _clock) = gate();
        let Admission::Allowed(a) = gate.admit(1, "a", NONE, 0).unwrap() else {
            panic!("Expected admission");
        };
        let Admission::Allowed(_b) = gate.admit(1, "b", NONE, 0).unwrap() else {
            panic!("Expected admission");
        };
        assert_eq!(gate.interference().running(), 2);

        a.end().unwrap();
        let running = gate.interference().query(1, NONE).unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].command_name, "b");
    }

    #[test]
    fn test_complete_by_id() {
        let (gate, _clock) = gate();
        let admission = gate.admit_with_id(1, "ping", NONE, 0, "inv-1").unwrap();
        let Admission::Allowed(invocation) = admission else {
            panic!("Expected admission");
        };
        assert_eq!(invocation.id(), "inv-1");

        gate.complete(1, "inv-1").unwrap();
        assert_eq!(gate.interference().running(), 0);
        drop(invocation);
        assert_eq!(gate.interference().running(), 0);
    }

    #[test]
    fn test_validation() {
        let (gate, _clock) = gate();
        assert_eq!(
            gate.admit(0, "ping", NONE, 0).unwrap_err(),
            GateError::InvalidUserId(0)
        );
        assert_eq!(
            gate.admit(1, "ping", NONE, 500).unwrap_err(),
            GateError::InvalidDuration(500)
        );
        assert_eq!(
            gate.admit_with_id(1, "ping", NONE, 0, "").unwrap_err(),
            GateError::InvalidInvocationId
        );
        assert!(gate.check(1, "", NONE).is_err());
    }

    #[test]
    fn test_concurrent_admissions_admit_one() {
        let (gate, _clock) = gate();
        let threads = 32;
        let barrier = Arc::new(std::sync::Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let gate = gate.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    match gate.admit(1, "gather", &["gather"], 0).unwrap() {
                        // Keep the winner registered until every thread is done
                        Admission::Allowed(invocation) => Some(invocation),
                        Admission::Rejected(_) => None,
                    }
                })
            })
            .collect();

        let admitted: Vec<_> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(admitted.len(), 1);
        assert_eq!(gate.interference().running(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_prunes_expired_cooldowns() {
        let (gate, clock) = gate();
        drop(gate.admit(1, "ping", NONE, 5).unwrap());
        drop(gate.admit(2, "ping", NONE, 60).unwrap());
        assert_eq!(gate.cooldowns().tracked_users(), 2);
        assert_eq!(gate.admissions.len(), 2);

        clock.advance(chrono::Duration::seconds(10));
        let sweeper = gate.spawn_sweeper(Duration::from_secs(30), Duration::from_secs(900));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(gate.cooldowns().tracked_users(), 1);
        assert!(gate.admissions.is_empty());

        clock.advance(chrono::Duration::seconds(60));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(gate.cooldowns().tracked_users(), 0);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_accepts_zero_interval() {
        let (gate, clock) = gate();
        drop(gate.admit(1, "ping", NONE, 5).unwrap());
        clock.advance(chrono::Duration::seconds(10));

        let sweeper = gate.spawn_sweeper(Duration::ZERO, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!sweeper.is_finished());
        assert_eq!(gate.cooldowns().tracked_users(), 0);
        sweeper.abort();
    }

    #[tokio::test]
    async fn test_run_skips_handler_when_cooling_down() {
        let (gate, _clock) = gate();
        gate.cooldowns().register(1, "ping", 5).unwrap();

        let mut called = false;
        let outcome = gate
            .run(1, "ping", NONE, 5, |_invocation| {
                called = true;
                async {}
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Rejected(Rejection::Cooldown { .. })));
        assert!(!called);
    }

    #[tokio::test]
    async fn test_run_releases_after_handler_error() {
        let (gate, _clock) = gate();
        let outcome = gate
            .run(1, "ping", NONE, 0, |_invocation| async {
                Err::<(), &str>("handler failed")
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(Err("handler failed"))));
        assert_eq!(gate.interference().running(), 0);
    }

    #[tokio::test]
    async fn test_run_releases_after_handler_panic() {
        let (gate, _clock) = gate();
        let task_gate = gate.clone();
        let joined = tokio::spawn(async move {
            task_gate
                .run(1, "ping", NONE, 0, |_invocation| async {
                    panic!("handler exploded");
                })
                .await
        })
        .await;
        assert!(joined.is_err());
        assert_eq!(gate.interference().running(), 0);
    }

    #[tokio::test]
    async fn test_moved_guard_keeps_invocation_running() {
        let (gate, _clock) = gate();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let outcome = gate
            .run(1, "gather", &["gather"], 0, |invocation| async move {
                tx.send(invocation).unwrap();
            })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Completed(())));
        assert!(!gate.admit(1, "gather", &["gather"], 0).unwrap().is_allowed());

        rx.await.unwrap().end().unwrap();
        assert!(gate.admit(1, "gather", &["gather"], 0).unwrap().is_allowed());
    }
}

//! Run-state gate for the poll loop.
//!
//! One mutex-guarded [`RunState`] plus one condvar replace a pair of
//! independently toggled run/keep-alive flags. `ShuttingDown` satisfies
//! every wait predicate, so teardown always wakes a paused loop; there is
//! no second flag to forget to flip.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle state of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Loop is alive but holding before the next scan.
    Paused,
    /// Loop is actively scanning.
    Running,
    /// Loop must exit at the next state check. Terminal.
    ShuttingDown,
}

/// Pausable wait condition gating the poll loop.
///
/// Every transition signals the condvar so a waiting loop re-evaluates its
/// predicate instead of missing an edge.
#[derive(Debug)]
pub(crate) struct PollGate {
    state: Mutex<RunState>,
    cond: Condvar,
}

impl PollGate {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RunState::Paused),
            cond: Condvar::new(),
        }
    }

    /// Snapshot of the current state.
    pub(crate) fn state(&self) -> RunState {
        *self.lock_state()
    }

    /// Opens the gate: `Paused` becomes `Running`. Idempotent and never
    /// overrides `ShuttingDown`.
    pub(crate) fn resume(&self) {
        let mut state = self.lock_state();
        if *state == RunState::Paused {
            *state = RunState::Running;
        }
        self.cond.notify_all();
    }

    /// Closes the gate: `Running` becomes `Paused`. The loop finishes its
    /// in-flight scan before honoring the pause.
    pub(crate) fn pause(&self) {
        let mut state = self.lock_state();
        if *state == RunState::Running {
            *state = RunState::Paused;
        }
        self.cond.notify_all();
    }

    /// Forces `ShuttingDown` from any state and wakes every waiter.
    pub(crate) fn shutdown(&self) {
        let mut state = self.lock_state();
        *state = RunState::ShuttingDown;
        self.cond.notify_all();
    }

    /// Blocks until the loop may proceed. Returns `Running` or
    /// `ShuttingDown`, never `Paused`.
    pub(crate) fn wait_runnable(&self) -> RunState {
        let guard = self.lock_state();
        let guard = self
            .cond
            .wait_while(guard, |state| *state == RunState::Paused)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Sleeps up to `interval` between scans. Returns early only on
    /// shutdown; a pause during the sleep takes effect at the next
    /// [`PollGate::wait_runnable`].
    pub(crate) fn idle_wait(&self, interval: Duration) -> RunState {
        let guard = self.lock_state();
        let (guard, _timeout) = self
            .cond
            .wait_timeout_while(guard, interval, |state| *state != RunState::ShuttingDown)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! Single-slot cancellable timer for deferred reports and retries.
//!
//! State machine: `Idle -> Scheduled -> (fires) -> Idle`, plus
//! `Scheduled -> Scheduled` when a new wait replaces the pending one.

use serde::Serialize;
use strum_macros::{AsRefStr, Display};
use tokio::task::AbortHandle;

/// Externally visible timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimerState {
    /// No report pending.
    Idle,
    /// One report pending.
    Scheduled,
}

#[derive(Debug)]
enum Slot {
    Idle,
    Scheduled { generation: u64, handle: AbortHandle },
}

/// At most one outstanding timer task.
///
/// Every schedule gets a fresh generation; a task that wakes up with a stale
/// generation has been superseded and must not act.
#[derive(Debug)]
pub(crate) struct RetryTimer {
    slot: Slot,
    next_generation: u64,
}

impl RetryTimer {
    pub(crate) fn new() -> Self {
        Self {
            slot: Slot::Idle,
            next_generation: 0,
        }
    }

    pub(crate) fn state(&self) -> TimerState {
        match self.slot {
            Slot::Idle => TimerState::Idle,
            Slot::Scheduled { .. } => TimerState::Scheduled,
        }
    }

    /// Cancel the pending timer, if any, and install a new one.
    ///
    /// `spawn` receives the new generation and returns the abort handle of the
    /// task it started.
    pub(crate) fn reschedule<F>(&mut self, spawn: F)
    where
        F: FnOnce(u64) -> AbortHandle,
    {
        self.cancel();
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        let handle = spawn(generation);
        self.slot = Slot::Scheduled { generation, handle };
    }

    /// Mark the timer of `generation` as fired.
    ///
    /// Returns `false` if that timer was superseded in the meantime.
    pub(crate) fn fire(&mut self, generation: u64) -> bool {
        match self.slot {
            Slot::Scheduled { generation: current, .. } if current == generation => {
                self.slot = Slot::Idle;
                true
            }
            _ => false,
        }
    }

    fn cancel(&mut self) {
        if let Slot::Scheduled { handle, .. } = std::mem::replace(&mut self.slot, Slot::Idle) {
            handle.abort();
        }
    }
}

impl Drop for RetryTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

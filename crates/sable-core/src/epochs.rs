//! Slow-path epoch tracking and cooperative cancellation.
//!
//! The main thread and the typechecker thread coordinate through a single
//! packed atomic word: the epoch of the in-flight slow path plus a RUNNING
//! flag. Cancellation is cooperative: the typechecker polls
//! [`EpochState::cancelled`] between units of work, and the final commit and
//! [`EpochState::try_cancel`] race through one compare-and-swap each, so
//! exactly one of them wins.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing identifier assigned to each canonicalized
/// workspace edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u32);

impl Epoch {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Epoch {
        Epoch(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const RUNNING: u64 = 1 << 32;
const IDLE: u64 = 0;

/// The sole piece of state shared between the main thread and the typechecker
/// thread. Shared by `Arc` across [`crate::GlobalState::deep_copy`], so a
/// clone handed to the typechecker observes cancellation triggered through
/// the original.
#[derive(Debug, Default)]
pub struct EpochState {
    state: AtomicU64,
}

impl EpochState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a cancelable slow path as in flight at `epoch`.
    pub fn start_commit(&self, epoch: Epoch) {
        self.state
            .store(u64::from(epoch.to_raw()) | RUNNING, Ordering::SeqCst);
    }

    /// Returns the epoch of the in-flight slow path, if any.
    pub fn running_slow_path(&self) -> Option<Epoch> {
        let state = self.state.load(Ordering::SeqCst);
        (state & RUNNING != 0).then(|| Epoch(state as u32))
    }

    /// True once the slow path started at `epoch` has been superseded.
    pub fn cancelled(&self, epoch: Epoch) -> bool {
        self.running_slow_path() != Some(epoch)
    }

    /// Attempts to cancel the in-flight slow path.
    ///
    /// Fails if no slow path is running, or if the typechecker's final commit
    /// already retired it. The two transitions contend on the same
    /// compare-and-swap, so a cancel can never tear a commit in half.
    pub fn try_cancel(&self) -> bool {
        let mut current = self.state.load(Ordering::SeqCst);
        loop {
            if current & RUNNING == 0 {
                return false;
            }
            match self
                .state
                .compare_exchange(current, IDLE, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Retires the slow path at `epoch` after a successful typecheck.
    ///
    /// Returns false if the run was cancelled after its last cooperative
    /// check; the caller must then discard its results.
    pub fn try_commit(&self, epoch: Epoch) -> bool {
        self.state
            .compare_exchange(
                u64::from(epoch.to_raw()) | RUNNING,
                IDLE,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

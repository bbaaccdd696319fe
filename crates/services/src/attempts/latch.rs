use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

const OPEN: u8 = 0;
const FINALIZING: u8 = 1;
const SUBMITTED: u8 = 2;

/// Observable state of an [`AttemptLatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    Open,
    Finalizing,
    Submitted,
}

/// One-shot gate in front of the finalize transition.
///
/// `try_begin` is a single compare-and-set, so of any number of concurrent
/// callers exactly one wins. The winner either `complete`s or `release`s;
/// losers may wait for that outcome with [`AttemptLatch::settled`].
#[derive(Debug)]
pub struct AttemptLatch {
    state: AtomicU8,
    settled: Notify,
}

impl AttemptLatch {
    #[must_use]
    pub fn new(submitted: bool) -> Self {
        Self {
            state: AtomicU8::new(if submitted { SUBMITTED } else { OPEN }),
            settled: Notify::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LatchState {
        match self.state.load(Ordering::Acquire) {
            OPEN => LatchState::Open,
            FINALIZING => LatchState::Finalizing,
            _ => LatchState::Submitted,
        }
    }

    /// Claims the latch. On failure returns the state that blocked the claim.
    ///
    /// # Errors
    ///
    /// Returns `LatchState::Finalizing` or `LatchState::Submitted` when the
    /// latch is not open.
    pub fn try_begin(&self) -> Result<(), LatchState> {
        self.state
            .compare_exchange(OPEN, FINALIZING, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|current| {
                if current == FINALIZING {
                    LatchState::Finalizing
                } else {
                    LatchState::Submitted
                }
            })
    }

    /// Hands a claimed latch back after a failed finalize write.
    pub fn release(&self) {
        let _ = self.state.compare_exchange(
            FINALIZING,
            OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.settled.notify_waiters();
    }

    pub fn complete(&self) {
        self.state.store(SUBMITTED, Ordering::Release);
        self.settled.notify_waiters();
    }

    /// Waits until no finalize is in flight and returns the resulting state,
    /// either `Open` (the write failed) or `Submitted`.
    pub async fn settled(&self) -> LatchState {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            let state = self.state();
            if state != LatchState::Finalizing {
                return state;
            }
            notified.await;
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == LatchState::Open
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.state() == LatchState::Submitted
    }
}

//! DoneSignal - one-shot flag with interruptible timed waits

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One-shot completion signal
///
/// Once set it stays set; every waiter wakes immediately.
#[derive(Debug, Default)]
pub struct DoneSignal {
    done: Mutex<bool>,
    cond: Condvar,
}

impl DoneSignal {
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the signal and wake all waiters
    pub fn set(&self) {
        *self.flag() = true;
        self.cond.notify_all();
    }

    pub fn is_set(&self) -> bool {
        *self.flag()
    }

    /// Wait up to `timeout` for the signal
    ///
    /// Returns true if the signal is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.flag();
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

//! # Cancellation Token
//!
//! Shared shutdown signal for the background threads (reconnect timer,
//! transport event pump, serial read loop). A token is cloned into each
//! thread; `cancel()` wakes every blocked `wait_timeout` immediately so
//! teardown never waits out a full poll interval.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake all waiters.
    pub fn cancel(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock().unwrap() = true;
        condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap()
    }

    /// Sleep for up to `duration`. Returns `true` if the token was
    /// cancelled before or during the wait.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let mut cancelled = flag.lock().unwrap();
        let deadline = std::time::Instant::now() + duration;
        while !*cancelled {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return false;
            }
            let (guard, timeout) = condvar.wait_timeout(cancelled, remaining).unwrap();
            cancelled = guard;
            if timeout.timed_out() {
                return *cancelled;
            }
        }
        true
    }
}
